//! Read-only traversal over a package.
//!
//! Implement [`Visitor`] and override the hooks of interest; every hook
//! defaults to a no-op. `accept` walks items in declaration order, blocks in
//! index order and instructions in program order with the terminator last.

use std::collections::BTreeMap;

use crate::ir::block::BasicBlock;
use crate::ir::function::Function;
use crate::ir::instr::{InstructionKind, NonTerminator, NonTerminatorOp, Terminator, TerminatorOp};
use crate::ir::package::{Constant, GlobalVar, Package, TypeDefinition};

#[allow(unused_variables)]
pub trait Visitor {
    fn visit_package(&mut self, pkg: &Package) {}
    fn visit_constant(&mut self, constant: &Constant) {}
    fn visit_global(&mut self, global: &GlobalVar) {}
    fn visit_type_def(&mut self, def: &TypeDefinition) {}
    fn visit_function(&mut self, func: &Function) {}
    fn visit_block(&mut self, func: &Function, block: &BasicBlock) {}

    // terminators
    fn visit_goto(&mut self, instr: &Terminator) {}
    fn visit_call(&mut self, instr: &Terminator) {}
    fn visit_branch(&mut self, instr: &Terminator) {}
    fn visit_return(&mut self, instr: &Terminator) {}
    fn visit_async_call(&mut self, instr: &Terminator) {}
    fn visit_wait(&mut self, instr: &Terminator) {}
    fn visit_fp_call(&mut self, instr: &Terminator) {}
    fn visit_worker_receive(&mut self, instr: &Terminator) {}
    fn visit_worker_send(&mut self, instr: &Terminator) {}
    fn visit_flush(&mut self, instr: &Terminator) {}
    fn visit_lock(&mut self, instr: &Terminator) {}
    fn visit_field_lock(&mut self, instr: &Terminator) {}
    fn visit_unlock(&mut self, instr: &Terminator) {}
    fn visit_wait_all(&mut self, instr: &Terminator) {}
    fn visit_panic(&mut self, instr: &Terminator) {}
    fn visit_worker_alt_receive(&mut self, instr: &Terminator) {}
    fn visit_worker_multiple_receive(&mut self, instr: &Terminator) {}

    // non-terminators
    fn visit_move(&mut self, instr: &NonTerminator) {}
    fn visit_const_load(&mut self, instr: &NonTerminator) {}
    fn visit_new_structure(&mut self, instr: &NonTerminator) {}
    fn visit_field_access(&mut self, instr: &NonTerminator) {}
    fn visit_new_array(&mut self, instr: &NonTerminator) {}
    fn visit_new_error(&mut self, instr: &NonTerminator) {}
    fn visit_type_cast(&mut self, instr: &NonTerminator) {}
    fn visit_is_like(&mut self, instr: &NonTerminator) {}
    fn visit_type_test(&mut self, instr: &NonTerminator) {}
    fn visit_new_instance(&mut self, instr: &NonTerminator) {}
    fn visit_fp_load(&mut self, instr: &NonTerminator) {}
    fn visit_new_table(&mut self, instr: &NonTerminator) {}
    fn visit_new_typedesc(&mut self, instr: &NonTerminator) {}
    fn visit_binary_op(&mut self, instr: &NonTerminator) {}
    fn visit_unary_op(&mut self, instr: &NonTerminator) {}
    fn visit_xml(&mut self, instr: &NonTerminator) {}
    fn visit_regex(&mut self, instr: &NonTerminator) {}
    fn visit_record_default_fp_load(&mut self, instr: &NonTerminator) {}
}

impl Package {
    pub fn accept<V: Visitor + ?Sized>(&self, v: &mut V) {
        v.visit_package(self);
        for c in &self.constants {
            v.visit_constant(c);
        }
        for t in &self.type_defs {
            v.visit_type_def(t);
        }
        for g in &self.globals {
            v.visit_global(g);
        }
        for body in &self.type_def_bodies {
            for f in &body.attached_functions {
                f.accept(v);
            }
        }
        for f in &self.functions {
            f.accept(v);
        }
    }
}

impl Function {
    pub fn accept<V: Visitor + ?Sized>(&self, v: &mut V) {
        v.visit_function(self);
        for block in &self.blocks {
            block.accept(self, v);
        }
    }
}

impl BasicBlock {
    pub fn accept<V: Visitor + ?Sized>(&self, func: &Function, v: &mut V) {
        v.visit_block(func, self);
        for instr in &self.instructions {
            dispatch_non_terminator(instr, v);
        }
        if let Some(term) = &self.terminator {
            dispatch_terminator(term, v);
        }
    }
}

fn dispatch_terminator<V: Visitor + ?Sized>(instr: &Terminator, v: &mut V) {
    match &instr.op {
        TerminatorOp::Goto { .. } => v.visit_goto(instr),
        TerminatorOp::Call { .. } => v.visit_call(instr),
        TerminatorOp::Branch { .. } => v.visit_branch(instr),
        TerminatorOp::Return => v.visit_return(instr),
        TerminatorOp::AsyncCall { .. } => v.visit_async_call(instr),
        TerminatorOp::Wait { .. } => v.visit_wait(instr),
        TerminatorOp::FpCall { .. } => v.visit_fp_call(instr),
        TerminatorOp::WorkerReceive { .. } => v.visit_worker_receive(instr),
        TerminatorOp::WorkerSend { .. } => v.visit_worker_send(instr),
        TerminatorOp::Flush { .. } => v.visit_flush(instr),
        TerminatorOp::Lock { .. } => v.visit_lock(instr),
        TerminatorOp::FieldLock { .. } => v.visit_field_lock(instr),
        TerminatorOp::Unlock { .. } => v.visit_unlock(instr),
        TerminatorOp::WaitAll { .. } => v.visit_wait_all(instr),
        TerminatorOp::Panic { .. } => v.visit_panic(instr),
        TerminatorOp::WorkerAltReceive { .. } => v.visit_worker_alt_receive(instr),
        TerminatorOp::WorkerMultipleReceive { .. } => v.visit_worker_multiple_receive(instr),
    }
}

fn dispatch_non_terminator<V: Visitor + ?Sized>(instr: &NonTerminator, v: &mut V) {
    match &instr.op {
        NonTerminatorOp::Move { .. } => v.visit_move(instr),
        NonTerminatorOp::ConstLoad { .. } => v.visit_const_load(instr),
        NonTerminatorOp::NewStructure { .. } => v.visit_new_structure(instr),
        NonTerminatorOp::FieldAccess { .. } => v.visit_field_access(instr),
        NonTerminatorOp::NewArray { .. } => v.visit_new_array(instr),
        NonTerminatorOp::NewError { .. } => v.visit_new_error(instr),
        NonTerminatorOp::TypeCast { .. } => v.visit_type_cast(instr),
        NonTerminatorOp::IsLike { .. } => v.visit_is_like(instr),
        NonTerminatorOp::TypeTest { .. } => v.visit_type_test(instr),
        NonTerminatorOp::NewInstance { .. } => v.visit_new_instance(instr),
        NonTerminatorOp::FpLoad { .. } => v.visit_fp_load(instr),
        NonTerminatorOp::NewTable { .. } => v.visit_new_table(instr),
        NonTerminatorOp::NewTypedesc { .. } => v.visit_new_typedesc(instr),
        NonTerminatorOp::BinaryOp { .. } => v.visit_binary_op(instr),
        NonTerminatorOp::UnaryOp { .. } => v.visit_unary_op(instr),
        NonTerminatorOp::Xml { .. } => v.visit_xml(instr),
        NonTerminatorOp::Regex { .. } => v.visit_regex(instr),
        NonTerminatorOp::RecordDefaultFpLoad { .. } => v.visit_record_default_fp_load(instr),
    }
}

/// Tallies functions, blocks and instructions by kind.
#[derive(Debug, Default)]
pub struct InstructionStats {
    pub functions: usize,
    pub blocks: usize,
    pub by_kind: BTreeMap<&'static str, usize>,
}

impl InstructionStats {
    pub fn collect(pkg: &Package) -> Self {
        let mut stats = InstructionStats::default();
        pkg.accept(&mut stats);
        stats
    }

    pub fn total(&self) -> usize {
        self.by_kind.values().sum()
    }

    fn bump(&mut self, kind: InstructionKind) {
        *self.by_kind.entry(kind.name()).or_insert(0) += 1;
    }
}

impl Visitor for InstructionStats {
    fn visit_function(&mut self, _func: &Function) {
        self.functions += 1;
    }

    fn visit_block(&mut self, _func: &Function, block: &BasicBlock) {
        self.blocks += 1;
        for instr in &block.instructions {
            self.bump(instr.op.kind());
        }
        if let Some(term) = &block.terminator {
            self.bump(term.op.kind());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::block::BlockId;
    use crate::ir::instr::Instr;
    use crate::ir::meta::Position;
    use crate::ir::package::PackageId;
    use crate::ir::types::TypeId;

    #[derive(Default)]
    struct Trace(Vec<String>);

    impl Visitor for Trace {
        fn visit_function(&mut self, func: &Function) {
            self.0.push(format!("fn {}", func.name));
        }
        fn visit_block(&mut self, _func: &Function, block: &BasicBlock) {
            self.0.push(block.name.clone());
        }
        fn visit_goto(&mut self, _instr: &Terminator) {
            self.0.push("goto".into());
        }
        fn visit_return(&mut self, _instr: &Terminator) {
            self.0.push("return".into());
        }
    }

    #[test]
    fn test_walk_order_is_deterministic() {
        let mut pkg = Package::new(PackageId::anonymous());
        let mut f = Function::new("main", TypeId(0));
        let b0 = f.add_block();
        let b1 = f.add_block();
        f.block_mut(b0).unwrap().terminator = Some(Instr::new(
            Position::default(),
            TerminatorOp::Goto { target: BlockId(1) },
        ));
        f.block_mut(b1).unwrap().terminator =
            Some(Instr::new(Position::default(), TerminatorOp::Return));
        pkg.functions.push(f);

        let mut trace = Trace::default();
        pkg.accept(&mut trace);
        assert_eq!(trace.0, vec!["fn main", "bb0", "goto", "bb1", "return"]);

        let stats = InstructionStats::collect(&pkg);
        assert_eq!(stats.functions, 1);
        assert_eq!(stats.blocks, 2);
        assert_eq!(stats.total(), 2);
        assert_eq!(stats.by_kind.get("Goto"), Some(&1));
    }
}
