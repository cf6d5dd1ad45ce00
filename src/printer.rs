//! BIR pretty-printer.
//!
//! Emits a deterministic, human-readable rendering of a [`Package`]: the
//! module header, imports and globals, then every function with its blocks in
//! index order and instructions in program order.
//!
//! ```text
//! module acme/demo:0.1.0;
//! f(int) -> int{
//!   bb0 {
//!     %3 = ConstantLoad 1
//!     %2 = + x %3;
//!     %0 = %2;
//!     return;
//!   }
//! }
//! ```

use std::fmt::{self, Write};

use crate::ir::block::BasicBlock;
use crate::ir::function::Function;
use crate::ir::instr::{
    AccessKind, MappingEntry, NonTerminator, NonTerminatorOp, Terminator, TerminatorOp,
};
use crate::ir::operand::Operand;
use crate::ir::package::Package;
use crate::ir::types::{TypeBody, TypeId};

/// Renders a whole package to a string.
pub fn print_package(pkg: &Package) -> String {
    let mut out = String::new();
    // Writing into a `String` cannot fail.
    let _ = write_package(&mut out, pkg);
    out
}

/// Renders a single function to a string.
pub fn print_function(pkg: &Package, func: &Function) -> String {
    let mut out = String::new();
    let _ = Printer { pkg, func }.function(&mut out);
    out
}

pub fn write_package(out: &mut impl Write, pkg: &Package) -> fmt::Result {
    writeln!(out, "module {};", pkg.id)?;
    for imp in &pkg.imports {
        writeln!(out, "import {};", imp)?;
    }
    for g in &pkg.globals {
        writeln!(out, "{}  {};", g.name, pkg.types.display(g.ty))?;
    }
    for func in &pkg.functions {
        Printer { pkg, func }.function(out)?;
        writeln!(out)?;
    }
    Ok(())
}

struct Printer<'a> {
    pkg: &'a Package,
    func: &'a Function,
}

impl Printer<'_> {
    fn function(&self, out: &mut impl Write) -> fmt::Result {
        write!(out, "{}", self.func.name)?;
        match self.pkg.types.get(self.func.ty).map(|t| &t.body) {
            Some(TypeBody::Invokable(Some(inv))) => {
                let params: Vec<String> = inv.params.iter().map(|p| self.ty(*p)).collect();
                write!(out, "({}) -> {}", params.join(","), self.ty(inv.ret))?;
            }
            _ => write!(out, "<NIL>")?,
        }
        writeln!(out, "{{")?;
        for block in self.func.blocks() {
            self.block(out, block)?;
        }
        write!(out, "}}")
    }

    fn block(&self, out: &mut impl Write, block: &BasicBlock) -> fmt::Result {
        writeln!(out, "  {} {{", block.name)?;
        for instr in &block.instructions {
            write!(out, "    ")?;
            self.non_terminator(out, instr)?;
            writeln!(out)?;
        }
        if let Some(term) = &block.terminator {
            write!(out, "    ")?;
            self.terminator(out, term)?;
            writeln!(out)?;
        }
        writeln!(out, "  }}")
    }

    fn ty(&self, id: TypeId) -> String {
        self.pkg.types.display(id)
    }

    fn operand(&self, op: &Operand) -> String {
        match op {
            Operand::Var(id) => self
                .func
                .var(*id)
                .map(|v| v.name.clone())
                .unwrap_or_else(|| id.to_string()),
            Operand::Global(g) => g.name.clone(),
            Operand::Ignored { .. } => "_".to_string(),
        }
    }

    fn operand_list(&self, ops: &[&Operand], sep: &str) -> String {
        ops.iter()
            .map(|o| self.operand(o))
            .collect::<Vec<_>>()
            .join(sep)
    }

    fn block_name(&self, id: crate::ir::block::BlockId) -> String {
        self.func
            .block(id)
            .map(|b| b.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    fn terminator(&self, out: &mut impl Write, term: &Terminator) -> fmt::Result {
        match &term.op {
            TerminatorOp::Goto { target } => write!(out, "GOTO {};", self.block_name(*target)),
            TerminatorOp::Return => write!(out, "return;"),
            TerminatorOp::Branch {
                cond,
                on_true,
                on_false,
            } => write!(
                out,
                "{} ? {} : {};",
                self.operand(cond),
                self.block_name(*on_true),
                self.block_name(*on_false)
            ),
            TerminatorOp::Call { call, then } => {
                let args: Vec<&Operand> = call.args.iter().collect();
                if let Some(lhs) = &call.lhs {
                    write!(out, "{} = ", self.operand(lhs))?;
                }
                write!(
                    out,
                    "{}({}) -> {};",
                    call.name,
                    self.operand_list(&args, ","),
                    self.block_name(*then)
                )
            }
            other => {
                let (lhs, ops) = terminator_operands(other);
                if let Some(lhs) = lhs {
                    write!(out, "{} = ", self.operand(lhs))?;
                }
                write!(out, "{}", other.kind().name())?;
                if !ops.is_empty() {
                    write!(out, " {}", self.operand_list(&ops, " "))?;
                }
                let succ: Vec<String> = other
                    .successors()
                    .into_iter()
                    .map(|b| self.block_name(b))
                    .collect();
                if !succ.is_empty() {
                    write!(out, " -> {}", succ.join(" "))?;
                }
                write!(out, ";")
            }
        }
    }

    fn non_terminator(&self, out: &mut impl Write, instr: &NonTerminator) -> fmt::Result {
        match &instr.op {
            NonTerminatorOp::Move { lhs, rhs } => {
                write!(out, "{} = {};", self.operand(lhs), self.operand(rhs))
            }
            NonTerminatorOp::ConstLoad { lhs, value, .. } => {
                write!(out, "{} = ConstantLoad {}", self.operand(lhs), value)
            }
            NonTerminatorOp::BinaryOp {
                op,
                lhs,
                rhs1,
                rhs2,
            } => write!(
                out,
                "{} = {} {} {};",
                self.operand(lhs),
                op.symbol(),
                self.operand(rhs1),
                self.operand(rhs2)
            ),
            NonTerminatorOp::UnaryOp { op, lhs, rhs } => write!(
                out,
                "{} = {} {};",
                self.operand(lhs),
                op.symbol(),
                self.operand(rhs)
            ),
            NonTerminatorOp::FieldAccess {
                kind: AccessKind::ArrayStore,
                lhs,
                key,
                rhs,
                ..
            } => write!(
                out,
                "{}[{}] = {};",
                self.operand(lhs),
                self.operand(key),
                self.operand(rhs)
            ),
            NonTerminatorOp::FieldAccess {
                kind: AccessKind::ArrayLoad,
                lhs,
                key,
                rhs,
                ..
            } => write!(
                out,
                "{} = {}[{}];",
                self.operand(lhs),
                self.operand(rhs),
                self.operand(key)
            ),
            NonTerminatorOp::TypeCast { lhs, rhs, ty, .. } => write!(
                out,
                "{} = <{}>({})",
                self.operand(lhs),
                self.ty(*ty),
                self.operand(rhs)
            ),
            NonTerminatorOp::TypeTest { ty, lhs, rhs } => write!(
                out,
                "{} = {} is {}",
                self.operand(lhs),
                self.operand(rhs),
                self.ty(*ty)
            ),
            NonTerminatorOp::NewArray {
                ty,
                lhs,
                size,
                values,
                ..
            } => {
                let values: Vec<&Operand> = values.iter().collect();
                write!(
                    out,
                    "{} = newArray {}[{}]{{{}}}",
                    self.operand(lhs),
                    self.ty(*ty),
                    self.operand(size),
                    self.operand_list(&values, ", ")
                )
            }
            other => {
                if let Some(lhs) = other.lhs() {
                    write!(out, "{} = ", self.operand(lhs))?;
                }
                write!(out, "{}", other.kind().name())?;
                let ops = non_terminator_operands(other);
                if !ops.is_empty() {
                    write!(out, " {}", self.operand_list(&ops, " "))?;
                }
                write!(out, ";")
            }
        }
    }
}

/// Result and input operands of terminators without a dedicated form.
fn terminator_operands(op: &TerminatorOp) -> (Option<&Operand>, Vec<&Operand>) {
    match op {
        TerminatorOp::AsyncCall { call, .. } => (call.lhs.as_ref(), call.args.iter().collect()),
        TerminatorOp::Wait { exprs, lhs, .. } => (Some(lhs), exprs.iter().collect()),
        TerminatorOp::FpCall { fp, args, lhs, .. } => {
            (lhs.as_ref(), std::iter::once(fp).chain(args).collect())
        }
        TerminatorOp::WorkerReceive { lhs, .. }
        | TerminatorOp::Flush { lhs, .. }
        | TerminatorOp::WorkerAltReceive { lhs, .. }
        | TerminatorOp::WorkerMultipleReceive { lhs, .. } => (Some(lhs), Vec::new()),
        TerminatorOp::WorkerSend { data, lhs, .. } => (lhs.as_ref(), vec![data]),
        TerminatorOp::WaitAll { lhs, values, .. } => (Some(lhs), values.iter().collect()),
        TerminatorOp::Panic { error } => (None, vec![error]),
        TerminatorOp::Goto { .. }
        | TerminatorOp::Call { .. }
        | TerminatorOp::Branch { .. }
        | TerminatorOp::Return
        | TerminatorOp::Lock { .. }
        | TerminatorOp::FieldLock { .. }
        | TerminatorOp::Unlock { .. } => (None, Vec::new()),
    }
}

/// Input operands, in wire order, of non-terminators without a dedicated form.
fn non_terminator_operands(op: &NonTerminatorOp) -> Vec<&Operand> {
    match op {
        NonTerminatorOp::Move { rhs, .. }
        | NonTerminatorOp::UnaryOp { rhs, .. }
        | NonTerminatorOp::TypeCast { rhs, .. }
        | NonTerminatorOp::IsLike { rhs, .. }
        | NonTerminatorOp::TypeTest { rhs, .. } => vec![rhs],
        NonTerminatorOp::BinaryOp { rhs1, rhs2, .. } => vec![rhs1, rhs2],
        NonTerminatorOp::NewStructure {
            typedesc, entries, ..
        } => {
            let mut ops = vec![typedesc];
            for entry in entries {
                match entry {
                    MappingEntry::Spread(op) => ops.push(op),
                    MappingEntry::KeyValue { key, value } => {
                        ops.push(key);
                        ops.push(value);
                    }
                }
            }
            ops
        }
        NonTerminatorOp::FieldAccess {
            kind, lhs, key, rhs, ..
        } => {
            if kind.is_store() {
                vec![lhs, key, rhs]
            } else {
                vec![rhs, key]
            }
        }
        NonTerminatorOp::NewArray { size, values, .. } => {
            std::iter::once(size).chain(values).collect()
        }
        NonTerminatorOp::NewError {
            message,
            cause,
            detail,
            ..
        } => vec![message, cause, detail],
        NonTerminatorOp::FpLoad { closure_args, .. } => closure_args.iter().collect(),
        NonTerminatorOp::NewTable {
            key_columns, data, ..
        } => vec![key_columns, data],
        NonTerminatorOp::Xml { operands, .. } | NonTerminatorOp::Regex { operands, .. } => {
            operands.iter().collect()
        }
        NonTerminatorOp::ConstLoad { .. }
        | NonTerminatorOp::NewInstance { .. }
        | NonTerminatorOp::NewTypedesc { .. }
        | NonTerminatorOp::RecordDefaultFpLoad { .. } => Vec::new(),
    }
}
