use std::collections::HashSet;

use crate::error::InvariantError;
use crate::ir::block::{BasicBlock, BlockId};
use crate::ir::instr::{ChannelDetail, NonTerminatorOp, TerminatorOp};
use crate::ir::meta::{AnnotationAttachment, Markdown, Position, SymbolOrigin};
use crate::ir::operand::{Operand, VarId, VarKind, VariableDcl};
use crate::ir::types::TypeId;

/// A declared parameter at the signature level.
#[derive(Debug, Clone, PartialEq)]
pub struct RequiredParam {
    pub name: String,
    pub flags: i64,
    pub annotations: Vec<AnnotationAttachment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestParam {
    pub name: String,
    pub annotations: Vec<AnnotationAttachment>,
}

/// Receiver of an attached (method-like) function.
#[derive(Debug, Clone, PartialEq)]
pub struct Receiver {
    pub kind: VarKind,
    pub ty: TypeId,
    pub name: String,
}

/// Parameter as seen by the function body.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamInfo {
    pub kind: VarKind,
    pub ty: Option<TypeId>,
    pub name: String,
    /// Written on the wire only for `VarKind::Arg`.
    pub meta_var_name: Option<String>,
    pub has_default: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathParam {
    pub name: String,
    pub ty: TypeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathSegment {
    pub name: String,
    pub pos: Position,
    pub ty: TypeId,
}

/// Extra signature data of resource functions.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceFunction {
    pub path_params: Vec<PathParam>,
    pub rest_path_param: Option<PathParam>,
    pub segments: Vec<PathSegment>,
    pub accessor: String,
}

/// One lexical scope. Ids are assigned in order of entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeEntry {
    pub id: i32,
    /// Function-wide instruction count at the point the scope opens.
    pub ins_offset: i32,
    pub parent: Option<i32>,
}

/// A trap region: errors raised between `trap` and `end` jump to `target`.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEntry {
    pub trap: BlockId,
    pub end: BlockId,
    pub error_op: Operand,
    pub target: BlockId,
}

/// A function in basic-block form.
///
/// Blocks and variables are stored in flat `Vec`s indexed by `BlockId` and
/// `VarId`. The entry block is `blocks[0]`. Variable names are unique, and
/// when present the return variable is the first local.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub pos: Position,
    pub name: String,
    pub original_name: String,
    pub worker_name: String,
    pub flags: i64,
    pub origin: SymbolOrigin,
    /// The function's invokable type.
    pub ty: TypeId,
    pub resource: Option<ResourceFunction>,
    pub annotations: Vec<AnnotationAttachment>,
    pub return_annotations: Vec<AnnotationAttachment>,
    pub required_params: Vec<RequiredParam>,
    pub rest_param: Option<RestParam>,
    pub receiver: Option<Receiver>,
    pub doc: Option<Markdown>,
    /// Names of module globals the function reads or writes.
    pub dependent_globals: Vec<String>,
    pub scopes: Vec<ScopeEntry>,
    pub args_count: i32,
    pub return_var: Option<VarId>,
    pub params: Vec<ParamInfo>,
    pub(crate) local_vars: Vec<VariableDcl>,
    pub(crate) blocks: Vec<BasicBlock>,
    pub error_table: Vec<ErrorEntry>,
    pub worker_channels: Vec<ChannelDetail>,
}

impl Function {
    pub fn new(name: impl Into<String>, ty: TypeId) -> Self {
        let name = name.into();
        Function {
            pos: Position::default(),
            original_name: name.clone(),
            name,
            worker_name: String::new(),
            flags: 0,
            origin: SymbolOrigin::Source,
            ty,
            resource: None,
            annotations: Vec::new(),
            return_annotations: Vec::new(),
            required_params: Vec::new(),
            rest_param: None,
            receiver: None,
            doc: None,
            dependent_globals: Vec::new(),
            scopes: Vec::new(),
            args_count: 0,
            return_var: None,
            params: Vec::new(),
            local_vars: Vec::new(),
            blocks: Vec::new(),
            error_table: Vec::new(),
            worker_channels: Vec::new(),
        }
    }

    /// Returns the entry block, if the function has any blocks.
    pub fn entry_block(&self) -> Option<&BasicBlock> {
        self.blocks.first()
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.0 as usize)
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(id.0 as usize)
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn block_by_name(&self, name: &str) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.name == name)
    }

    pub fn local_vars(&self) -> &[VariableDcl] {
        &self.local_vars
    }

    pub fn var(&self, id: VarId) -> Option<&VariableDcl> {
        self.local_vars.get(id.0 as usize)
    }

    pub fn var_by_name(&self, name: &str) -> Option<VarId> {
        self.local_vars
            .iter()
            .position(|v| v.name == name)
            .map(|i| VarId(i as u32))
    }

    /// Appends an empty block named `bb{n}` where `n` is its index.
    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(id, id.to_string()));
        id
    }

    /// Appends an empty block with an explicit name.
    pub fn add_named_block(&mut self, name: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(id, name));
        id
    }

    pub fn add_var(&mut self, var: VariableDcl) -> VarId {
        let id = VarId(self.local_vars.len() as u32);
        self.local_vars.push(var);
        id
    }

    /// Total number of instructions, terminators included.
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(BasicBlock::len).sum()
    }

    /// Checks the structural invariants the codec relies on.
    pub fn validate(&self) -> Result<(), InvariantError> {
        let mut names = HashSet::new();
        for block in &self.blocks {
            if !names.insert(block.name.as_str()) {
                return Err(InvariantError::DuplicateBlock {
                    func: self.name.clone(),
                    block: block.name.clone(),
                });
            }
            let Some(term) = &block.terminator else {
                return Err(InvariantError::MissingTerminator {
                    func: self.name.clone(),
                    block: block.name.clone(),
                });
            };
            for succ in term.op.successors() {
                self.check_block(succ)?;
            }
            self.check_terminator_operands(&term.op)?;
            for instr in &block.instructions {
                self.check_instruction_operands(&instr.op)?;
            }
        }

        let mut vars = HashSet::new();
        for var in &self.local_vars {
            if !vars.insert(var.name.as_str()) {
                return Err(InvariantError::DuplicateVariable {
                    func: self.name.clone(),
                    name: var.name.clone(),
                });
            }
            if let Some(range) = &var.range {
                self.check_block(range.start)?;
                self.check_block(range.end)?;
            }
        }
        if let Some(ret) = self.return_var {
            self.check_var(ret)?;
        }
        for entry in &self.error_table {
            self.check_block(entry.trap)?;
            self.check_block(entry.end)?;
            self.check_block(entry.target)?;
        }
        Ok(())
    }

    fn check_block(&self, id: BlockId) -> Result<(), InvariantError> {
        if self.block(id).is_some() {
            Ok(())
        } else {
            Err(InvariantError::UnknownBlock {
                func: self.name.clone(),
                block: id.to_string(),
            })
        }
    }

    fn check_var(&self, id: VarId) -> Result<(), InvariantError> {
        if self.var(id).is_some() {
            Ok(())
        } else {
            Err(InvariantError::UnknownVariable {
                func: self.name.clone(),
                name: id.to_string(),
            })
        }
    }

    fn check_operand(&self, op: &Operand) -> Result<(), InvariantError> {
        match op {
            Operand::Var(v) => self.check_var(*v),
            Operand::Global(_) | Operand::Ignored { .. } => Ok(()),
        }
    }

    fn check_terminator_operands(&self, op: &TerminatorOp) -> Result<(), InvariantError> {
        match op {
            TerminatorOp::Branch { cond, .. } => self.check_operand(cond),
            TerminatorOp::Call { call, .. } | TerminatorOp::AsyncCall { call, .. } => {
                call.args.iter().try_for_each(|a| self.check_operand(a))?;
                call.lhs.iter().try_for_each(|l| self.check_operand(l))
            }
            TerminatorOp::Panic { error } => self.check_operand(error),
            _ => Ok(()),
        }
    }

    fn check_instruction_operands(&self, op: &NonTerminatorOp) -> Result<(), InvariantError> {
        match op {
            NonTerminatorOp::Move { lhs, rhs }
            | NonTerminatorOp::UnaryOp { lhs, rhs, .. }
            | NonTerminatorOp::TypeCast { lhs, rhs, .. }
            | NonTerminatorOp::TypeTest { lhs, rhs, .. }
            | NonTerminatorOp::IsLike { lhs, rhs, .. } => {
                self.check_operand(lhs)?;
                self.check_operand(rhs)
            }
            NonTerminatorOp::BinaryOp { lhs, rhs1, rhs2, .. } => {
                self.check_operand(lhs)?;
                self.check_operand(rhs1)?;
                self.check_operand(rhs2)
            }
            NonTerminatorOp::FieldAccess { lhs, key, rhs, .. } => {
                self.check_operand(lhs)?;
                self.check_operand(key)?;
                self.check_operand(rhs)
            }
            NonTerminatorOp::NewArray {
                lhs, size, values, ..
            } => {
                self.check_operand(lhs)?;
                self.check_operand(size)?;
                values.iter().try_for_each(|v| self.check_operand(v))
            }
            other => other
                .lhs()
                .map(|l| self.check_operand(l))
                .unwrap_or(Ok(())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instr::{Instr, Terminator};

    fn ret() -> Terminator {
        Instr::new(Position::default(), TerminatorOp::Return)
    }

    #[test]
    fn test_validate_accepts_sealed_blocks() {
        let mut f = Function::new("f", TypeId(0));
        let b0 = f.add_block();
        let b1 = f.add_block();
        f.block_mut(b0).unwrap().terminator = Some(Instr::new(
            Position::default(),
            TerminatorOp::Goto { target: b1 },
        ));
        f.block_mut(b1).unwrap().terminator = Some(ret());
        assert_eq!(f.validate(), Ok(()));
        assert_eq!(f.block_by_name("bb1").map(|b| b.id), Some(b1));
    }

    #[test]
    fn test_validate_rejects_open_block_and_dangling_target() {
        let mut f = Function::new("f", TypeId(0));
        let b0 = f.add_block();
        assert!(matches!(
            f.validate(),
            Err(InvariantError::MissingTerminator { .. })
        ));

        f.block_mut(b0).unwrap().terminator = Some(Instr::new(
            Position::default(),
            TerminatorOp::Goto { target: BlockId(9) },
        ));
        assert!(matches!(
            f.validate(),
            Err(InvariantError::UnknownBlock { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_duplicate_variable_names() {
        let mut f = Function::new("f", TypeId(0));
        let b0 = f.add_block();
        f.block_mut(b0).unwrap().terminator = Some(ret());
        f.add_var(VariableDcl::new("%0", VarKind::Return, None));
        f.add_var(VariableDcl::new("%0", VarKind::Temp, None));
        assert!(matches!(
            f.validate(),
            Err(InvariantError::DuplicateVariable { .. })
        ));
    }
}
