use crate::ir::instr::{NonTerminator, Terminator};

/// An opaque index identifying a basic block within a `Function`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// A basic block.
///
/// Invariants enforced by `Function::validate()` and the decoder:
/// 1. `terminator` is present once the function is complete.
/// 2. Every `BlockId` named by the terminator indexes the same function.
/// 3. `name` is unique within the function; it is the block's identity on the wire.
///
/// The split between `instructions` and `terminator` makes "exactly one
/// terminator, and it comes last" hold structurally.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub id: BlockId,
    pub name: String,
    /// Non-terminator instructions in program order.
    pub instructions: Vec<NonTerminator>,
    pub terminator: Option<Terminator>,
}

impl BasicBlock {
    pub fn new(id: BlockId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            instructions: Vec::new(),
            terminator: None,
        }
    }

    /// A block is sealed when it has a terminator.
    pub fn is_sealed(&self) -> bool {
        self.terminator.is_some()
    }

    /// Successor blocks, empty for unsealed blocks and for return/panic.
    pub fn successors(&self) -> Vec<BlockId> {
        self.terminator
            .as_ref()
            .map(|t| t.op.successors())
            .unwrap_or_default()
    }

    /// Instruction count including the terminator.
    pub fn len(&self) -> usize {
        self.instructions.len() + usize::from(self.terminator.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
