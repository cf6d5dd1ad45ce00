use std::fmt;

use crate::ir::block::BlockId;
use crate::ir::package::PackageId;
use crate::ir::types::TypeId;

/// An index into a function's local variable list.
///
/// Invariant: `VarId(n)` is only valid within the `Function` that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub u32);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKind {
    Local = 1,
    Arg = 2,
    Temp = 3,
    Return = 4,
    Global = 5,
    SelfRef = 6,
    Constant = 7,
    Synthetic = 8,
}

impl VarKind {
    pub fn from_i8(v: i8) -> Option<Self> {
        match v {
            1 => Some(VarKind::Local),
            2 => Some(VarKind::Arg),
            3 => Some(VarKind::Temp),
            4 => Some(VarKind::Return),
            5 => Some(VarKind::Global),
            6 => Some(VarKind::SelfRef),
            7 => Some(VarKind::Constant),
            8 => Some(VarKind::Synthetic),
            _ => None,
        }
    }

    /// Module-level kinds are referenced by package and name, not by slot.
    pub fn is_module_level(self) -> bool {
        matches!(self, VarKind::Global | VarKind::Constant)
    }
}

impl fmt::Display for VarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VarKind::Local => "LOCAL",
            VarKind::Arg => "ARG",
            VarKind::Temp => "TEMP",
            VarKind::Return => "RETURN",
            VarKind::Global => "GLOBAL",
            VarKind::SelfRef => "SELF",
            VarKind::Constant => "CONSTANT",
            VarKind::Synthetic => "SYNTHETIC",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarScope {
    Function = 1,
    Global = 2,
}

impl VarScope {
    pub fn from_i8(v: i8) -> Option<Self> {
        match v {
            1 => Some(VarScope::Function),
            2 => Some(VarScope::Global),
            _ => None,
        }
    }
}

/// Live range of a source-level local: the block it is declared in, the
/// block where its lexical scope ends and the instruction offset of the
/// declaration inside the start block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarRange {
    pub start: BlockId,
    pub end: BlockId,
    pub ins_offset: i32,
}

/// A variable declaration inside a function.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDcl {
    /// Unique within the enclosing function.
    pub name: String,
    /// Source-level name for arguments and locals.
    pub meta_var_name: Option<String>,
    /// `None` when the type is not known (e.g. untyped temporaries).
    pub ty: Option<TypeId>,
    pub kind: VarKind,
    pub scope: VarScope,
    /// Present for `VarKind::Local` only.
    pub range: Option<VarRange>,
}

impl VariableDcl {
    pub fn new(name: impl Into<String>, kind: VarKind, ty: Option<TypeId>) -> Self {
        VariableDcl {
            name: name.into(),
            meta_var_name: None,
            ty,
            kind,
            scope: VarScope::Function,
            range: None,
        }
    }
}

/// Reference to a module-level variable or constant.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalRef {
    pub kind: VarKind,
    pub scope: VarScope,
    pub name: String,
    pub pkg: PackageId,
    pub ty: Option<TypeId>,
}

/// An instruction operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A variable of the enclosing function.
    Var(VarId),
    Global(GlobalRef),
    /// A discarded value of the given type.
    Ignored { ty: Option<TypeId> },
}

impl Operand {
    pub fn var(&self) -> Option<VarId> {
        match self {
            Operand::Var(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<VarId> for Operand {
    fn from(v: VarId) -> Self {
        Operand::Var(v)
    }
}
