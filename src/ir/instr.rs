//! Instructions.
//!
//! Every block holds a list of [`NonTerminator`]s followed by exactly one
//! [`Terminator`]. The split is also visible on the wire: the numeric
//! [`InstructionKind`] decides which family a decoded instruction belongs to
//! (see [`InstructionKind::is_terminator`]).

use crate::ir::block::BlockId;
use crate::ir::meta::{AnnotationAttachment, ConstValue, Position};
use crate::ir::operand::{Operand, VarKind};
use crate::ir::package::PackageId;
use crate::ir::types::TypeId;

macro_rules! instruction_kinds {
    ($($variant:ident = $value:literal,)*) => {
        /// Wire discriminant of an instruction.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum InstructionKind {
            $($variant = $value,)*
        }

        impl InstructionKind {
            /// Decodes the signed wire byte. `Platform` (128) arrives as -128.
            pub fn from_wire(value: i8) -> Option<InstructionKind> {
                match value as u8 {
                    $($value => Some(InstructionKind::$variant),)*
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(InstructionKind::$variant => stringify!($variant),)*
                }
            }
        }
    };
}

instruction_kinds! {
    Goto = 1,
    Call = 2,
    Branch = 3,
    Return = 4,
    AsyncCall = 5,
    Wait = 6,
    FpCall = 7,
    WkReceive = 8,
    WkSend = 9,
    Flush = 10,
    Lock = 11,
    FieldLock = 12,
    Unlock = 13,
    WaitAll = 14,
    Move = 20,
    ConstLoad = 21,
    NewStructure = 22,
    MapStore = 23,
    MapLoad = 24,
    NewArray = 25,
    ArrayStore = 26,
    ArrayLoad = 27,
    NewError = 28,
    TypeCast = 29,
    IsLike = 30,
    TypeTest = 31,
    NewInstance = 32,
    ObjectStore = 33,
    ObjectLoad = 34,
    Panic = 35,
    FpLoad = 36,
    StringLoad = 37,
    NewXmlElement = 38,
    NewXmlText = 39,
    NewXmlComment = 40,
    NewXmlPi = 41,
    NewXmlSequence = 42,
    NewXmlQname = 43,
    NewStringXmlQname = 44,
    XmlSeqStore = 45,
    XmlSeqLoad = 46,
    XmlLoad = 47,
    XmlLoadAll = 48,
    XmlAttributeLoad = 49,
    XmlAttributeStore = 50,
    NewTable = 51,
    NewTypedesc = 52,
    NewStream = 53,
    TableStore = 54,
    TableLoad = 55,
    Add = 61,
    Sub = 62,
    Mul = 63,
    Div = 64,
    Mod = 65,
    Equal = 66,
    NotEqual = 67,
    GreaterThan = 68,
    GreaterEqual = 69,
    LessThan = 70,
    LessEqual = 71,
    And = 72,
    Or = 73,
    RefEqual = 74,
    RefNotEqual = 75,
    ClosedRange = 76,
    HalfOpenRange = 77,
    AnnotAccess = 78,
    Typeof = 80,
    Not = 81,
    Negate = 82,
    BitwiseAnd = 83,
    BitwiseOr = 84,
    BitwiseXor = 85,
    BitwiseLeftShift = 86,
    BitwiseRightShift = 87,
    BitwiseUnsignedRightShift = 88,
    NewRegExp = 89,
    NewReDisjunction = 90,
    NewReSequence = 91,
    NewReAssertion = 92,
    NewReAtomQuantifier = 93,
    NewReLiteralCharEscape = 94,
    NewReCharClass = 95,
    NewReCharSet = 96,
    NewReCharSetRange = 97,
    NewReCapturingGroup = 98,
    NewReFlagExpr = 99,
    NewReFlagOnOff = 100,
    NewReQuantifier = 101,
    RecordDefaultFpLoad = 102,
    WkAltReceive = 103,
    WkMulReceive = 104,
    Platform = 128,
}

impl InstructionKind {
    /// Block-ending kinds: everything below `Move` plus panic and the two
    /// late-added receive forms.
    pub fn is_terminator(self) -> bool {
        let v = self as u8;
        v < InstructionKind::Move as u8
            || matches!(
                self,
                InstructionKind::Panic | InstructionKind::WkAltReceive | InstructionKind::WkMulReceive
            )
    }

    pub fn to_wire(self) -> i8 {
        self as u8 as i8
    }
}

/// An instruction with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Instr<Op> {
    pub pos: Position,
    pub op: Op,
}

impl<Op> Instr<Op> {
    pub fn new(pos: Position, op: Op) -> Self {
        Instr { pos, op }
    }
}

pub type Terminator = Instr<TerminatorOp>;
pub type NonTerminator = Instr<NonTerminatorOp>;

// ── terminators ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct CallInfo {
    pub is_virtual: bool,
    pub pkg: PackageId,
    pub name: String,
    pub args: Vec<Operand>,
    pub lhs: Option<Operand>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDetail {
    pub name: String,
    pub same_strand: bool,
    pub is_send: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveField {
    pub field_name: String,
    pub channel_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TerminatorOp {
    Goto {
        target: BlockId,
    },
    Call {
        call: CallInfo,
        then: BlockId,
    },
    Branch {
        cond: Operand,
        on_true: BlockId,
        on_false: BlockId,
    },
    Return,
    AsyncCall {
        call: CallInfo,
        annotations: Vec<AnnotationAttachment>,
        then: BlockId,
    },
    Wait {
        exprs: Vec<Operand>,
        lhs: Operand,
        then: BlockId,
    },
    FpCall {
        fp: Operand,
        args: Vec<Operand>,
        lhs: Option<Operand>,
        is_async: bool,
        annotations: Vec<AnnotationAttachment>,
        then: BlockId,
    },
    WorkerReceive {
        channel: String,
        lhs: Operand,
        same_strand: bool,
        then: BlockId,
    },
    /// `lhs` is present exactly for synchronous sends.
    WorkerSend {
        channel: String,
        data: Operand,
        same_strand: bool,
        lhs: Option<Operand>,
        then: BlockId,
    },
    Flush {
        channels: Vec<ChannelDetail>,
        lhs: Operand,
        then: BlockId,
    },
    Lock {
        target: BlockId,
    },
    FieldLock {
        local_var: String,
        field: String,
        target: BlockId,
    },
    Unlock {
        target: BlockId,
    },
    WaitAll {
        lhs: Operand,
        keys: Vec<String>,
        values: Vec<Operand>,
        then: BlockId,
    },
    Panic {
        error: Operand,
    },
    WorkerAltReceive {
        channels: Vec<String>,
        lhs: Operand,
        same_strand: bool,
        then: BlockId,
    },
    WorkerMultipleReceive {
        fields: Vec<ReceiveField>,
        ty: TypeId,
        lhs: Operand,
        same_strand: bool,
        then: BlockId,
    },
}

impl TerminatorOp {
    pub fn kind(&self) -> InstructionKind {
        use InstructionKind as K;
        match self {
            TerminatorOp::Goto { .. } => K::Goto,
            TerminatorOp::Call { .. } => K::Call,
            TerminatorOp::Branch { .. } => K::Branch,
            TerminatorOp::Return => K::Return,
            TerminatorOp::AsyncCall { .. } => K::AsyncCall,
            TerminatorOp::Wait { .. } => K::Wait,
            TerminatorOp::FpCall { .. } => K::FpCall,
            TerminatorOp::WorkerReceive { .. } => K::WkReceive,
            TerminatorOp::WorkerSend { .. } => K::WkSend,
            TerminatorOp::Flush { .. } => K::Flush,
            TerminatorOp::Lock { .. } => K::Lock,
            TerminatorOp::FieldLock { .. } => K::FieldLock,
            TerminatorOp::Unlock { .. } => K::Unlock,
            TerminatorOp::WaitAll { .. } => K::WaitAll,
            TerminatorOp::Panic { .. } => K::Panic,
            TerminatorOp::WorkerAltReceive { .. } => K::WkAltReceive,
            TerminatorOp::WorkerMultipleReceive { .. } => K::WkMulReceive,
        }
    }

    /// Blocks control may transfer to, in wire order.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            TerminatorOp::Branch {
                on_true, on_false, ..
            } => vec![*on_true, *on_false],
            TerminatorOp::Return | TerminatorOp::Panic { .. } => Vec::new(),
            TerminatorOp::Goto { target }
            | TerminatorOp::Lock { target }
            | TerminatorOp::FieldLock { target, .. }
            | TerminatorOp::Unlock { target } => vec![*target],
            TerminatorOp::Call { then, .. }
            | TerminatorOp::AsyncCall { then, .. }
            | TerminatorOp::Wait { then, .. }
            | TerminatorOp::FpCall { then, .. }
            | TerminatorOp::WorkerReceive { then, .. }
            | TerminatorOp::WorkerSend { then, .. }
            | TerminatorOp::Flush { then, .. }
            | TerminatorOp::WaitAll { then, .. }
            | TerminatorOp::WorkerAltReceive { then, .. }
            | TerminatorOp::WorkerMultipleReceive { then, .. } => vec![*then],
        }
    }

    /// Mutable access to the block references, in the same order as
    /// [`TerminatorOp::successors`].
    pub fn successors_mut(&mut self) -> Vec<&mut BlockId> {
        match self {
            TerminatorOp::Branch {
                on_true, on_false, ..
            } => vec![on_true, on_false],
            TerminatorOp::Return | TerminatorOp::Panic { .. } => Vec::new(),
            TerminatorOp::Goto { target }
            | TerminatorOp::Lock { target }
            | TerminatorOp::FieldLock { target, .. }
            | TerminatorOp::Unlock { target } => vec![target],
            TerminatorOp::Call { then, .. }
            | TerminatorOp::AsyncCall { then, .. }
            | TerminatorOp::Wait { then, .. }
            | TerminatorOp::FpCall { then, .. }
            | TerminatorOp::WorkerReceive { then, .. }
            | TerminatorOp::WorkerSend { then, .. }
            | TerminatorOp::Flush { then, .. }
            | TerminatorOp::WaitAll { then, .. }
            | TerminatorOp::WorkerAltReceive { then, .. }
            | TerminatorOp::WorkerMultipleReceive { then, .. } => vec![then],
        }
    }
}

// ── non-terminators ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
    And,
    Or,
    RefEqual,
    RefNotEqual,
    ClosedRange,
    HalfOpenRange,
    AnnotAccess,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    BitwiseLeftShift,
    BitwiseRightShift,
    BitwiseUnsignedRightShift,
}

impl BinaryOpKind {
    const ALL: [(BinaryOpKind, InstructionKind, &'static str); 24] = [
        (BinaryOpKind::Add, InstructionKind::Add, "+"),
        (BinaryOpKind::Sub, InstructionKind::Sub, "-"),
        (BinaryOpKind::Mul, InstructionKind::Mul, "*"),
        (BinaryOpKind::Div, InstructionKind::Div, "/"),
        (BinaryOpKind::Mod, InstructionKind::Mod, "%"),
        (BinaryOpKind::Equal, InstructionKind::Equal, "=="),
        (BinaryOpKind::NotEqual, InstructionKind::NotEqual, "!="),
        (BinaryOpKind::GreaterThan, InstructionKind::GreaterThan, ">"),
        (BinaryOpKind::GreaterEqual, InstructionKind::GreaterEqual, ">="),
        (BinaryOpKind::LessThan, InstructionKind::LessThan, "<"),
        (BinaryOpKind::LessEqual, InstructionKind::LessEqual, "<="),
        (BinaryOpKind::And, InstructionKind::And, "&&"),
        (BinaryOpKind::Or, InstructionKind::Or, "||"),
        (BinaryOpKind::RefEqual, InstructionKind::RefEqual, "==="),
        (BinaryOpKind::RefNotEqual, InstructionKind::RefNotEqual, "!=="),
        (BinaryOpKind::ClosedRange, InstructionKind::ClosedRange, "..."),
        (BinaryOpKind::HalfOpenRange, InstructionKind::HalfOpenRange, "..<"),
        (BinaryOpKind::AnnotAccess, InstructionKind::AnnotAccess, ".@"),
        (BinaryOpKind::BitwiseAnd, InstructionKind::BitwiseAnd, "&"),
        (BinaryOpKind::BitwiseOr, InstructionKind::BitwiseOr, "|"),
        (BinaryOpKind::BitwiseXor, InstructionKind::BitwiseXor, "^"),
        (BinaryOpKind::BitwiseLeftShift, InstructionKind::BitwiseLeftShift, "<<"),
        (BinaryOpKind::BitwiseRightShift, InstructionKind::BitwiseRightShift, ">>"),
        (
            BinaryOpKind::BitwiseUnsignedRightShift,
            InstructionKind::BitwiseUnsignedRightShift,
            ">>>",
        ),
    ];

    pub fn kind(self) -> InstructionKind {
        Self::ALL
            .iter()
            .find(|(op, _, _)| *op == self)
            .map(|(_, k, _)| *k)
            .unwrap_or(InstructionKind::Add)
    }

    pub fn from_kind(kind: InstructionKind) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|(_, k, _)| *k == kind)
            .map(|(op, _, _)| *op)
    }

    pub fn symbol(self) -> &'static str {
        Self::ALL
            .iter()
            .find(|(op, _, _)| *op == self)
            .map(|(_, _, s)| *s)
            .unwrap_or("?")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOpKind {
    Typeof,
    Not,
    Negate,
}

impl UnaryOpKind {
    pub fn kind(self) -> InstructionKind {
        match self {
            UnaryOpKind::Typeof => InstructionKind::Typeof,
            UnaryOpKind::Not => InstructionKind::Not,
            UnaryOpKind::Negate => InstructionKind::Negate,
        }
    }

    pub fn from_kind(kind: InstructionKind) -> Option<Self> {
        match kind {
            InstructionKind::Typeof => Some(UnaryOpKind::Typeof),
            InstructionKind::Not => Some(UnaryOpKind::Not),
            InstructionKind::Negate => Some(UnaryOpKind::Negate),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOpKind::Typeof => "typeof",
            UnaryOpKind::Not => "!",
            UnaryOpKind::Negate => "-",
        }
    }
}

/// Instructions encoded as a `(lhs, key, rhs)` triple.
///
/// For stores `lhs` is the container and `rhs` the stored value; for loads
/// `lhs` is the result and `rhs` the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    MapStore,
    MapLoad,
    ArrayStore,
    ArrayLoad,
    ObjectStore,
    ObjectLoad,
    StringLoad,
    TableStore,
    TableLoad,
    XmlSeqLoad,
    XmlLoad,
    XmlAttributeLoad,
    XmlAttributeStore,
}

impl AccessKind {
    pub fn kind(self) -> InstructionKind {
        use InstructionKind as K;
        match self {
            AccessKind::MapStore => K::MapStore,
            AccessKind::MapLoad => K::MapLoad,
            AccessKind::ArrayStore => K::ArrayStore,
            AccessKind::ArrayLoad => K::ArrayLoad,
            AccessKind::ObjectStore => K::ObjectStore,
            AccessKind::ObjectLoad => K::ObjectLoad,
            AccessKind::StringLoad => K::StringLoad,
            AccessKind::TableStore => K::TableStore,
            AccessKind::TableLoad => K::TableLoad,
            AccessKind::XmlSeqLoad => K::XmlSeqLoad,
            AccessKind::XmlLoad => K::XmlLoad,
            AccessKind::XmlAttributeLoad => K::XmlAttributeLoad,
            AccessKind::XmlAttributeStore => K::XmlAttributeStore,
        }
    }

    pub fn from_kind(kind: InstructionKind) -> Option<Self> {
        use InstructionKind as K;
        Some(match kind {
            K::MapStore => AccessKind::MapStore,
            K::MapLoad => AccessKind::MapLoad,
            K::ArrayStore => AccessKind::ArrayStore,
            K::ArrayLoad => AccessKind::ArrayLoad,
            K::ObjectStore => AccessKind::ObjectStore,
            K::ObjectLoad => AccessKind::ObjectLoad,
            K::StringLoad => AccessKind::StringLoad,
            K::TableStore => AccessKind::TableStore,
            K::TableLoad => AccessKind::TableLoad,
            K::XmlSeqLoad => AccessKind::XmlSeqLoad,
            K::XmlLoad => AccessKind::XmlLoad,
            K::XmlAttributeLoad => AccessKind::XmlAttributeLoad,
            K::XmlAttributeStore => AccessKind::XmlAttributeStore,
            _ => return None,
        })
    }

    /// Only map and array loads carry the optional/filling-read flags.
    pub fn has_load_flags(self) -> bool {
        matches!(self, AccessKind::MapLoad | AccessKind::ArrayLoad)
    }

    pub fn is_store(self) -> bool {
        matches!(
            self,
            AccessKind::MapStore
                | AccessKind::ArrayStore
                | AccessKind::ObjectStore
                | AccessKind::TableStore
                | AccessKind::XmlAttributeStore
        )
    }
}

/// XML constructors and sequence ops encoded as a plain operand list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XmlKind {
    NewElement,
    NewText,
    NewComment,
    NewPi,
    NewSequence,
    NewQname,
    NewStringQname,
    SeqStore,
    LoadAll,
}

impl XmlKind {
    pub fn kind(self) -> InstructionKind {
        use InstructionKind as K;
        match self {
            XmlKind::NewElement => K::NewXmlElement,
            XmlKind::NewText => K::NewXmlText,
            XmlKind::NewComment => K::NewXmlComment,
            XmlKind::NewPi => K::NewXmlPi,
            XmlKind::NewSequence => K::NewXmlSequence,
            XmlKind::NewQname => K::NewXmlQname,
            XmlKind::NewStringQname => K::NewStringXmlQname,
            XmlKind::SeqStore => K::XmlSeqStore,
            XmlKind::LoadAll => K::XmlLoadAll,
        }
    }

    pub fn from_kind(kind: InstructionKind) -> Option<Self> {
        use InstructionKind as K;
        Some(match kind {
            K::NewXmlElement => XmlKind::NewElement,
            K::NewXmlText => XmlKind::NewText,
            K::NewXmlComment => XmlKind::NewComment,
            K::NewXmlPi => XmlKind::NewPi,
            K::NewXmlSequence => XmlKind::NewSequence,
            K::NewXmlQname => XmlKind::NewQname,
            K::NewStringXmlQname => XmlKind::NewStringQname,
            K::XmlSeqStore => XmlKind::SeqStore,
            K::XmlLoadAll => XmlKind::LoadAll,
            _ => return None,
        })
    }

    /// Number of operands after `lhs`.
    pub fn arity(self) -> usize {
        match self {
            XmlKind::NewSequence => 0,
            XmlKind::NewText
            | XmlKind::NewComment
            | XmlKind::NewStringQname
            | XmlKind::SeqStore
            | XmlKind::LoadAll => 1,
            XmlKind::NewElement | XmlKind::NewPi => 2,
            XmlKind::NewQname => 3,
        }
    }
}

/// Regular-expression constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegexKind {
    NewRegExp,
    Disjunction,
    Sequence,
    Assertion,
    AtomQuantifier,
    LiteralCharEscape,
    CharClass,
    CharSet,
    CharSetRange,
    CapturingGroup,
    FlagExpr,
    FlagOnOff,
    Quantifier,
}

impl RegexKind {
    const ALL: [(RegexKind, InstructionKind, usize); 13] = [
        (RegexKind::NewRegExp, InstructionKind::NewRegExp, 1),
        (RegexKind::Disjunction, InstructionKind::NewReDisjunction, 1),
        (RegexKind::Sequence, InstructionKind::NewReSequence, 1),
        (RegexKind::Assertion, InstructionKind::NewReAssertion, 1),
        (RegexKind::AtomQuantifier, InstructionKind::NewReAtomQuantifier, 2),
        (RegexKind::LiteralCharEscape, InstructionKind::NewReLiteralCharEscape, 1),
        (RegexKind::CharClass, InstructionKind::NewReCharClass, 4),
        (RegexKind::CharSet, InstructionKind::NewReCharSet, 1),
        (RegexKind::CharSetRange, InstructionKind::NewReCharSetRange, 3),
        (RegexKind::CapturingGroup, InstructionKind::NewReCapturingGroup, 4),
        (RegexKind::FlagExpr, InstructionKind::NewReFlagExpr, 3),
        (RegexKind::FlagOnOff, InstructionKind::NewReFlagOnOff, 1),
        (RegexKind::Quantifier, InstructionKind::NewReQuantifier, 2),
    ];

    fn entry(self) -> (RegexKind, InstructionKind, usize) {
        Self::ALL
            .iter()
            .copied()
            .find(|(k, _, _)| *k == self)
            .unwrap_or(Self::ALL[0])
    }

    pub fn kind(self) -> InstructionKind {
        self.entry().1
    }

    pub fn from_kind(kind: InstructionKind) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|(_, k, _)| *k == kind)
            .map(|(r, _, _)| *r)
    }

    /// Number of operands after `lhs`.
    pub fn arity(self) -> usize {
        self.entry().2
    }
}

/// One entry of a mapping constructor.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingEntry {
    Spread(Operand),
    KeyValue { key: Operand, value: Operand },
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstanceDef {
    /// Index of a type definition in the current package.
    Local(i32),
    External { pkg: PackageId, object_name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FpParam {
    pub kind: VarKind,
    pub ty: TypeId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NonTerminatorOp {
    Move {
        lhs: Operand,
        rhs: Operand,
    },
    /// Loads a scalar or nil literal.
    ConstLoad {
        ty: TypeId,
        lhs: Operand,
        value: ConstValue,
    },
    NewStructure {
        lhs: Operand,
        typedesc: Operand,
        entries: Vec<MappingEntry>,
    },
    FieldAccess {
        kind: AccessKind,
        lhs: Operand,
        key: Operand,
        rhs: Operand,
        is_optional: bool,
        is_filling_read: bool,
    },
    NewArray {
        ty: TypeId,
        lhs: Operand,
        typedesc: Option<Operand>,
        element_typedesc: Option<Operand>,
        size: Operand,
        values: Vec<Operand>,
    },
    NewError {
        ty: TypeId,
        lhs: Operand,
        message: Operand,
        cause: Operand,
        detail: Operand,
    },
    TypeCast {
        lhs: Operand,
        rhs: Operand,
        ty: TypeId,
        check_types: bool,
    },
    IsLike {
        ty: TypeId,
        lhs: Operand,
        rhs: Operand,
    },
    TypeTest {
        ty: TypeId,
        lhs: Operand,
        rhs: Operand,
    },
    NewInstance {
        def: InstanceDef,
        lhs: Operand,
    },
    FpLoad {
        lhs: Operand,
        pkg: PackageId,
        name: String,
        ret_ty: TypeId,
        closure_args: Vec<Operand>,
        params: Vec<FpParam>,
    },
    NewTable {
        ty: TypeId,
        lhs: Operand,
        key_columns: Operand,
        data: Operand,
    },
    NewTypedesc {
        lhs: Operand,
        ty: TypeId,
    },
    BinaryOp {
        op: BinaryOpKind,
        lhs: Operand,
        rhs1: Operand,
        rhs2: Operand,
    },
    UnaryOp {
        op: UnaryOpKind,
        lhs: Operand,
        rhs: Operand,
    },
    Xml {
        kind: XmlKind,
        lhs: Operand,
        operands: Vec<Operand>,
    },
    Regex {
        kind: RegexKind,
        lhs: Operand,
        operands: Vec<Operand>,
    },
    RecordDefaultFpLoad {
        lhs: Operand,
        enclosed_type_index: i32,
        field_name: i32,
    },
}

impl NonTerminatorOp {
    pub fn kind(&self) -> InstructionKind {
        use InstructionKind as K;
        match self {
            NonTerminatorOp::Move { .. } => K::Move,
            NonTerminatorOp::ConstLoad { .. } => K::ConstLoad,
            NonTerminatorOp::NewStructure { .. } => K::NewStructure,
            NonTerminatorOp::FieldAccess { kind, .. } => kind.kind(),
            NonTerminatorOp::NewArray { .. } => K::NewArray,
            NonTerminatorOp::NewError { .. } => K::NewError,
            NonTerminatorOp::TypeCast { .. } => K::TypeCast,
            NonTerminatorOp::IsLike { .. } => K::IsLike,
            NonTerminatorOp::TypeTest { .. } => K::TypeTest,
            NonTerminatorOp::NewInstance { .. } => K::NewInstance,
            NonTerminatorOp::FpLoad { .. } => K::FpLoad,
            NonTerminatorOp::NewTable { .. } => K::NewTable,
            NonTerminatorOp::NewTypedesc { .. } => K::NewTypedesc,
            NonTerminatorOp::BinaryOp { op, .. } => op.kind(),
            NonTerminatorOp::UnaryOp { op, .. } => op.kind(),
            NonTerminatorOp::Xml { kind, .. } => kind.kind(),
            NonTerminatorOp::Regex { kind, .. } => kind.kind(),
            NonTerminatorOp::RecordDefaultFpLoad { .. } => K::RecordDefaultFpLoad,
        }
    }

    /// The operand written by this instruction, if it has one.
    pub fn lhs(&self) -> Option<&Operand> {
        match self {
            NonTerminatorOp::FieldAccess { kind, lhs, .. } => {
                if kind.is_store() {
                    None
                } else {
                    Some(lhs)
                }
            }
            NonTerminatorOp::Move { lhs, .. }
            | NonTerminatorOp::ConstLoad { lhs, .. }
            | NonTerminatorOp::NewStructure { lhs, .. }
            | NonTerminatorOp::NewArray { lhs, .. }
            | NonTerminatorOp::NewError { lhs, .. }
            | NonTerminatorOp::TypeCast { lhs, .. }
            | NonTerminatorOp::IsLike { lhs, .. }
            | NonTerminatorOp::TypeTest { lhs, .. }
            | NonTerminatorOp::NewInstance { lhs, .. }
            | NonTerminatorOp::FpLoad { lhs, .. }
            | NonTerminatorOp::NewTable { lhs, .. }
            | NonTerminatorOp::NewTypedesc { lhs, .. }
            | NonTerminatorOp::BinaryOp { lhs, .. }
            | NonTerminatorOp::UnaryOp { lhs, .. }
            | NonTerminatorOp::Xml { lhs, .. }
            | NonTerminatorOp::Regex { lhs, .. }
            | NonTerminatorOp::RecordDefaultFpLoad { lhs, .. } => Some(lhs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminator_boundary() {
        for v in 1..=14i8 {
            let k = InstructionKind::from_wire(v).unwrap();
            assert!(k.is_terminator(), "{:?}", k);
        }
        assert!(InstructionKind::Panic.is_terminator());
        assert!(InstructionKind::WkAltReceive.is_terminator());
        assert!(InstructionKind::WkMulReceive.is_terminator());
        assert!(!InstructionKind::Move.is_terminator());
        assert!(!InstructionKind::ConstLoad.is_terminator());
        assert!(!InstructionKind::RecordDefaultFpLoad.is_terminator());
        assert!(!InstructionKind::Add.is_terminator());
    }

    #[test]
    fn test_platform_reads_from_negative_byte() {
        assert_eq!(InstructionKind::from_wire(-128), Some(InstructionKind::Platform));
        assert_eq!(InstructionKind::Platform.to_wire(), -128);
        assert_eq!(InstructionKind::from_wire(15), None);
        assert_eq!(InstructionKind::from_wire(79), None);
    }

    #[test]
    fn test_op_tables_cover_their_kinds() {
        for v in 61..=78i8 {
            let k = InstructionKind::from_wire(v).unwrap();
            let op = BinaryOpKind::from_kind(k).unwrap();
            assert_eq!(op.kind(), k);
        }
        for v in 89..=101i8 {
            let k = InstructionKind::from_wire(v).unwrap();
            assert_eq!(RegexKind::from_kind(k).unwrap().kind(), k);
        }
        assert_eq!(RegexKind::CharClass.arity(), 4);
        assert_eq!(XmlKind::NewQname.arity(), 3);
        assert_eq!(BinaryOpKind::LessEqual.symbol(), "<=");
    }
}
