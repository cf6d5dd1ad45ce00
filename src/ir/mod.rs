pub mod block;
pub mod function;
pub mod instr;
pub mod meta;
pub mod operand;
pub mod package;
pub mod semtype;
pub mod types;
pub mod visitor;

pub use block::{BasicBlock, BlockId};
pub use function::{
    ErrorEntry, Function, ParamInfo, PathParam, PathSegment, Receiver, RequiredParam, ResourceFunction,
    RestParam, ScopeEntry,
};
pub use instr::{
    AccessKind, BinaryOpKind, CallInfo, ChannelDetail, FpParam, InstanceDef, Instr, InstructionKind,
    MappingEntry, NonTerminator, NonTerminatorOp, ReceiveField, RegexKind, Terminator, TerminatorOp,
    UnaryOpKind, XmlKind,
};
pub use meta::{
    AnnotationAttachment, ConstValue, ConstantValue, Markdown, MarkdownParam, Position, SymbolOrigin,
};
pub use operand::{GlobalRef, Operand, VarId, VarKind, VarRange, VarScope, VariableDcl};
pub use package::{
    Annotation, AttachPoint, Constant, GlobalVar, Package, PackageId, ServiceDecl, TypeDefinition,
    TypeDefinitionBody,
};
pub use semtype::{AtomTable, AtomicType, Bdd, BddAtom, BddNode, SemType};
pub use types::{BType, TypeBody, TypeId, TypeTable, TypeTag};
pub use visitor::{InstructionStats, Visitor};
