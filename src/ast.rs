//! Typed AST consumed by the lowering engine.
//!
//! Names are already resolved and every expression carries the [`TypeId`] the
//! type checker determined for it. Type ids index [`AstPackage::types`], which
//! becomes the type table of the lowered package.

use crate::ir::types::{TypeId, TypeTable, TypeTag};

/// A source location. Lines and columns are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: i32,
    pub col: i32,
}

impl Span {
    pub fn new(line: i32, col: i32) -> Self {
        Span { line, col }
    }
}

/// An identifier with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Ident {
            name: name.into(),
            span,
        }
    }
}

/// A whole compilation unit.
#[derive(Debug, Clone, Default)]
pub struct AstPackage {
    /// Defaults to `$anon` when absent.
    pub org: Option<String>,
    /// Defaults to `.` when absent.
    pub name: Option<String>,
    /// Defaults to `0.0.0` when absent.
    pub version: Option<String>,
    /// File name stamped on positions. Falls back to the lowering config.
    pub source_file: Option<String>,
    pub imports: Vec<AstImport>,
    pub constants: Vec<AstConstant>,
    pub type_defs: Vec<AstTypeDef>,
    pub globals: Vec<AstGlobal>,
    pub functions: Vec<AstFunction>,
    pub types: TypeTable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AstImport {
    pub org: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    /// Prefix used by qualified invocations, e.g. `io` in `io:println(x)`.
    pub alias: Option<String>,
    pub span: Span,
}

/// `const <ty> <name> = <literal>;`
#[derive(Debug, Clone)]
pub struct AstConstant {
    pub name: Ident,
    pub ty: TypeId,
    pub flags: i64,
    pub value: AstExpr,
}

/// A module-level variable.
#[derive(Debug, Clone)]
pub struct AstGlobal {
    pub name: Ident,
    pub ty: TypeId,
    pub flags: i64,
}

/// `type <name> <descriptor>;`, optionally with methods for object and class types.
#[derive(Debug, Clone)]
pub struct AstTypeDef {
    pub name: Ident,
    pub ty: TypeId,
    pub flags: i64,
    pub attached_functions: Vec<AstFunction>,
}

#[derive(Debug, Clone)]
pub struct AstParam {
    pub name: Ident,
    pub ty: TypeId,
}

#[derive(Debug, Clone)]
pub struct AstFunction {
    pub name: Ident,
    pub params: Vec<AstParam>,
    /// `T... rest`; the type is the array type the body sees.
    pub rest_param: Option<AstParam>,
    pub return_type: TypeId,
    /// Type of `self` for methods.
    pub receiver: Option<TypeId>,
    pub flags: i64,
    pub body: AstFunctionBody,
}

#[derive(Debug, Clone)]
pub enum AstFunctionBody {
    Block(AstBlock),
    /// `=> expr;`
    Expr(AstExpr),
}

/// A `{ ... }` statement list. Each block is its own lexical scope.
#[derive(Debug, Clone, Default)]
pub struct AstBlock {
    pub stmts: Vec<AstStmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum AstStmt {
    /// An expression used for its side effects (followed by `;`).
    Expr(AstExpr),
    If {
        cond: AstExpr,
        then_block: AstBlock,
        /// Either another `If` (for `else if`) or a `Block`.
        else_branch: Option<Box<AstStmt>>,
        span: Span,
    },
    Block(AstBlock),
    Return {
        value: Option<AstExpr>,
        span: Span,
    },
    /// `<ty> <name> [= <init>];`
    VarDef {
        name: Ident,
        ty: TypeId,
        init: Option<AstExpr>,
        span: Span,
    },
    Assign {
        target: AssignTarget,
        value: AstExpr,
        span: Span,
    },
    /// `<name> <op>= <value>;`
    CompoundAssign {
        target: Ident,
        op: BinaryOp,
        value: AstExpr,
        /// Type of the intermediate `target op value`.
        ty: TypeId,
        span: Span,
    },
    While {
        cond: AstExpr,
        body: AstBlock,
        span: Span,
    },
    Break {
        span: Span,
    },
    Continue {
        span: Span,
    },
    /// `foreach <var> in <collection> { ... }`. Not lowered.
    Foreach {
        var: Ident,
        collection: AstExpr,
        body: AstBlock,
        span: Span,
    },
}

impl AstStmt {
    pub fn kind_name(&self) -> &'static str {
        match self {
            AstStmt::Expr(_) => "expression statement",
            AstStmt::If { .. } => "if statement",
            AstStmt::Block(_) => "block statement",
            AstStmt::Return { .. } => "return statement",
            AstStmt::VarDef { .. } => "variable definition",
            AstStmt::Assign { .. } => "assignment",
            AstStmt::CompoundAssign { .. } => "compound assignment",
            AstStmt::While { .. } => "while statement",
            AstStmt::Break { .. } => "break statement",
            AstStmt::Continue { .. } => "continue statement",
            AstStmt::Foreach { .. } => "foreach statement",
        }
    }

    pub fn span(&self) -> Span {
        match self {
            AstStmt::Expr(e) => e.span,
            AstStmt::Block(b) => b.span,
            AstStmt::If { span, .. }
            | AstStmt::Return { span, .. }
            | AstStmt::VarDef { span, .. }
            | AstStmt::Assign { span, .. }
            | AstStmt::CompoundAssign { span, .. }
            | AstStmt::While { span, .. }
            | AstStmt::Break { span }
            | AstStmt::Continue { span }
            | AstStmt::Foreach { span, .. } => *span,
        }
    }
}

/// Left-hand side of a plain assignment.
#[derive(Debug, Clone)]
pub enum AssignTarget {
    Var(Ident),
    /// `_ = expr;`
    Wildcard,
    /// `container[index] = expr;`
    Index { container: AstExpr, index: AstExpr },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Eq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
    RefEq,
    RefNotEq,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UnsignedShr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
    Typeof,
    /// `~x`
    Complement,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Byte(u8),
    Float(f64),
    /// Decimal digits as written in the source.
    Decimal(String),
    String(String),
    Boolean(bool),
    Nil,
}

impl Literal {
    /// Tag of the basic type a literal of this kind has.
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Literal::Int(_) => TypeTag::Int,
            Literal::Byte(_) => TypeTag::Byte,
            Literal::Float(_) => TypeTag::Float,
            Literal::Decimal(_) => TypeTag::Decimal,
            Literal::String(_) => TypeTag::String,
            Literal::Boolean(_) => TypeTag::Boolean,
            Literal::Nil => TypeTag::Nil,
        }
    }
}

/// An expression with its determined type.
#[derive(Debug, Clone)]
pub struct AstExpr {
    pub kind: AstExprKind,
    pub ty: TypeId,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum AstExprKind {
    Literal(Literal),
    VarRef(String),
    Binary {
        op: BinaryOp,
        lhs: Box<AstExpr>,
        rhs: Box<AstExpr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<AstExpr>,
    },
    /// `( expr )`
    Group(Box<AstExpr>),
    /// `[alias:]name(args)`
    Invocation {
        pkg_alias: Option<String>,
        name: String,
        args: Vec<AstExpr>,
    },
    /// `[a, b, c]`; the expression type is the list type.
    List(Vec<AstExpr>),
    Index {
        container: Box<AstExpr>,
        index: Box<AstExpr>,
    },
    /// `<T> expr`; `T` is the expression type.
    TypeConversion(Box<AstExpr>),
    /// `expr is T`
    TypeTest {
        expr: Box<AstExpr>,
        tested: TypeId,
    },
    /// `c ? a : b`. Not lowered.
    Conditional {
        cond: Box<AstExpr>,
        then_expr: Box<AstExpr>,
        else_expr: Box<AstExpr>,
    },
    /// `check expr`. Not lowered.
    Check(Box<AstExpr>),
}

impl AstExpr {
    pub fn new(kind: AstExprKind, ty: TypeId, span: Span) -> Self {
        AstExpr { kind, ty, span }
    }

    pub fn literal(value: Literal, ty: TypeId, span: Span) -> Self {
        Self::new(AstExprKind::Literal(value), ty, span)
    }

    pub fn var(name: impl Into<String>, ty: TypeId, span: Span) -> Self {
        Self::new(AstExprKind::VarRef(name.into()), ty, span)
    }

    pub fn binary(op: BinaryOp, lhs: AstExpr, rhs: AstExpr, ty: TypeId) -> Self {
        let span = lhs.span;
        Self::new(
            AstExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ty,
            span,
        )
    }

    pub fn call(name: impl Into<String>, args: Vec<AstExpr>, ty: TypeId, span: Span) -> Self {
        Self::new(
            AstExprKind::Invocation {
                pkg_alias: None,
                name: name.into(),
                args,
            },
            ty,
            span,
        )
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            AstExprKind::Literal(_) => "literal",
            AstExprKind::VarRef(_) => "variable reference",
            AstExprKind::Binary { .. } => "binary expression",
            AstExprKind::Unary {
                op: UnaryOp::Complement,
                ..
            } => "bitwise complement",
            AstExprKind::Unary { .. } => "unary expression",
            AstExprKind::Group(_) => "group expression",
            AstExprKind::Invocation { .. } => "invocation",
            AstExprKind::List(_) => "list constructor",
            AstExprKind::Index { .. } => "index access",
            AstExprKind::TypeConversion(_) => "type conversion",
            AstExprKind::TypeTest { .. } => "type test",
            AstExprKind::Conditional { .. } => "conditional expression",
            AstExprKind::Check(_) => "check expression",
        }
    }
}
