//! Metadata shared by module items: source positions, documentation,
//! annotation attachments and constant values.

use std::fmt;

use crate::ir::package::PackageId;
use crate::ir::types::TypeId;

/// Source range of an item or instruction. Lines and columns are 0-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub source_file: String,
    pub start_line: i32,
    pub start_col: i32,
    pub end_line: i32,
    pub end_col: i32,
}

impl Position {
    pub fn new(source_file: impl Into<String>, start_line: i32, start_col: i32) -> Self {
        Position {
            source_file: source_file.into(),
            start_line,
            start_col,
            end_line: start_line,
            end_col: start_col,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source_file, self.start_line, self.start_col)
    }
}

/// Where a symbol came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SymbolOrigin {
    Builtin = 1,
    #[default]
    Source = 2,
    CompiledSource = 3,
    Virtual = 4,
}

impl SymbolOrigin {
    pub fn from_i8(v: i8) -> Option<Self> {
        match v {
            1 => Some(SymbolOrigin::Builtin),
            2 => Some(SymbolOrigin::Source),
            3 => Some(SymbolOrigin::CompiledSource),
            4 => Some(SymbolOrigin::Virtual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MarkdownParam {
    pub name: String,
    pub description: String,
}

/// Documentation attached to an item. Items without docs carry `None`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Markdown {
    pub description: String,
    pub return_description: String,
    pub parameters: Vec<MarkdownParam>,
    pub deprecated_docs: String,
    pub deprecated_parameters: Vec<MarkdownParam>,
}

/// An annotation applied to an item, optionally carrying a constant value.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationAttachment {
    pub pkg: PackageId,
    pub pos: Position,
    pub tag: String,
    pub value: Option<ConstantValue>,
}

/// A typed compile-time value.
///
/// The body encoding is selected by the tag of `ty`, so the value variant must
/// agree with it: integer tags hold `Int`, `Record` holds `Map`, and so on.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantValue {
    pub ty: TypeId,
    pub value: ConstValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Byte(i32),
    Float(f64),
    Decimal(String),
    String(String),
    Boolean(bool),
    Nil,
    Map(Vec<(String, ConstantValue)>),
    List(Vec<ConstantValue>),
}

impl ConstValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ConstValue::Int(_) => "int",
            ConstValue::Byte(_) => "byte",
            ConstValue::Float(_) => "float",
            ConstValue::Decimal(_) => "decimal",
            ConstValue::String(_) => "string",
            ConstValue::Boolean(_) => "boolean",
            ConstValue::Nil => "nil",
            ConstValue::Map(_) => "map",
            ConstValue::List(_) => "list",
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int(v) => write!(f, "{}", v),
            ConstValue::Byte(v) => write!(f, "{}", v),
            ConstValue::Float(v) => write!(f, "{:?}", v),
            ConstValue::Decimal(v) => write!(f, "{}d", v),
            ConstValue::String(v) => write!(f, "{:?}", v),
            ConstValue::Boolean(v) => write!(f, "{}", v),
            ConstValue::Nil => f.write_str("()"),
            ConstValue::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v.value)?;
                }
                f.write_str("}")
            }
            ConstValue::List(items) => {
                f.write_str("[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", v.value)?;
                }
                f.write_str("]")
            }
        }
    }
}
