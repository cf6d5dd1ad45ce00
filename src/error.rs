use thiserror::Error;

/// Top-level error type for lowering, encoding and loading BIR.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{}", format_error_pretty("format error", &format!("{}", _0)))]
    FormatValidation(#[from] FormatError),

    #[error("{}", format_error_pretty("invariant violation", &format!("{}", _0)))]
    InvariantViolation(#[from] InvariantError),

    #[error("{}", format_error_pretty("lowering error", &format!("{}", _0)))]
    Lower(#[from] LowerError),

    #[error("{}", format_error_pretty("config error", &format!("{}", _0)))]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_error_pretty(category: &str, msg: &str) -> String {
    format!("[{}] {}", category, msg)
}

// ---------------------------------------------------------------------------
// Format validation errors (malformed byte streams)
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum FormatError {
    #[error("bad magic {found:02X?} at offset 0, expected BA 10 C0 DE. This is not a BIR file")]
    BadMagic { found: Vec<u8> },

    #[error("unsupported BIR version {found}, this reader understands version {expected}")]
    UnsupportedVersion { found: i32, expected: i32 },

    #[error("unexpected end of input at offset {offset} while reading {what} ({needed} more bytes needed)")]
    Truncated {
        offset: usize,
        needed: usize,
        what: &'static str,
    },

    #[error("constant pool index {index} at offset {offset} is out of range (pool has {len} entries)")]
    PoolIndexOutOfRange { offset: usize, index: i32, len: usize },

    #[error("constant pool entry {index} at offset {offset} is a {found} entry, expected {expected}")]
    PoolKindMismatch {
        offset: usize,
        index: i32,
        expected: &'static str,
        found: &'static str,
    },

    #[error("unknown {what} discriminant {tag} at offset {offset}")]
    UnknownTag {
        offset: usize,
        what: &'static str,
        tag: i64,
    },

    #[error("negative {what} {value} at offset {offset}")]
    NegativeLength {
        offset: usize,
        what: &'static str,
        value: i64,
    },

    #[error("{what} at offset {offset} declares {declared} bytes but {consumed} were used")]
    LengthMismatch {
        offset: usize,
        what: &'static str,
        declared: usize,
        consumed: usize,
    },

    #[error("string at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },

    #[error("type nesting deeper than {limit} levels at offset {offset}")]
    TooDeep { offset: usize, limit: usize },

    #[error("type tag {tag} at offset {offset} has no constant value encoding")]
    NoConstantEncoding { offset: usize, tag: i8 },
}

// ---------------------------------------------------------------------------
// Invariant violations (well-formed bytes, ill-formed IR)
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum InvariantError {
    #[error("in function '{func}': block '{block}' does not end with a terminator")]
    MissingTerminator { func: String, block: String },

    #[error("in function '{func}': block '{block}' has a terminator at position {index}, before its last instruction")]
    TerminatorNotLast {
        func: String,
        block: String,
        index: usize,
    },

    #[error("in function '{func}': reference to unknown block '{block}'")]
    UnknownBlock { func: String, block: String },

    #[error("in function '{func}': block name '{block}' is used twice")]
    DuplicateBlock { func: String, block: String },

    #[error("in function '{func}': operand refers to unknown variable '{name}'")]
    UnknownVariable { func: String, name: String },

    #[error("in function '{func}': variable name '{name}' is declared twice")]
    DuplicateVariable { func: String, name: String },

    #[error("in function '{func}': operand '{name}' is encoded as {encoded} but declared as {declared}")]
    OperandKindMismatch {
        func: String,
        name: String,
        encoded: String,
        declared: String,
    },

    #[error("type id {id} is not present in the package type table")]
    UnknownType { id: u32 },

    #[error("constant of type tag {tag} cannot hold a {value} value")]
    ConstantTypeMismatch { tag: String, value: &'static str },

    #[error("atom {index} is defined again while its first definition is still being decoded")]
    AtomRedefined { index: i32 },

    #[error("atom {index} is defined twice with different contents")]
    AtomConflict { index: i32 },

    #[error("recursive atom reference {index} does not name an atom in scope")]
    UndefinedRecAtom { index: i32 },

    #[error("atom {index} is referenced but has no definition in the atom table")]
    MissingAtom { index: i32 },

    #[error("{what}: {detail}")]
    Malformed { what: &'static str, detail: String },
}

// ---------------------------------------------------------------------------
// Lowering errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum LowerError {
    #[error("in function '{func}': {kind} is not supported by the BIR lowering yet (line {line})")]
    UnsupportedConstruct {
        kind: &'static str,
        func: String,
        line: i32,
    },

    #[error("in function '{func}': cannot resolve '{name}', it is neither a local, a module constant nor a global variable (line {line})")]
    UnresolvedReference {
        name: String,
        func: String,
        line: i32,
    },

    #[error("'{name}' is defined more than once at module level")]
    DuplicateDefinition { name: String },
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

impl Error {
    /// Returns a stable diagnostic code for this error.
    pub fn diagnostic_code(&self) -> &'static str {
        match self {
            Error::FormatValidation(f) => match f {
                FormatError::BadMagic { .. } => "E0001",
                FormatError::UnsupportedVersion { .. } => "E0002",
                FormatError::Truncated { .. } => "E0003",
                FormatError::PoolIndexOutOfRange { .. } => "E0004",
                FormatError::PoolKindMismatch { .. } => "E0005",
                FormatError::UnknownTag { .. } => "E0006",
                FormatError::NegativeLength { .. } => "E0007",
                FormatError::LengthMismatch { .. } => "E0008",
                FormatError::InvalidUtf8 { .. } => "E0009",
                FormatError::TooDeep { .. } => "E0010",
                FormatError::NoConstantEncoding { .. } => "E0011",
            },
            Error::InvariantViolation(i) => match i {
                InvariantError::MissingTerminator { .. } => "E0100",
                InvariantError::TerminatorNotLast { .. } => "E0101",
                InvariantError::UnknownBlock { .. } => "E0102",
                InvariantError::DuplicateBlock { .. } => "E0103",
                InvariantError::UnknownVariable { .. } => "E0104",
                InvariantError::DuplicateVariable { .. } => "E0105",
                InvariantError::OperandKindMismatch { .. } => "E0106",
                InvariantError::UnknownType { .. } => "E0107",
                InvariantError::ConstantTypeMismatch { .. } => "E0108",
                InvariantError::AtomRedefined { .. } => "E0109",
                InvariantError::AtomConflict { .. } => "E0110",
                InvariantError::UndefinedRecAtom { .. } => "E0111",
                InvariantError::MissingAtom { .. } => "E0112",
                InvariantError::Malformed { .. } => "E0113",
            },
            Error::Lower(l) => match l {
                LowerError::UnsupportedConstruct { .. } => "E0200",
                LowerError::UnresolvedReference { .. } => "E0201",
                LowerError::DuplicateDefinition { .. } => "E0202",
            },
            Error::Config(_) => "E0300",
            Error::Io(_) => "E0400",
        }
    }

    /// Byte offset in the input stream, for format errors that carry one.
    pub fn byte_offset(&self) -> Option<usize> {
        match self {
            Error::FormatValidation(f) => match f {
                FormatError::BadMagic { .. } => Some(0),
                FormatError::UnsupportedVersion { .. } => Some(4),
                FormatError::Truncated { offset, .. }
                | FormatError::PoolIndexOutOfRange { offset, .. }
                | FormatError::PoolKindMismatch { offset, .. }
                | FormatError::UnknownTag { offset, .. }
                | FormatError::NegativeLength { offset, .. }
                | FormatError::LengthMismatch { offset, .. }
                | FormatError::InvalidUtf8 { offset }
                | FormatError::TooDeep { offset, .. }
                | FormatError::NoConstantEncoding { offset, .. } => Some(*offset),
            },
            _ => None,
        }
    }
}
