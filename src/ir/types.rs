//! Package-level type table.
//!
//! Types are referenced everywhere in the IR by [`TypeId`], an index into the
//! owning package's [`TypeTable`]. Recursive types (a union containing itself,
//! a record whose field refers back to the record) are expressed by reserving
//! an id first and filling it in afterwards.

use std::fmt;

use crate::ir::meta::{AnnotationAttachment, Markdown};
use crate::ir::package::PackageId;
use crate::ir::semtype::SemNamedType;

/// Index of a type in a package's [`TypeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(pub u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

macro_rules! type_tags {
    ($($variant:ident = $value:literal, $text:literal;)*) => {
        /// Discriminant of a BIR type.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum TypeTag {
            $($variant = $value,)*
        }

        impl TypeTag {
            pub fn from_i8(value: i8) -> Option<TypeTag> {
                match value {
                    $($value => Some(TypeTag::$variant),)*
                    _ => None,
                }
            }

            /// Source-level spelling used by the printer.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(TypeTag::$variant => $text,)*
                }
            }
        }
    };
}

type_tags! {
    Int = 1, "int";
    Byte = 2, "byte";
    Float = 3, "float";
    Decimal = 4, "decimal";
    String = 5, "string";
    Boolean = 6, "boolean";
    Json = 7, "json";
    Xml = 8, "xml";
    Table = 9, "table";
    Nil = 10, "()";
    Anydata = 11, "anydata";
    Record = 12, "record";
    Typedesc = 13, "typedesc";
    Typerefdesc = 14, "typerefdesc";
    Stream = 15, "stream";
    Map = 16, "map";
    Invokable = 17, "function";
    Any = 18, "any";
    Endpoint = 19, "endpoint";
    Array = 20, "array";
    Union = 21, "union";
    Intersection = 22, "intersection";
    Package = 23, "package";
    None = 24, "none";
    Void = 25, "void";
    Xmlns = 26, "xmlns";
    Annotation = 27, "annotation";
    SemanticError = 28, "semantic_error";
    Error = 29, "error";
    Iterator = 30, "iterator";
    Tuple = 31, "tuple";
    Future = 32, "future";
    Finite = 33, "finite";
    ObjectOrService = 34, "object";
    ByteArray = 35, "byte[]";
    FunctionPointer = 36, "function_pointer";
    Handle = 37, "handle";
    Readonly = 38, "readonly";
    Signed32Int = 39, "int:Signed32";
    Signed16Int = 40, "int:Signed16";
    Signed8Int = 41, "int:Signed8";
    Unsigned32Int = 42, "int:Unsigned32";
    Unsigned16Int = 43, "int:Unsigned16";
    Unsigned8Int = 44, "int:Unsigned8";
    CharString = 45, "string:Char";
    XmlElement = 46, "xml:Element";
    XmlPi = 47, "xml:ProcessingInstruction";
    XmlComment = 48, "xml:Comment";
    XmlText = 49, "xml:Text";
    Never = 50, "never";
    NullSet = 51, "null_set";
    ParameterizedType = 52, "parameterized";
    RegExp = 53, "regexp";
}

impl TypeTag {
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            TypeTag::Int
                | TypeTag::Signed32Int
                | TypeTag::Signed16Int
                | TypeTag::Signed8Int
                | TypeTag::Unsigned32Int
                | TypeTag::Unsigned16Int
                | TypeTag::Unsigned8Int
        )
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry of the type table.
#[derive(Debug, Clone, PartialEq)]
pub struct BType {
    pub tag: TypeTag,
    pub name: Option<String>,
    pub flags: i64,
    pub body: TypeBody,
}

impl BType {
    /// A nameless type with no tag-specific payload (`int`, `string`, `any`...).
    pub fn basic(tag: TypeTag) -> Self {
        BType {
            tag,
            name: None,
            flags: 0,
            body: TypeBody::Plain,
        }
    }

    pub fn new(tag: TypeTag, body: TypeBody) -> Self {
        BType {
            tag,
            name: None,
            flags: 0,
            body,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Tag-specific payload of a [`BType`].
#[derive(Debug, Clone, PartialEq)]
pub enum TypeBody {
    /// Tags with no payload on the wire.
    Plain,
    Array {
        state: i8,
        size: i32,
        element: TypeId,
    },
    Error(ErrorType),
    Finite {
        name: String,
        flags: i64,
        values: Vec<SemNamedType>,
    },
    Future {
        constraint: TypeId,
    },
    Map {
        constraint: TypeId,
    },
    Typedesc {
        constraint: TypeId,
    },
    Xml {
        constraint: TypeId,
    },
    Intersection {
        constituents: Vec<TypeId>,
        effective: TypeId,
    },
    Invokable(Option<InvokableType>),
    Object(ObjectType),
    Parameterized {
        value_type: TypeId,
        index: i32,
    },
    Record(RecordType),
    Stream {
        constraint: TypeId,
        completion: TypeId,
    },
    Table {
        constraint: TypeId,
        field_names: Option<Vec<String>>,
        key_constraint: Option<TypeId>,
    },
    Tuple {
        members: Vec<TupleMember>,
        rest: Option<TypeId>,
    },
    Typerefdesc {
        pkg: PackageId,
        name: String,
        constraint: TypeId,
    },
    Union(UnionType),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeIdSet {
    pub pkg: PackageId,
    pub name: String,
    pub is_public: bool,
}

/// Nominal identity of error and object types.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypeIds {
    pub primary: Vec<TypeIdSet>,
    pub secondary: Vec<TypeIdSet>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorType {
    pub pkg: PackageId,
    pub name: String,
    pub detail: TypeId,
    pub type_ids: TypeIds,
}

/// A function type. `None` in [`TypeBody::Invokable`] is the `function` top type.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokableType {
    pub params: Vec<TypeId>,
    pub rest: Option<TypeId>,
    pub ret: TypeId,
    pub symbol: Option<InvokableSymbol>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvokableSymbol {
    pub params: Vec<FunctionParameter>,
    pub rest: Option<FunctionParameter>,
    pub defaults: Vec<DefaultValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionParameter {
    pub name: String,
    pub flags: i64,
    pub doc: Option<Markdown>,
    pub ty: TypeId,
}

/// Default value of a parameter or record field, held as a closure.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultValue {
    pub param_name: String,
    pub closure: ClosureSymbol,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosureSymbol {
    pub name: String,
    pub flags: i64,
    pub ty: TypeId,
    pub pkg: PackageId,
    pub params: Vec<FunctionParameter>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectField {
    pub name: String,
    pub flags: i64,
    pub is_defaultable: bool,
    pub doc: Option<Markdown>,
    pub ty: TypeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttachedFunctionType {
    pub name: String,
    pub original_name: String,
    pub flags: i64,
    pub ty: TypeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectType {
    pub pkg: PackageId,
    pub name: String,
    pub flags: i64,
    pub fields: Vec<ObjectField>,
    pub generated_init: Option<AttachedFunctionType>,
    pub init: Option<AttachedFunctionType>,
    pub methods: Vec<AttachedFunctionType>,
    pub inclusions: Vec<TypeId>,
    pub type_ids: TypeIds,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordField {
    pub name: String,
    pub flags: i64,
    pub doc: Option<Markdown>,
    pub ty: TypeId,
    pub annotations: Vec<AnnotationAttachment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordType {
    pub pkg: PackageId,
    pub name: String,
    pub is_sealed: bool,
    pub rest_field: TypeId,
    pub fields: Vec<RecordField>,
    pub inclusions: Vec<TypeId>,
    pub defaults: Vec<DefaultValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TupleMember {
    pub name: String,
    pub flags: i64,
    pub ty: TypeId,
    pub annotations: Vec<AnnotationAttachment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumInfo {
    pub pkg: PackageId,
    pub name: String,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionType {
    pub is_cyclic: bool,
    pub name: Option<(PackageId, String)>,
    pub members: Vec<TypeId>,
    pub original_members: Vec<TypeId>,
    pub enum_info: Option<EnumInfo>,
}

/// Owning storage for every type a package mentions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypeTable {
    types: Vec<BType>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn get(&self, id: TypeId) -> Option<&BType> {
        self.types.get(id.0 as usize)
    }

    pub fn contains(&self, id: TypeId) -> bool {
        (id.0 as usize) < self.types.len()
    }

    /// Appends a type unconditionally.
    pub fn push(&mut self, ty: BType) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    /// Returns the id of an equal existing entry, or appends `ty`.
    ///
    /// Tables stay small (one entry per distinct type in a package), so a
    /// linear scan is used rather than hashing types that carry floats.
    pub fn intern(&mut self, ty: BType) -> TypeId {
        match self.types.iter().position(|t| *t == ty) {
            Some(i) => TypeId(i as u32),
            None => self.push(ty),
        }
    }

    /// Interns a payload-free type with the given tag.
    pub fn basic(&mut self, tag: TypeTag) -> TypeId {
        self.intern(BType::basic(tag))
    }

    /// Reserves a slot for a type whose body is filled in later with [`TypeTable::set`].
    pub fn reserve(&mut self) -> TypeId {
        self.push(BType::basic(TypeTag::None))
    }

    /// Replaces the entry at `id`. Returns `false` if `id` is out of range.
    pub fn set(&mut self, id: TypeId, ty: BType) -> bool {
        match self.types.get_mut(id.0 as usize) {
            Some(slot) => {
                *slot = ty;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &BType)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, t)| (TypeId(i as u32), t))
    }

    /// Human-readable spelling of a type, following named types by name.
    pub fn display(&self, id: TypeId) -> String {
        self.display_depth(id, 0)
    }

    fn display_depth(&self, id: TypeId, depth: usize) -> String {
        let Some(ty) = self.get(id) else {
            return format!("<unknown {}>", id);
        };
        if let Some(name) = &ty.name {
            if !name.is_empty() {
                return name.clone();
            }
        }
        // Anonymous recursive types have no name to stop at.
        if depth > 8 {
            return "...".to_string();
        }
        let d = depth + 1;
        match &ty.body {
            TypeBody::Array { element, .. } => format!("{}[]", self.display_depth(*element, d)),
            TypeBody::Map { constraint } => format!("map<{}>", self.display_depth(*constraint, d)),
            TypeBody::Future { constraint } => {
                format!("future<{}>", self.display_depth(*constraint, d))
            }
            TypeBody::Typedesc { constraint } => {
                format!("typedesc<{}>", self.display_depth(*constraint, d))
            }
            TypeBody::Union(u) => u
                .members
                .iter()
                .map(|m| self.display_depth(*m, d))
                .collect::<Vec<_>>()
                .join("|"),
            TypeBody::Intersection { constituents, .. } => constituents
                .iter()
                .map(|m| self.display_depth(*m, d))
                .collect::<Vec<_>>()
                .join("&"),
            TypeBody::Tuple { members, rest } => {
                let mut parts: Vec<String> =
                    members.iter().map(|m| self.display_depth(m.ty, d)).collect();
                if let Some(r) = rest {
                    parts.push(format!("{}...", self.display_depth(*r, d)));
                }
                format!("[{}]", parts.join(", "))
            }
            TypeBody::Invokable(Some(inv)) => {
                let params: Vec<String> =
                    inv.params.iter().map(|p| self.display_depth(*p, d)).collect();
                format!(
                    "function({}) returns {}",
                    params.join(", "),
                    self.display_depth(inv.ret, d)
                )
            }
            TypeBody::Record(r) if !r.name.is_empty() => r.name.clone(),
            TypeBody::Object(o) if !o.name.is_empty() => o.name.clone(),
            _ => ty.tag.as_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_deduplicates() {
        let mut table = TypeTable::new();
        let a = table.basic(TypeTag::Int);
        let b = table.basic(TypeTag::String);
        let c = table.basic(TypeTag::Int);
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_reserve_then_set_builds_recursive_union() {
        let mut table = TypeTable::new();
        let nil = table.basic(TypeTag::Nil);
        let slot = table.reserve();
        let union = BType::new(
            TypeTag::Union,
            TypeBody::Union(UnionType {
                is_cyclic: true,
                name: None,
                members: vec![nil, slot],
                original_members: vec![nil, slot],
                enum_info: None,
            }),
        )
        .named("List");
        assert!(table.set(slot, union));
        assert_eq!(table.get(slot).map(|t| t.tag), Some(TypeTag::Union));
        assert_eq!(table.display(slot), "List");
    }

    #[test]
    fn test_tag_roundtrip_and_display() {
        for v in 1..=53i8 {
            let tag = TypeTag::from_i8(v).expect("tag in range");
            assert_eq!(tag as i8, v);
        }
        assert!(TypeTag::from_i8(0).is_none());
        assert!(TypeTag::from_i8(54).is_none());

        let mut table = TypeTable::new();
        let int = table.basic(TypeTag::Int);
        let arr = table.intern(BType::new(
            TypeTag::Array,
            TypeBody::Array {
                state: 0,
                size: -1,
                element: int,
            },
        ));
        assert_eq!(table.display(arr), "int[]");
    }
}
