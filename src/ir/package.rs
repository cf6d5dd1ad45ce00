use std::fmt;

use crate::error::InvariantError;
use crate::ir::function::Function;
use crate::ir::meta::{AnnotationAttachment, ConstantValue, Markdown, Position, SymbolOrigin};
use crate::ir::operand::VarKind;
use crate::ir::semtype::AtomTable;
use crate::ir::types::{TypeId, TypeTable};

/// Identity of a package: organization, package name, module name and version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId {
    pub org: String,
    pub pkg_name: String,
    pub name: String,
    pub version: String,
}

impl PackageId {
    pub fn new(org: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        let name = name.into();
        PackageId {
            org: org.into(),
            pkg_name: name.clone(),
            name,
            version: version.into(),
        }
    }

    /// The package used when a source file declares none.
    pub fn anonymous() -> Self {
        PackageId::new("$anon", ".", "0.0.0")
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.org, self.name, self.version)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub name: String,
    pub flags: i64,
    pub origin: SymbolOrigin,
    pub pos: Position,
    pub doc: Option<Markdown>,
    pub ty: TypeId,
    pub annotations: Vec<AnnotationAttachment>,
    pub value: ConstantValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVar {
    pub pos: Position,
    pub kind: VarKind,
    pub name: String,
    pub flags: i64,
    pub origin: SymbolOrigin,
    pub doc: Option<Markdown>,
    pub ty: TypeId,
    pub annotations: Vec<AnnotationAttachment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDefinition {
    pub pos: Position,
    pub name: String,
    pub original_name: String,
    pub flags: i64,
    pub origin: SymbolOrigin,
    pub doc: Option<Markdown>,
    pub ty: TypeId,
    pub has_reference_type: bool,
    pub annotations: Vec<AnnotationAttachment>,
}

/// Functions attached to the type definition at the same index.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypeDefinitionBody {
    pub attached_functions: Vec<Function>,
    pub referenced_types: Vec<TypeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachPoint {
    pub name: String,
    pub is_source: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub pkg: PackageId,
    pub name: String,
    pub original_name: String,
    pub flags: i64,
    pub origin: SymbolOrigin,
    pub pos: Position,
    pub attach_points: Vec<AttachPoint>,
    pub annot_type: TypeId,
    pub doc: Option<Markdown>,
    pub annotations: Vec<AnnotationAttachment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDecl {
    pub name: String,
    pub assoc_class_name: String,
    pub flags: i64,
    pub origin: SymbolOrigin,
    pub pos: Position,
    pub ty: Option<TypeId>,
    pub attach_point: Option<Vec<String>>,
    pub attach_point_literal: Option<String>,
    pub listener_types: Vec<TypeId>,
}

/// A whole package: module items plus the type and atom tables they index.
///
/// Module items are stored in declaration order, which is also their order
/// on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    pub id: PackageId,
    pub imports: Vec<PackageId>,
    pub constants: Vec<Constant>,
    pub type_defs: Vec<TypeDefinition>,
    pub globals: Vec<GlobalVar>,
    pub type_def_bodies: Vec<TypeDefinitionBody>,
    pub functions: Vec<Function>,
    pub annotations: Vec<Annotation>,
    pub services: Vec<ServiceDecl>,
    pub types: TypeTable,
    pub atoms: AtomTable,
}

impl Package {
    pub fn new(id: PackageId) -> Self {
        Package {
            id,
            imports: Vec::new(),
            constants: Vec::new(),
            type_defs: Vec::new(),
            globals: Vec::new(),
            type_def_bodies: Vec::new(),
            functions: Vec::new(),
            annotations: Vec::new(),
            services: Vec::new(),
            types: TypeTable::new(),
            atoms: AtomTable::new(),
        }
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// All functions, including those attached to type definitions.
    pub fn all_functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter().chain(
            self.type_def_bodies
                .iter()
                .flat_map(|b| b.attached_functions.iter()),
        )
    }

    /// Validates every function and checks that type references resolve.
    pub fn validate(&self) -> Result<(), InvariantError> {
        for func in self.all_functions() {
            func.validate()?;
            self.check_type(func.ty)?;
        }
        for c in &self.constants {
            self.check_type(c.ty)?;
            self.check_type(c.value.ty)?;
        }
        for g in &self.globals {
            self.check_type(g.ty)?;
        }
        for t in &self.type_defs {
            self.check_type(t.ty)?;
        }
        if let Some(index) = self.atoms.incomplete().next() {
            return Err(InvariantError::MissingAtom { index });
        }
        Ok(())
    }

    fn check_type(&self, id: TypeId) -> Result<(), InvariantError> {
        if self.types.contains(id) {
            Ok(())
        } else {
            Err(InvariantError::UnknownType { id: id.0 })
        }
    }
}
