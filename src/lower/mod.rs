//! AST → BIR lowering.
//!
//! Module items are registered first (imports, type definitions, globals,
//! constants) so that function bodies can refer to any of them. Each function
//! is then lowered independently by a `Lowerer` that owns the
//! function's blocks, locals and scope stack. Nothing is shared between
//! packages: a lowering call only touches the [`ModuleCtx`] and type table it
//! builds for its own package.

mod function;

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::ast::{AstExprKind, AstFunction, AstPackage, Literal, Span};
use crate::config::LowerConfig;
use crate::error::LowerError;
use crate::ir::function::Function;
use crate::ir::meta::{ConstValue, ConstantValue, Position, SymbolOrigin};
use crate::ir::operand::VarKind;
use crate::ir::package::{
    Constant, GlobalVar, Package, PackageId, TypeDefinition, TypeDefinitionBody,
};
use crate::ir::types::TypeId;

/// Per-package lookup tables used while lowering function bodies.
pub(crate) struct ModuleCtx {
    pub pkg: PackageId,
    pub source_file: String,
    /// Import alias → imported package.
    pub aliases: HashMap<String, PackageId>,
    /// Constant name → (declared type, value).
    pub constants: HashMap<String, (TypeId, ConstantValue)>,
    /// Global variable name → declared type.
    pub globals: HashMap<String, TypeId>,
}

impl ModuleCtx {
    pub fn position(&self, span: Span) -> Position {
        Position::new(self.source_file.clone(), span.line, span.col)
    }
}

/// Lowers a whole package, stopping at the first error.
pub fn lower(ast: &AstPackage, config: &LowerConfig) -> Result<Package, LowerError> {
    let mut lowering = PackageLowering::new(ast, config, false);
    lowering.run()?;
    Ok(lowering.pkg)
}

/// Lowers a whole package, collecting errors instead of stopping.
///
/// Functions and constants that fail to lower are left out of the returned
/// package; every other item is still emitted.
pub fn lower_lenient(ast: &AstPackage, config: &LowerConfig) -> (Package, Vec<LowerError>) {
    let mut lowering = PackageLowering::new(ast, config, true);
    // Lenient runs collect through `report`; an error that still escapes joins them.
    if let Err(err) = lowering.run() {
        lowering.errors.push(err);
    }
    (lowering.pkg, lowering.errors)
}

struct PackageLowering<'a> {
    ast: &'a AstPackage,
    pkg: Package,
    ctx: ModuleCtx,
    lenient: bool,
    errors: Vec<LowerError>,
    /// Module-level names seen so far.
    defined: HashSet<String>,
}

impl<'a> PackageLowering<'a> {
    fn new(ast: &'a AstPackage, config: &LowerConfig, lenient: bool) -> Self {
        let anon = PackageId::anonymous();
        let id = PackageId::new(
            ast.org.clone().unwrap_or(anon.org),
            ast.name.clone().unwrap_or(anon.name),
            ast.version.clone().unwrap_or(anon.version),
        );
        let mut pkg = Package::new(id.clone());
        pkg.types = ast.types.clone();
        let source_file = ast
            .source_file
            .clone()
            .unwrap_or_else(|| config.source_file.clone());
        PackageLowering {
            ast,
            pkg,
            ctx: ModuleCtx {
                pkg: id,
                source_file,
                aliases: HashMap::new(),
                constants: HashMap::new(),
                globals: HashMap::new(),
            },
            lenient,
            errors: Vec::new(),
            defined: HashSet::new(),
        }
    }

    fn report(&mut self, err: LowerError) -> Result<(), LowerError> {
        if self.lenient {
            self.errors.push(err);
            Ok(())
        } else {
            Err(err)
        }
    }

    /// Registers a module-level name, reporting a duplicate.
    fn define(&mut self, name: &str) -> Result<bool, LowerError> {
        if self.defined.insert(name.to_string()) {
            return Ok(true);
        }
        self.report(LowerError::DuplicateDefinition {
            name: name.to_string(),
        })?;
        Ok(false)
    }

    fn run(&mut self) -> Result<(), LowerError> {
        let ast = self.ast;

        // 1. Imports and their aliases.
        let anon = PackageId::anonymous();
        for imp in &ast.imports {
            let id = PackageId::new(
                imp.org.clone().unwrap_or_else(|| anon.org.clone()),
                imp.name.clone().unwrap_or_else(|| anon.name.clone()),
                imp.version.clone().unwrap_or_else(|| anon.version.clone()),
            );
            if let Some(alias) = imp.alias.as_ref().filter(|a| !a.is_empty()) {
                self.ctx.aliases.insert(alias.clone(), id.clone());
            }
            self.pkg.imports.push(id);
        }

        // 2. Type definitions. Their bodies are filled in step 5.
        let mut type_defs = Vec::new();
        for def in &ast.type_defs {
            if !self.define(&def.name.name)? {
                continue;
            }
            type_defs.push(def);
            self.pkg.type_defs.push(TypeDefinition {
                pos: self.ctx.position(def.name.span),
                name: def.name.name.clone(),
                original_name: def.name.name.clone(),
                flags: def.flags,
                origin: SymbolOrigin::Source,
                doc: None,
                ty: def.ty,
                has_reference_type: false,
                annotations: Vec::new(),
            });
        }

        // 3. Globals.
        for g in &ast.globals {
            if !self.define(&g.name.name)? {
                continue;
            }
            self.ctx.globals.insert(g.name.name.clone(), g.ty);
            self.pkg.globals.push(GlobalVar {
                pos: self.ctx.position(g.name.span),
                kind: VarKind::Global,
                name: g.name.name.clone(),
                flags: g.flags,
                origin: SymbolOrigin::Source,
                doc: None,
                ty: g.ty,
                annotations: Vec::new(),
            });
        }

        // 4. Constants. Only literal initializers have a value at this stage.
        for c in &ast.constants {
            if !self.define(&c.name.name)? {
                continue;
            }
            let AstExprKind::Literal(lit) = &c.value.kind else {
                self.report(LowerError::UnsupportedConstruct {
                    kind: c.value.kind_name(),
                    func: c.name.name.clone(),
                    line: c.value.span.line,
                })?;
                continue;
            };
            let value = ConstantValue {
                ty: self.pkg.types.basic(lit.type_tag()),
                value: const_value(lit),
            };
            self.ctx
                .constants
                .insert(c.name.name.clone(), (c.ty, value.clone()));
            self.pkg.constants.push(Constant {
                name: c.name.name.clone(),
                flags: c.flags,
                origin: SymbolOrigin::Source,
                pos: self.ctx.position(c.name.span),
                doc: None,
                ty: c.ty,
                annotations: Vec::new(),
                value,
            });
        }

        // 5. Methods of type definitions, one body per definition.
        for def in type_defs {
            let mut body = TypeDefinitionBody::default();
            for f in &def.attached_functions {
                if let Some(func) = self.lower_one(f)? {
                    body.attached_functions.push(func);
                }
            }
            self.pkg.type_def_bodies.push(body);
        }

        // 6. Functions.
        for f in &ast.functions {
            if !self.define(&f.name.name)? {
                continue;
            }
            if let Some(func) = self.lower_one(f)? {
                self.pkg.functions.push(func);
            }
        }

        debug!(
            package = %self.pkg.id,
            functions = self.pkg.functions.len(),
            errors = self.errors.len(),
            "lowered package"
        );
        Ok(())
    }

    fn lower_one(&mut self, f: &AstFunction) -> Result<Option<Function>, LowerError> {
        match function::lower_function(&self.ctx, &mut self.pkg.types, f) {
            Ok(func) => {
                debug!(
                    function = %func.name,
                    blocks = func.blocks().len(),
                    locals = func.local_vars().len(),
                    "lowered function"
                );
                Ok(Some(func))
            }
            Err(err) => {
                self.report(err)?;
                Ok(None)
            }
        }
    }
}

pub(crate) fn const_value(lit: &Literal) -> ConstValue {
    match lit {
        Literal::Int(v) => ConstValue::Int(*v),
        Literal::Byte(v) => ConstValue::Byte(i32::from(*v)),
        Literal::Float(v) => ConstValue::Float(*v),
        Literal::Decimal(v) => ConstValue::Decimal(v.clone()),
        Literal::String(v) => ConstValue::String(v.clone()),
        Literal::Boolean(v) => ConstValue::Boolean(*v),
        Literal::Nil => ConstValue::Nil,
    }
}
