//! Bytes → package.
//!
//! Decoding runs in three passes over the input:
//!
//! 1. header and constant pool;
//! 2. every shape entry in pool order, so the n-th shape becomes `TypeId(n)`
//!    and shapes may refer to later shapes;
//! 3. the module, resolving pool references as it goes.
//!
//! Block references inside a function body name blocks that may not have
//! been read yet. They are recorded by name and patched once every block of
//! the function is known.

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use crate::codec::io::ByteReader;
use crate::codec::pool::{ConstantPool, PoolEntry, NO_INDEX};
use crate::codec::{MAGIC, VERSION};
use crate::config::CodecConfig;
use crate::error::{Error, FormatError, InvariantError};
use crate::ir::block::{BasicBlock, BlockId};
use crate::ir::function::{
    ErrorEntry, Function, ParamInfo, PathParam, PathSegment, Receiver, RequiredParam, ResourceFunction,
    RestParam, ScopeEntry,
};
use crate::ir::instr::{
    AccessKind, BinaryOpKind, CallInfo, ChannelDetail, FpParam, InstanceDef, Instr, InstructionKind,
    MappingEntry, NonTerminatorOp, ReceiveField, RegexKind, TerminatorOp, UnaryOpKind, XmlKind,
};
use crate::ir::meta::{AnnotationAttachment, ConstValue, ConstantValue, Markdown, MarkdownParam, Position, SymbolOrigin};
use crate::ir::operand::{GlobalRef, Operand, VarId, VarKind, VarRange, VarScope, VariableDcl};
use crate::ir::package::{
    Annotation, AttachPoint, Constant, GlobalVar, Package, PackageId, ServiceDecl, TypeDefinition,
    TypeDefinitionBody,
};
use crate::ir::semtype::AtomTable;
use crate::ir::types::{TypeId, TypeTable, TypeTag};

pub(crate) struct Decoder<'a> {
    pub(super) pool: ConstantPool<'a>,
    /// Shape pool index → type id.
    shapes: HashMap<i32, TypeId>,
    pub(super) types: TypeTable,
    pub(super) atoms: AtomTable,
    config: CodecConfig,
    depth: usize,
}

/// Decodes a BIR file with the default [`CodecConfig`].
pub fn decode(bytes: &[u8]) -> Result<Package, Error> {
    decode_with(bytes, &CodecConfig::default())
}

pub fn decode_with(bytes: &[u8], config: &CodecConfig) -> Result<Package, Error> {
    if bytes.len() < MAGIC.len() || bytes[..MAGIC.len()] != MAGIC {
        return Err(FormatError::BadMagic {
            found: bytes[..bytes.len().min(MAGIC.len())].to_vec(),
        }
        .into());
    }
    let mut r = ByteReader::new(bytes);
    r.bytes(MAGIC.len(), "magic")?;

    let version = r.i32("version")?;
    if version != VERSION {
        if config.strict_version {
            return Err(FormatError::UnsupportedVersion {
                found: version,
                expected: VERSION,
            }
            .into());
        }
        warn!(found = version, expected = VERSION, "BIR version differs, decoding anyway");
    }

    let pool = ConstantPool::read(&mut r)?;
    let mut dec = Decoder {
        pool,
        shapes: HashMap::new(),
        types: TypeTable::new(),
        atoms: AtomTable::new(),
        config: *config,
        depth: 0,
    };
    dec.read_shapes()?;

    let mut pkg = dec.read_module(&mut r)?;
    dec.finish(&r, "module")?;

    if let Some(index) = dec.atoms.incomplete().next() {
        return Err(InvariantError::MissingAtom { index }.into());
    }
    pkg.types = std::mem::take(&mut dec.types);
    pkg.atoms = std::mem::take(&mut dec.atoms);
    debug!(
        package = %pkg.id,
        pool_entries = dec.pool.len(),
        types = pkg.types.len(),
        functions = pkg.functions.len(),
        "decoded package"
    );
    Ok(pkg)
}

/// Per-function state while a body is being read.
struct FnCtx {
    name: String,
    vars: HashMap<String, VarId>,
    kinds: Vec<VarKind>,
    /// Block names referenced so far; a placeholder `BlockId(i)` stands for `pending[i]`.
    pending: Vec<String>,
}

impl FnCtx {
    fn new(name: &str) -> Self {
        FnCtx {
            name: name.to_string(),
            vars: HashMap::new(),
            kinds: Vec::new(),
            pending: Vec::new(),
        }
    }

    fn block_ref(&mut self, name: String) -> BlockId {
        self.pending.push(name);
        BlockId(self.pending.len() as u32 - 1)
    }

    fn resolve(&self, placeholder: BlockId, blocks: &HashMap<String, BlockId>) -> Result<BlockId, InvariantError> {
        let name = self
            .pending
            .get(placeholder.0 as usize)
            .map(String::as_str)
            .unwrap_or_default();
        blocks.get(name).copied().ok_or_else(|| InvariantError::UnknownBlock {
            func: self.name.clone(),
            block: name.to_string(),
        })
    }
}

fn origin(r: &mut ByteReader<'_>) -> Result<SymbolOrigin, FormatError> {
    let offset = r.offset();
    let v = r.i8("symbol origin")?;
    SymbolOrigin::from_i8(v).ok_or(FormatError::UnknownTag {
        offset,
        what: "symbol origin",
        tag: v as i64,
    })
}

fn var_kind(r: &mut ByteReader<'_>) -> Result<VarKind, FormatError> {
    let offset = r.offset();
    let v = r.i8("variable kind")?;
    VarKind::from_i8(v).ok_or(FormatError::UnknownTag {
        offset,
        what: "variable kind",
        tag: v as i64,
    })
}

fn var_scope(r: &mut ByteReader<'_>) -> Result<VarScope, FormatError> {
    let offset = r.offset();
    let v = r.i8("variable scope")?;
    VarScope::from_i8(v).ok_or(FormatError::UnknownTag {
        offset,
        what: "variable scope",
        tag: v as i64,
    })
}

impl<'a> Decoder<'a> {
    // ── bookkeeping ─────────────────────────────────────────────────────────

    pub(super) fn enter(&mut self, r: &ByteReader<'_>) -> Result<(), FormatError> {
        if self.depth >= self.config.max_type_depth {
            return Err(FormatError::TooDeep {
                offset: r.offset(),
                limit: self.config.max_type_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    pub(super) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn finish(&self, r: &ByteReader<'_>, what: &'static str) -> Result<(), FormatError> {
        if self.config.require_full_consumption {
            r.finish(what)
        } else {
            Ok(())
        }
    }

    fn read_shapes(&mut self) -> Result<(), Error> {
        let shapes: Vec<(i32, &'a [u8], usize)> = self
            .pool
            .entries()
            .iter()
            .enumerate()
            .filter_map(|(i, e)| match e {
                PoolEntry::Shape { bytes, offset } => Some((i as i32, *bytes, *offset)),
                _ => None,
            })
            .collect();

        let mut ids = Vec::with_capacity(shapes.len());
        for (cp, _, _) in &shapes {
            let id = self.types.reserve();
            self.shapes.insert(*cp, id);
            ids.push(id);
        }
        for ((_, bytes, offset), id) in shapes.into_iter().zip(ids) {
            let mut r = ByteReader::with_base(bytes, offset);
            let ty = self.read_shape(&mut r)?;
            self.finish(&r, "type shape")?;
            self.types.set(id, ty);
        }
        trace!(shapes = self.types.len(), "decoded type shapes");
        Ok(())
    }

    // ── references ──────────────────────────────────────────────────────────

    fn type_at(&self, index: i32, offset: usize) -> Result<TypeId, FormatError> {
        if let Some(id) = self.shapes.get(&index) {
            return Ok(*id);
        }
        self.pool.shape_at(index, offset)?;
        Err(FormatError::PoolIndexOutOfRange {
            offset,
            index,
            len: self.pool.len(),
        })
    }

    pub(super) fn read_type(&self, r: &mut ByteReader<'_>, what: &'static str) -> Result<TypeId, FormatError> {
        let offset = r.offset();
        let index = r.i32(what)?;
        self.type_at(index, offset)
    }

    pub(super) fn read_opt_type(
        &self,
        r: &mut ByteReader<'_>,
        what: &'static str,
    ) -> Result<Option<TypeId>, FormatError> {
        let offset = r.offset();
        match r.i32(what)? {
            NO_INDEX => Ok(None),
            index => Ok(Some(self.type_at(index, offset)?)),
        }
    }

    pub(super) fn read_types(&self, r: &mut ByteReader<'_>, what: &'static str) -> Result<Vec<TypeId>, FormatError> {
        let n = r.count(what)?;
        (0..n).map(|_| self.read_type(r, what)).collect()
    }

    pub(super) fn read_strings(&self, r: &mut ByteReader<'_>, what: &'static str) -> Result<Vec<String>, FormatError> {
        let n = r.count(what)?;
        (0..n).map(|_| self.pool.read_string(r, what)).collect()
    }

    /// Tag of a shape, read from its raw bytes. Constant values can appear
    /// inside shapes (annotations on record fields) before the type they
    /// name has been decoded.
    fn shape_tag(&self, index: i32, offset: usize) -> Result<i8, FormatError> {
        let (bytes, base) = self.pool.shape_at(index, offset)?;
        ByteReader::with_base(bytes, base).i8("type tag")
    }

    /// Pool index of an intersection shape's effective type.
    fn effective_shape(&self, index: i32, offset: usize) -> Result<i32, FormatError> {
        let (bytes, base) = self.pool.shape_at(index, offset)?;
        let mut r = ByteReader::with_base(bytes, base);
        r.i8("type tag")?;
        r.i32("type name")?;
        r.i64("type flags")?;
        let n = r.count("intersection constituent count")?;
        for _ in 0..n {
            r.i32("intersection constituent")?;
        }
        r.i32("intersection effective type")
    }

    // ── shared structures ───────────────────────────────────────────────────

    fn read_position(&self, r: &mut ByteReader<'_>) -> Result<Position, FormatError> {
        Ok(Position {
            source_file: self.pool.read_string(r, "source file")?,
            start_line: r.i32("start line")?,
            start_col: r.i32("start column")?,
            end_line: r.i32("end line")?,
            end_col: r.i32("end column")?,
        })
    }

    pub(super) fn read_markdown(&self, r: &mut ByteReader<'_>) -> Result<Option<Markdown>, FormatError> {
        let mut body = r.sized_i32("markdown")?;
        if !body.bool("markdown presence")? {
            self.finish(&body, "markdown")?;
            return Ok(None);
        }
        let text = |b: &mut ByteReader<'_>, what| {
            self.pool.read_opt_string(b, what).map(Option::unwrap_or_default)
        };
        let description = text(&mut body, "doc description")?;
        let return_description = text(&mut body, "doc return description")?;
        let mut parameters = Vec::new();
        for _ in 0..body.count("doc parameter count")? {
            parameters.push(MarkdownParam {
                name: text(&mut body, "doc parameter name")?,
                description: text(&mut body, "doc parameter description")?,
            });
        }
        let deprecated_docs = text(&mut body, "deprecation doc")?;
        let mut deprecated_parameters = Vec::new();
        for _ in 0..body.count("deprecated parameter count")? {
            deprecated_parameters.push(MarkdownParam {
                name: text(&mut body, "deprecated parameter name")?,
                description: text(&mut body, "deprecated parameter description")?,
            });
        }
        self.finish(&body, "markdown")?;
        Ok(Some(Markdown {
            description,
            return_description,
            parameters,
            deprecated_docs,
            deprecated_parameters,
        }))
    }

    pub(super) fn read_annotations(&mut self, r: &mut ByteReader<'_>) -> Result<Vec<AnnotationAttachment>, Error> {
        let mut body = r.sized_i64("annotation attachments")?;
        let n = body.count("annotation attachment count")?;
        let mut out = Vec::with_capacity(n.min(body.remaining()));
        for _ in 0..n {
            let pkg = self.pool.read_package(&mut body, "annotation package")?;
            let pos = self.read_position(&mut body)?;
            let tag = self.pool.read_string(&mut body, "annotation tag")?;
            let value = if body.bool("annotation value flag")? {
                Some(self.read_constant_value(&mut body)?)
            } else {
                None
            };
            out.push(AnnotationAttachment { pkg, pos, tag, value });
        }
        self.finish(&body, "annotation attachments")?;
        Ok(out)
    }

    pub(super) fn read_constant_value(&mut self, r: &mut ByteReader<'_>) -> Result<ConstantValue, Error> {
        self.enter(r)?;
        let offset = r.offset();
        let index = r.i32("constant type")?;
        let ty = self.type_at(index, offset)?;
        let value = self.read_constant_body(r, index, offset, true)?;
        self.leave();
        Ok(ConstantValue { ty, value })
    }

    fn read_constant_body(
        &mut self,
        r: &mut ByteReader<'_>,
        shape: i32,
        offset: usize,
        composite: bool,
    ) -> Result<ConstValue, Error> {
        let raw = self.shape_tag(shape, offset)?;
        let no_encoding = |tag| FormatError::NoConstantEncoding { offset, tag };
        let value = match TypeTag::from_i8(raw) {
            Some(TypeTag::Boolean) => ConstValue::Boolean(r.bool("boolean constant")?),
            Some(TypeTag::Byte) => ConstValue::Byte(self.pool.read_byte(r, "byte constant")?),
            Some(TypeTag::String | TypeTag::CharString) => {
                ConstValue::String(self.pool.read_string(r, "string constant")?)
            }
            Some(TypeTag::Decimal) => ConstValue::Decimal(self.pool.read_string(r, "decimal constant")?),
            Some(TypeTag::Float) => ConstValue::Float(self.pool.read_float(r, "float constant")?),
            Some(t) if t.is_integer() => ConstValue::Int(self.pool.read_int(r, "int constant")?),
            Some(TypeTag::Nil) => ConstValue::Nil,
            Some(TypeTag::Record) if composite => self.read_map_constant(r)?,
            Some(TypeTag::Intersection) if composite => {
                let effective = self.effective_shape(shape, offset)?;
                let eff_tag = self.shape_tag(effective, offset)?;
                match TypeTag::from_i8(eff_tag) {
                    Some(TypeTag::Record) => self.read_map_constant(r)?,
                    Some(TypeTag::Tuple) => {
                        let n = r.count("constant list size")?;
                        let mut items = Vec::with_capacity(n.min(r.remaining()));
                        for _ in 0..n {
                            items.push(self.read_constant_value(r)?);
                        }
                        ConstValue::List(items)
                    }
                    _ => return Err(no_encoding(eff_tag).into()),
                }
            }
            _ => return Err(no_encoding(raw).into()),
        };
        Ok(value)
    }

    fn read_map_constant(&mut self, r: &mut ByteReader<'_>) -> Result<ConstValue, Error> {
        let n = r.count("constant map size")?;
        let mut entries = Vec::with_capacity(n.min(r.remaining()));
        for _ in 0..n {
            let key = self.pool.read_string(r, "constant map key")?;
            entries.push((key, self.read_constant_value(r)?));
        }
        Ok(ConstValue::Map(entries))
    }

    // ── module items ────────────────────────────────────────────────────────

    fn read_module(&mut self, r: &mut ByteReader<'_>) -> Result<Package, Error> {
        let mut pkg = Package::new(self.pool.read_package(r, "module id")?);

        let n = r.count("import count")?;
        for _ in 0..n {
            pkg.imports.push(PackageId {
                org: self.pool.read_string(r, "import org")?,
                pkg_name: self.pool.read_string(r, "import package name")?,
                name: self.pool.read_string(r, "import module name")?,
                version: self.pool.read_string(r, "import version")?,
            });
        }

        for _ in 0..r.count("constant count")? {
            let c = self.read_constant(r)?;
            pkg.constants.push(c);
        }
        for _ in 0..r.count("type definition count")? {
            let t = self.read_type_def(r)?;
            pkg.type_defs.push(t);
        }
        for _ in 0..r.count("global variable count")? {
            let g = self.read_global(r)?;
            pkg.globals.push(g);
        }
        for _ in 0..r.count("type definition body count")? {
            let mut body = TypeDefinitionBody::default();
            for _ in 0..r.count("attached function count")? {
                body.attached_functions.push(self.read_function(r)?);
            }
            body.referenced_types = self.read_types(r, "referenced types")?;
            pkg.type_def_bodies.push(body);
        }
        for _ in 0..r.count("function count")? {
            let f = self.read_function(r)?;
            pkg.functions.push(f);
        }
        for _ in 0..r.count("annotation count")? {
            let a = self.read_annotation_decl(r)?;
            pkg.annotations.push(a);
        }
        for _ in 0..r.count("service count")? {
            let s = self.read_service(r)?;
            pkg.services.push(s);
        }
        Ok(pkg)
    }

    fn read_constant(&mut self, r: &mut ByteReader<'_>) -> Result<Constant, Error> {
        let name = self.pool.read_string(r, "constant name")?;
        let flags = r.i64("constant flags")?;
        let origin = origin(r)?;
        let pos = self.read_position(r)?;
        let doc = self.read_markdown(r)?;
        let ty = self.read_type(r, "constant type")?;
        let annotations = self.read_annotations(r)?;
        let mut body = r.sized_i64("constant value")?;
        let value = self.read_constant_value(&mut body)?;
        self.finish(&body, "constant value")?;
        Ok(Constant {
            name,
            flags,
            origin,
            pos,
            doc,
            ty,
            annotations,
            value,
        })
    }

    fn read_type_def(&mut self, r: &mut ByteReader<'_>) -> Result<TypeDefinition, Error> {
        Ok(TypeDefinition {
            pos: self.read_position(r)?,
            name: self.pool.read_string(r, "type definition name")?,
            original_name: self.pool.read_string(r, "type definition original name")?,
            flags: r.i64("type definition flags")?,
            origin: origin(r)?,
            doc: self.read_markdown(r)?,
            ty: self.read_type(r, "type definition type")?,
            has_reference_type: r.bool("reference type flag")?,
            annotations: self.read_annotations(r)?,
        })
    }

    fn read_global(&mut self, r: &mut ByteReader<'_>) -> Result<GlobalVar, Error> {
        Ok(GlobalVar {
            pos: self.read_position(r)?,
            kind: var_kind(r)?,
            name: self.pool.read_string(r, "global name")?,
            flags: r.i64("global flags")?,
            origin: origin(r)?,
            doc: self.read_markdown(r)?,
            ty: self.read_type(r, "global type")?,
            annotations: self.read_annotations(r)?,
        })
    }

    fn read_annotation_decl(&mut self, r: &mut ByteReader<'_>) -> Result<Annotation, Error> {
        let pkg = self.pool.read_package(r, "annotation package")?;
        let name = self.pool.read_string(r, "annotation name")?;
        let original_name = self.pool.read_string(r, "annotation original name")?;
        let flags = r.i64("annotation flags")?;
        let origin = origin(r)?;
        let pos = self.read_position(r)?;
        let n = r.count("attach point count")?;
        let mut attach_points = Vec::with_capacity(n.min(r.remaining()));
        for _ in 0..n {
            attach_points.push(AttachPoint {
                name: self.pool.read_string(r, "attach point")?,
                is_source: r.bool("attach point source flag")?,
            });
        }
        Ok(Annotation {
            pkg,
            name,
            original_name,
            flags,
            origin,
            pos,
            attach_points,
            annot_type: self.read_type(r, "annotation type")?,
            doc: self.read_markdown(r)?,
            annotations: self.read_annotations(r)?,
        })
    }

    fn read_service(&mut self, r: &mut ByteReader<'_>) -> Result<ServiceDecl, Error> {
        let name = self.pool.read_string(r, "service name")?;
        let assoc_class_name = self.pool.read_string(r, "service class name")?;
        let flags = r.i64("service flags")?;
        let origin = origin(r)?;
        let pos = self.read_position(r)?;
        let ty = if r.bool("service type flag")? {
            Some(self.read_type(r, "service type")?)
        } else {
            None
        };
        let attach_point = if r.bool("service attach point flag")? {
            Some(self.read_strings(r, "service attach point")?)
        } else {
            None
        };
        let attach_point_literal = if r.bool("service attach literal flag")? {
            Some(self.pool.read_string(r, "service attach literal")?)
        } else {
            None
        };
        let listener_types = self.read_types(r, "service listener types")?;
        Ok(ServiceDecl {
            name,
            assoc_class_name,
            flags,
            origin,
            pos,
            ty,
            attach_point,
            attach_point_literal,
            listener_types,
        })
    }

    // ── functions ───────────────────────────────────────────────────────────

    fn read_function(&mut self, r: &mut ByteReader<'_>) -> Result<Function, Error> {
        let pos = self.read_position(r)?;
        let name = self.pool.read_string(r, "function name")?;
        let mut f = Function::new(name, TypeId(0));
        f.pos = pos;
        f.original_name = self.pool.read_string(r, "function original name")?;
        f.worker_name = self.pool.read_string(r, "worker name")?;
        f.flags = r.i64("function flags")?;
        f.origin = origin(r)?;
        f.ty = self.read_type(r, "function type")?;

        if r.bool("resource flag")? {
            let n = r.count("path param count")?;
            let mut path_params = Vec::with_capacity(n.min(r.remaining()));
            for _ in 0..n {
                path_params.push(self.read_path_param(r)?);
            }
            let rest_path_param = if r.bool("rest path param flag")? {
                Some(self.read_path_param(r)?)
            } else {
                None
            };
            let n = r.count("path segment count")?;
            let mut segments = Vec::with_capacity(n.min(r.remaining()));
            for _ in 0..n {
                segments.push(PathSegment {
                    name: self.pool.read_string(r, "path segment")?,
                    pos: self.read_position(r)?,
                    ty: self.read_type(r, "path segment type")?,
                });
            }
            f.resource = Some(ResourceFunction {
                path_params,
                rest_path_param,
                segments,
                accessor: self.pool.read_string(r, "resource accessor")?,
            });
        }

        f.annotations = self.read_annotations(r)?;
        f.return_annotations = self.read_annotations(r)?;

        for _ in 0..r.count("required param count")? {
            let p = RequiredParam {
                name: self.pool.read_string(r, "required param name")?,
                flags: r.i64("required param flags")?,
                annotations: self.read_annotations(r)?,
            };
            f.required_params.push(p);
        }
        if r.bool("rest param flag")? {
            f.rest_param = Some(RestParam {
                name: self.pool.read_string(r, "rest param name")?,
                annotations: self.read_annotations(r)?,
            });
        }
        if r.bool("receiver flag")? {
            f.receiver = Some(Receiver {
                kind: var_kind(r)?,
                ty: self.read_type(r, "receiver type")?,
                name: self.pool.read_string(r, "receiver name")?,
            });
        }
        f.doc = self.read_markdown(r)?;
        f.dependent_globals = self.read_strings(r, "dependent globals")?;

        let mut scopes = r.sized_i64("scope table")?;
        for _ in 0..scopes.count("scope count")? {
            let id = scopes.i32("scope id")?;
            let ins_offset = scopes.i32("scope instruction offset")?;
            let parent = if scopes.bool("scope parent flag")? {
                Some(scopes.i32("scope parent")?)
            } else {
                None
            };
            f.scopes.push(ScopeEntry { id, ins_offset, parent });
        }
        self.finish(&scopes, "scope table")?;

        let mut body = r.sized_i64("function body")?;
        self.read_body(&mut body, &mut f)?;
        self.finish(&body, "function body")?;

        debug!(function = %f.name, blocks = f.blocks.len(), vars = f.local_vars.len(), "decoded function");
        Ok(f)
    }

    fn read_path_param(&self, r: &mut ByteReader<'_>) -> Result<PathParam, FormatError> {
        Ok(PathParam {
            name: self.pool.read_string(r, "path param name")?,
            ty: self.read_type(r, "path param type")?,
        })
    }

    fn read_body(&mut self, r: &mut ByteReader<'_>, f: &mut Function) -> Result<(), Error> {
        let mut ctx = FnCtx::new(&f.name);
        f.args_count = r.i32("argument count")?;

        let return_var = if r.bool("return variable flag")? {
            let kind = var_kind(r)?;
            let ty = self.read_opt_type(r, "return variable type")?;
            let name = self.pool.read_string(r, "return variable name")?;
            Some(VariableDcl::new(name, kind, ty))
        } else {
            None
        };

        for _ in 0..r.count("default param count")? {
            let kind = var_kind(r)?;
            let ty = self.read_opt_type(r, "param type")?;
            let name = self.pool.read_string(r, "param name")?;
            let meta_var_name = if kind == VarKind::Arg {
                Some(self.pool.read_string(r, "param source name")?)
            } else {
                None
            };
            let has_default = r.bool("param default flag")?;
            f.params.push(ParamInfo {
                kind,
                ty,
                name,
                meta_var_name,
                has_default,
            });
        }

        let mut vars = Vec::new();
        for _ in 0..r.count("local variable count")? {
            let kind = var_kind(r)?;
            let ty = self.read_opt_type(r, "variable type")?;
            let name = self.pool.read_string(r, "variable name")?;
            let mut var = VariableDcl::new(name, kind, ty);
            match kind {
                VarKind::Arg => {
                    var.meta_var_name = Some(self.pool.read_string(r, "variable source name")?);
                }
                VarKind::Local => {
                    var.meta_var_name = Some(self.pool.read_string(r, "variable source name")?);
                    let end = ctx.block_ref(self.pool.read_string(r, "variable end block")?);
                    let start = ctx.block_ref(self.pool.read_string(r, "variable start block")?);
                    var.range = Some(VarRange {
                        start,
                        end,
                        ins_offset: r.i32("variable instruction offset")?,
                    });
                }
                _ => {}
            }
            vars.push(var);
        }
        if let Some(ret) = return_var {
            let index = match vars.iter().position(|v| v.name == ret.name) {
                Some(i) => i,
                None => {
                    vars.insert(0, ret);
                    0
                }
            };
            f.return_var = Some(VarId(index as u32));
        }
        for (i, var) in vars.iter().enumerate() {
            if ctx.vars.insert(var.name.clone(), VarId(i as u32)).is_some() {
                return Err(InvariantError::DuplicateVariable {
                    func: f.name.clone(),
                    name: var.name.clone(),
                }
                .into());
            }
            ctx.kinds.push(var.kind);
        }
        f.local_vars = vars;

        let n = r.count("block count")?;
        let mut blocks = Vec::with_capacity(n.min(r.remaining()));
        for i in 0..n {
            let block = self.read_block(r, &mut ctx, BlockId(i as u32))?;
            blocks.push(block);
        }

        for _ in 0..r.count("error table size")? {
            let trap = self.read_block_ref(r, &mut ctx)?;
            let end = self.read_block_ref(r, &mut ctx)?;
            let error_op = self.read_operand(r, &ctx)?;
            let target = self.read_block_ref(r, &mut ctx)?;
            f.error_table.push(ErrorEntry { trap, end, error_op, target });
        }
        f.worker_channels = self.read_channels(r)?;

        // Patch placeholder block ids now that every name is known.
        let mut by_name = HashMap::with_capacity(blocks.len());
        for block in &blocks {
            if by_name.insert(block.name.clone(), block.id).is_some() {
                return Err(InvariantError::DuplicateBlock {
                    func: f.name.clone(),
                    block: block.name.clone(),
                }
                .into());
            }
        }
        for block in &mut blocks {
            if let Some(term) = &mut block.terminator {
                for target in term.op.successors_mut() {
                    *target = ctx.resolve(*target, &by_name)?;
                }
            }
        }
        for var in &mut f.local_vars {
            if let Some(range) = &mut var.range {
                range.start = ctx.resolve(range.start, &by_name)?;
                range.end = ctx.resolve(range.end, &by_name)?;
            }
        }
        for entry in &mut f.error_table {
            entry.trap = ctx.resolve(entry.trap, &by_name)?;
            entry.end = ctx.resolve(entry.end, &by_name)?;
            entry.target = ctx.resolve(entry.target, &by_name)?;
        }
        f.blocks = blocks;
        Ok(())
    }

    fn read_block(&mut self, r: &mut ByteReader<'_>, ctx: &mut FnCtx, id: BlockId) -> Result<BasicBlock, Error> {
        let name = self.pool.read_string(r, "block name")?;
        let mut block = BasicBlock::new(id, name);
        let count = r.count("instruction count")?;
        for index in 0..count {
            let pos = self.read_position(r)?;
            let offset = r.offset();
            let raw = r.i8("instruction kind")?;
            let kind = InstructionKind::from_wire(raw)
                .filter(|k| !matches!(k, InstructionKind::NewStream | InstructionKind::Platform))
                .ok_or(FormatError::UnknownTag {
                    offset,
                    what: "instruction kind",
                    tag: raw as i64,
                })?;
            if kind.is_terminator() {
                if index + 1 != count {
                    return Err(InvariantError::TerminatorNotLast {
                        func: ctx.name.clone(),
                        block: block.name.clone(),
                        index,
                    }
                    .into());
                }
                let op = self.read_terminator(r, ctx, kind)?;
                block.terminator = Some(Instr::new(pos, op));
            } else {
                let op = self.read_non_terminator(r, ctx, kind, offset)?;
                block.instructions.push(Instr::new(pos, op));
            }
        }
        if block.terminator.is_none() {
            return Err(InvariantError::MissingTerminator {
                func: ctx.name.clone(),
                block: block.name,
            }
            .into());
        }
        trace!(function = %ctx.name, block = %block.name, instructions = count, "decoded block");
        Ok(block)
    }

    fn read_block_ref(&self, r: &mut ByteReader<'_>, ctx: &mut FnCtx) -> Result<BlockId, FormatError> {
        Ok(ctx.block_ref(self.pool.read_string(r, "block reference")?))
    }

    fn read_channels(&self, r: &mut ByteReader<'_>) -> Result<Vec<ChannelDetail>, FormatError> {
        let n = r.count("channel count")?;
        let mut out = Vec::with_capacity(n.min(r.remaining()));
        for _ in 0..n {
            out.push(ChannelDetail {
                name: self.pool.read_string(r, "channel name")?,
                same_strand: r.bool("channel same-strand flag")?,
                is_send: r.bool("channel send flag")?,
            });
        }
        Ok(out)
    }

    // ── operands ────────────────────────────────────────────────────────────

    fn read_operand(&self, r: &mut ByteReader<'_>, ctx: &FnCtx) -> Result<Operand, Error> {
        if r.bool("operand ignored flag")? {
            return Ok(Operand::Ignored {
                ty: self.read_opt_type(r, "ignored operand type")?,
            });
        }
        let kind = var_kind(r)?;
        let scope = var_scope(r)?;
        let name = self.pool.read_string(r, "operand name")?;
        if kind.is_module_level() {
            return Ok(Operand::Global(GlobalRef {
                kind,
                scope,
                name,
                pkg: self.pool.read_package(r, "operand package")?,
                ty: self.read_opt_type(r, "operand type")?,
            }));
        }
        let id = *ctx.vars.get(&name).ok_or_else(|| InvariantError::UnknownVariable {
            func: ctx.name.clone(),
            name: name.clone(),
        })?;
        let declared = ctx.kinds[id.0 as usize];
        if declared != kind {
            return Err(InvariantError::OperandKindMismatch {
                func: ctx.name.clone(),
                name,
                encoded: kind.to_string(),
                declared: declared.to_string(),
            }
            .into());
        }
        Ok(Operand::Var(id))
    }

    fn read_operands(&self, r: &mut ByteReader<'_>, ctx: &FnCtx) -> Result<Vec<Operand>, Error> {
        let n = r.count("operand count")?;
        (0..n).map(|_| self.read_operand(r, ctx)).collect()
    }

    fn read_opt_operand(&self, r: &mut ByteReader<'_>, ctx: &FnCtx) -> Result<Option<Operand>, Error> {
        if r.i8("operand presence")? != 0 {
            Ok(Some(self.read_operand(r, ctx)?))
        } else {
            Ok(None)
        }
    }

    // ── instructions ────────────────────────────────────────────────────────

    fn read_call_info(&self, r: &mut ByteReader<'_>, ctx: &FnCtx) -> Result<CallInfo, Error> {
        Ok(CallInfo {
            is_virtual: r.bool("virtual call flag")?,
            pkg: self.pool.read_package(r, "callee package")?,
            name: self.pool.read_string(r, "callee name")?,
            args: self.read_operands(r, ctx)?,
            lhs: self.read_opt_operand(r, ctx)?,
        })
    }

    fn read_terminator(
        &mut self,
        r: &mut ByteReader<'_>,
        ctx: &mut FnCtx,
        kind: InstructionKind,
    ) -> Result<TerminatorOp, Error> {
        use InstructionKind as K;
        let op = match kind {
            K::Goto => TerminatorOp::Goto { target: self.read_block_ref(r, ctx)? },
            K::Lock => TerminatorOp::Lock { target: self.read_block_ref(r, ctx)? },
            K::Unlock => TerminatorOp::Unlock { target: self.read_block_ref(r, ctx)? },
            K::Call => {
                let call = self.read_call_info(r, ctx)?;
                TerminatorOp::Call { call, then: self.read_block_ref(r, ctx)? }
            }
            K::Branch => {
                let cond = self.read_operand(r, ctx)?;
                let on_true = self.read_block_ref(r, ctx)?;
                let on_false = self.read_block_ref(r, ctx)?;
                TerminatorOp::Branch { cond, on_true, on_false }
            }
            K::Return => TerminatorOp::Return,
            K::AsyncCall => {
                let call = self.read_call_info(r, ctx)?;
                let annotations = self.read_annotations(r)?;
                TerminatorOp::AsyncCall { call, annotations, then: self.read_block_ref(r, ctx)? }
            }
            K::Wait => {
                let exprs = self.read_operands(r, ctx)?;
                let lhs = self.read_operand(r, ctx)?;
                TerminatorOp::Wait { exprs, lhs, then: self.read_block_ref(r, ctx)? }
            }
            K::FpCall => {
                let fp = self.read_operand(r, ctx)?;
                let args = self.read_operands(r, ctx)?;
                let lhs = self.read_opt_operand(r, ctx)?;
                let is_async = r.bool("async flag")?;
                let annotations = self.read_annotations(r)?;
                TerminatorOp::FpCall {
                    fp,
                    args,
                    lhs,
                    is_async,
                    annotations,
                    then: self.read_block_ref(r, ctx)?,
                }
            }
            K::WkReceive => {
                let channel = self.pool.read_string(r, "channel name")?;
                let lhs = self.read_operand(r, ctx)?;
                let same_strand = r.bool("same-strand flag")?;
                TerminatorOp::WorkerReceive { channel, lhs, same_strand, then: self.read_block_ref(r, ctx)? }
            }
            K::WkSend => {
                let channel = self.pool.read_string(r, "channel name")?;
                let data = self.read_operand(r, ctx)?;
                let same_strand = r.bool("same-strand flag")?;
                let lhs = if r.bool("sync send flag")? {
                    Some(self.read_operand(r, ctx)?)
                } else {
                    None
                };
                TerminatorOp::WorkerSend {
                    channel,
                    data,
                    same_strand,
                    lhs,
                    then: self.read_block_ref(r, ctx)?,
                }
            }
            K::Flush => {
                let channels = self.read_channels(r)?;
                let lhs = self.read_operand(r, ctx)?;
                TerminatorOp::Flush { channels, lhs, then: self.read_block_ref(r, ctx)? }
            }
            K::FieldLock => TerminatorOp::FieldLock {
                local_var: self.pool.read_string(r, "locked variable")?,
                field: self.pool.read_string(r, "locked field")?,
                target: self.read_block_ref(r, ctx)?,
            },
            K::WaitAll => {
                let lhs = self.read_operand(r, ctx)?;
                let keys = self.read_strings(r, "wait keys")?;
                let values = self.read_operands(r, ctx)?;
                TerminatorOp::WaitAll { lhs, keys, values, then: self.read_block_ref(r, ctx)? }
            }
            K::Panic => TerminatorOp::Panic { error: self.read_operand(r, ctx)? },
            K::WkAltReceive => {
                let channels = self.read_strings(r, "alternate channels")?;
                let lhs = self.read_operand(r, ctx)?;
                let same_strand = r.bool("same-strand flag")?;
                TerminatorOp::WorkerAltReceive { channels, lhs, same_strand, then: self.read_block_ref(r, ctx)? }
            }
            K::WkMulReceive => {
                let n = r.count("receive field count")?;
                let mut fields = Vec::with_capacity(n.min(r.remaining()));
                for _ in 0..n {
                    fields.push(ReceiveField {
                        field_name: self.pool.read_string(r, "receive field")?,
                        channel_name: self.pool.read_string(r, "receive channel")?,
                    });
                }
                let ty = self.read_type(r, "receive type")?;
                let lhs = self.read_operand(r, ctx)?;
                let same_strand = r.bool("same-strand flag")?;
                TerminatorOp::WorkerMultipleReceive {
                    fields,
                    ty,
                    lhs,
                    same_strand,
                    then: self.read_block_ref(r, ctx)?,
                }
            }
            other => {
                return Err(InvariantError::Malformed {
                    what: "instruction",
                    detail: format!("{} is not a terminator", other.name()),
                }
                .into())
            }
        };
        Ok(op)
    }

    fn read_non_terminator(
        &mut self,
        r: &mut ByteReader<'_>,
        ctx: &FnCtx,
        kind: InstructionKind,
        offset: usize,
    ) -> Result<NonTerminatorOp, Error> {
        use InstructionKind as K;

        if let Some(access) = AccessKind::from_kind(kind) {
            let (is_optional, is_filling_read) = if access.has_load_flags() {
                (r.bool("optional access flag")?, r.bool("filling read flag")?)
            } else {
                (false, false)
            };
            return Ok(NonTerminatorOp::FieldAccess {
                kind: access,
                lhs: self.read_operand(r, ctx)?,
                key: self.read_operand(r, ctx)?,
                rhs: self.read_operand(r, ctx)?,
                is_optional,
                is_filling_read,
            });
        }
        if let Some(op) = BinaryOpKind::from_kind(kind) {
            let rhs1 = self.read_operand(r, ctx)?;
            let rhs2 = self.read_operand(r, ctx)?;
            let lhs = self.read_operand(r, ctx)?;
            return Ok(NonTerminatorOp::BinaryOp { op, lhs, rhs1, rhs2 });
        }
        if let Some(op) = UnaryOpKind::from_kind(kind) {
            let rhs = self.read_operand(r, ctx)?;
            let lhs = self.read_operand(r, ctx)?;
            return Ok(NonTerminatorOp::UnaryOp { op, lhs, rhs });
        }
        if let Some(xml) = XmlKind::from_kind(kind) {
            let lhs = self.read_operand(r, ctx)?;
            let operands = (0..xml.arity())
                .map(|_| self.read_operand(r, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(NonTerminatorOp::Xml { kind: xml, lhs, operands });
        }
        if let Some(regex) = RegexKind::from_kind(kind) {
            let lhs = self.read_operand(r, ctx)?;
            let operands = (0..regex.arity())
                .map(|_| self.read_operand(r, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(NonTerminatorOp::Regex { kind: regex, lhs, operands });
        }

        let op = match kind {
            K::Move => {
                let rhs = self.read_operand(r, ctx)?;
                let lhs = self.read_operand(r, ctx)?;
                NonTerminatorOp::Move { lhs, rhs }
            }
            K::ConstLoad => {
                let type_offset = r.offset();
                let shape = r.i32("constant type")?;
                let ty = self.type_at(shape, type_offset)?;
                let lhs = self.read_operand(r, ctx)?;
                let value = self.read_constant_body(r, shape, type_offset, false)?;
                NonTerminatorOp::ConstLoad { ty, lhs, value }
            }
            K::NewStructure => {
                let typedesc = self.read_operand(r, ctx)?;
                let lhs = self.read_operand(r, ctx)?;
                let n = r.count("mapping entry count")?;
                let mut entries = Vec::with_capacity(n.min(r.remaining()));
                for _ in 0..n {
                    let entry_offset = r.offset();
                    entries.push(match r.u8("mapping entry kind")? {
                        0 => MappingEntry::Spread(self.read_operand(r, ctx)?),
                        1 => MappingEntry::KeyValue {
                            key: self.read_operand(r, ctx)?,
                            value: self.read_operand(r, ctx)?,
                        },
                        tag => {
                            return Err(FormatError::UnknownTag {
                                offset: entry_offset,
                                what: "mapping entry kind",
                                tag: tag as i64,
                            }
                            .into())
                        }
                    });
                }
                NonTerminatorOp::NewStructure { lhs, typedesc, entries }
            }
            K::NewArray => NonTerminatorOp::NewArray {
                ty: self.read_type(r, "array type")?,
                lhs: self.read_operand(r, ctx)?,
                typedesc: self.read_opt_operand(r, ctx)?,
                element_typedesc: self.read_opt_operand(r, ctx)?,
                size: self.read_operand(r, ctx)?,
                values: self.read_operands(r, ctx)?,
            },
            K::NewError => NonTerminatorOp::NewError {
                ty: self.read_type(r, "error type")?,
                lhs: self.read_operand(r, ctx)?,
                message: self.read_operand(r, ctx)?,
                cause: self.read_operand(r, ctx)?,
                detail: self.read_operand(r, ctx)?,
            },
            K::TypeCast => NonTerminatorOp::TypeCast {
                lhs: self.read_operand(r, ctx)?,
                rhs: self.read_operand(r, ctx)?,
                ty: self.read_type(r, "cast type")?,
                check_types: r.bool("check types flag")?,
            },
            K::IsLike => NonTerminatorOp::IsLike {
                ty: self.read_type(r, "is-like type")?,
                lhs: self.read_operand(r, ctx)?,
                rhs: self.read_operand(r, ctx)?,
            },
            K::TypeTest => NonTerminatorOp::TypeTest {
                ty: self.read_type(r, "type test type")?,
                lhs: self.read_operand(r, ctx)?,
                rhs: self.read_operand(r, ctx)?,
            },
            K::NewInstance => {
                let def_offset = r.offset();
                let def = match r.u8("instance definition kind")? {
                    0 => InstanceDef::Local(r.i32("type definition index")?),
                    1 => InstanceDef::External {
                        pkg: self.pool.read_package(r, "object package")?,
                        object_name: self.pool.read_string(r, "object name")?,
                    },
                    tag => {
                        return Err(FormatError::UnknownTag {
                            offset: def_offset,
                            what: "instance definition kind",
                            tag: tag as i64,
                        }
                        .into())
                    }
                };
                NonTerminatorOp::NewInstance { def, lhs: self.read_operand(r, ctx)? }
            }
            K::FpLoad => {
                let lhs = self.read_operand(r, ctx)?;
                let pkg = self.pool.read_package(r, "function package")?;
                let name = self.pool.read_string(r, "function name")?;
                let ret_ty = self.read_type(r, "function return type")?;
                let closure_args = self.read_operands(r, ctx)?;
                let n = r.count("function pointer param count")?;
                let mut params = Vec::with_capacity(n.min(r.remaining()));
                for _ in 0..n {
                    params.push(FpParam {
                        kind: var_kind(r)?,
                        ty: self.read_type(r, "function pointer param type")?,
                        name: self.pool.read_string(r, "function pointer param name")?,
                    });
                }
                NonTerminatorOp::FpLoad {
                    lhs,
                    pkg,
                    name,
                    ret_ty,
                    closure_args,
                    params,
                }
            }
            K::NewTable => NonTerminatorOp::NewTable {
                ty: self.read_type(r, "table type")?,
                lhs: self.read_operand(r, ctx)?,
                key_columns: self.read_operand(r, ctx)?,
                data: self.read_operand(r, ctx)?,
            },
            K::NewTypedesc => NonTerminatorOp::NewTypedesc {
                lhs: self.read_operand(r, ctx)?,
                ty: self.read_type(r, "typedesc type")?,
            },
            K::RecordDefaultFpLoad => NonTerminatorOp::RecordDefaultFpLoad {
                lhs: self.read_operand(r, ctx)?,
                enclosed_type_index: r.i32("enclosed type index")?,
                field_name: r.i32("default field name")?,
            },
            other => {
                return Err(FormatError::UnknownTag {
                    offset,
                    what: "instruction kind",
                    tag: other.to_wire() as i64,
                }
                .into())
            }
        };
        Ok(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;
    use crate::ir::instr::Terminator;

    fn tiny_package() -> Package {
        let mut pkg = Package::new(PackageId::new("acme", "tiny", "0.1.0"));
        let nil = pkg.types.basic(TypeTag::Nil);
        let mut f = Function::new("main", nil);
        let b0 = f.add_block();
        let t: Terminator = Instr::new(Position::default(), TerminatorOp::Return);
        f.block_mut(b0).unwrap().terminator = Some(t);
        pkg.functions.push(f);
        pkg
    }

    #[test]
    fn test_version_mismatch_is_lenient_by_default() {
        let mut bytes = encode(&tiny_package()).unwrap();
        bytes[4..8].copy_from_slice(&74i32.to_be_bytes());

        let pkg = decode(&bytes).unwrap();
        assert_eq!(pkg.functions.len(), 1);

        let strict = CodecConfig {
            strict_version: true,
            ..CodecConfig::default()
        };
        let err = decode_with(&bytes, &strict).unwrap_err();
        assert!(matches!(
            err,
            Error::FormatValidation(FormatError::UnsupportedVersion { found: 74, expected: 75 })
        ));
    }

    #[test]
    fn test_short_input_is_bad_magic() {
        let err = decode(&[0xBA, 0x10]).unwrap_err();
        assert!(matches!(err, Error::FormatValidation(FormatError::BadMagic { ref found }) if found.len() == 2));
    }

    #[test]
    fn test_trailing_bytes_follow_config() {
        let mut bytes = encode(&tiny_package()).unwrap();
        bytes.push(0);
        assert!(matches!(
            decode(&bytes),
            Err(Error::FormatValidation(FormatError::LengthMismatch { what: "module", .. }))
        ));

        let relaxed = CodecConfig {
            require_full_consumption: false,
            ..CodecConfig::default()
        };
        assert!(decode_with(&bytes, &relaxed).is_ok());
    }

    /// A finite type whose semtype nests another semtype through an inline atom.
    fn nested_semtype_package() -> Package {
        use crate::ir::semtype::{AtomicType, Bdd, BddAtom, BddNode, ComplexSemType, ProperSubtype, SemNamedType, SemType};
        use crate::ir::types::{BType, TypeBody};

        let mut pkg = Package::new(PackageId::new("acme", "deep", "0.1.0"));
        pkg.atoms
            .define(
                3,
                AtomicType::Mapping {
                    names: vec!["inner".to_string()],
                    types: vec![Some(SemType::Uniform(1 << 2))],
                    rest: None,
                },
            )
            .unwrap();
        let outer = SemType::Complex(ComplexSemType {
            all: 0,
            some: 1 << 19,
            subtypes: vec![ProperSubtype::Bdd(Bdd::Node(Box::new(BddNode {
                atom: BddAtom::Type(3),
                left: Bdd::AllOrNothing(true),
                middle: Bdd::AllOrNothing(false),
                right: Bdd::AllOrNothing(false),
            })))],
        });
        pkg.types.push(BType::new(
            TypeTag::Finite,
            TypeBody::Finite {
                name: "Deep".to_string(),
                flags: 0,
                values: vec![SemNamedType { semtype: Some(outer), name: Some("Deep".to_string()) }],
            },
        ));
        pkg
    }

    #[test]
    fn test_type_nesting_beyond_limit_is_rejected() {
        let bytes = encode(&nested_semtype_package()).unwrap();
        assert!(decode(&bytes).is_ok());

        let shallow = CodecConfig {
            max_type_depth: 2,
            ..CodecConfig::default()
        };
        let err = decode_with(&bytes, &shallow).unwrap_err();
        assert!(
            matches!(err, Error::FormatValidation(FormatError::TooDeep { limit: 2, .. })),
            "got {err:?}"
        );
        assert_eq!(err.diagnostic_code(), "E0010");
    }

    #[test]
    fn test_placeholder_blocks_resolve_by_name() {
        let mut ctx = FnCtx::new("f");
        let a = ctx.block_ref("bb1".to_string());
        let b = ctx.block_ref("nowhere".to_string());
        let blocks: HashMap<String, BlockId> = [("bb0".to_string(), BlockId(0)), ("bb1".to_string(), BlockId(1))]
            .into_iter()
            .collect();
        assert_eq!(ctx.resolve(a, &blocks), Ok(BlockId(1)));
        assert!(matches!(
            ctx.resolve(b, &blocks),
            Err(InvariantError::UnknownBlock { ref block, .. }) if block == "nowhere"
        ));
    }
}
