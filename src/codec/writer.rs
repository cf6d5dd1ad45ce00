//! Package → bytes.
//!
//! The writer mirrors [`crate::codec::reader`] field for field. Everything it
//! references (strings, packages, types) is interned into a [`PoolBuilder`]
//! while the module is written into a side buffer; the pool is emitted first
//! once it is complete.

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::codec::io::ByteWriter;
use crate::codec::pool::{PoolBuilder, NO_INDEX};
use crate::codec::{MAGIC, VERSION};
use crate::error::{Error, InvariantError};
use crate::ir::block::BlockId;
use crate::ir::function::{Function, PathParam};
use crate::ir::instr::{
    CallInfo, ChannelDetail, InstanceDef, MappingEntry, NonTerminator, NonTerminatorOp, Terminator,
    TerminatorOp,
};
use crate::ir::meta::{AnnotationAttachment, ConstValue, ConstantValue, Markdown, Position};
use crate::ir::operand::{Operand, VarKind};
use crate::ir::package::{Annotation, Constant, GlobalVar, Package, ServiceDecl, TypeDefinition};
use crate::ir::types::{TypeBody, TypeId, TypeTag};

pub(crate) struct Encoder<'p> {
    pub(super) pkg: &'p Package,
    pub(super) pool: PoolBuilder,
    /// Atoms whose definition is currently being written.
    pub(super) open_atoms: HashSet<i32>,
}

/// Encodes a package into a complete BIR file.
///
/// The package is validated first, so a block without a terminator or an
/// operand naming an unknown variable fails here instead of producing a file
/// the reader would reject.
pub fn encode(pkg: &Package) -> Result<Vec<u8>, Error> {
    pkg.validate()?;
    let mut enc = Encoder {
        pkg,
        pool: PoolBuilder::new(),
        open_atoms: HashSet::new(),
    };

    // 1. Reserve one shape per type, in id order, so shapes may refer forward.
    for (id, _) in pkg.types.iter() {
        enc.pool.shape(id);
    }

    // 2. Encode the shapes into their reserved slots.
    for (id, ty) in pkg.types.iter() {
        let mut w = ByteWriter::new();
        enc.write_shape(&mut w, ty)?;
        enc.pool.fill_shape(id, w.into_bytes());
    }

    // 3. Module body; this keeps adding pool entries.
    let mut module = ByteWriter::new();
    enc.write_module(&mut module)?;

    // 4. Header, pool, module.
    let mut out = ByteWriter::new();
    out.bytes(&MAGIC);
    out.i32(VERSION);
    enc.pool.write(&mut out)?;
    out.bytes(module.as_slice());

    debug!(package = %pkg.id, pool_entries = enc.pool.len(), bytes = out.len(), "encoded package");
    Ok(out.into_bytes())
}

impl Encoder<'_> {
    // ── references ──────────────────────────────────────────────────────────

    pub(super) fn type_ref(&mut self, id: TypeId) -> Result<i32, Error> {
        if !self.pkg.types.contains(id) {
            return Err(InvariantError::UnknownType { id: id.0 }.into());
        }
        Ok(self.pool.shape(id))
    }

    pub(super) fn opt_type_ref(&mut self, id: Option<TypeId>) -> Result<i32, Error> {
        match id {
            Some(id) => self.type_ref(id),
            None => Ok(NO_INDEX),
        }
    }

    pub(super) fn type_refs(&mut self, w: &mut ByteWriter, ids: &[TypeId]) -> Result<(), Error> {
        w.count(ids.len());
        for id in ids {
            w.i32(self.type_ref(*id)?);
        }
        Ok(())
    }

    pub(super) fn strings(&mut self, w: &mut ByteWriter, values: &[String]) {
        w.count(values.len());
        for v in values {
            w.i32(self.pool.string(v));
        }
    }

    fn tag_of(&self, id: TypeId) -> Result<TypeTag, InvariantError> {
        self.pkg
            .types
            .get(id)
            .map(|t| t.tag)
            .ok_or(InvariantError::UnknownType { id: id.0 })
    }

    // ── shared structures ───────────────────────────────────────────────────

    pub(super) fn write_position(&mut self, w: &mut ByteWriter, pos: &Position) {
        w.i32(self.pool.string(&pos.source_file));
        w.i32(pos.start_line);
        w.i32(pos.start_col);
        w.i32(pos.end_line);
        w.i32(pos.end_col);
    }

    pub(super) fn write_markdown(&mut self, w: &mut ByteWriter, doc: Option<&Markdown>) {
        let mut body = ByteWriter::new();
        match doc {
            None => body.u8(0),
            Some(md) => {
                body.u8(1);
                body.i32(self.pool.string(&md.description));
                body.i32(self.pool.string(&md.return_description));
                body.count(md.parameters.len());
                for p in &md.parameters {
                    body.i32(self.pool.string(&p.name));
                    body.i32(self.pool.string(&p.description));
                }
                body.i32(self.pool.string(&md.deprecated_docs));
                body.count(md.deprecated_parameters.len());
                for p in &md.deprecated_parameters {
                    body.i32(self.pool.string(&p.name));
                    body.i32(self.pool.string(&p.description));
                }
            }
        }
        w.sized_i32(body);
    }

    pub(super) fn write_annotations(
        &mut self,
        w: &mut ByteWriter,
        list: &[AnnotationAttachment],
    ) -> Result<(), Error> {
        let mut body = ByteWriter::new();
        body.count(list.len());
        for a in list {
            body.i32(self.pool.package(&a.pkg));
            self.write_position(&mut body, &a.pos);
            body.i32(self.pool.string(&a.tag));
            match &a.value {
                Some(v) => {
                    body.u8(1);
                    self.write_constant_value(&mut body, v)?;
                }
                None => body.u8(0),
            }
        }
        w.sized_i64(body);
        Ok(())
    }

    /// Writes a type reference followed by a body chosen by that type's tag.
    pub(super) fn write_constant_value(&mut self, w: &mut ByteWriter, cv: &ConstantValue) -> Result<(), Error> {
        w.i32(self.type_ref(cv.ty)?);
        self.write_constant_body(w, cv.ty, &cv.value, true)
    }

    /// `composite` admits map and list bodies; instruction-level constant
    /// loads only carry scalars.
    fn write_constant_body(
        &mut self,
        w: &mut ByteWriter,
        ty: TypeId,
        value: &ConstValue,
        composite: bool,
    ) -> Result<(), Error> {
        let tag = self.tag_of(ty)?;
        let mismatch = || InvariantError::ConstantTypeMismatch {
            tag: tag.to_string(),
            value: value.kind_name(),
        };
        match (tag, value) {
            (TypeTag::Boolean, ConstValue::Boolean(b)) => w.bool(*b),
            (TypeTag::Byte, ConstValue::Byte(b)) => w.i32(self.pool.byte(*b)),
            (TypeTag::String | TypeTag::CharString, ConstValue::String(s))
            | (TypeTag::Decimal, ConstValue::Decimal(s)) => w.i32(self.pool.string(s)),
            (TypeTag::Float, ConstValue::Float(f)) => w.i32(self.pool.float(*f)),
            (t, ConstValue::Int(v)) if t.is_integer() => w.i32(self.pool.int(*v)),
            (TypeTag::Nil, ConstValue::Nil) => {}
            (TypeTag::Record, ConstValue::Map(entries)) if composite => self.write_map_constant(w, entries)?,
            (TypeTag::Intersection, _) if composite => {
                let effective = match self.pkg.types.get(ty).map(|t| &t.body) {
                    Some(TypeBody::Intersection { effective, .. }) => *effective,
                    _ => return Err(mismatch().into()),
                };
                match (self.tag_of(effective)?, value) {
                    (TypeTag::Record, ConstValue::Map(entries)) => self.write_map_constant(w, entries)?,
                    (TypeTag::Tuple, ConstValue::List(items)) => {
                        w.count(items.len());
                        for item in items {
                            self.write_constant_value(w, item)?;
                        }
                    }
                    _ => return Err(mismatch().into()),
                }
            }
            _ => return Err(mismatch().into()),
        }
        Ok(())
    }

    fn write_map_constant(&mut self, w: &mut ByteWriter, entries: &[(String, ConstantValue)]) -> Result<(), Error> {
        w.count(entries.len());
        for (key, value) in entries {
            w.i32(self.pool.string(key));
            self.write_constant_value(w, value)?;
        }
        Ok(())
    }

    // ── module items ────────────────────────────────────────────────────────

    fn write_module(&mut self, w: &mut ByteWriter) -> Result<(), Error> {
        let pkg = self.pkg;
        w.i32(self.pool.package(&pkg.id));

        w.count(pkg.imports.len());
        for imp in &pkg.imports {
            for part in [&imp.org, &imp.pkg_name, &imp.name, &imp.version] {
                w.i32(self.pool.string(part));
            }
        }

        w.count(pkg.constants.len());
        for c in &pkg.constants {
            self.write_constant(w, c)?;
        }
        w.count(pkg.type_defs.len());
        for t in &pkg.type_defs {
            self.write_type_def(w, t)?;
        }
        w.count(pkg.globals.len());
        for g in &pkg.globals {
            self.write_global(w, g)?;
        }
        w.count(pkg.type_def_bodies.len());
        for body in &pkg.type_def_bodies {
            w.count(body.attached_functions.len());
            for f in &body.attached_functions {
                self.write_function(w, f)?;
            }
            self.type_refs(w, &body.referenced_types)?;
        }
        w.count(pkg.functions.len());
        for f in &pkg.functions {
            self.write_function(w, f)?;
        }
        w.count(pkg.annotations.len());
        for a in &pkg.annotations {
            self.write_annotation_decl(w, a)?;
        }
        w.count(pkg.services.len());
        for s in &pkg.services {
            self.write_service(w, s)?;
        }
        Ok(())
    }

    fn write_constant(&mut self, w: &mut ByteWriter, c: &Constant) -> Result<(), Error> {
        w.i32(self.pool.string(&c.name));
        w.i64(c.flags);
        w.i8(c.origin as i8);
        self.write_position(w, &c.pos);
        self.write_markdown(w, c.doc.as_ref());
        w.i32(self.type_ref(c.ty)?);
        self.write_annotations(w, &c.annotations)?;
        let mut value = ByteWriter::new();
        self.write_constant_value(&mut value, &c.value)?;
        w.sized_i64(value);
        Ok(())
    }

    fn write_type_def(&mut self, w: &mut ByteWriter, t: &TypeDefinition) -> Result<(), Error> {
        self.write_position(w, &t.pos);
        w.i32(self.pool.string(&t.name));
        w.i32(self.pool.string(&t.original_name));
        w.i64(t.flags);
        w.i8(t.origin as i8);
        self.write_markdown(w, t.doc.as_ref());
        w.i32(self.type_ref(t.ty)?);
        w.bool(t.has_reference_type);
        self.write_annotations(w, &t.annotations)
    }

    fn write_global(&mut self, w: &mut ByteWriter, g: &GlobalVar) -> Result<(), Error> {
        self.write_position(w, &g.pos);
        w.i8(g.kind as i8);
        w.i32(self.pool.string(&g.name));
        w.i64(g.flags);
        w.i8(g.origin as i8);
        self.write_markdown(w, g.doc.as_ref());
        w.i32(self.type_ref(g.ty)?);
        self.write_annotations(w, &g.annotations)
    }

    fn write_annotation_decl(&mut self, w: &mut ByteWriter, a: &Annotation) -> Result<(), Error> {
        w.i32(self.pool.package(&a.pkg));
        w.i32(self.pool.string(&a.name));
        w.i32(self.pool.string(&a.original_name));
        w.i64(a.flags);
        w.i8(a.origin as i8);
        self.write_position(w, &a.pos);
        w.count(a.attach_points.len());
        for p in &a.attach_points {
            w.i32(self.pool.string(&p.name));
            w.bool(p.is_source);
        }
        w.i32(self.type_ref(a.annot_type)?);
        self.write_markdown(w, a.doc.as_ref());
        self.write_annotations(w, &a.annotations)
    }

    fn write_service(&mut self, w: &mut ByteWriter, s: &ServiceDecl) -> Result<(), Error> {
        w.i32(self.pool.string(&s.name));
        w.i32(self.pool.string(&s.assoc_class_name));
        w.i64(s.flags);
        w.i8(s.origin as i8);
        self.write_position(w, &s.pos);
        match s.ty {
            Some(ty) => {
                w.u8(1);
                w.i32(self.type_ref(ty)?);
            }
            None => w.u8(0),
        }
        match &s.attach_point {
            Some(path) => {
                w.u8(1);
                self.strings(w, path);
            }
            None => w.u8(0),
        }
        match &s.attach_point_literal {
            Some(lit) => {
                w.u8(1);
                w.i32(self.pool.string(lit));
            }
            None => w.u8(0),
        }
        self.type_refs(w, &s.listener_types)
    }

    // ── functions ───────────────────────────────────────────────────────────

    fn write_function(&mut self, w: &mut ByteWriter, f: &Function) -> Result<(), Error> {
        self.write_position(w, &f.pos);
        w.i32(self.pool.string(&f.name));
        w.i32(self.pool.string(&f.original_name));
        w.i32(self.pool.string(&f.worker_name));
        w.i64(f.flags);
        w.i8(f.origin as i8);
        w.i32(self.type_ref(f.ty)?);

        match &f.resource {
            Some(res) => {
                w.u8(1);
                w.count(res.path_params.len());
                for p in &res.path_params {
                    self.write_path_param(w, p)?;
                }
                match &res.rest_path_param {
                    Some(p) => {
                        w.u8(1);
                        self.write_path_param(w, p)?;
                    }
                    None => w.u8(0),
                }
                w.count(res.segments.len());
                for seg in &res.segments {
                    w.i32(self.pool.string(&seg.name));
                    self.write_position(w, &seg.pos);
                    w.i32(self.type_ref(seg.ty)?);
                }
                w.i32(self.pool.string(&res.accessor));
            }
            None => w.u8(0),
        }

        self.write_annotations(w, &f.annotations)?;
        self.write_annotations(w, &f.return_annotations)?;

        w.count(f.required_params.len());
        for p in &f.required_params {
            w.i32(self.pool.string(&p.name));
            w.i64(p.flags);
            self.write_annotations(w, &p.annotations)?;
        }
        match &f.rest_param {
            Some(rest) => {
                w.u8(1);
                w.i32(self.pool.string(&rest.name));
                self.write_annotations(w, &rest.annotations)?;
            }
            None => w.u8(0),
        }
        match &f.receiver {
            Some(recv) => {
                w.u8(1);
                w.i8(recv.kind as i8);
                w.i32(self.type_ref(recv.ty)?);
                w.i32(self.pool.string(&recv.name));
            }
            None => w.u8(0),
        }
        self.write_markdown(w, f.doc.as_ref());
        self.strings(w, &f.dependent_globals);

        let mut scopes = ByteWriter::new();
        scopes.count(f.scopes.len());
        for s in &f.scopes {
            scopes.i32(s.id);
            scopes.i32(s.ins_offset);
            match s.parent {
                Some(parent) => {
                    scopes.u8(1);
                    scopes.i32(parent);
                }
                None => scopes.u8(0),
            }
        }
        w.sized_i64(scopes);

        let mut body = ByteWriter::new();
        self.write_body(&mut body, f)?;
        w.sized_i64(body);

        trace!(function = %f.name, blocks = f.blocks().len(), "encoded function");
        Ok(())
    }

    fn write_path_param(&mut self, w: &mut ByteWriter, p: &PathParam) -> Result<(), Error> {
        w.i32(self.pool.string(&p.name));
        w.i32(self.type_ref(p.ty)?);
        Ok(())
    }

    fn write_body(&mut self, w: &mut ByteWriter, f: &Function) -> Result<(), Error> {
        w.i32(f.args_count);

        match f.return_var.and_then(|id| f.var(id)) {
            Some(var) => {
                w.u8(1);
                w.i8(var.kind as i8);
                w.i32(self.opt_type_ref(var.ty)?);
                w.i32(self.pool.string(&var.name));
            }
            None => w.u8(0),
        }

        w.count(f.params.len());
        for p in &f.params {
            w.i8(p.kind as i8);
            w.i32(self.opt_type_ref(p.ty)?);
            w.i32(self.pool.string(&p.name));
            if p.kind == VarKind::Arg {
                let meta = p.meta_var_name.as_deref().unwrap_or(&p.name);
                w.i32(self.pool.string(meta));
            }
            w.bool(p.has_default);
        }

        w.count(f.local_vars().len());
        for var in f.local_vars() {
            w.i8(var.kind as i8);
            w.i32(self.opt_type_ref(var.ty)?);
            w.i32(self.pool.string(&var.name));
            let meta = var.meta_var_name.as_deref().unwrap_or(&var.name);
            match var.kind {
                VarKind::Arg => w.i32(self.pool.string(meta)),
                VarKind::Local => {
                    let range = var.range.ok_or_else(|| InvariantError::Malformed {
                        what: "local variable",
                        detail: format!("'{}' in function '{}' has no enclosing block range", var.name, f.name),
                    })?;
                    w.i32(self.pool.string(meta));
                    self.write_block_ref(w, f, range.end)?;
                    self.write_block_ref(w, f, range.start)?;
                    w.i32(range.ins_offset);
                }
                _ => {}
            }
        }

        w.count(f.blocks().len());
        for block in f.blocks() {
            w.i32(self.pool.string(&block.name));
            w.count(block.len());
            for instr in &block.instructions {
                self.write_non_terminator(w, f, instr)?;
            }
            let term = block.terminator.as_ref().ok_or_else(|| InvariantError::MissingTerminator {
                func: f.name.clone(),
                block: block.name.clone(),
            })?;
            self.write_terminator(w, f, term)?;
        }

        w.count(f.error_table.len());
        for entry in &f.error_table {
            self.write_block_ref(w, f, entry.trap)?;
            self.write_block_ref(w, f, entry.end)?;
            self.write_operand(w, f, &entry.error_op)?;
            self.write_block_ref(w, f, entry.target)?;
        }

        self.write_channels(w, &f.worker_channels);
        Ok(())
    }

    fn write_channels(&mut self, w: &mut ByteWriter, channels: &[ChannelDetail]) {
        w.count(channels.len());
        for c in channels {
            w.i32(self.pool.string(&c.name));
            w.bool(c.same_strand);
            w.bool(c.is_send);
        }
    }

    fn write_block_ref(&mut self, w: &mut ByteWriter, f: &Function, id: BlockId) -> Result<(), Error> {
        let block = f.block(id).ok_or_else(|| InvariantError::UnknownBlock {
            func: f.name.clone(),
            block: id.to_string(),
        })?;
        w.i32(self.pool.string(&block.name));
        Ok(())
    }

    // ── operands ────────────────────────────────────────────────────────────

    fn write_operand(&mut self, w: &mut ByteWriter, f: &Function, op: &Operand) -> Result<(), Error> {
        match op {
            Operand::Ignored { ty } => {
                w.u8(1);
                w.i32(self.opt_type_ref(*ty)?);
            }
            Operand::Var(id) => {
                let var = f.var(*id).ok_or_else(|| InvariantError::UnknownVariable {
                    func: f.name.clone(),
                    name: id.to_string(),
                })?;
                w.u8(0);
                w.i8(var.kind as i8);
                w.i8(var.scope as i8);
                w.i32(self.pool.string(&var.name));
                if var.kind.is_module_level() {
                    w.i32(self.pool.package(&self.pkg.id));
                    w.i32(self.opt_type_ref(var.ty)?);
                }
            }
            Operand::Global(g) => {
                w.u8(0);
                w.i8(g.kind as i8);
                w.i8(g.scope as i8);
                w.i32(self.pool.string(&g.name));
                if g.kind.is_module_level() {
                    w.i32(self.pool.package(&g.pkg));
                    w.i32(self.opt_type_ref(g.ty)?);
                }
            }
        }
        Ok(())
    }

    fn write_operands(&mut self, w: &mut ByteWriter, f: &Function, ops: &[Operand]) -> Result<(), Error> {
        w.count(ops.len());
        for op in ops {
            self.write_operand(w, f, op)?;
        }
        Ok(())
    }

    fn write_opt_operand(&mut self, w: &mut ByteWriter, f: &Function, op: Option<&Operand>) -> Result<(), Error> {
        match op {
            Some(op) => {
                w.i8(1);
                self.write_operand(w, f, op)
            }
            None => {
                w.i8(0);
                Ok(())
            }
        }
    }

    // ── instructions ────────────────────────────────────────────────────────

    fn write_call_info(&mut self, w: &mut ByteWriter, f: &Function, call: &CallInfo) -> Result<(), Error> {
        w.bool(call.is_virtual);
        w.i32(self.pool.package(&call.pkg));
        w.i32(self.pool.string(&call.name));
        self.write_operands(w, f, &call.args)?;
        self.write_opt_operand(w, f, call.lhs.as_ref())
    }

    fn write_terminator(&mut self, w: &mut ByteWriter, f: &Function, t: &Terminator) -> Result<(), Error> {
        self.write_position(w, &t.pos);
        w.i8(t.op.kind().to_wire());
        match &t.op {
            TerminatorOp::Goto { target } | TerminatorOp::Lock { target } | TerminatorOp::Unlock { target } => {
                self.write_block_ref(w, f, *target)?;
            }
            TerminatorOp::Call { call, then } => {
                self.write_call_info(w, f, call)?;
                self.write_block_ref(w, f, *then)?;
            }
            TerminatorOp::Branch { cond, on_true, on_false } => {
                self.write_operand(w, f, cond)?;
                self.write_block_ref(w, f, *on_true)?;
                self.write_block_ref(w, f, *on_false)?;
            }
            TerminatorOp::Return => {}
            TerminatorOp::AsyncCall { call, annotations, then } => {
                self.write_call_info(w, f, call)?;
                self.write_annotations(w, annotations)?;
                self.write_block_ref(w, f, *then)?;
            }
            TerminatorOp::Wait { exprs, lhs, then } => {
                self.write_operands(w, f, exprs)?;
                self.write_operand(w, f, lhs)?;
                self.write_block_ref(w, f, *then)?;
            }
            TerminatorOp::FpCall { fp, args, lhs, is_async, annotations, then } => {
                self.write_operand(w, f, fp)?;
                self.write_operands(w, f, args)?;
                self.write_opt_operand(w, f, lhs.as_ref())?;
                w.bool(*is_async);
                self.write_annotations(w, annotations)?;
                self.write_block_ref(w, f, *then)?;
            }
            TerminatorOp::WorkerReceive { channel, lhs, same_strand, then } => {
                w.i32(self.pool.string(channel));
                self.write_operand(w, f, lhs)?;
                w.bool(*same_strand);
                self.write_block_ref(w, f, *then)?;
            }
            TerminatorOp::WorkerSend { channel, data, same_strand, lhs, then } => {
                w.i32(self.pool.string(channel));
                self.write_operand(w, f, data)?;
                w.bool(*same_strand);
                w.bool(lhs.is_some());
                if let Some(lhs) = lhs {
                    self.write_operand(w, f, lhs)?;
                }
                self.write_block_ref(w, f, *then)?;
            }
            TerminatorOp::Flush { channels, lhs, then } => {
                self.write_channels(w, channels);
                self.write_operand(w, f, lhs)?;
                self.write_block_ref(w, f, *then)?;
            }
            TerminatorOp::FieldLock { local_var, field, target } => {
                w.i32(self.pool.string(local_var));
                w.i32(self.pool.string(field));
                self.write_block_ref(w, f, *target)?;
            }
            TerminatorOp::WaitAll { lhs, keys, values, then } => {
                self.write_operand(w, f, lhs)?;
                self.strings(w, keys);
                self.write_operands(w, f, values)?;
                self.write_block_ref(w, f, *then)?;
            }
            TerminatorOp::Panic { error } => self.write_operand(w, f, error)?,
            TerminatorOp::WorkerAltReceive { channels, lhs, same_strand, then } => {
                self.strings(w, channels);
                self.write_operand(w, f, lhs)?;
                w.bool(*same_strand);
                self.write_block_ref(w, f, *then)?;
            }
            TerminatorOp::WorkerMultipleReceive { fields, ty, lhs, same_strand, then } => {
                w.count(fields.len());
                for field in fields {
                    w.i32(self.pool.string(&field.field_name));
                    w.i32(self.pool.string(&field.channel_name));
                }
                w.i32(self.type_ref(*ty)?);
                self.write_operand(w, f, lhs)?;
                w.bool(*same_strand);
                self.write_block_ref(w, f, *then)?;
            }
        }
        Ok(())
    }

    fn write_non_terminator(&mut self, w: &mut ByteWriter, f: &Function, instr: &NonTerminator) -> Result<(), Error> {
        self.write_position(w, &instr.pos);
        w.i8(instr.op.kind().to_wire());
        match &instr.op {
            NonTerminatorOp::Move { lhs, rhs } => {
                self.write_operand(w, f, rhs)?;
                self.write_operand(w, f, lhs)?;
            }
            NonTerminatorOp::ConstLoad { ty, lhs, value } => {
                w.i32(self.type_ref(*ty)?);
                self.write_operand(w, f, lhs)?;
                self.write_constant_body(w, *ty, value, false)?;
            }
            NonTerminatorOp::NewStructure { lhs, typedesc, entries } => {
                self.write_operand(w, f, typedesc)?;
                self.write_operand(w, f, lhs)?;
                w.count(entries.len());
                for entry in entries {
                    match entry {
                        MappingEntry::Spread(op) => {
                            w.u8(0);
                            self.write_operand(w, f, op)?;
                        }
                        MappingEntry::KeyValue { key, value } => {
                            w.u8(1);
                            self.write_operand(w, f, key)?;
                            self.write_operand(w, f, value)?;
                        }
                    }
                }
            }
            NonTerminatorOp::FieldAccess { kind, lhs, key, rhs, is_optional, is_filling_read } => {
                if kind.has_load_flags() {
                    w.bool(*is_optional);
                    w.bool(*is_filling_read);
                }
                self.write_operand(w, f, lhs)?;
                self.write_operand(w, f, key)?;
                self.write_operand(w, f, rhs)?;
            }
            NonTerminatorOp::NewArray { ty, lhs, typedesc, element_typedesc, size, values } => {
                w.i32(self.type_ref(*ty)?);
                self.write_operand(w, f, lhs)?;
                self.write_opt_operand(w, f, typedesc.as_ref())?;
                self.write_opt_operand(w, f, element_typedesc.as_ref())?;
                self.write_operand(w, f, size)?;
                self.write_operands(w, f, values)?;
            }
            NonTerminatorOp::NewError { ty, lhs, message, cause, detail } => {
                w.i32(self.type_ref(*ty)?);
                self.write_operand(w, f, lhs)?;
                self.write_operand(w, f, message)?;
                self.write_operand(w, f, cause)?;
                self.write_operand(w, f, detail)?;
            }
            NonTerminatorOp::TypeCast { lhs, rhs, ty, check_types } => {
                self.write_operand(w, f, lhs)?;
                self.write_operand(w, f, rhs)?;
                w.i32(self.type_ref(*ty)?);
                w.bool(*check_types);
            }
            NonTerminatorOp::IsLike { ty, lhs, rhs } | NonTerminatorOp::TypeTest { ty, lhs, rhs } => {
                w.i32(self.type_ref(*ty)?);
                self.write_operand(w, f, lhs)?;
                self.write_operand(w, f, rhs)?;
            }
            NonTerminatorOp::NewInstance { def, lhs } => {
                match def {
                    InstanceDef::Local(index) => {
                        w.u8(0);
                        w.i32(*index);
                    }
                    InstanceDef::External { pkg, object_name } => {
                        w.u8(1);
                        w.i32(self.pool.package(pkg));
                        w.i32(self.pool.string(object_name));
                    }
                }
                self.write_operand(w, f, lhs)?;
            }
            NonTerminatorOp::FpLoad { lhs, pkg, name, ret_ty, closure_args, params } => {
                self.write_operand(w, f, lhs)?;
                w.i32(self.pool.package(pkg));
                w.i32(self.pool.string(name));
                w.i32(self.type_ref(*ret_ty)?);
                self.write_operands(w, f, closure_args)?;
                w.count(params.len());
                for p in params {
                    w.i8(p.kind as i8);
                    w.i32(self.type_ref(p.ty)?);
                    w.i32(self.pool.string(&p.name));
                }
            }
            NonTerminatorOp::NewTable { ty, lhs, key_columns, data } => {
                w.i32(self.type_ref(*ty)?);
                self.write_operand(w, f, lhs)?;
                self.write_operand(w, f, key_columns)?;
                self.write_operand(w, f, data)?;
            }
            NonTerminatorOp::NewTypedesc { lhs, ty } => {
                self.write_operand(w, f, lhs)?;
                w.i32(self.type_ref(*ty)?);
            }
            NonTerminatorOp::BinaryOp { lhs, rhs1, rhs2, .. } => {
                self.write_operand(w, f, rhs1)?;
                self.write_operand(w, f, rhs2)?;
                self.write_operand(w, f, lhs)?;
            }
            NonTerminatorOp::UnaryOp { lhs, rhs, .. } => {
                self.write_operand(w, f, rhs)?;
                self.write_operand(w, f, lhs)?;
            }
            NonTerminatorOp::Xml { kind, lhs, operands } => {
                self.check_arity(f, instr, kind.arity(), operands.len())?;
                self.write_operand(w, f, lhs)?;
                for op in operands {
                    self.write_operand(w, f, op)?;
                }
            }
            NonTerminatorOp::Regex { kind, lhs, operands } => {
                self.check_arity(f, instr, kind.arity(), operands.len())?;
                self.write_operand(w, f, lhs)?;
                for op in operands {
                    self.write_operand(w, f, op)?;
                }
            }
            NonTerminatorOp::RecordDefaultFpLoad { lhs, enclosed_type_index, field_name } => {
                self.write_operand(w, f, lhs)?;
                w.i32(*enclosed_type_index);
                w.i32(*field_name);
            }
        }
        Ok(())
    }

    fn check_arity(&self, f: &Function, instr: &NonTerminator, expected: usize, found: usize) -> Result<(), InvariantError> {
        if expected == found {
            return Ok(());
        }
        Err(InvariantError::Malformed {
            what: "instruction",
            detail: format!(
                "{} in function '{}' has {} operands after lhs, expected {}",
                instr.op.kind().name(),
                f.name,
                found,
                expected
            ),
        })
    }
}
