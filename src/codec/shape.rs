//! Type descriptors stored in shape pool entries.
//!
//! ```text
//! TypeInfo := tag(i8) name(cp or -1) flags(i64) body
//! ```
//!
//! The body layout is chosen by the tag; tags not listed in
//! [`has_body`] have an empty body.

use crate::codec::io::{ByteReader, ByteWriter};
use crate::codec::reader::Decoder;
use crate::codec::writer::Encoder;
use crate::error::{Error, FormatError, InvariantError};
use crate::ir::types::{
    AttachedFunctionType, BType, ClosureSymbol, DefaultValue, EnumInfo, ErrorType, FunctionParameter,
    InvokableSymbol, InvokableType, ObjectField, ObjectType, RecordField, RecordType, TupleMember,
    TypeBody, TypeIdSet, TypeIds, TypeTag, UnionType,
};

/// Tags whose shapes carry a tag-specific body.
pub(crate) fn has_body(tag: TypeTag) -> bool {
    matches!(
        tag,
        TypeTag::Array
            | TypeTag::Error
            | TypeTag::Finite
            | TypeTag::Future
            | TypeTag::Intersection
            | TypeTag::Invokable
            | TypeTag::Map
            | TypeTag::ObjectOrService
            | TypeTag::ParameterizedType
            | TypeTag::Record
            | TypeTag::Stream
            | TypeTag::Table
            | TypeTag::Tuple
            | TypeTag::Typedesc
            | TypeTag::Typerefdesc
            | TypeTag::Union
            | TypeTag::Xml
    )
}

fn body_matches(tag: TypeTag, body: &TypeBody) -> bool {
    match body {
        TypeBody::Plain => !has_body(tag),
        TypeBody::Array { .. } => tag == TypeTag::Array,
        TypeBody::Error(_) => tag == TypeTag::Error,
        TypeBody::Finite { .. } => tag == TypeTag::Finite,
        TypeBody::Future { .. } => tag == TypeTag::Future,
        TypeBody::Map { .. } => tag == TypeTag::Map,
        TypeBody::Typedesc { .. } => tag == TypeTag::Typedesc,
        TypeBody::Xml { .. } => tag == TypeTag::Xml,
        TypeBody::Intersection { .. } => tag == TypeTag::Intersection,
        TypeBody::Invokable(_) => tag == TypeTag::Invokable,
        TypeBody::Object(_) => tag == TypeTag::ObjectOrService,
        TypeBody::Parameterized { .. } => tag == TypeTag::ParameterizedType,
        TypeBody::Record(_) => tag == TypeTag::Record,
        TypeBody::Stream { .. } => tag == TypeTag::Stream,
        TypeBody::Table { .. } => tag == TypeTag::Table,
        TypeBody::Tuple { .. } => tag == TypeTag::Tuple,
        TypeBody::Typerefdesc { .. } => tag == TypeTag::Typerefdesc,
        TypeBody::Union(_) => tag == TypeTag::Union,
    }
}

// ── encoding ────────────────────────────────────────────────────────────────

impl Encoder<'_> {
    pub(super) fn write_shape(&mut self, w: &mut ByteWriter, ty: &BType) -> Result<(), Error> {
        if !body_matches(ty.tag, &ty.body) {
            return Err(InvariantError::Malformed {
                what: "type",
                detail: format!("tag '{}' does not match the shape of its body", ty.tag),
            }
            .into());
        }
        w.i8(ty.tag as i8);
        w.i32(self.pool.opt_string(ty.name.as_deref()));
        w.i64(ty.flags);

        match &ty.body {
            TypeBody::Plain => {}
            TypeBody::Array { state, size, element } => {
                w.i8(*state);
                w.i32(*size);
                w.i32(self.type_ref(*element)?);
            }
            TypeBody::Error(e) => {
                w.i32(self.pool.package(&e.pkg));
                w.i32(self.pool.string(&e.name));
                w.i32(self.type_ref(e.detail)?);
                self.write_type_ids(w, &e.type_ids);
            }
            TypeBody::Finite { name, flags, values } => {
                w.i32(self.pool.string(name));
                w.i64(*flags);
                w.count(values.len());
                for v in values {
                    self.write_sem_named(w, v)?;
                }
            }
            TypeBody::Future { constraint }
            | TypeBody::Map { constraint }
            | TypeBody::Typedesc { constraint }
            | TypeBody::Xml { constraint } => w.i32(self.type_ref(*constraint)?),
            TypeBody::Intersection { constituents, effective } => {
                self.type_refs(w, constituents)?;
                w.i32(self.type_ref(*effective)?);
            }
            TypeBody::Invokable(None) => w.u8(1),
            TypeBody::Invokable(Some(inv)) => {
                w.u8(0);
                self.write_invokable(w, inv)?;
            }
            TypeBody::Object(o) => self.write_object(w, o)?,
            TypeBody::Parameterized { value_type, index } => {
                w.i32(self.type_ref(*value_type)?);
                w.i32(*index);
            }
            TypeBody::Record(rec) => self.write_record(w, rec)?,
            TypeBody::Stream { constraint, completion } => {
                w.i32(self.type_ref(*constraint)?);
                w.i32(self.type_ref(*completion)?);
            }
            TypeBody::Table { constraint, field_names, key_constraint } => {
                w.i32(self.type_ref(*constraint)?);
                match field_names {
                    Some(names) => {
                        w.u8(1);
                        self.strings(w, names);
                    }
                    None => w.u8(0),
                }
                match key_constraint {
                    Some(k) => {
                        w.u8(1);
                        w.i32(self.type_ref(*k)?);
                    }
                    None => w.u8(0),
                }
            }
            TypeBody::Tuple { members, rest } => {
                w.count(members.len());
                for m in members {
                    w.i32(self.pool.string(&m.name));
                    w.i64(m.flags);
                    w.i32(self.type_ref(m.ty)?);
                    self.write_annotations(w, &m.annotations)?;
                }
                match rest {
                    Some(r) => {
                        w.u8(1);
                        w.i32(self.type_ref(*r)?);
                    }
                    None => w.u8(0),
                }
            }
            TypeBody::Typerefdesc { pkg, name, constraint } => {
                w.i32(self.pool.package(pkg));
                w.i32(self.pool.string(name));
                w.i32(self.type_ref(*constraint)?);
            }
            TypeBody::Union(u) => self.write_union(w, u)?,
        }
        Ok(())
    }

    fn write_type_ids(&mut self, w: &mut ByteWriter, ids: &TypeIds) {
        for set in [&ids.primary, &ids.secondary] {
            w.count(set.len());
            for id in set {
                w.i32(self.pool.package(&id.pkg));
                w.i32(self.pool.string(&id.name));
                w.bool(id.is_public);
            }
        }
    }

    fn write_invokable(&mut self, w: &mut ByteWriter, inv: &InvokableType) -> Result<(), Error> {
        self.type_refs(w, &inv.params)?;
        match inv.rest {
            Some(rest) => {
                w.u8(1);
                w.i32(self.type_ref(rest)?);
            }
            None => w.u8(0),
        }
        w.i32(self.type_ref(inv.ret)?);
        match &inv.symbol {
            Some(sym) => {
                w.u8(1);
                w.count(sym.params.len());
                for p in &sym.params {
                    self.write_function_param(w, p)?;
                }
                match &sym.rest {
                    Some(p) => {
                        w.u8(1);
                        self.write_function_param(w, p)?;
                    }
                    None => w.u8(0),
                }
                self.write_defaults(w, &sym.defaults)?;
            }
            None => w.u8(0),
        }
        Ok(())
    }

    fn write_function_param(&mut self, w: &mut ByteWriter, p: &FunctionParameter) -> Result<(), Error> {
        w.i32(self.pool.string(&p.name));
        w.i64(p.flags);
        self.write_markdown(w, p.doc.as_ref());
        w.i32(self.type_ref(p.ty)?);
        Ok(())
    }

    fn write_defaults(&mut self, w: &mut ByteWriter, defaults: &[DefaultValue]) -> Result<(), Error> {
        w.count(defaults.len());
        for d in defaults {
            w.i32(self.pool.string(&d.param_name));
            let c = &d.closure;
            w.i32(self.pool.string(&c.name));
            w.i64(c.flags);
            w.i32(self.type_ref(c.ty)?);
            w.i32(self.pool.package(&c.pkg));
            w.count(c.params.len());
            for p in &c.params {
                self.write_function_param(w, p)?;
            }
        }
        Ok(())
    }

    fn write_attached(&mut self, w: &mut ByteWriter, a: &AttachedFunctionType) -> Result<(), Error> {
        w.i32(self.pool.string(&a.name));
        w.i32(self.pool.string(&a.original_name));
        w.i64(a.flags);
        w.i32(self.type_ref(a.ty)?);
        Ok(())
    }

    fn write_opt_attached(&mut self, w: &mut ByteWriter, a: Option<&AttachedFunctionType>) -> Result<(), Error> {
        match a {
            Some(a) => {
                w.i8(1);
                self.write_attached(w, a)
            }
            None => {
                w.i8(0);
                Ok(())
            }
        }
    }

    fn write_object(&mut self, w: &mut ByteWriter, o: &ObjectType) -> Result<(), Error> {
        w.i32(self.pool.package(&o.pkg));
        w.i32(self.pool.string(&o.name));
        w.i64(o.flags);
        w.count(o.fields.len());
        for field in &o.fields {
            w.i32(self.pool.string(&field.name));
            w.i64(field.flags);
            w.bool(field.is_defaultable);
            self.write_markdown(w, field.doc.as_ref());
            w.i32(self.type_ref(field.ty)?);
        }
        self.write_opt_attached(w, o.generated_init.as_ref())?;
        self.write_opt_attached(w, o.init.as_ref())?;
        w.count(o.methods.len());
        for m in &o.methods {
            self.write_attached(w, m)?;
        }
        self.type_refs(w, &o.inclusions)?;
        self.write_type_ids(w, &o.type_ids);
        Ok(())
    }

    fn write_record(&mut self, w: &mut ByteWriter, rec: &RecordType) -> Result<(), Error> {
        w.i32(self.pool.package(&rec.pkg));
        w.i32(self.pool.string(&rec.name));
        w.bool(rec.is_sealed);
        w.i32(self.type_ref(rec.rest_field)?);
        w.count(rec.fields.len());
        for field in &rec.fields {
            w.i32(self.pool.string(&field.name));
            w.i64(field.flags);
            self.write_markdown(w, field.doc.as_ref());
            w.i32(self.type_ref(field.ty)?);
            self.write_annotations(w, &field.annotations)?;
        }
        self.type_refs(w, &rec.inclusions)?;
        self.write_defaults(w, &rec.defaults)
    }

    fn write_union(&mut self, w: &mut ByteWriter, u: &UnionType) -> Result<(), Error> {
        w.bool(u.is_cyclic);
        match &u.name {
            Some((pkg, name)) => {
                w.bool(true);
                w.i32(self.pool.package(pkg));
                w.i32(self.pool.string(name));
            }
            None => w.bool(false),
        }
        self.type_refs(w, &u.members)?;
        self.type_refs(w, &u.original_members)?;
        match &u.enum_info {
            Some(e) => {
                w.u8(1);
                w.i32(self.pool.package(&e.pkg));
                w.i32(self.pool.string(&e.name));
                self.strings(w, &e.members);
            }
            None => w.u8(0),
        }
        Ok(())
    }
}

// ── decoding ────────────────────────────────────────────────────────────────

impl Decoder<'_> {
    pub(super) fn read_shape(&mut self, r: &mut ByteReader<'_>) -> Result<BType, Error> {
        let offset = r.offset();
        let raw = r.i8("type tag")?;
        let tag = TypeTag::from_i8(raw).ok_or(FormatError::UnknownTag {
            offset,
            what: "type tag",
            tag: raw as i64,
        })?;
        let name = self.pool.read_opt_string(r, "type name")?;
        let flags = r.i64("type flags")?;

        let body = match tag {
            TypeTag::Array => TypeBody::Array {
                state: r.i8("array state")?,
                size: r.i32("array size")?,
                element: self.read_type(r, "array element type")?,
            },
            TypeTag::Error => TypeBody::Error(ErrorType {
                pkg: self.pool.read_package(r, "error package")?,
                name: self.pool.read_string(r, "error name")?,
                detail: self.read_type(r, "error detail type")?,
                type_ids: self.read_type_ids(r)?,
            }),
            TypeTag::Finite => {
                let name = self.pool.read_string(r, "finite name")?;
                let flags = r.i64("finite flags")?;
                let n = r.count("finite value count")?;
                let values = (0..n).map(|_| self.read_sem_named(r)).collect::<Result<Vec<_>, _>>()?;
                TypeBody::Finite { name, flags, values }
            }
            TypeTag::Future => TypeBody::Future { constraint: self.read_type(r, "future constraint")? },
            TypeTag::Map => TypeBody::Map { constraint: self.read_type(r, "map constraint")? },
            TypeTag::Typedesc => TypeBody::Typedesc { constraint: self.read_type(r, "typedesc constraint")? },
            TypeTag::Xml => TypeBody::Xml { constraint: self.read_type(r, "xml constraint")? },
            TypeTag::Intersection => TypeBody::Intersection {
                constituents: self.read_types(r, "intersection constituents")?,
                effective: self.read_type(r, "intersection effective type")?,
            },
            TypeTag::Invokable => {
                if r.bool("any-function flag")? {
                    TypeBody::Invokable(None)
                } else {
                    TypeBody::Invokable(Some(self.read_invokable(r)?))
                }
            }
            TypeTag::ObjectOrService => TypeBody::Object(self.read_object(r)?),
            TypeTag::ParameterizedType => TypeBody::Parameterized {
                value_type: self.read_type(r, "parameterized value type")?,
                index: r.i32("parameter index")?,
            },
            TypeTag::Record => TypeBody::Record(self.read_record(r)?),
            TypeTag::Stream => TypeBody::Stream {
                constraint: self.read_type(r, "stream constraint")?,
                completion: self.read_type(r, "stream completion")?,
            },
            TypeTag::Table => {
                let constraint = self.read_type(r, "table constraint")?;
                let field_names = if r.bool("table field name flag")? {
                    Some(self.read_strings(r, "table field names")?)
                } else {
                    None
                };
                let key_constraint = if r.bool("table key constraint flag")? {
                    Some(self.read_type(r, "table key constraint")?)
                } else {
                    None
                };
                TypeBody::Table { constraint, field_names, key_constraint }
            }
            TypeTag::Tuple => {
                let n = r.count("tuple member count")?;
                let mut members = Vec::with_capacity(n.min(r.remaining()));
                for _ in 0..n {
                    members.push(TupleMember {
                        name: self.pool.read_string(r, "tuple member name")?,
                        flags: r.i64("tuple member flags")?,
                        ty: self.read_type(r, "tuple member type")?,
                        annotations: self.read_annotations(r)?,
                    });
                }
                let rest = if r.bool("tuple rest flag")? {
                    Some(self.read_type(r, "tuple rest type")?)
                } else {
                    None
                };
                TypeBody::Tuple { members, rest }
            }
            TypeTag::Typerefdesc => TypeBody::Typerefdesc {
                pkg: self.pool.read_package(r, "typeref package")?,
                name: self.pool.read_string(r, "typeref name")?,
                constraint: self.read_type(r, "typeref constraint")?,
            },
            TypeTag::Union => TypeBody::Union(self.read_union(r)?),
            _ => TypeBody::Plain,
        };
        Ok(BType { tag, name, flags, body })
    }

    fn read_type_ids(&mut self, r: &mut ByteReader<'_>) -> Result<TypeIds, Error> {
        let mut sets = [Vec::new(), Vec::new()];
        for set in &mut sets {
            let n = r.count("type id count")?;
            for _ in 0..n {
                set.push(TypeIdSet {
                    pkg: self.pool.read_package(r, "type id package")?,
                    name: self.pool.read_string(r, "type id name")?,
                    is_public: r.bool("type id public flag")?,
                });
            }
        }
        let [primary, secondary] = sets;
        Ok(TypeIds { primary, secondary })
    }

    fn read_invokable(&mut self, r: &mut ByteReader<'_>) -> Result<InvokableType, Error> {
        let params = self.read_types(r, "invokable params")?;
        let rest = if r.bool("invokable rest flag")? {
            Some(self.read_type(r, "invokable rest type")?)
        } else {
            None
        };
        let ret = self.read_type(r, "invokable return type")?;
        let symbol = if r.bool("invokable symbol flag")? {
            let n = r.count("symbol param count")?;
            let params = (0..n)
                .map(|_| self.read_function_param(r))
                .collect::<Result<Vec<_>, _>>()?;
            let rest = if r.bool("symbol rest flag")? {
                Some(self.read_function_param(r)?)
            } else {
                None
            };
            let defaults = self.read_defaults(r)?;
            Some(InvokableSymbol { params, rest, defaults })
        } else {
            None
        };
        Ok(InvokableType { params, rest, ret, symbol })
    }

    fn read_function_param(&mut self, r: &mut ByteReader<'_>) -> Result<FunctionParameter, Error> {
        Ok(FunctionParameter {
            name: self.pool.read_string(r, "parameter name")?,
            flags: r.i64("parameter flags")?,
            doc: self.read_markdown(r)?,
            ty: self.read_type(r, "parameter type")?,
        })
    }

    fn read_defaults(&mut self, r: &mut ByteReader<'_>) -> Result<Vec<DefaultValue>, Error> {
        let n = r.count("default value count")?;
        let mut out = Vec::with_capacity(n.min(r.remaining()));
        for _ in 0..n {
            let param_name = self.pool.read_string(r, "default param name")?;
            let name = self.pool.read_string(r, "closure name")?;
            let flags = r.i64("closure flags")?;
            let ty = self.read_type(r, "closure type")?;
            let pkg = self.pool.read_package(r, "closure package")?;
            let count = r.count("closure param count")?;
            let params = (0..count)
                .map(|_| self.read_function_param(r))
                .collect::<Result<Vec<_>, _>>()?;
            out.push(DefaultValue {
                param_name,
                closure: ClosureSymbol { name, flags, ty, pkg, params },
            });
        }
        Ok(out)
    }

    fn read_attached(&mut self, r: &mut ByteReader<'_>) -> Result<AttachedFunctionType, Error> {
        Ok(AttachedFunctionType {
            name: self.pool.read_string(r, "attached function name")?,
            original_name: self.pool.read_string(r, "attached function original name")?,
            flags: r.i64("attached function flags")?,
            ty: self.read_type(r, "attached function type")?,
        })
    }

    fn read_opt_attached(&mut self, r: &mut ByteReader<'_>) -> Result<Option<AttachedFunctionType>, Error> {
        if r.i8("attached function flag")? != 0 {
            Ok(Some(self.read_attached(r)?))
        } else {
            Ok(None)
        }
    }

    fn read_object(&mut self, r: &mut ByteReader<'_>) -> Result<ObjectType, Error> {
        let pkg = self.pool.read_package(r, "object package")?;
        let name = self.pool.read_string(r, "object name")?;
        let flags = r.i64("object flags")?;
        let n = r.count("object field count")?;
        let mut fields = Vec::with_capacity(n.min(r.remaining()));
        for _ in 0..n {
            fields.push(ObjectField {
                name: self.pool.read_string(r, "object field name")?,
                flags: r.i64("object field flags")?,
                is_defaultable: r.bool("object field defaultable flag")?,
                doc: self.read_markdown(r)?,
                ty: self.read_type(r, "object field type")?,
            });
        }
        let generated_init = self.read_opt_attached(r)?;
        let init = self.read_opt_attached(r)?;
        let n = r.count("object method count")?;
        let methods = (0..n).map(|_| self.read_attached(r)).collect::<Result<Vec<_>, _>>()?;
        let inclusions = self.read_types(r, "object inclusions")?;
        let type_ids = self.read_type_ids(r)?;
        Ok(ObjectType {
            pkg,
            name,
            flags,
            fields,
            generated_init,
            init,
            methods,
            inclusions,
            type_ids,
        })
    }

    fn read_record(&mut self, r: &mut ByteReader<'_>) -> Result<RecordType, Error> {
        let pkg = self.pool.read_package(r, "record package")?;
        let name = self.pool.read_string(r, "record name")?;
        let is_sealed = r.bool("record sealed flag")?;
        let rest_field = self.read_type(r, "record rest field type")?;
        let n = r.count("record field count")?;
        let mut fields = Vec::with_capacity(n.min(r.remaining()));
        for _ in 0..n {
            fields.push(RecordField {
                name: self.pool.read_string(r, "record field name")?,
                flags: r.i64("record field flags")?,
                doc: self.read_markdown(r)?,
                ty: self.read_type(r, "record field type")?,
                annotations: self.read_annotations(r)?,
            });
        }
        let inclusions = self.read_types(r, "record inclusions")?;
        let defaults = self.read_defaults(r)?;
        Ok(RecordType {
            pkg,
            name,
            is_sealed,
            rest_field,
            fields,
            inclusions,
            defaults,
        })
    }

    fn read_union(&mut self, r: &mut ByteReader<'_>) -> Result<UnionType, Error> {
        let is_cyclic = r.bool("union cyclic flag")?;
        let name = if r.bool("union name flag")? {
            Some((
                self.pool.read_package(r, "union package")?,
                self.pool.read_string(r, "union name")?,
            ))
        } else {
            None
        };
        let members = self.read_types(r, "union members")?;
        let original_members = self.read_types(r, "union original members")?;
        let enum_info = if r.bool("union enum flag")? {
            Some(EnumInfo {
                pkg: self.pool.read_package(r, "enum package")?,
                name: self.pool.read_string(r, "enum name")?,
                members: self.read_strings(r, "enum members")?,
            })
        } else {
            None
        };
        Ok(UnionType {
            is_cyclic,
            name,
            members,
            original_members,
            enum_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_body_only_for_bodiless_tags() {
        assert!(body_matches(TypeTag::Int, &TypeBody::Plain));
        assert!(!body_matches(TypeTag::Record, &TypeBody::Plain));
        assert!(!body_matches(
            TypeTag::Map,
            &TypeBody::Typedesc { constraint: crate::ir::types::TypeId(0) }
        ));
        assert!(has_body(TypeTag::ParameterizedType));
        assert!(!has_body(TypeTag::XmlElement));
    }

    #[test]
    fn test_any_nonzero_union_name_flag_means_present() {
        use crate::codec::io::ByteReader;
        use crate::codec::pool::{ConstantPool, PoolEntry};
        use crate::codec::{decode, encode};
        use crate::ir::package::{Package, PackageId};

        let id = PackageId::new("acme", "choice", "0.1.0");
        let mut pkg = Package::new(id.clone());
        let int = pkg.types.basic(TypeTag::Int);
        let nil = pkg.types.basic(TypeTag::Nil);
        pkg.types.push(BType::new(
            TypeTag::Union,
            TypeBody::Union(UnionType {
                is_cyclic: false,
                name: Some((id, "Choice".to_string())),
                members: vec![int, nil],
                original_members: vec![int, nil],
                enum_info: None,
            }),
        ));
        let mut bytes = encode(&pkg).unwrap();

        let pool = ConstantPool::read(&mut ByteReader::new(&bytes[8..])).unwrap();
        let entries = pool.entries();
        let pkg_index = entries.iter().position(|e| matches!(e, PoolEntry::Package(_))).unwrap() as i32;
        let name_index = entries
            .iter()
            .position(|e| matches!(e, PoolEntry::String(s) if s.as_str() == "Choice"))
            .unwrap() as i32;

        // [cyclic=0][name flag=1][package cp][name cp]
        let mut pattern = vec![0u8, 1u8];
        pattern.extend_from_slice(&pkg_index.to_be_bytes());
        pattern.extend_from_slice(&name_index.to_be_bytes());
        let at = bytes
            .windows(pattern.len())
            .position(|w| w == pattern.as_slice())
            .expect("union name flag present");
        bytes[at + 1] = 7;

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, pkg);
    }
}
