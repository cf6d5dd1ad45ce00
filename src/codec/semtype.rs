//! Semantic types and BDDs.
//!
//! ```text
//! SemtypeInfo  := has(u8) [Internal]
//! Internal     := uniform(u8) (bitset(i32) | all(i32) some(i32) n(i8) ProperSubtype*n)
//! ProperSubtype:= kind(i8) body        1 Bdd | 2 Int | 3 Boolean | 4 Float
//!                                      5 Decimal | 6 String | 7 Xml
//! Bdd          := node(u8) (BddNode | allOrNothing(u8))
//! BddNode      := rec(u8) (index(i32) [kind(i32) if index > 1] | TypeAtom) Bdd Bdd Bdd
//! TypeAtom     := atomIndex(i32) kind(i8) AtomicType
//! ```
//!
//! A `TypeAtom` carries the atom's full definition. A rec atom is a bare
//! back-reference and must name an atom that is already defined or is being
//! defined by an enclosing node; this is what makes recursive types finite.

use crate::codec::io::{ByteReader, ByteWriter};
use crate::codec::reader::Decoder;
use crate::codec::writer::Encoder;
use crate::error::{Error, FormatError, InvariantError};
use crate::ir::semtype::{
    AtomConflict, AtomicType, Bdd, BddAtom, BddNode, ComplexSemType, DecimalValue, IntRange,
    ProperSubtype, SemNamedType, SemType, StringSet, MAX_BUILTIN_REC_ATOM,
};

// ── encoding ────────────────────────────────────────────────────────────────

impl Encoder<'_> {
    pub(super) fn write_sem_named(&mut self, w: &mut ByteWriter, t: &SemNamedType) -> Result<(), Error> {
        self.write_sem_info(w, t.semtype.as_ref())?;
        match &t.name {
            Some(name) => { w.u8(1); w.i32(self.pool.string(name)); }
            None => w.u8(0),
        }
        Ok(())
    }

    pub(super) fn write_sem_info(&mut self, w: &mut ByteWriter, t: Option<&SemType>) -> Result<(), Error> {
        match t {
            None => { w.u8(0); Ok(()) }
            Some(t) => { w.u8(1); self.write_semtype(w, t) }
        }
    }

    fn write_semtype(&mut self, w: &mut ByteWriter, t: &SemType) -> Result<(), Error> {
        match t {
            SemType::Uniform(bits) => { w.u8(1); w.i32(*bits); }
            SemType::Complex(c) => {
                w.u8(0);
                w.i32(c.all);
                w.i32(c.some);
                let n = i8::try_from(c.subtypes.len()).map_err(|_| InvariantError::Malformed {
                    what: "semantic type",
                    detail: format!("{} subtypes do not fit in a signed byte", c.subtypes.len()),
                })?;
                w.i8(n);
                for s in &c.subtypes {
                    self.write_subtype(w, s)?;
                }
            }
        }
        Ok(())
    }

    fn write_subtype(&mut self, w: &mut ByteWriter, s: &ProperSubtype) -> Result<(), Error> {
        w.i8(s.kind());
        match s {
            ProperSubtype::Bdd(bdd) => self.write_bdd(w, bdd)?,
            ProperSubtype::Int(ranges) => {
                w.count(ranges.len());
                for r in ranges {
                    w.i64(r.min);
                    w.i64(r.max);
                }
            }
            ProperSubtype::Boolean(v) => w.bool(*v),
            ProperSubtype::Float { allowed, values } => {
                w.bool(*allowed);
                w.count(values.len());
                for v in values {
                    w.f64(*v);
                }
            }
            ProperSubtype::Decimal { allowed, values } => {
                w.bool(*allowed);
                w.count(values.len());
                for v in values {
                    w.i32(v.scale);
                    w.count(v.unscaled.len());
                    w.bytes(&v.unscaled);
                }
            }
            ProperSubtype::String { chars, non_chars } => {
                self.write_string_set(w, chars);
                self.write_string_set(w, non_chars);
            }
            ProperSubtype::Xml { primitives, sequence } => {
                w.i32(*primitives);
                self.write_bdd(w, sequence)?;
            }
        }
        Ok(())
    }

    fn write_string_set(&mut self, w: &mut ByteWriter, set: &StringSet) {
        w.bool(set.allowed);
        w.count(set.values.len());
        for v in &set.values {
            w.i32(self.pool.string(v));
        }
    }

    fn write_bdd(&mut self, w: &mut ByteWriter, bdd: &Bdd) -> Result<(), Error> {
        match bdd {
            Bdd::AllOrNothing(v) => { w.u8(0); w.bool(*v); }
            Bdd::Node(node) => {
                w.u8(1);
                match node.atom {
                    BddAtom::Rec { index, kind } => {
                        w.u8(1);
                        w.i32(index);
                        if index > MAX_BUILTIN_REC_ATOM {
                            w.i32(kind.unwrap_or(0));
                        }
                    }
                    BddAtom::Type(index) => {
                        w.u8(0);
                        self.write_type_atom(w, index)?;
                    }
                }
                self.write_bdd(w, &node.left)?;
                self.write_bdd(w, &node.middle)?;
                self.write_bdd(w, &node.right)?;
            }
        }
        Ok(())
    }

    fn write_type_atom(&mut self, w: &mut ByteWriter, index: i32) -> Result<(), Error> {
        let pkg = self.pkg;
        let atom = pkg.atoms.get(index).ok_or(InvariantError::MissingAtom { index })?;
        // A definition nested inside itself would never terminate; it must use a rec atom.
        if !self.open_atoms.insert(index) {
            return Err(InvariantError::AtomRedefined { index }.into());
        }
        w.i32(index);
        w.i8(atom.kind());
        match atom {
            AtomicType::Mapping { names, types, rest } => {
                w.count(names.len());
                for n in names {
                    w.i32(self.pool.string(n));
                }
                w.count(types.len());
                for t in types {
                    self.write_sem_info(w, t.as_ref())?;
                }
                self.write_sem_info(w, rest.as_ref())?;
            }
            AtomicType::List { initial, fixed_length, rest } => {
                w.count(initial.len());
                for t in initial {
                    self.write_sem_info(w, t.as_ref())?;
                }
                w.i32(*fixed_length);
                self.write_sem_info(w, rest.as_ref())?;
            }
            AtomicType::Function { param, ret, qualifier, is_generic } => {
                self.write_sem_info(w, param.as_ref())?;
                self.write_sem_info(w, ret.as_ref())?;
                self.write_sem_info(w, qualifier.as_ref())?;
                w.bool(*is_generic);
            }
            AtomicType::Cell { ty, mutability } => {
                self.write_sem_info(w, ty.as_ref())?;
                w.i8(*mutability);
            }
        }
        self.open_atoms.remove(&index);
        Ok(())
    }
}

// ── decoding ────────────────────────────────────────────────────────────────

impl Decoder<'_> {
    pub(super) fn read_sem_named(&mut self, r: &mut ByteReader<'_>) -> Result<SemNamedType, Error> {
        let semtype = self.read_sem_info(r)?;
        let name = if r.bool("semtype name flag")? {
            Some(self.pool.read_string(r, "semtype name")?)
        } else {
            None
        };
        Ok(SemNamedType { semtype, name })
    }

    pub(super) fn read_sem_info(&mut self, r: &mut ByteReader<'_>) -> Result<Option<SemType>, Error> {
        if r.bool("semtype presence")? {
            Ok(Some(self.read_semtype(r)?))
        } else {
            Ok(None)
        }
    }

    fn read_semtype(&mut self, r: &mut ByteReader<'_>) -> Result<SemType, Error> {
        self.enter(r)?;
        let t = if r.bool("uniform flag")? {
            SemType::Uniform(r.i32("uniform bitset")?)
        } else {
            let all = r.i32("all bitset")?;
            let some = r.i32("some bitset")?;
            let offset = r.offset();
            let n = r.i8("subtype count")?;
            if n < 0 {
                return Err(FormatError::NegativeLength { offset, what: "subtype count", value: n as i64 }.into());
            }
            let subtypes = (0..n).map(|_| self.read_subtype(r)).collect::<Result<Vec<_>, _>>()?;
            SemType::Complex(ComplexSemType { all, some, subtypes })
        };
        self.leave();
        Ok(t)
    }

    fn read_subtype(&mut self, r: &mut ByteReader<'_>) -> Result<ProperSubtype, Error> {
        let offset = r.offset();
        Ok(match r.i8("subtype kind")? {
            1 => ProperSubtype::Bdd(self.read_bdd(r)?),
            2 => {
                let n = r.count("int range count")?;
                let ranges = (0..n)
                    .map(|_| Ok(IntRange { min: r.i64("range min")?, max: r.i64("range max")? }))
                    .collect::<Result<Vec<_>, FormatError>>()?;
                ProperSubtype::Int(ranges)
            }
            3 => ProperSubtype::Boolean(r.bool("boolean subtype")?),
            4 => {
                let allowed = r.bool("float allowed")?;
                let n = r.count("float value count")?;
                let values = (0..n).map(|_| r.f64("float value")).collect::<Result<Vec<_>, _>>()?;
                ProperSubtype::Float { allowed, values }
            }
            5 => {
                let allowed = r.bool("decimal allowed")?;
                let n = r.count("decimal value count")?;
                let mut values = Vec::with_capacity(n.min(r.remaining()));
                for _ in 0..n {
                    let scale = r.i32("decimal scale")?;
                    let len = r.count("decimal length")?;
                    values.push(DecimalValue { scale, unscaled: r.bytes(len, "decimal bytes")?.to_vec() });
                }
                ProperSubtype::Decimal { allowed, values }
            }
            6 => {
                let chars = self.read_string_set(r)?;
                let non_chars = self.read_string_set(r)?;
                ProperSubtype::String { chars, non_chars }
            }
            7 => {
                let primitives = r.i32("xml primitives")?;
                ProperSubtype::Xml { primitives, sequence: self.read_bdd(r)? }
            }
            tag => return Err(FormatError::UnknownTag { offset, what: "proper subtype", tag: tag as i64 }.into()),
        })
    }

    fn read_string_set(&mut self, r: &mut ByteReader<'_>) -> Result<StringSet, Error> {
        let allowed = r.bool("string set allowed")?;
        let n = r.count("string set size")?;
        let values = (0..n)
            .map(|_| self.pool.read_string(r, "string set value"))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(StringSet { allowed, values })
    }

    fn read_bdd(&mut self, r: &mut ByteReader<'_>) -> Result<Bdd, Error> {
        if !r.bool("bdd node flag")? {
            return Ok(Bdd::AllOrNothing(r.bool("bdd all-or-nothing")?));
        }
        self.enter(r)?;
        let atom = if r.bool("rec atom flag")? {
            let index = r.i32("rec atom index")?;
            if index > MAX_BUILTIN_REC_ATOM {
                if !self.atoms.contains(index) {
                    return Err(InvariantError::UndefinedRecAtom { index }.into());
                }
                BddAtom::Rec { index, kind: Some(r.i32("rec atom target kind")?) }
            } else {
                BddAtom::Rec { index, kind: None }
            }
        } else {
            BddAtom::Type(self.read_type_atom(r)?)
        };
        let left = self.read_bdd(r)?;
        let middle = self.read_bdd(r)?;
        let right = self.read_bdd(r)?;
        self.leave();
        Ok(Bdd::Node(Box::new(BddNode { atom, left, middle, right })))
    }

    fn read_type_atom(&mut self, r: &mut ByteReader<'_>) -> Result<i32, Error> {
        let index = r.i32("atom index")?;
        let already_defined = match self.atoms.reserve(index) {
            Ok(defined) => defined,
            Err(AtomConflict::InProgress) => return Err(InvariantError::AtomRedefined { index }.into()),
            Err(AtomConflict::Different) => return Err(InvariantError::AtomConflict { index }.into()),
        };
        let offset = r.offset();
        let atom = match r.i8("atom kind")? {
            1 => {
                let n = r.count("mapping name count")?;
                let names = (0..n)
                    .map(|_| self.pool.read_string(r, "mapping field name"))
                    .collect::<Result<Vec<_>, _>>()?;
                let n = r.count("mapping type count")?;
                let types = (0..n).map(|_| self.read_sem_info(r)).collect::<Result<Vec<_>, _>>()?;
                let rest = self.read_sem_info(r)?;
                AtomicType::Mapping { names, types, rest }
            }
            2 => {
                let n = r.count("list initial count")?;
                let initial = (0..n).map(|_| self.read_sem_info(r)).collect::<Result<Vec<_>, _>>()?;
                let fixed_length = r.i32("list fixed length")?;
                let rest = self.read_sem_info(r)?;
                AtomicType::List { initial, fixed_length, rest }
            }
            3 => AtomicType::Function {
                param: self.read_sem_info(r)?,
                ret: self.read_sem_info(r)?,
                qualifier: self.read_sem_info(r)?,
                is_generic: r.bool("function generic flag")?,
            },
            4 => AtomicType::Cell { ty: self.read_sem_info(r)?, mutability: r.i8("cell mutability")? },
            tag => return Err(FormatError::UnknownTag { offset, what: "atomic type", tag: tag as i64 }.into()),
        };
        if already_defined {
            if self.atoms.get(index) != Some(&atom) {
                return Err(InvariantError::AtomConflict { index }.into());
            }
        } else {
            self.atoms.complete(index, atom);
        }
        Ok(index)
    }
}
