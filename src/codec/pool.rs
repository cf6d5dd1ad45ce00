//! The constant pool: a deduplicated table of scalars, strings, package ids
//! and type shapes that every other part of the file refers to by index.

use indexmap::IndexMap;

use crate::codec::io::{ByteReader, ByteWriter};
use crate::error::{FormatError, InvariantError};
use crate::ir::package::PackageId;
use crate::ir::types::TypeId;

// ── entry tags ──────────────────────────────────────────────────────────────
pub const CP_INT: u8 = 1;
pub const CP_FLOAT: u8 = 2;
pub const CP_BOOLEAN: u8 = 3;
pub const CP_STRING: u8 = 4;
pub const CP_PACKAGE: u8 = 5;
pub const CP_BYTE: u8 = 6;
pub const CP_SHAPE: u8 = 7;

/// Index written for an absent optional reference.
pub const NO_INDEX: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PoolKey {
    Int(i64),
    Float(u64),
    Boolean(bool),
    String(String),
    Package([i32; 4]),
    Byte(i32),
    Shape(TypeId),
}

/// Encoder-side pool. Equal values share one entry; indices are assigned in
/// first-use order.
#[derive(Debug, Default)]
pub struct PoolBuilder {
    entries: IndexMap<PoolKey, Option<Vec<u8>>>,
}

impl PoolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn intern(&mut self, key: PoolKey) -> i32 {
        let (index, _) = self.entries.insert_full(key, None);
        index as i32
    }

    pub fn int(&mut self, v: i64) -> i32 { self.intern(PoolKey::Int(v)) }
    pub fn float(&mut self, v: f64) -> i32 { self.intern(PoolKey::Float(v.to_bits())) }
    pub fn boolean(&mut self, v: bool) -> i32 { self.intern(PoolKey::Boolean(v)) }
    pub fn byte(&mut self, v: i32) -> i32 { self.intern(PoolKey::Byte(v)) }
    pub fn string(&mut self, v: &str) -> i32 { self.intern(PoolKey::String(v.to_owned())) }

    pub fn opt_string(&mut self, v: Option<&str>) -> i32 {
        v.map_or(NO_INDEX, |s| self.string(s))
    }

    pub fn package(&mut self, id: &PackageId) -> i32 {
        let parts = [
            self.string(&id.org),
            self.string(&id.pkg_name),
            self.string(&id.name),
            self.string(&id.version),
        ];
        self.intern(PoolKey::Package(parts))
    }

    /// Index of the shape entry for `ty`, reserving it on first use.
    pub fn shape(&mut self, ty: TypeId) -> i32 {
        self.intern(PoolKey::Shape(ty))
    }

    /// Stores the encoded `TypeInfo` for a reserved shape entry.
    pub fn fill_shape(&mut self, ty: TypeId, bytes: Vec<u8>) {
        if let Some(slot) = self.entries.get_mut(&PoolKey::Shape(ty)) {
            *slot = Some(bytes);
        }
    }

    pub fn write(&self, w: &mut ByteWriter) -> Result<(), InvariantError> {
        w.count(self.entries.len());
        for (key, shape) in &self.entries {
            match key {
                PoolKey::Int(v) => { w.u8(CP_INT); w.i64(*v); }
                PoolKey::Float(bits) => { w.u8(CP_FLOAT); w.f64(f64::from_bits(*bits)); }
                PoolKey::Boolean(v) => { w.u8(CP_BOOLEAN); w.bool(*v); }
                PoolKey::String(s) => {
                    w.u8(CP_STRING);
                    w.count(s.len());
                    w.bytes(s.as_bytes());
                }
                PoolKey::Package(parts) => {
                    w.u8(CP_PACKAGE);
                    for p in parts {
                        w.i32(*p);
                    }
                }
                PoolKey::Byte(v) => { w.u8(CP_BYTE); w.i32(*v); }
                PoolKey::Shape(ty) => {
                    let bytes = shape.as_ref().ok_or_else(|| InvariantError::Malformed {
                        what: "constant pool",
                        detail: format!("shape for type {} was reserved but never encoded", ty),
                    })?;
                    w.u8(CP_SHAPE);
                    w.count(bytes.len());
                    w.bytes(bytes);
                }
            }
        }
        Ok(())
    }
}

/// A decoded pool entry. Shapes stay as raw bytes until the type table is built.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolEntry<'a> {
    Int(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    Package([i32; 4]),
    Byte(i32),
    Shape { bytes: &'a [u8], offset: usize },
}

impl PoolEntry<'_> {
    fn kind_name(&self) -> &'static str {
        match self {
            PoolEntry::Int(_) => "int",
            PoolEntry::Float(_) => "float",
            PoolEntry::Boolean(_) => "boolean",
            PoolEntry::String(_) => "string",
            PoolEntry::Package(_) => "package",
            PoolEntry::Byte(_) => "byte",
            PoolEntry::Shape { .. } => "shape",
        }
    }
}

/// Decoder-side pool.
#[derive(Debug)]
pub struct ConstantPool<'a> {
    entries: Vec<PoolEntry<'a>>,
}

impl<'a> ConstantPool<'a> {
    pub fn read(r: &mut ByteReader<'a>) -> Result<Self, FormatError> {
        let count = r.count("constant pool size")?;
        let mut entries = Vec::with_capacity(count.min(r.remaining()));
        for _ in 0..count {
            let offset = r.offset();
            let entry = match r.u8("constant pool tag")? {
                CP_INT => PoolEntry::Int(r.i64("int constant")?),
                CP_FLOAT => PoolEntry::Float(r.f64("float constant")?),
                CP_BOOLEAN => PoolEntry::Boolean(r.bool("boolean constant")?),
                CP_STRING => PoolEntry::String(r.string("string constant")?),
                CP_PACKAGE => PoolEntry::Package([
                    r.i32("package org")?,
                    r.i32("package name")?,
                    r.i32("package module name")?,
                    r.i32("package version")?,
                ]),
                CP_BYTE => PoolEntry::Byte(r.i32("byte constant")?),
                CP_SHAPE => {
                    let len = r.count("shape length")?;
                    let offset = r.offset();
                    PoolEntry::Shape { bytes: r.bytes(len, "shape")?, offset }
                }
                tag => {
                    return Err(FormatError::UnknownTag { offset, what: "constant pool entry", tag: tag as i64 })
                }
            };
            entries.push(entry);
        }
        Ok(ConstantPool { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PoolEntry<'a>] {
        &self.entries
    }

    pub fn entry(&self, index: i32, offset: usize) -> Result<&PoolEntry<'a>, FormatError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.entries.get(i))
            .ok_or(FormatError::PoolIndexOutOfRange { offset, index, len: self.entries.len() })
    }

    fn mismatch(&self, index: i32, offset: usize, expected: &'static str) -> FormatError {
        let found = self.entry(index, offset).map(PoolEntry::kind_name).unwrap_or("missing");
        FormatError::PoolKindMismatch { offset, index, expected, found }
    }

    pub fn string_at(&self, index: i32, offset: usize) -> Result<&str, FormatError> {
        match self.entry(index, offset)? {
            PoolEntry::String(s) => Ok(s),
            _ => Err(self.mismatch(index, offset, "string")),
        }
    }

    pub fn package_at(&self, index: i32, offset: usize) -> Result<PackageId, FormatError> {
        match self.entry(index, offset)? {
            PoolEntry::Package([org, pkg_name, name, version]) => Ok(PackageId {
                org: self.string_at(*org, offset)?.to_owned(),
                pkg_name: self.string_at(*pkg_name, offset)?.to_owned(),
                name: self.string_at(*name, offset)?.to_owned(),
                version: self.string_at(*version, offset)?.to_owned(),
            }),
            _ => Err(self.mismatch(index, offset, "package")),
        }
    }

    pub fn shape_at(&self, index: i32, offset: usize) -> Result<(&'a [u8], usize), FormatError> {
        match self.entry(index, offset)? {
            PoolEntry::Shape { bytes, offset } => Ok((bytes, *offset)),
            _ => Err(self.mismatch(index, offset, "shape")),
        }
    }

    // ── readers that consume an index from the stream ───────────────────────

    pub fn read_string(&self, r: &mut ByteReader<'_>, what: &'static str) -> Result<String, FormatError> {
        let offset = r.offset();
        let index = r.i32(what)?;
        Ok(self.string_at(index, offset)?.to_owned())
    }

    pub fn read_opt_string(&self, r: &mut ByteReader<'_>, what: &'static str) -> Result<Option<String>, FormatError> {
        let offset = r.offset();
        match r.i32(what)? {
            NO_INDEX => Ok(None),
            index => Ok(Some(self.string_at(index, offset)?.to_owned())),
        }
    }

    pub fn read_package(&self, r: &mut ByteReader<'_>, what: &'static str) -> Result<PackageId, FormatError> {
        let offset = r.offset();
        let index = r.i32(what)?;
        self.package_at(index, offset)
    }

    pub fn read_int(&self, r: &mut ByteReader<'_>, what: &'static str) -> Result<i64, FormatError> {
        let offset = r.offset();
        let index = r.i32(what)?;
        match self.entry(index, offset)? {
            PoolEntry::Int(v) => Ok(*v),
            _ => Err(self.mismatch(index, offset, "int")),
        }
    }

    pub fn read_float(&self, r: &mut ByteReader<'_>, what: &'static str) -> Result<f64, FormatError> {
        let offset = r.offset();
        let index = r.i32(what)?;
        match self.entry(index, offset)? {
            PoolEntry::Float(v) => Ok(*v),
            _ => Err(self.mismatch(index, offset, "float")),
        }
    }

    pub fn read_byte(&self, r: &mut ByteReader<'_>, what: &'static str) -> Result<i32, FormatError> {
        let offset = r.offset();
        let index = r.i32(what)?;
        match self.entry(index, offset)? {
            PoolEntry::Byte(v) => Ok(*v),
            _ => Err(self.mismatch(index, offset, "byte")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_deduplicates_and_orders() {
        let mut pool = PoolBuilder::new();
        let a = pool.string("main");
        let b = pool.int(42);
        let c = pool.string("main");
        assert_eq!(a, c);
        assert_eq!((a, b), (0, 1));

        let pkg = PackageId::new("acme", "demo", "1.0.0");
        let p1 = pool.package(&pkg);
        let p2 = pool.package(&pkg);
        assert_eq!(p1, p2);
        // org, name (shared by pkg_name and name), version, then the package itself
        assert_eq!(pool.len(), 6);
    }

    #[test]
    fn test_write_then_read_resolves_packages() {
        let mut pool = PoolBuilder::new();
        let pkg = PackageId::new("acme", "demo", "1.0.0");
        let p = pool.package(&pkg);
        let f = pool.float(1.5);
        let mut w = ByteWriter::new();
        pool.write(&mut w).unwrap();
        let bytes = w.into_bytes();

        let mut r = ByteReader::new(&bytes);
        let decoded = ConstantPool::read(&mut r).unwrap();
        assert!(r.is_at_end());
        assert_eq!(decoded.package_at(p, 0).unwrap(), pkg);
        assert!(matches!(decoded.entry(f, 0), Ok(PoolEntry::Float(v)) if *v == 1.5));
        assert!(matches!(
            decoded.string_at(f, 0),
            Err(FormatError::PoolKindMismatch { expected: "string", found: "float", .. })
        ));
        assert!(matches!(
            decoded.string_at(99, 0),
            Err(FormatError::PoolIndexOutOfRange { index: 99, .. })
        ));
    }

    #[test]
    fn test_unfilled_shape_is_an_error() {
        let mut pool = PoolBuilder::new();
        pool.shape(TypeId(0));
        let mut w = ByteWriter::new();
        assert!(pool.write(&mut w).is_err());
    }
}
