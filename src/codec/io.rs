//! Big-endian primitive readers and writers.

use crate::error::FormatError;

// ── Writer ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self { Self::default() }
    pub fn u8(&mut self, v: u8) { self.buf.push(v); }
    pub fn i8(&mut self, v: i8) { self.buf.push(v as u8); }
    pub fn bool(&mut self, v: bool) { self.buf.push(u8::from(v)); }
    pub fn i32(&mut self, v: i32) { self.buf.extend_from_slice(&v.to_be_bytes()); }
    pub fn i64(&mut self, v: i64) { self.buf.extend_from_slice(&v.to_be_bytes()); }
    pub fn f64(&mut self, v: f64) { self.buf.extend_from_slice(&v.to_be_bytes()); }
    pub fn bytes(&mut self, v: &[u8]) { self.buf.extend_from_slice(v); }
    pub fn len(&self) -> usize { self.buf.len() }
    pub fn is_empty(&self) -> bool { self.buf.is_empty() }
    pub fn as_slice(&self) -> &[u8] { &self.buf }
    pub fn into_bytes(self) -> Vec<u8> { self.buf }

    /// Writes a collection length as `i32`.
    pub fn count(&mut self, n: usize) { self.i32(n as i32); }

    /// Writes `body` prefixed with its byte length as `i32`.
    pub fn sized_i32(&mut self, body: ByteWriter) {
        self.i32(body.len() as i32);
        self.bytes(body.as_slice());
    }

    /// Writes `body` prefixed with its byte length as `i64`.
    pub fn sized_i64(&mut self, body: ByteWriter) {
        self.i64(body.len() as i64);
        self.bytes(body.as_slice());
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

/// Cursor over a byte slice. `base` is the absolute offset of `data[0]` in the
/// original stream, so errors from nested readers report stream offsets.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self { Self { data, pos: 0, base: 0 } }

    pub fn with_base(data: &'a [u8], base: usize) -> Self { Self { data, pos: 0, base } }

    /// Absolute stream offset of the next byte.
    pub fn offset(&self) -> usize { self.base + self.pos }
    pub fn remaining(&self) -> usize { self.data.len() - self.pos }
    pub fn is_at_end(&self) -> bool { self.pos >= self.data.len() }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], FormatError> {
        if self.remaining() < n {
            return Err(FormatError::Truncated { offset: self.offset(), needed: n - self.remaining(), what });
        }
        let s = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N], FormatError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    pub fn u8(&mut self, what: &'static str) -> Result<u8, FormatError> { Ok(self.array::<1>(what)?[0]) }
    pub fn i8(&mut self, what: &'static str) -> Result<i8, FormatError> { Ok(self.u8(what)? as i8) }
    pub fn i32(&mut self, what: &'static str) -> Result<i32, FormatError> { Ok(i32::from_be_bytes(self.array(what)?)) }
    pub fn i64(&mut self, what: &'static str) -> Result<i64, FormatError> { Ok(i64::from_be_bytes(self.array(what)?)) }
    pub fn f64(&mut self, what: &'static str) -> Result<f64, FormatError> { Ok(f64::from_be_bytes(self.array(what)?)) }
    pub fn bytes(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], FormatError> { self.take(n, what) }

    /// Reads a `u8` flag. Any non-zero value is `true`.
    pub fn bool(&mut self, what: &'static str) -> Result<bool, FormatError> { Ok(self.u8(what)? != 0) }

    /// Reads an `i32` collection length, rejecting negatives.
    pub fn count(&mut self, what: &'static str) -> Result<usize, FormatError> {
        let offset = self.offset();
        let n = self.i32(what)?;
        if n < 0 {
            return Err(FormatError::NegativeLength { offset, what, value: n as i64 });
        }
        Ok(n as usize)
    }

    /// Reads an `i32` length followed by UTF-8 bytes.
    pub fn string(&mut self, what: &'static str) -> Result<String, FormatError> {
        let len = self.count(what)?;
        let offset = self.offset();
        let raw = self.take(len, what)?;
        std::str::from_utf8(raw).map(str::to_owned).map_err(|_| FormatError::InvalidUtf8 { offset })
    }

    /// Splits off the next `len` bytes as an independent reader.
    pub fn sub_reader(&mut self, len: usize, what: &'static str) -> Result<ByteReader<'a>, FormatError> {
        let base = self.offset();
        let data = self.take(len, what)?;
        Ok(ByteReader::with_base(data, base))
    }

    /// Reads an `i32` byte length and splits off that many bytes.
    pub fn sized_i32(&mut self, what: &'static str) -> Result<ByteReader<'a>, FormatError> {
        let len = self.count(what)?;
        self.sub_reader(len, what)
    }

    /// Reads an `i64` byte length and splits off that many bytes.
    pub fn sized_i64(&mut self, what: &'static str) -> Result<ByteReader<'a>, FormatError> {
        let offset = self.offset();
        let len = self.i64(what)?;
        if len < 0 {
            return Err(FormatError::NegativeLength { offset, what, value: len });
        }
        let len = usize::try_from(len).map_err(|_| FormatError::Truncated { offset, needed: usize::MAX, what })?;
        self.sub_reader(len, what)
    }

    /// Fails if a length-delimited section was not fully consumed.
    pub fn finish(&self, what: &'static str) -> Result<(), FormatError> {
        if self.is_at_end() {
            Ok(())
        } else {
            Err(FormatError::LengthMismatch {
                offset: self.base,
                what,
                declared: self.data.len(),
                consumed: self.pos,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_layout() {
        let mut w = ByteWriter::new();
        w.i32(1);
        w.i64(-2);
        w.i8(-128);
        assert_eq!(&w.as_slice()[..4], &[0, 0, 0, 1]);
        assert_eq!(&w.as_slice()[4..12], &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE]);
        assert_eq!(w.as_slice()[12], 0x80);

        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.i32("a").unwrap(), 1);
        assert_eq!(r.i64("b").unwrap(), -2);
        assert_eq!(r.i8("c").unwrap(), -128);
        assert!(r.is_at_end());
    }

    #[test]
    fn test_truncation_reports_offset() {
        let bytes = [0u8, 0, 0];
        let mut r = ByteReader::new(&bytes);
        let err = r.i32("count").unwrap_err();
        assert_eq!(err, FormatError::Truncated { offset: 0, needed: 1, what: "count" });
    }

    #[test]
    fn test_sub_reader_offsets_and_finish() {
        let mut w = ByteWriter::new();
        w.u8(9);
        let mut inner = ByteWriter::new();
        inner.i32(7);
        inner.u8(1);
        w.sized_i64(inner);
        let bytes = w.into_bytes();

        let mut r = ByteReader::new(&bytes);
        r.u8("lead").unwrap();
        let mut sub = r.sized_i64("body").unwrap();
        assert_eq!(sub.offset(), 9);
        assert_eq!(sub.i32("x").unwrap(), 7);
        let err = sub.finish("body").unwrap_err();
        assert!(matches!(err, FormatError::LengthMismatch { declared: 5, consumed: 4, .. }));
    }

    #[test]
    fn test_negative_count_rejected() {
        let bytes = (-1i32).to_be_bytes();
        let mut r = ByteReader::new(&bytes);
        assert!(matches!(r.count("n"), Err(FormatError::NegativeLength { value: -1, .. })));
    }
}
