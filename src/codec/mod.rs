//! Binary BIR codec.
//!
//! ## Wire format
//!
//! ```text
//! File     := magic(BA 10 C0 DE) version(i32) ConstantPool Module
//! Pool     := count(i32) Entry*
//! Entry    := tag(u8) body          1 int(i64) | 2 float(f64) | 3 bool(u8)
//!                                   4 string(i32 len + utf8) | 5 package(4 × i32)
//!                                   6 byte(i32) | 7 shape(i32 len + TypeInfo)
//! Module   := id(cp) imports constants typeDefs globals typeDefBodies
//!             functions annotations services
//! ```
//!
//! All integers are big-endian. Every reference to a string, package or type
//! is an `i32` index into the pool; `-1` marks an absent optional reference.
//! Function bodies, scope tables, constant values, docs and annotation lists
//! are length-prefixed so a reader can bound them.

pub mod io;
pub mod pool;
pub mod reader;
pub mod writer;

mod semtype;
mod shape;

pub use reader::{decode, decode_with};
pub use writer::encode;

/// First four bytes of every BIR file.
pub const MAGIC: [u8; 4] = [0xBA, 0x10, 0xC0, 0xDE];

/// The format version this codec reads and writes.
pub const VERSION: i32 = 75;
