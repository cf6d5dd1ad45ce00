//! BIR: a basic-block intermediate representation.
//!
//! ```text
//! typed AST → lower → [Package] → codec::encode → .bir bytes
//!                          ↑                          │
//!                          └──── codec::decode ───────┘
//! ```
//!
//! - [`lower`] turns a typed [`ast::AstPackage`] into a [`ir::Package`] of
//!   functions made of basic blocks.
//! - [`codec`] reads and writes the big-endian, constant-pool based binary
//!   format, including recursive semantic types.
//! - [`printer`] renders a package as deterministic text.
//!
//! Nothing here holds global state: packages can be lowered, encoded and
//! decoded on independent threads.

pub mod ast;
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod ir;
pub mod lower;
pub mod printer;

pub use codec::{decode, decode_with, encode};
pub use config::BirConfig;
pub use error::Error;
pub use lower::{lower, lower_lenient};
pub use printer::print_package;
