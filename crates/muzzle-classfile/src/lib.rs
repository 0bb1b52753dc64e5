//! Binary structural decoder for compiled units.
//!
//! [`decode`] turns a class file into an ordered list of [`ClassEvent`]s;
//! [`decode_headers`] stops at declarations. The [`assemble`] module writes
//! small class files, mostly for fixtures.

pub mod assemble;
mod constant_pool;
pub mod decode;
pub mod error;
pub mod event;
pub mod opcodes;
mod reader;

pub use assemble::{ClassAssembler, CodeBuilder, HandleSpec};
pub use decode::{decode, decode_headers};
pub use error::DecodeError;
pub use event::{ClassEvent, HandleRef, Instruction, InvokeKind, TypeOp};
