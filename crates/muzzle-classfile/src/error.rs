//! Decode error types.

use muzzle_core::CoreError;

/// Errors that can occur while decoding a compiled unit.
///
/// Every variant means the input is unusable; the decoder never returns a
/// partial event stream alongside an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The input ended before a structure was complete.
    #[error("truncated input: needed {needed} byte(s) at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    /// The first four bytes were not the class-file magic.
    #[error("bad magic 0x{0:08X}")]
    BadMagic(u32),

    /// A constant-pool entry carried an unknown tag.
    #[error("unknown constant tag {tag} at pool index {index}")]
    UnknownConstantTag { index: u16, tag: u8 },

    /// A pool index pointed at the wrong kind of entry (or out of range).
    #[error("constant pool index {index} is not a {expected}")]
    BadConstantIndex { index: u16, expected: &'static str },

    /// A UTF-8 constant was not valid modified UTF-8.
    #[error("malformed modified UTF-8 in constant {index}")]
    MalformedUtf8 { index: u16 },

    /// An opcode that does not exist appeared in a method body.
    #[error("unknown opcode 0x{opcode:02X} at pc {pc} in {method}")]
    UnknownOpcode { method: String, pc: usize, opcode: u8 },

    /// An instruction ran past the end of its code array.
    #[error("instruction at pc {pc} in {method} runs past end of code")]
    CodeOverrun { method: String, pc: usize },

    /// `invokedynamic` named a bootstrap method the class does not declare.
    #[error("bootstrap method {index} out of range")]
    BadBootstrapIndex { index: u16 },

    /// A descriptor in the pool could not be parsed.
    #[error("invalid descriptor '{descriptor}': {reason}")]
    BadDescriptor { descriptor: String, reason: String },
}

impl From<CoreError> for DecodeError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidDescriptor { descriptor, reason } => {
                DecodeError::BadDescriptor { descriptor, reason }
            }
            other => DecodeError::BadDescriptor {
                descriptor: String::new(),
                reason: other.to_string(),
            },
        }
    }
}
