//! Error types for environment scanning.
//!
//! A [`ScanError`] is never fatal to a matching pass: the matcher turns it
//! into a [`Mismatch::ReferenceCheckError`](crate::Mismatch) for the
//! reference being checked and moves on. It is `Clone` so that a failed
//! resolution stored in a single-flight cell can be handed to every waiter.

use muzzle_classfile::DecodeError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    /// The environment's provider failed to read a unit.
    #[error("failed to read '{name}' in environment '{environment}': {reason}")]
    Provider {
        name: String,
        environment: String,
        reason: String,
    },

    /// A unit was found but its declarations could not be decoded.
    #[error("failed to decode '{name}' in environment '{environment}': {source}")]
    Decode {
        name: String,
        environment: String,
        #[source]
        source: DecodeError,
    },

    /// The unit stored under `requested` declares a different type.
    #[error("environment '{environment}' returned '{found}' for '{requested}'")]
    UnexpectedUnit {
        requested: String,
        found: String,
        environment: String,
    },
}
