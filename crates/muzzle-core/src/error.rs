//! Core error types for muzzle-core.
//!
//! Uses `thiserror` for structured, matchable error variants. [`CoreError`]
//! covers broken internal consistency of the reference model; [`ProviderError`]
//! covers failures reading compiled units from a [`ClassProvider`].
//!
//! [`ClassProvider`]: crate::provider::ClassProvider

use thiserror::Error;

/// Errors produced by the reference data model.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Two references with different class names were merged.
    #[error("illegal merge: '{left}' != '{right}'")]
    IllegalMerge { left: String, right: String },

    /// Two member references (fields or methods) with different identities
    /// were merged.
    #[error("illegal member merge on '{class_name}': '{left}' != '{right}'")]
    IllegalMemberMerge {
        class_name: String,
        left: String,
        right: String,
    },

    /// A type or method descriptor could not be parsed.
    #[error("invalid descriptor '{descriptor}': {reason}")]
    InvalidDescriptor { descriptor: String, reason: String },

    /// JSON serialization or deserialization of an exported graph failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors produced while reading compiled units from a provider.
///
/// A unit that simply does not exist is *not* an error: providers return
/// `Ok(None)` for it.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Reading the unit failed for a reason other than absence.
    #[error("failed to read '{name}' from {location}: {source}")]
    Io {
        name: String,
        location: String,
        #[source]
        source: std::io::Error,
    },

    /// A jar archive could not be opened or read.
    #[error("archive error in {path}: {reason}")]
    Archive { path: String, reason: String },
}
