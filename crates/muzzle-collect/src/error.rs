//! Error types for reference collection.
//!
//! Every variant is fatal: collection stops and no partial graph is
//! returned.

use muzzle_classfile::DecodeError;
use muzzle_core::{CoreError, ProviderError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectError {
    /// An internal unit could not be located by the build-time provider.
    #[error("internal unit not found: {name}")]
    MissingUnit { name: String },

    /// An internal unit was found but could not be decoded.
    #[error("failed to decode {unit}: {source}")]
    Decode {
        unit: String,
        #[source]
        source: DecodeError,
    },

    /// Two references could not be merged, or a descriptor was invalid.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The provider failed while reading a unit.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Helper supertypes form a cycle, so no injection order exists.
    #[error("helper supertype cycle involving: {}", members.join(", "))]
    HelperCycle { members: Vec<String> },

    /// A resource file could not be interpreted.
    #[error("invalid resource {path}: {reason}")]
    InvalidResource { path: String, reason: String },
}
