//! Build-time reference collection.
//!
//! Starting from advice roots (or service-provider resources), the
//! [`Collector`] decodes every internal unit it can reach and records what
//! each one requires of other symbols. The output is a [`Collection`]: the
//! merged [`ReferenceGraph`](muzzle_core::ReferenceGraph), the helper units
//! in injection order and the helper dependency graph they were sorted from.

pub mod collector;
pub mod config;
pub mod error;
pub mod helpers;
pub mod prune;
pub mod visibility;
mod visitor;

// Re-export commonly used types
pub use collector::{collect, is_provider_resource, Collection, Collector};
pub use config::CollectorConfig;
pub use error::CollectError;
pub use helpers::HelperGraph;
pub use visibility::Accessor;
pub use visitor::UnitReferences;
