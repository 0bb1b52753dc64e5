//! Runtime compatibility checking.
//!
//! A [`ReferenceMatcher`] compares a collected reference graph with an
//! [`Environment`] and lists every [`Mismatch`]. Declarations are read
//! through a [`SymbolScanner`], which caches one [`Shape`] per
//! `(environment, type)`; a [`MatchResultCache`] memoizes whole mismatch
//! lists per environment. Both caches hold environments weakly and compute
//! each entry once, however many threads ask for it.

pub mod cache;
pub mod config;
pub mod environment;
pub mod error;
mod helper_check;
pub mod matcher;
pub mod mismatch;
pub mod scanner;
pub mod shape;
pub mod weak_cache;

// Re-export commonly used types
pub use cache::MatchResultCache;
pub use config::MatcherConfig;
pub use environment::{Environment, EnvironmentId};
pub use error::ScanError;
pub use matcher::ReferenceMatcher;
pub use mismatch::Mismatch;
pub use scanner::{ChainLookup, Resolution, SymbolScanner};
pub use shape::{DeclaredField, DeclaredMethod, Shape};
pub use weak_cache::WeakCache;
