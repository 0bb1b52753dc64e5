pub mod descriptor;
pub mod error;
pub mod flag;
pub mod graph;
pub mod names;
pub mod provider;
pub mod reference;

// Re-export commonly used types
pub use descriptor::{MethodSig, Primitive, TypeSig};
pub use error::{CoreError, ProviderError};
pub use flag::{access, Flag, FlagKind};
pub use graph::ReferenceGraph;
pub use provider::{ClassProvider, CompositeProvider, DirectoryProvider, InMemoryProvider, JarProvider};
pub use reference::{FieldRef, MethodRef, Reference, ReferenceBuilder, Source};
