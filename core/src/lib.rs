//! Scope primitive and typed context containers.
//!
//! `tether-core` knows nothing about middleware. It provides the storage a
//! chain establishes: named scopes that stay active across `.await`, and the
//! containers that read and write them.

pub mod container;
pub mod error;
pub mod key;
pub mod name;
pub mod scope;

pub use container::{ContextContainer, Lookup};
pub use error::ContextError;
pub use key::{ContextSchema, DeclaredContext, Dynamic, Key};
pub use name::ContextName;
pub use scope::{propagate, ScopeHandle, ScopeLookup, ScopeSnapshot, ScopeStore, TaskScopes};

pub mod prelude {
    pub use crate::container::{ContextContainer, Lookup};
    pub use crate::error::ContextError;
    pub use crate::key::{ContextSchema, DeclaredContext, Dynamic, Key};
    pub use crate::name::ContextName;
    pub use crate::scope::{propagate, ScopeSnapshot, ScopeStore, TaskScopes};
}
