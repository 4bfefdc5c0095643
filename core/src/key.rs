//! Typed keys and context schemas.
//!
//! A schema is a zero-sized marker naming one context domain. Keys carry both
//! the value type and the schema they belong to, so a container typed by
//! `RequestContext` only accepts `Key<_, RequestContext>` constants:
//!
//! ```rust
//! use tether_core::key::{DeclaredContext, ContextSchema, Key};
//!
//! pub enum RequestContext {}
//! impl ContextSchema for RequestContext {}
//! impl DeclaredContext for RequestContext {
//!     const NAME: &'static str = "request";
//! }
//!
//! pub const REQUEST_ID: Key<String, RequestContext> = Key::new("request_id");
//! ```
//!
//! Contexts that were never declared use the [`Dynamic`] schema, whose keys
//! are accepted by any untyped container.

use std::fmt;
use std::marker::PhantomData;

/// Marker for a family of keys.
pub trait ContextSchema: Send + Sync + 'static {}

/// A schema bound to one fixed context name.
pub trait DeclaredContext: ContextSchema {
    const NAME: &'static str;
}

/// Schema used for contexts without a declaration.
pub enum Dynamic {}

impl ContextSchema for Dynamic {}

/// Typed handle to one slot inside a scope.
pub struct Key<T, S: ContextSchema = Dynamic> {
    name: &'static str,
    _marker: PhantomData<fn() -> (T, S)>,
}

impl<T, S: ContextSchema> Key<T, S> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T, S: ContextSchema> Clone for Key<T, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, S: ContextSchema> Copy for Key<T, S> {}

impl<T, S: ContextSchema> fmt::Debug for Key<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("name", &self.name)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}
