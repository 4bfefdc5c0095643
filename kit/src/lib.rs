//! Tether facade crate.
//!
//! Re-exports the scope primitive (`tether-core`) and the registry/executor
//! (`tether-runtime`) behind a single entry point.
//!
//! ```rust
//! use tether::prelude::*;
//!
//! const REQUEST_ID: Key<String> = Key::new("request_id");
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> anyhow::Result<()> {
//! let factory = create_context_factory();
//! let request = factory.provider_with("request", |ctx: ContextContainer, next: Next<()>| async move {
//!     ctx.set(&REQUEST_ID, "abc".to_string())?;
//!     next.run().await
//! });
//!
//! let probe = factory.clone();
//! with_context(vec![request])
//!     .run(move || async move {
//!         let ctx = probe.load("request").expect("created by the provider");
//!         assert_eq!(ctx.get(&REQUEST_ID).as_deref(), Some("abc"));
//!         Ok(())
//!     })
//!     .await
//! # }
//! ```

pub use tether_core as core;
pub use tether_runtime as runtime;

#[cfg(feature = "observe")]
pub mod observe;

pub use tether_core::{ContextContainer, ContextName, Key, Lookup, ScopeStore, TaskScopes};
pub use tether_runtime::{
    create_context_factory, with_context, ContextFactory, ContextHandler, FactoryConfig, Next,
    ProviderOptions,
};

pub mod prelude {
    pub use tether_core::prelude::*;
    pub use tether_runtime::prelude::*;
}
