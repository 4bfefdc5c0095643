pub mod config;
pub mod factory;
pub mod handler;
pub mod middleware;

pub mod prelude {
    pub use crate::config::FactoryConfig;
    pub use crate::factory::{create_context_factory, ContextFactory, ProviderOptions};
    pub use crate::handler::{with_context, ContextHandler};
    pub use crate::middleware::{from_fn, ChainResult, Middleware, Next, Provider};
}

pub use config::{ConfigError, FactoryConfig};
pub use factory::{create_context_factory, ContextFactory, ContextWrapper, ProviderOptions};
pub use handler::{with_context, ContextHandler};
pub use middleware::{from_fn, BoxFuture, ChainError, ChainResult, Middleware, Next, Provider};
