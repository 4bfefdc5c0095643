//! # ContextFactory: Named Context Registry
//!
//! Owns the set of known context names, caches one [`ContextContainer`] per
//! name, and generates providers that open a fresh scope for a name on every
//! invocation.
//!
//! The factory is an explicit, cheaply cloned value. Pass it to wherever
//! middleware is composed instead of reaching for a global.

use crate::config::FactoryConfig;
use crate::middleware::{BoxFuture, ChainResult, Middleware, Next, Provider};
use ahash::AHashMap;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use tether_core::{
    ContextContainer, ContextName, DeclaredContext, ScopeLookup, ScopeStore, TaskScopes,
};
use tracing::Instrument;

/// Wrapper run inside a freshly opened scope, in place of calling `next`
/// directly.
pub trait ContextWrapper<T>: Send + Sync + 'static {
    fn wrap(&self, context: ContextContainer, next: Next<T>) -> BoxFuture<'static, ChainResult<T>>;
}

impl<T, F, Fut> ContextWrapper<T> for F
where
    T: Send + 'static,
    F: Fn(ContextContainer, Next<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ChainResult<T>> + Send + 'static,
{
    fn wrap(&self, context: ContextContainer, next: Next<T>) -> BoxFuture<'static, ChainResult<T>> {
        Box::pin(self(context, next))
    }
}

/// What [`ContextFactory::generate_provider`] should build.
pub struct ProviderOptions<T> {
    pub name: ContextName,
    pub wrapper: Option<Arc<dyn ContextWrapper<T>>>,
}

impl<T: Send + 'static> ProviderOptions<T> {
    pub fn new(name: impl Into<ContextName>) -> Self {
        Self {
            name: name.into(),
            wrapper: None,
        }
    }

    pub fn wrap<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ContextContainer, Next<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ChainResult<T>> + Send + 'static,
    {
        self.wrapper = Some(Arc::new(f));
        self
    }
}

struct FactoryInner<S> {
    store: Arc<S>,
    contexts: RwLock<AHashMap<ContextName, ContextContainer>>,
    config: FactoryConfig,
}

pub struct ContextFactory<S: ScopeStore = TaskScopes> {
    inner: Arc<FactoryInner<S>>,
}

impl<S: ScopeStore> Clone for ContextFactory<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl ContextFactory<TaskScopes> {
    pub fn new() -> Self {
        Self::from_config(FactoryConfig::default())
    }

    pub fn from_config(config: FactoryConfig) -> Self {
        Self::with_config(TaskScopes::new(), config)
    }
}

impl Default for ContextFactory<TaskScopes> {
    fn default() -> Self {
        Self::new()
    }
}

/// Shorthand for [`ContextFactory::new`].
pub fn create_context_factory() -> ContextFactory {
    ContextFactory::new()
}

impl<S: ScopeStore> ContextFactory<S> {
    pub fn with_store(store: S) -> Self {
        Self::with_config(store, FactoryConfig::default())
    }

    pub fn with_config(store: S, config: FactoryConfig) -> Self {
        Self {
            inner: Arc::new(FactoryInner {
                store: Arc::new(store),
                contexts: RwLock::new(AHashMap::new()),
                config,
            }),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.inner.store
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.inner.config
    }

    /// Register `name`, replacing its cached container, and make sure the
    /// store has a namespace for it. No scope is opened.
    pub fn create(&self, name: impl Into<ContextName>) -> ContextContainer {
        let name = name.into();
        let scopes: Arc<dyn ScopeLookup> = self.inner.store.clone();
        let container = ContextContainer::new(name.clone(), scopes);

        self.inner.store.create_namespace(&name);
        self.inner
            .contexts
            .write()
            .insert(name.clone(), container.clone());
        tracing::debug!(tether.context = %name, "context created");

        container
    }

    pub fn create_typed<C: DeclaredContext>(&self) -> ContextContainer<C> {
        self.create(C::NAME);
        ContextContainer::declared(self.inner.store.clone())
    }

    pub fn create_default(&self) -> ContextContainer {
        self.create(self.inner.config.default_context.as_str())
    }

    pub fn load(&self, name: &str) -> Option<ContextContainer> {
        self.inner.contexts.read().get(name).cloned()
    }

    pub fn load_typed<C: DeclaredContext>(&self) -> Option<ContextContainer<C>> {
        self.load(C::NAME)?.with_schema::<C>()
    }

    pub fn default_context(&self) -> Option<ContextContainer> {
        self.load(&self.inner.config.default_context)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contexts.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<ContextName> {
        let mut names: Vec<_> = self.inner.contexts.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn ensure(&self, name: &ContextName) -> ContextContainer {
        match self.load(name.as_str()) {
            Some(container) if self.inner.store.has_namespace(name.as_str()) => container,
            _ => self.create(name),
        }
    }

    /// Build a provider that opens a fresh scope for `options.name` and runs
    /// the wrapper (or `next`) inside it.
    pub fn generate_provider<T: Send + 'static>(&self, options: ProviderOptions<T>) -> Provider<T> {
        Arc::new(ContextProvider {
            factory: self.clone(),
            name: options.name,
            wrapper: options.wrapper,
        })
    }

    pub fn provider<T: Send + 'static>(&self, name: impl Into<ContextName>) -> Provider<T> {
        self.generate_provider(ProviderOptions::new(name))
    }

    pub fn provider_with<T, F, Fut>(&self, name: impl Into<ContextName>, f: F) -> Provider<T>
    where
        T: Send + 'static,
        F: Fn(ContextContainer, Next<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ChainResult<T>> + Send + 'static,
    {
        self.generate_provider(ProviderOptions::new(name).wrap(f))
    }

    /// Like [`provider_with`](Self::provider_with), for a declared schema.
    pub fn provider_typed<C, T, F, Fut>(&self, f: F) -> Provider<T>
    where
        C: DeclaredContext,
        T: Send + 'static,
        F: Fn(ContextContainer<C>, Next<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ChainResult<T>> + Send + 'static,
    {
        let f = Arc::new(f);
        self.provider_with(C::NAME, move |context: ContextContainer, next: Next<T>| {
            let f = f.clone();
            async move {
                let typed = context
                    .with_schema::<C>()
                    .ok_or_else(|| anyhow::anyhow!("context `{}` is not `{}`", context.name(), C::NAME))?;
                (*f)(typed, next).await
            }
        })
    }
}

impl<S: ScopeStore> std::fmt::Debug for ContextFactory<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextFactory")
            .field("contexts", &self.names())
            .field("config", &self.inner.config)
            .finish()
    }
}

struct ContextProvider<S: ScopeStore, T> {
    factory: ContextFactory<S>,
    name: ContextName,
    wrapper: Option<Arc<dyn ContextWrapper<T>>>,
}

impl<S: ScopeStore, T: Send + 'static> Middleware<T> for ContextProvider<S, T> {
    fn handle(&self, next: Next<T>) -> BoxFuture<'static, ChainResult<T>> {
        let factory = self.factory.clone();
        let name = self.name.clone();
        let wrapper = self.wrapper.clone();

        Box::pin(async move {
            let fallback = factory.ensure(&name);
            let store = factory.store().clone();
            let scope = store.open(&name)?;

            let span = if factory.config().trace_scopes {
                tracing::debug_span!("Context", tether.context = %name, tether.scope = %scope.id())
            } else {
                tracing::Span::none()
            };

            let body = async move {
                let context = factory.load(name.as_str()).unwrap_or(fallback);
                match wrapper {
                    Some(wrapper) => wrapper.wrap(context, next).await,
                    None => next.run().await,
                }
            };

            store.run_bound(scope, body.instrument(span)).await
        })
    }
}
