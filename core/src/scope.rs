//! Scope - Isolated Storage That Survives `.await`
//!
//! A [`ScopeHandle`] is one isolated key/value region for one context name.
//! A [`ScopeStore`] decides which handle is *active* on the calling task and
//! binds futures to handles.
//!
//! # Propagation
//! [`TaskScopes`] keeps the active handles in a tokio task-local, so every
//! continuation polled inside [`ScopeStore::run_bound`] observes the same
//! handle after it resumes, regardless of what other tasks are doing.
//! Task-locals do not follow `tokio::spawn`; use [`propagate`] (or
//! [`ScopeSnapshot`]) to carry the caller's scopes into a spawned task.

use crate::error::ContextError;
use crate::name::ContextName;
use ahash::{AHashMap, AHashSet};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

type Slots = AHashMap<&'static str, Box<dyn Any + Send + Sync>>;

struct ScopeSlot {
    id: Uuid,
    name: ContextName,
    values: RwLock<Slots>,
}

/// Handle to one active storage region.
///
/// Clones share the same storage. The region is released once the last
/// clone (normally the one held by the bound future) is dropped.
#[derive(Clone)]
pub struct ScopeHandle {
    inner: Arc<ScopeSlot>,
}

impl ScopeHandle {
    pub fn new(name: ContextName) -> Self {
        Self {
            inner: Arc::new(ScopeSlot {
                id: Uuid::new_v4(),
                name,
                values: RwLock::new(AHashMap::new()),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn name(&self) -> &ContextName {
        &self.inner.name
    }

    /// Clone of the value stored under `key`.
    ///
    /// Returns `None` if the key is absent or holds a value of another type.
    pub fn get<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        self.inner
            .values
            .read()
            .get(key)
            .and_then(|boxed| boxed.downcast_ref::<T>())
            .cloned()
    }

    /// Store `value` under `key`, returning the previous value of the same type.
    pub fn set<T: Send + Sync + 'static>(&self, key: &'static str, value: T) -> Option<T> {
        self.inner
            .values
            .write()
            .insert(key, Box::new(value))
            .and_then(|boxed| boxed.downcast().ok())
            .map(|boxed| *boxed)
    }

    /// Mutate the value under `key` in place.
    pub fn update<T: 'static, R>(&self, key: &str, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut values = self.inner.values.write();
        values
            .get_mut(key)
            .and_then(|boxed| boxed.downcast_mut::<T>())
            .map(f)
    }

    /// Remove the value under `key` if it has type `T`.
    pub fn remove<T: 'static>(&self, key: &str) -> Option<T> {
        let mut values = self.inner.values.write();
        if !values.get(key).is_some_and(|boxed| boxed.is::<T>()) {
            return None;
        }
        values
            .remove(key)
            .and_then(|boxed| boxed.downcast().ok())
            .map(|boxed| *boxed)
    }

    /// Whether `key` holds a value of type `T`.
    pub fn contains<T: 'static>(&self, key: &str) -> bool {
        self.inner
            .values
            .read()
            .get(key)
            .is_some_and(|boxed| boxed.is::<T>())
    }

    pub fn len(&self) -> usize {
        self.inner.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ScopeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeHandle")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("value_count", &self.len())
            .finish()
    }
}

/// Read side of a scope store: which handle is active on the calling task.
///
/// Split from [`ScopeStore`] so containers can hold it as a trait object.
pub trait ScopeLookup: Send + Sync + 'static {
    fn active(&self, name: &str) -> Option<ScopeHandle>;
}

/// The storage primitive the registry is built on.
#[async_trait]
pub trait ScopeStore: ScopeLookup {
    /// Register `name` in the namespace table. Idempotent.
    fn create_namespace(&self, name: &ContextName);

    fn has_namespace(&self, name: &str) -> bool;

    /// Create a fresh, empty handle for `name`.
    fn open(&self, name: &ContextName) -> Result<ScopeHandle, ContextError>;

    /// Run `fut` with `scope` active for its name, on top of every handle
    /// already active on the caller. The binding ends when `fut` completes
    /// or is dropped.
    async fn run_bound<F>(&self, scope: ScopeHandle, fut: F) -> F::Output
    where
        F: Future + Send,
        F::Output: Send;
}

type StoreScopes = AHashMap<ContextName, ScopeHandle>;

/// Active handles on a task, grouped by the store that bound them.
type ActiveScopes = Arc<AHashMap<Uuid, StoreScopes>>;

tokio::task_local! {
    static ACTIVE: ActiveScopes;
}

fn current_scopes() -> Option<ActiveScopes> {
    ACTIVE.try_with(Arc::clone).ok()
}

/// Task-local scope store.
///
/// Every instance has its own identity. Scopes bound through one store are
/// invisible to every other store, even for the same context name.
pub struct TaskScopes {
    id: Uuid,
    namespaces: RwLock<AHashSet<ContextName>>,
}

impl TaskScopes {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            namespaces: RwLock::new(AHashSet::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Default for TaskScopes {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeLookup for TaskScopes {
    fn active(&self, name: &str) -> Option<ScopeHandle> {
        ACTIVE
            .try_with(|scopes| {
                scopes
                    .get(&self.id)
                    .and_then(|bound| bound.get(name))
                    .cloned()
            })
            .ok()
            .flatten()
    }
}

#[async_trait]
impl ScopeStore for TaskScopes {
    fn create_namespace(&self, name: &ContextName) {
        if self.namespaces.write().insert(name.clone()) {
            tracing::trace!(tether.context = %name, "namespace created");
        }
    }

    fn has_namespace(&self, name: &str) -> bool {
        self.namespaces.read().contains(name)
    }

    fn open(&self, name: &ContextName) -> Result<ScopeHandle, ContextError> {
        if !self.has_namespace(name.as_str()) {
            return Err(ContextError::UnknownContext {
                context: name.clone(),
            });
        }
        let scope = ScopeHandle::new(name.clone());
        tracing::trace!(tether.context = %name, tether.scope = %scope.id(), "scope opened");
        Ok(scope)
    }

    async fn run_bound<F>(&self, scope: ScopeHandle, fut: F) -> F::Output
    where
        F: Future + Send,
        F::Output: Send,
    {
        let mut scopes = current_scopes()
            .map(|active| (*active).clone())
            .unwrap_or_default();
        scopes
            .entry(self.id)
            .or_default()
            .insert(scope.name().clone(), scope);
        ACTIVE.scope(Arc::new(scopes), fut).await
    }
}

/// The set of scopes active on a task at the moment of capture.
#[derive(Clone, Default)]
pub struct ScopeSnapshot {
    scopes: Option<ActiveScopes>,
}

impl ScopeSnapshot {
    pub fn capture() -> Self {
        Self {
            scopes: current_scopes(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scopes
            .as_ref()
            .is_none_or(|scopes| scopes.values().all(|bound| bound.is_empty()))
    }

    /// Names with an active scope in any store, sorted and deduplicated.
    pub fn names(&self) -> Vec<ContextName> {
        let mut names: Vec<_> = self
            .scopes
            .iter()
            .flat_map(|scopes| scopes.values())
            .flat_map(|bound| bound.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Run `fut` with the captured scopes active.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        match self.scopes {
            Some(scopes) => ACTIVE.scope(scopes, fut).await,
            None => fut.await,
        }
    }
}

impl std::fmt::Debug for ScopeSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeSnapshot")
            .field("names", &self.names())
            .finish()
    }
}

/// Carry the caller's active scopes into `fut`, typically before spawning it.
///
/// The snapshot is taken when `propagate` is called, not when `fut` is first
/// polled.
pub fn propagate<F: Future>(fut: F) -> impl Future<Output = F::Output> {
    ScopeSnapshot::capture().scope(fut)
}
