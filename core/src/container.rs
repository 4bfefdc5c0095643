use crate::error::ContextError;
use crate::key::{ContextSchema, DeclaredContext, Dynamic, Key};
use crate::name::ContextName;
use crate::scope::{ScopeHandle, ScopeLookup};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

/// Result of a read that distinguishes "no scope" from "no value".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    /// No scope for this context is active on the calling task.
    NoScope,
    /// A scope is active but the key holds nothing of the requested type.
    Unset,
    Value(T),
}

impl<T> Lookup<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Value(value) => Some(value),
            Lookup::NoScope | Lookup::Unset => None,
        }
    }

    pub fn is_no_scope(&self) -> bool {
        matches!(self, Lookup::NoScope)
    }
}

/// Typed accessors over one named context.
///
/// A container holds no values itself. Every call resolves against the scope
/// that is active for its name on the *calling* task, so one container can be
/// shared by any number of concurrent requests.
pub struct ContextContainer<S: ContextSchema = Dynamic> {
    name: ContextName,
    scopes: Arc<dyn ScopeLookup>,
    _schema: PhantomData<fn() -> S>,
}

impl<S: ContextSchema> Clone for ContextContainer<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            scopes: self.scopes.clone(),
            _schema: PhantomData,
        }
    }
}

impl ContextContainer<Dynamic> {
    pub fn new(name: impl Into<ContextName>, scopes: Arc<dyn ScopeLookup>) -> Self {
        Self {
            name: name.into(),
            scopes,
            _schema: PhantomData,
        }
    }

    /// View this container through a declared schema.
    ///
    /// Returns `None` when `S::NAME` is not this container's name.
    pub fn with_schema<S: DeclaredContext>(&self) -> Option<ContextContainer<S>> {
        (self.name == S::NAME).then(|| ContextContainer {
            name: self.name.clone(),
            scopes: self.scopes.clone(),
            _schema: PhantomData,
        })
    }
}

impl<S: DeclaredContext> ContextContainer<S> {
    /// Container for a declared schema, named after `S::NAME`.
    pub fn declared(scopes: Arc<dyn ScopeLookup>) -> Self {
        Self {
            name: ContextName::new(S::NAME),
            scopes,
            _schema: PhantomData,
        }
    }
}

impl<S: ContextSchema> ContextContainer<S> {
    pub fn name(&self) -> &ContextName {
        &self.name
    }

    /// The scope active for this context on the calling task.
    pub fn scope(&self) -> Option<ScopeHandle> {
        self.scopes.active(self.name.as_str())
    }

    pub fn is_active(&self) -> bool {
        self.scope().is_some()
    }

    pub fn scope_id(&self) -> Option<Uuid> {
        self.scope().map(|scope| scope.id())
    }

    /// Read `key`. Both "no active scope" and "never set" read as `None`;
    /// use [`lookup`](Self::lookup) to tell them apart.
    pub fn get<T>(&self, key: &Key<T, S>) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.lookup(key).into_option()
    }

    pub fn lookup<T>(&self, key: &Key<T, S>) -> Lookup<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        match self.scope() {
            None => Lookup::NoScope,
            Some(scope) => scope
                .get(key.name())
                .map_or(Lookup::Unset, Lookup::Value),
        }
    }

    pub fn try_get<T>(&self, key: &Key<T, S>) -> Result<Option<T>, ContextError>
    where
        T: Clone + Send + Sync + 'static,
    {
        Ok(self.require_scope()?.get(key.name()))
    }

    /// Write `key` in the active scope, returning the previous value.
    ///
    /// Without an active scope nothing is written and `NoActiveScope` is
    /// returned.
    pub fn set<T>(&self, key: &Key<T, S>, value: T) -> Result<Option<T>, ContextError>
    where
        T: Send + Sync + 'static,
    {
        Ok(self.require_scope()?.set(key.name(), value))
    }

    /// Mutate the value under `key` in place. `Ok(None)` if the key is unset.
    pub fn update<T, R>(
        &self,
        key: &Key<T, S>,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<Option<R>, ContextError>
    where
        T: Send + Sync + 'static,
    {
        Ok(self.require_scope()?.update(key.name(), f))
    }

    pub fn remove<T>(&self, key: &Key<T, S>) -> Result<Option<T>, ContextError>
    where
        T: Send + Sync + 'static,
    {
        Ok(self.require_scope()?.remove(key.name()))
    }

    /// Whether `key` holds a value of its own type in the active scope.
    pub fn contains<T: 'static>(&self, key: &Key<T, S>) -> bool {
        self.scope()
            .is_some_and(|scope| scope.contains::<T>(key.name()))
    }

    /// Drop the schema and accept [`Dynamic`] keys.
    pub fn untyped(&self) -> ContextContainer<Dynamic> {
        ContextContainer {
            name: self.name.clone(),
            scopes: self.scopes.clone(),
            _schema: PhantomData,
        }
    }

    fn require_scope(&self) -> Result<ScopeHandle, ContextError> {
        self.scope().ok_or_else(|| ContextError::NoActiveScope {
            context: self.name.clone(),
        })
    }
}

impl<S: ContextSchema> fmt::Debug for ContextContainer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextContainer")
            .field("name", &self.name)
            .field("schema", &std::any::type_name::<S>())
            .field("scope", &self.scope_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{ScopeStore, TaskScopes};
    use futures_util::future::join_all;
    use std::time::Duration;

    const ID: Key<String> = Key::new("id");
    const HITS: Key<u32> = Key::new("hits");

    enum Tenant {}
    impl ContextSchema for Tenant {}
    impl DeclaredContext for Tenant {
        const NAME: &'static str = "tenant";
    }
    const TENANT_ID: Key<u64, Tenant> = Key::new("tenant_id");

    fn setup(name: &str) -> (Arc<TaskScopes>, ContextContainer) {
        let store = Arc::new(TaskScopes::new());
        store.create_namespace(&name.into());
        let container = ContextContainer::new(name, store.clone() as Arc<dyn ScopeLookup>);
        (store, container)
    }

    #[test]
    fn test_absent_outside_scope() {
        let (_store, ctx) = setup("req");

        assert_eq!(ctx.get(&ID), None);
        assert!(ctx.lookup(&ID).is_no_scope());
        let err = ctx.set(&ID, "abc".into()).unwrap_err();
        assert_eq!(
            err,
            ContextError::NoActiveScope {
                context: "req".into()
            }
        );
        assert_eq!(err.context(), "req");
        assert!(ctx.try_get(&ID).is_err());
        assert!(!ctx.is_active());
    }

    #[tokio::test]
    async fn test_round_trip_inside_scope() {
        let (store, ctx) = setup("req");
        let scope = store.open(&"req".into()).unwrap();

        store
            .run_bound(scope, async {
                assert_eq!(ctx.lookup(&ID), Lookup::Unset);
                assert!(!ctx.lookup(&ID).is_no_scope());
                assert_eq!(ctx.set(&ID, "abc".into()), Ok(None));
                assert_eq!(ctx.get(&ID), Some("abc".to_string()));
                assert_eq!(ctx.try_get(&ID), Ok(Some("abc".to_string())));

                ctx.set(&HITS, 1).unwrap();
                assert_eq!(ctx.update(&HITS, |n| *n += 1), Ok(Some(())));
                assert_eq!(ctx.get(&HITS), Some(2));
                assert_eq!(ctx.remove(&HITS), Ok(Some(2)));
                assert!(!ctx.contains(&HITS));

                let id_as_number = Key::<u32>::new("id");
                assert!(ctx.contains(&ID));
                assert!(!ctx.contains(&id_as_number));
                assert_eq!(ctx.get(&id_as_number), None);
            })
            .await;
    }

    #[tokio::test]
    async fn test_concurrent_scopes_are_isolated() {
        let (store, ctx) = setup("req");

        let runs = (0..8u32).map(|i| {
            let store = store.clone();
            let ctx = ctx.clone();
            async move {
                let scope = store.open(&"req".into()).unwrap();
                store
                    .run_bound(scope, async {
                        ctx.set(&ID, format!("req-{i}")).unwrap();
                        tokio::time::sleep(Duration::from_millis(u64::from(8 - i))).await;
                        ctx.get(&ID)
                    })
                    .await
            }
        });

        let seen = join_all(runs).await;
        for (i, id) in seen.into_iter().enumerate() {
            assert_eq!(id, Some(format!("req-{i}")));
        }
    }

    #[tokio::test]
    async fn test_schema_view() {
        let (store, ctx) = setup("tenant");
        assert!(ctx.with_schema::<Tenant>().is_some());

        let tenant = ctx.with_schema::<Tenant>().unwrap();
        let scope = store.open(&"tenant".into()).unwrap();
        store
            .run_bound(scope, async {
                tenant.set(&TENANT_ID, 42).unwrap();
                assert_eq!(tenant.get(&TENANT_ID), Some(42));
                assert_eq!(tenant.untyped().get(&Key::<u64>::new("tenant_id")), Some(42));
            })
            .await;

        let (_other, req) = setup("req");
        assert!(req.with_schema::<Tenant>().is_none());
    }
}
