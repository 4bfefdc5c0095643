//! # ContextHandler: Middleware Executor
//!
//! Holds an ordered list of providers and runs them around a terminal action.
//!
//! * **Onion order**: `p0` wraps `p1` wraps ... wraps the terminal action
//! * **Fresh chain per run**: one handler can serve concurrent invocations
//! * **Unchanged failures**: whatever a provider or the terminal returns as
//!   `Err` is what the caller of [`ContextHandler::run`] receives

use crate::middleware::{BoxFuture, Chain, ChainResult, Middleware, Provider, Terminal};
use std::future::Future;
use std::sync::Arc;
use tracing::Instrument;

pub struct ContextHandler<T> {
    providers: Arc<[Provider<T>]>,
}

impl<T> Clone for ContextHandler<T> {
    fn clone(&self) -> Self {
        Self {
            providers: self.providers.clone(),
        }
    }
}

impl<T: Send + 'static> ContextHandler<T> {
    pub fn new(providers: impl IntoIterator<Item = Provider<T>>) -> Self {
        Self {
            providers: providers.into_iter().collect(),
        }
    }

    /// Append a provider; it runs inside every provider already wired.
    pub fn wire(self, provider: impl Middleware<T>) -> Self {
        self.push(Arc::new(provider))
    }

    pub fn push(self, provider: Provider<T>) -> Self {
        let mut providers = self.providers.to_vec();
        providers.push(provider);
        Self {
            providers: providers.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Run every provider around `terminal` and resolve once the whole chain
    /// has unwound.
    ///
    /// If a provider never calls its continuation, `terminal` is dropped
    /// without running and that provider's result is returned.
    pub async fn run<F, Fut>(&self, terminal: F) -> ChainResult<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ChainResult<T>> + Send + 'static,
    {
        let terminal: Terminal<T> =
            Box::new(move || Box::pin(terminal()) as BoxFuture<'static, ChainResult<T>>);
        let chain = Chain::new(self.providers.clone(), terminal);

        chain
            .start()
            .instrument(tracing::info_span!(
                "ContextChain",
                tether.providers = self.providers.len()
            ))
            .await
    }

    /// Run the providers with a terminal action that does nothing.
    pub async fn run_providers(&self) -> ChainResult<T>
    where
        T: Default,
    {
        self.run(|| async { Ok(T::default()) }).await
    }
}

impl<T> std::fmt::Debug for ContextHandler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandler")
            .field("providers", &self.providers.len())
            .finish()
    }
}

/// Build a handler from an ordered list of providers.
pub fn with_context<T, I>(providers: I) -> ContextHandler<T>
where
    T: Send + 'static,
    I: IntoIterator<Item = Provider<T>>,
{
    ContextHandler::new(providers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{from_fn, Next};
    use parking_lot::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn logging(log: &Log, label: &'static str) -> Provider<()> {
        let log = log.clone();
        from_fn(move |next: Next<()>| {
            let log = log.clone();
            async move {
                log.lock().push(format!("{label}:in"));
                let result = next.run().await;
                log.lock().push(format!("{label}:out"));
                result
            }
        })
    }

    #[tokio::test]
    async fn test_wire_appends_innermost() {
        let log: Log = Arc::default();
        let handler = with_context(vec![logging(&log, "a")]).push(logging(&log, "b"));
        assert_eq!(handler.len(), 2);

        let terminal_log = log.clone();
        handler
            .run(move || async move {
                terminal_log.lock().push("terminal".into());
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(
            *log.lock(),
            vec!["a:in", "b:in", "terminal", "b:out", "a:out"]
        );
    }

    #[tokio::test]
    async fn test_run_providers_without_terminal() {
        let log: Log = Arc::default();
        let handler = with_context(vec![logging(&log, "only")]);

        handler.run_providers().await.unwrap();
        assert_eq!(*log.lock(), vec!["only:in", "only:out"]);
    }

    #[tokio::test]
    async fn test_empty_handler_is_noop() {
        let handler: ContextHandler<u8> = with_context(Vec::new());
        assert!(handler.is_empty());
        assert_eq!(handler.run_providers().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_handler_is_reusable() {
        let handler = ContextHandler::<u32>::new(Vec::new()).wire(|next: Next<u32>| async move {
            Ok(next.run().await? * 2)
        });

        assert_eq!(handler.run(|| async { Ok(2) }).await.unwrap(), 4);
        assert_eq!(handler.run(|| async { Ok(5) }).await.unwrap(), 10);
    }
}
