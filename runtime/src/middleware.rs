//! # Middleware: Continuation-Passing Providers
//!
//! A provider receives a [`Next`] continuation and decides whether, when and
//! how often to run it. Providers compose into an onion: work before
//! `next.run()` happens on the way in (list order), work after it happens on
//! the way out (reverse order).
//!
//! A [`Chain`] is assembled once per handler run, so concurrent runs never
//! share continuation state.

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Type alias for async boxed futures used in chain execution.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of a provider, the terminal action, or a whole chain.
///
/// Failures travel as `anyhow::Error` so the original error can be recovered
/// at the call site with `downcast_ref`.
pub type ChainResult<T> = anyhow::Result<T>;

/// Shared provider handle, as stored in a handler.
pub type Provider<T> = Arc<dyn Middleware<T>>;

pub(crate) type Terminal<T> = Box<dyn FnOnce() -> BoxFuture<'static, ChainResult<T>> + Send>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("terminal action already ran for this invocation")]
    TerminalConsumed,
}

/// A chain-composable unit.
pub trait Middleware<T>: Send + Sync + 'static {
    fn handle(&self, next: Next<T>) -> BoxFuture<'static, ChainResult<T>>;
}

impl<T, F, Fut> Middleware<T> for F
where
    T: Send + 'static,
    F: Fn(Next<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ChainResult<T>> + Send + 'static,
{
    fn handle(&self, next: Next<T>) -> BoxFuture<'static, ChainResult<T>> {
        Box::pin(self(next))
    }
}

/// Wrap an async closure as a [`Provider`].
///
/// Mostly a type-inference aid: `from_fn(|next| async move { next.run().await })`.
pub fn from_fn<T, F, Fut>(f: F) -> Provider<T>
where
    T: Send + 'static,
    F: Fn(Next<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ChainResult<T>> + Send + 'static,
{
    Arc::new(f)
}

/// The providers and terminal action of one invocation.
pub(crate) struct Chain<T> {
    providers: Arc<[Provider<T>]>,
    terminal: Mutex<Option<Terminal<T>>>,
}

impl<T: Send + 'static> Chain<T> {
    pub(crate) fn new(providers: Arc<[Provider<T>]>, terminal: Terminal<T>) -> Arc<Self> {
        Arc::new(Self {
            providers,
            terminal: Mutex::new(Some(terminal)),
        })
    }

    pub(crate) fn start(self: Arc<Self>) -> BoxFuture<'static, ChainResult<T>> {
        self.dispatch(0)
    }

    fn dispatch(self: Arc<Self>, index: usize) -> BoxFuture<'static, ChainResult<T>> {
        match self.providers.get(index).cloned() {
            Some(provider) => {
                tracing::trace!(tether.step = index, "entering provider");
                provider.handle(Next { chain: self, index: index + 1 })
            }
            None => {
                let terminal = self.terminal.lock().take();
                match terminal {
                    Some(terminal) => {
                        tracing::trace!(tether.step = index, "entering terminal action");
                        terminal()
                    }
                    None => Box::pin(std::future::ready(Err(ChainError::TerminalConsumed.into()))),
                }
            }
        }
    }
}

/// Continuation handed to a provider: "the rest of the chain".
///
/// Running it again re-runs the providers after this slot, never the ones
/// before it. The terminal action runs at most once per invocation; reaching
/// it a second time fails with [`ChainError::TerminalConsumed`].
pub struct Next<T> {
    chain: Arc<Chain<T>>,
    index: usize,
}

impl<T> Clone for Next<T> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            index: self.index,
        }
    }
}

impl<T: Send + 'static> Next<T> {
    pub fn run(&self) -> BoxFuture<'static, ChainResult<T>> {
        self.chain.clone().dispatch(self.index)
    }

    /// Slot this continuation resumes at; equals the provider count when only
    /// the terminal action is left.
    pub fn position(&self) -> usize {
        self.index
    }

    /// Providers still ahead of the terminal action.
    pub fn remaining(&self) -> usize {
        self.chain.providers.len().saturating_sub(self.index)
    }
}

impl<T> std::fmt::Debug for Next<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("providers", &self.chain.providers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terminal(value: u32) -> Terminal<u32> {
        Box::new(move || Box::pin(async move { Ok(value) }))
    }

    #[tokio::test]
    async fn test_empty_chain_runs_terminal() {
        let chain = Chain::new(Arc::from(Vec::<Provider<u32>>::new()), terminal(7));
        assert_eq!(chain.start().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_provider_sees_position() {
        let first = from_fn(|next: Next<u32>| async move {
            assert_eq!(next.position(), 1);
            assert_eq!(next.remaining(), 1);
            next.run().await
        });
        let second = from_fn(|next: Next<u32>| async move {
            assert_eq!(next.remaining(), 0);
            Ok(next.run().await? + 1)
        });

        let chain = Chain::new(Arc::from(vec![first, second]), terminal(1));
        assert_eq!(chain.start().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_terminal_runs_at_most_once() {
        let twice = from_fn(|next: Next<u32>| async move {
            let first = next.run().await?;
            match next.run().await {
                Err(e) => {
                    assert_eq!(e.downcast_ref::<ChainError>(), Some(&ChainError::TerminalConsumed));
                    Ok(first)
                }
                Ok(_) => panic!("terminal ran twice"),
            }
        });

        let chain = Chain::new(Arc::from(vec![twice]), terminal(3));
        assert_eq!(chain.start().await.unwrap(), 3);
    }
}
