use crate::name::ContextName;
use thiserror::Error;

/// Recoverable conditions raised by context access.
///
/// None of these abort a chain by themselves. Middleware decides whether to
/// branch on them or lift them into the chain's failure with `?`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("no active scope for context `{context}`")]
    NoActiveScope { context: ContextName },
    #[error("context `{context}` has not been created")]
    UnknownContext { context: ContextName },
}

impl ContextError {
    pub fn context(&self) -> &ContextName {
        match self {
            ContextError::NoActiveScope { context } => context,
            ContextError::UnknownContext { context } => context,
        }
    }
}
