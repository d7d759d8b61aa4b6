//! Workflow error types

use thiserror::Error;

/// Errors raised by engine operations
///
/// Resolution misses that callers routinely probe for are reported through
/// [`crate::models::WorkflowResult`] instead; these variants cover the cases
/// that must reach an operator.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow '{0}' has no initial state")]
    MissingInitialState(String),

    #[error("command '{0}' has no next state")]
    MissingNextState(String),

    #[error("command '{0}' not found")]
    CommandNotFound(String),

    #[error("workflow '{0}' not found")]
    WorkflowNotFound(String),

    #[error("item '{0}' not found")]
    ItemNotFound(String),

    #[error("no pending operation for token {0}")]
    ContinuationNotFound(uuid::Uuid),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type EngineResult<T> = std::result::Result<T, WorkflowError>;
