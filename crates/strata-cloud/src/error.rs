//! Engine error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine errors
///
/// Graph errors (missing references, cycles) surface as
/// [`CloudError::Config`] and are raised before any provider call.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error(transparent)]
    Config(#[from] strata_core::FlowError),

    #[error("no provider registered for resource kind '{0}'")]
    ProviderNotFound(String),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("output '{name}' is unavailable: {reason}")]
    UnavailableOutput { name: String, reason: String },

    #[error("worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure reported by a provider's create, update or delete call
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,

    /// Whether repeating the same call may succeed
    pub retryable: bool,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;
