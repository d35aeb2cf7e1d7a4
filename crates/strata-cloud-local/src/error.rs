//! Local provider error types

use strata_cloud::ProviderError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocalError {
    #[error("{kind} '{id}' requires input '{input}'")]
    MissingInput {
        kind: String,
        id: String,
        input: &'static str,
    },

    #[error("input '{input}' is invalid: {reason}")]
    InvalidInput { input: String, reason: String },

    #[error("input '{input}' cannot change once created (was {was}, now {now})")]
    Immutable {
        input: &'static str,
        was: String,
        now: String,
    },

    #[error("{0}")]
    Injected(String),

    #[error("simulated outage: {0}")]
    Unavailable(String),
}

impl From<LocalError> for ProviderError {
    fn from(error: LocalError) -> Self {
        match error {
            LocalError::Unavailable(_) => ProviderError::retryable(error.to_string()),
            other => ProviderError::new(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, LocalError>;
