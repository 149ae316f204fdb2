//! Error type shared by all provider adapters.
//!
//! The first four variants are the adapter contract; the rest describe the
//! HTTP layer underneath and are classified with [`ProviderError::is_transient`]
//! when they surface from a poll.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Malformed request set or payload refused by the provider.
    #[error("submission rejected: {0}")]
    Submission(String),

    /// Polling failed in a way that may succeed later.
    #[error("transient poll failure: {0}")]
    TransientPoll(String),

    /// The remote job is gone or no longer accessible.
    #[error("permanent poll failure: {0}")]
    PermanentPoll(String),

    /// Results were requested before the remote job finished successfully.
    #[error("results unavailable: {0}")]
    ResultsUnavailable(String),

    /// HTTP 429.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Any other non-success HTTP status.
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("failed to parse provider response: {0}")]
    Parse(String),
}

impl ProviderError {
    /// Whether a poll that failed with this error should simply be retried
    /// later rather than failing the job.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::TransientPoll(_)
            | ProviderError::RateLimited { .. }
            | ProviderError::Network(_)
            | ProviderError::Parse(_) => true,
            ProviderError::ApiError { status, .. } => *status == 408 || *status >= 500,
            ProviderError::Submission(_)
            | ProviderError::PermanentPoll(_)
            | ProviderError::ResultsUnavailable(_) => false,
        }
    }

    /// Folds an HTTP-layer failure into the poll contract.
    pub fn into_poll_error(self) -> ProviderError {
        match self {
            ProviderError::TransientPoll(_) | ProviderError::PermanentPoll(_) => self,
            other if other.is_transient() => ProviderError::TransientPoll(other.to_string()),
            other => ProviderError::PermanentPoll(other.to_string()),
        }
    }

    /// Folds an HTTP-layer failure into the submission contract.
    pub fn into_submission_error(self) -> ProviderError {
        match self {
            ProviderError::Submission(_) => self,
            other => ProviderError::Submission(other.to_string()),
        }
    }
}
