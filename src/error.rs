use thiserror::Error;

use crate::provider::ProviderError;
use crate::state_machine::JobStatus;

pub type Result<T, E = RelayError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Bad request set or job id, rejected before any I/O.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Job id already exists: {0}")]
    DuplicateJobId(String),

    #[error("Provider rejected job {job_id}: {source}")]
    Submission {
        job_id: String,
        #[source]
        source: ProviderError,
    },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Corrupt record for job {job_id}: {reason}")]
    CorruptRecord { job_id: String, reason: String },

    #[error("Results not ready for job {job_id} (status: {status})")]
    ResultsNotReady { job_id: String, status: JobStatus },

    #[error("Reconciliation error: {0}")]
    Reconciliation(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}
