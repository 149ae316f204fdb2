use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::state::JobStatus;

/// A single prompt in a batch, identified by a caller-chosen id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Correlation id, unique within one job.
    pub id: String,
    pub model: String,
    pub system_prompt: String,
    pub prompt: String,
    /// Provider-specific parameters (temperature, top_p, ...), passed through untouched.
    #[serde(default)]
    pub provider_args: Map<String, Value>,
}

impl BatchRequest {
    pub fn new(
        id: impl Into<String>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            system_prompt: system_prompt.into(),
            prompt: prompt.into(),
            provider_args: Map::new(),
        }
    }

    /// Adds one provider argument, builder style.
    pub fn with_arg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.provider_args.insert(key.into(), value);
        self
    }
}

/// A batch submitted to a provider and tracked in the job store.
///
/// `job_id`, `provider`, `n_requests`, `request_ids`, `submitted_at` and
/// `description` are fixed once the record is first written. Everything else
/// is refreshed from the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub job_id: String,
    pub provider: String,
    pub n_requests: usize,
    /// Original request ids in submission order, used for reconciliation.
    pub request_ids: Vec<String>,
    pub submitted_at: DateTime<Utc>,
    pub status: JobStatus,
    /// Remote handle understood only by the adapter that created it.
    pub provider_ref: Option<String>,
    pub description: Option<String>,
    /// Raw status string last reported by the provider.
    #[serde(default)]
    pub remote_status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub results_fetched_at: Option<DateTime<Utc>>,
}

impl BatchJob {
    /// Builds the initial `created` record for a request set.
    pub fn new(
        job_id: String,
        provider: String,
        requests: &[BatchRequest],
        description: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            provider,
            n_requests: requests.len(),
            request_ids: requests.iter().map(|r| r.id.clone()).collect(),
            submitted_at: now,
            status: JobStatus::Created,
            provider_ref: None,
            description,
            remote_status: None,
            error: None,
            updated_at: now,
            results_fetched_at: None,
        }
    }

    /// Generates a fresh job id for callers that do not bring their own.
    pub fn generate_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True when `other` carries the same write-once fields as `self`.
    pub fn same_identity(&self, other: &BatchJob) -> bool {
        self.job_id == other.job_id
            && self.provider == other.provider
            && self.n_requests == other.n_requests
            && self.request_ids == other.request_ids
            && self.submitted_at == other.submitted_at
            && self.description == other.description
    }
}

/// Fields an adapter or the orchestrator may refresh alongside a status change.
///
/// `None` leaves the stored value as it is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderFields {
    pub provider_ref: Option<String>,
    pub remote_status: Option<String>,
    pub error: Option<String>,
    pub results_fetched_at: Option<DateTime<Utc>>,
}

impl ProviderFields {
    pub(crate) fn apply_to(self, job: &mut BatchJob) {
        if let Some(provider_ref) = self.provider_ref {
            job.provider_ref = Some(provider_ref);
        }
        if let Some(remote_status) = self.remote_status {
            job.remote_status = Some(remote_status);
        }
        if let Some(error) = self.error {
            job.error = Some(error);
        }
        if let Some(at) = self.results_fetched_at {
            job.results_fetched_at = Some(at);
        }
    }
}

/// One reconciled result, keyed by the original request id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub custom_id: String,
    /// Provider response payload, opaque to relay.
    pub response: Option<Value>,
    /// Per-request error reported by the provider, if any.
    pub error: Option<Value>,
}

impl BatchResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.response.is_some()
    }
}

/// Output of a retrieval: reconciled results plus the requests the provider
/// returned nothing for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResults {
    pub job_id: String,
    pub results: Vec<BatchResult>,
    /// Request ids with no result, in submission order.
    pub missing: Vec<String>,
}

impl BatchResults {
    /// True when fewer results came back than requests were submitted.
    pub fn is_partial(&self) -> bool {
        !self.missing.is_empty()
    }

    pub fn get(&self, custom_id: &str) -> Option<&BatchResult> {
        self.results.iter().find(|r| r.custom_id == custom_id)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
