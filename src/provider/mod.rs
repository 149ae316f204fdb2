//! Provider adapters: one implementation per batch API behind a single trait.
//!
//! The orchestrator only ever talks to [`ProviderAdapter`]; payload shapes,
//! status vocabularies and result encodings stay inside each adapter module.

pub mod anthropic;
pub mod error;
pub mod openai;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::state_machine::{BatchRequest, RemoteStatus};

pub use anthropic::AnthropicAdapter;
pub use error::ProviderError;
pub use openai::OpenAiAdapter;

/// Raw output for one request as returned by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    /// Provider correlation id; relay always sets it to the request id.
    pub custom_id: String,
    pub response: Option<Value>,
    pub error: Option<Value>,
}

/// Defaults applied to every request of a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDefaults {
    /// Completion window for providers that take one.
    #[serde(default = "default_completion_window")]
    pub completion_window: String,

    /// Used when a provider requires `max_tokens` and the request has none.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Body parameters merged under each request's `provider_args`.
    #[serde(default)]
    pub params: Map<String, Value>,

    /// Batch-level metadata for providers that support it.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

fn default_completion_window() -> String {
    "24h".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self {
            completion_window: default_completion_window(),
            max_tokens: default_max_tokens(),
            params: Map::new(),
            metadata: BTreeMap::new(),
        }
    }
}

impl ModelDefaults {
    /// Request body parameters: defaults first, then the request's own args.
    pub fn merged_args(&self, request: &BatchRequest) -> Map<String, Value> {
        let mut args = self.params.clone();
        for (key, value) in &request.provider_args {
            args.insert(key.clone(), value.clone());
        }
        args
    }
}

/// Contract every batch provider implements.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Registry key, stored on every job this adapter submits.
    fn name(&self) -> &str;

    /// Builds and submits the provider payload, returning the remote handle.
    async fn submit(
        &self,
        requests: &[BatchRequest],
        defaults: &ModelDefaults,
    ) -> Result<String, ProviderError>;

    /// Fetches the current remote status. Errors are either
    /// [`ProviderError::TransientPoll`] or [`ProviderError::PermanentPoll`].
    async fn poll(&self, provider_ref: &str) -> Result<RemoteStatus, ProviderError>;

    /// Downloads raw results of a successfully finished remote job.
    async fn fetch_results(&self, provider_ref: &str) -> Result<Vec<RawResult>, ProviderError>;
}

/// Adapters addressable by name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under its own name, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("adapters", &self.names())
            .finish()
    }
}

pub(crate) fn http_client() -> Result<Client, ProviderError> {
    let client = Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(120))
        .build()?;
    Ok(client)
}

/// Maps non-success statuses to [`ProviderError`]; passes successes through.
pub(crate) async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|secs| secs.saturating_mul(1000))
            .unwrap_or(1000);
        return Err(ProviderError::RateLimited {
            retry_after_ms: retry_after,
        });
    }

    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        return Err(ProviderError::ApiError {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response)
}

/// Parses a JSON Lines body, skipping blank lines.
pub(crate) fn parse_jsonl<T: serde::de::DeserializeOwned>(body: &str) -> Result<Vec<T>, ProviderError> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(i, line)| {
            serde_json::from_str(line)
                .map_err(|e| ProviderError::Parse(format!("line {}: {e}", i + 1)))
        })
        .collect()
}
