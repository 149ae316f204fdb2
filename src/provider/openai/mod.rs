//! OpenAI Batch API adapter.
//!
//! Requests become JSONL lines against the Responses endpoint, uploaded as a
//! `purpose=batch` file and referenced from a batch object. The batch id is
//! the `provider_ref`.

pub mod client;
pub mod types;

use std::collections::BTreeMap;

use serde_json::Value;

pub use client::OpenAiAdapter;

use crate::provider::{ModelDefaults, ProviderError};
use crate::state_machine::{BatchRequest, RemoteState, RemoteStatus};
use types::BatchLine;

pub const PROVIDER_NAME: &str = "openai";

/// Endpoint every line is sent to.
pub const BATCH_ENDPOINT: &str = "/v1/responses";

/// Converts generic requests into batch input lines.
pub fn build_batch_lines(
    requests: &[BatchRequest],
    defaults: &ModelDefaults,
) -> Result<Vec<BatchLine>, ProviderError> {
    if requests.is_empty() {
        return Err(ProviderError::Submission("empty request set".into()));
    }

    requests
        .iter()
        .map(|req| {
            if req.model.trim().is_empty() {
                return Err(ProviderError::Submission(format!(
                    "request {} has no model",
                    req.id
                )));
            }
            let mut body = defaults.merged_args(req);
            body.insert("model".into(), Value::String(req.model.clone()));
            if !req.system_prompt.is_empty() {
                body.insert(
                    "instructions".into(),
                    Value::String(req.system_prompt.clone()),
                );
            }
            body.insert("input".into(), Value::String(req.prompt.clone()));
            Ok(BatchLine {
                custom_id: req.id.clone(),
                method: "POST".into(),
                url: BATCH_ENDPOINT.into(),
                body,
            })
        })
        .collect()
}

/// OpenAI rejects a batch whose metadata values exceed this many characters.
pub const MAX_METADATA_VALUE_CHARS: usize = 512;

/// Batch metadata with every value cut to [`MAX_METADATA_VALUE_CHARS`].
pub fn batch_metadata(metadata: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    metadata
        .iter()
        .map(|(key, value)| {
            let value = match value.char_indices().nth(MAX_METADATA_VALUE_CHARS) {
                Some((cut, _)) => value[..cut].to_string(),
                None => value.clone(),
            };
            (key.clone(), value)
        })
        .collect()
}

/// Serializes lines into the uploaded file body.
pub fn to_jsonl(lines: &[BatchLine]) -> Result<String, ProviderError> {
    let mut out = String::new();
    for line in lines {
        let text = serde_json::to_string(line)
            .map_err(|e| ProviderError::Submission(format!("unserializable request: {e}")))?;
        out.push_str(&text);
        out.push('\n');
    }
    Ok(out)
}

/// Maps an OpenAI batch status string onto the generic lifecycle.
pub fn map_status(status: &str, error: Option<String>) -> Result<RemoteStatus, ProviderError> {
    let state = match status {
        "validating" => RemoteState::Validating,
        "in_progress" => RemoteState::InProgress,
        "finalizing" | "cancelling" => RemoteState::Finalizing,
        "completed" => RemoteState::Completed,
        "failed" | "expired" | "cancelled" => {
            RemoteState::Failed(error.unwrap_or_else(|| format!("batch {status}")))
        }
        other => {
            return Err(ProviderError::TransientPoll(format!(
                "unrecognized batch status: {other}"
            )));
        }
    };
    Ok(RemoteStatus::new(state, status))
}
