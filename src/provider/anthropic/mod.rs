//! Anthropic Message Batches adapter.
//!
//! Requests are sent inline (no file upload). The message batch id is the
//! `provider_ref`; results are streamed from the batch's `results_url`.

pub mod client;
pub mod types;

use serde_json::{Value, json};

pub use client::AnthropicAdapter;

use crate::provider::{ModelDefaults, ProviderError, RawResult};
use crate::state_machine::{BatchRequest, RemoteState, RemoteStatus};
use types::{BatchRequestItem, Message, ResultLine};

pub const PROVIDER_NAME: &str = "anthropic";

const MAX_CUSTOM_ID_LEN: usize = 64;

fn valid_custom_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_CUSTOM_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Converts generic requests into batch items.
///
/// Fails before any network call if an id does not fit Anthropic's
/// `custom_id` format (`[A-Za-z0-9_-]{1,64}`).
pub fn build_batch_items(
    requests: &[BatchRequest],
    defaults: &ModelDefaults,
) -> Result<Vec<BatchRequestItem>, ProviderError> {
    if requests.is_empty() {
        return Err(ProviderError::Submission("empty request set".into()));
    }

    requests
        .iter()
        .map(|req| {
            if !valid_custom_id(&req.id) {
                return Err(ProviderError::Submission(format!(
                    "request id {:?} is not a valid anthropic custom_id",
                    req.id
                )));
            }
            if req.model.trim().is_empty() {
                return Err(ProviderError::Submission(format!(
                    "request {} has no model",
                    req.id
                )));
            }

            let mut params = defaults.merged_args(req);
            params.insert("model".into(), Value::String(req.model.clone()));
            params
                .entry("max_tokens")
                .or_insert_with(|| json!(defaults.max_tokens));
            if !req.system_prompt.is_empty() {
                params.insert("system".into(), Value::String(req.system_prompt.clone()));
            }
            let messages = vec![Message {
                role: "user".into(),
                content: req.prompt.clone(),
            }];
            params.insert("messages".into(), json!(messages));

            Ok(BatchRequestItem {
                custom_id: req.id.clone(),
                params,
            })
        })
        .collect()
}

/// Maps `processing_status` onto the generic lifecycle.
pub fn map_status(processing_status: &str) -> Result<RemoteStatus, ProviderError> {
    let state = match processing_status {
        "in_progress" => RemoteState::InProgress,
        "canceling" => RemoteState::Finalizing,
        "ended" => RemoteState::Completed,
        other => {
            return Err(ProviderError::TransientPoll(format!(
                "unrecognized processing status: {other}"
            )));
        }
    };
    Ok(RemoteStatus::new(state, processing_status))
}

/// Splits a result line into a response or an error.
pub fn to_raw_result(line: ResultLine) -> RawResult {
    let ResultLine { custom_id, result } = line;
    match result.result_type.as_str() {
        "succeeded" => RawResult {
            custom_id,
            response: result.message,
            error: None,
        },
        other => RawResult {
            custom_id,
            response: None,
            error: Some(result.error.unwrap_or_else(|| json!({ "type": other }))),
        },
    }
}
