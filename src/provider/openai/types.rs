//! Wire types for the OpenAI Files and Batch endpoints.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One line of the uploaded JSONL input file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchLine {
    pub custom_id: String,
    pub method: String,
    pub url: String,
    pub body: Map<String, Value>,
}

/// Response of `POST /files`.
#[derive(Debug, Clone, Deserialize)]
pub struct FileObject {
    pub id: String,
}

/// Body of `POST /batches`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateBatchRequest {
    pub input_file_id: String,
    pub endpoint: String,
    pub completion_window: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// Batch object returned by create and retrieve.
#[derive(Debug, Clone, Deserialize)]
pub struct Batch {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub output_file_id: Option<String>,
    #[serde(default)]
    pub error_file_id: Option<String>,
    #[serde(default)]
    pub errors: Option<BatchErrors>,
}

impl Batch {
    /// First batch-level error message, if the provider gave one.
    pub fn first_error(&self) -> Option<String> {
        self.errors
            .as_ref()
            .and_then(|e| e.data.first())
            .map(|item| match (&item.code, &item.message) {
                (Some(code), Some(message)) => format!("{code}: {message}"),
                (None, Some(message)) => message.clone(),
                (Some(code), None) => code.clone(),
                (None, None) => "unknown error".to_string(),
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchErrors {
    #[serde(default)]
    pub data: Vec<BatchErrorItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchErrorItem {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// One line of an output or error file.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputLine {
    pub custom_id: String,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}
