use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use tracing::{debug, info};

use super::types::{Batch, CreateBatchRequest, FileObject, OutputLine};
use super::{
    BATCH_ENDPOINT, PROVIDER_NAME, batch_metadata, build_batch_lines, map_status, to_jsonl,
};
use crate::provider::{
    ModelDefaults, ProviderAdapter, ProviderError, RawResult, check_status, http_client,
    parse_jsonl,
};
use crate::state_machine::{BatchRequest, RemoteStatus};

const API_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiAdapter {
    api_key: String,
    client: Client,
    base_url: String,
}

impl OpenAiAdapter {
    pub fn new(api_key: String) -> Result<Self, ProviderError> {
        Self::with_base_url(api_key, API_URL.to_string())
    }

    /// Create an adapter pointing at a custom base URL (useful for testing).
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, ProviderError> {
        Ok(Self {
            api_key,
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn upload_file(&self, jsonl: String) -> Result<FileObject, ProviderError> {
        let part = Part::bytes(jsonl.into_bytes())
            .file_name("relay-batch.jsonl")
            .mime_str("application/jsonl")?;
        let form = Form::new().text("purpose", "batch").part("file", part);

        let response = self
            .client
            .post(format!("{}/files", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        let file = check_status(response).await?.json::<FileObject>().await?;
        Ok(file)
    }

    async fn create_batch(&self, req: &CreateBatchRequest) -> Result<Batch, ProviderError> {
        let response = self
            .client
            .post(format!("{}/batches", self.base_url))
            .bearer_auth(&self.api_key)
            .json(req)
            .send()
            .await?;
        let batch = check_status(response).await?.json::<Batch>().await?;
        Ok(batch)
    }

    async fn retrieve_batch(&self, batch_id: &str) -> Result<Batch, ProviderError> {
        let response = self
            .client
            .get(format!("{}/batches/{batch_id}", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let batch = check_status(response).await?.json::<Batch>().await?;
        Ok(batch)
    }

    async fn file_content(&self, file_id: &str) -> Result<String, ProviderError> {
        let response = self
            .client
            .get(format!("{}/files/{file_id}/content", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let body = check_status(response).await?.text().await?;
        Ok(body)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn submit(
        &self,
        requests: &[BatchRequest],
        defaults: &ModelDefaults,
    ) -> Result<String, ProviderError> {
        let lines = build_batch_lines(requests, defaults)?;
        let jsonl = to_jsonl(&lines)?;

        let file = self
            .upload_file(jsonl)
            .await
            .map_err(ProviderError::into_submission_error)?;
        debug!(file_id = %file.id, lines = lines.len(), "uploaded batch input file");

        let batch = self
            .create_batch(&CreateBatchRequest {
                input_file_id: file.id,
                endpoint: BATCH_ENDPOINT.to_string(),
                completion_window: defaults.completion_window.clone(),
                metadata: batch_metadata(&defaults.metadata),
            })
            .await
            .map_err(ProviderError::into_submission_error)?;
        info!(batch_id = %batch.id, status = %batch.status, "created openai batch");

        Ok(batch.id)
    }

    async fn poll(&self, provider_ref: &str) -> Result<RemoteStatus, ProviderError> {
        let batch = self
            .retrieve_batch(provider_ref)
            .await
            .map_err(ProviderError::into_poll_error)?;
        map_status(&batch.status, batch.first_error())
    }

    async fn fetch_results(&self, provider_ref: &str) -> Result<Vec<RawResult>, ProviderError> {
        let batch = self.retrieve_batch(provider_ref).await?;
        if batch.status != "completed" {
            return Err(ProviderError::ResultsUnavailable(format!(
                "batch {provider_ref} is {}",
                batch.status
            )));
        }

        let mut results = Vec::new();
        // The error file holds lines for requests that failed individually.
        for file_id in [&batch.output_file_id, &batch.error_file_id]
            .into_iter()
            .flatten()
        {
            let body = self.file_content(file_id).await?;
            let lines: Vec<OutputLine> = parse_jsonl(&body)?;
            results.extend(lines.into_iter().map(|line| RawResult {
                custom_id: line.custom_id,
                response: line.response,
                error: line.error,
            }));
        }
        debug!(batch_id = %provider_ref, results = results.len(), "downloaded openai results");
        Ok(results)
    }
}
