use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use tracing::{debug, info};

use super::types::{CreateBatchRequest, MessageBatch, ResultLine};
use super::{PROVIDER_NAME, build_batch_items, map_status, to_raw_result};
use crate::provider::{
    ModelDefaults, ProviderAdapter, ProviderError, RawResult, check_status, http_client,
    parse_jsonl,
};
use crate::state_machine::{BatchRequest, RemoteStatus};

const API_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicAdapter {
    api_key: String,
    client: Client,
    base_url: String,
}

impl AnthropicAdapter {
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

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
    }

    async fn retrieve_batch(&self, batch_id: &str) -> Result<MessageBatch, ProviderError> {
        let url = format!("{}/messages/batches/{batch_id}", self.base_url);
        let response = self.authed(self.client.get(url)).send().await?;
        let batch = check_status(response).await?.json::<MessageBatch>().await?;
        Ok(batch)
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn submit(
        &self,
        requests: &[BatchRequest],
        defaults: &ModelDefaults,
    ) -> Result<String, ProviderError> {
        let body = CreateBatchRequest {
            requests: build_batch_items(requests, defaults)?,
        };

        let url = format!("{}/messages/batches", self.base_url);
        let send = async {
            let response = self
                .authed(self.client.post(url))
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await?;
            let batch = check_status(response).await?.json::<MessageBatch>().await?;
            Ok::<_, ProviderError>(batch)
        };
        let batch = send.await.map_err(ProviderError::into_submission_error)?;
        info!(batch_id = %batch.id, status = %batch.processing_status, "created anthropic message batch");

        Ok(batch.id)
    }

    async fn poll(&self, provider_ref: &str) -> Result<RemoteStatus, ProviderError> {
        let batch = self
            .retrieve_batch(provider_ref)
            .await
            .map_err(ProviderError::into_poll_error)?;
        if batch.processing_status == "ended" {
            let counts = batch.request_counts.clone().unwrap_or_default();
            info!(
                batch_id = %batch.id,
                succeeded = counts.succeeded,
                errored = counts.errored,
                canceled = counts.canceled,
                expired = counts.expired,
                "anthropic message batch ended"
            );
        }
        map_status(&batch.processing_status)
    }

    async fn fetch_results(&self, provider_ref: &str) -> Result<Vec<RawResult>, ProviderError> {
        let batch = self.retrieve_batch(provider_ref).await?;
        if batch.processing_status != "ended" {
            return Err(ProviderError::ResultsUnavailable(format!(
                "message batch {provider_ref} is {}",
                batch.processing_status
            )));
        }
        let url = batch.results_url.unwrap_or_else(|| {
            format!("{}/messages/batches/{provider_ref}/results", self.base_url)
        });

        let response = self.authed(self.client.get(url)).send().await?;
        let body = check_status(response).await?.text().await?;
        let lines: Vec<ResultLine> = parse_jsonl(&body)?;
        debug!(batch_id = %provider_ref, results = lines.len(), "downloaded anthropic results");

        Ok(lines.into_iter().map(to_raw_result).collect())
    }
}
