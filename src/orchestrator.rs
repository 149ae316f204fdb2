use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::provider::{
    AnthropicAdapter, ModelDefaults, OpenAiAdapter, ProviderAdapter, ProviderRegistry, RawResult,
};
use crate::state_machine::{
    BatchJob, BatchRequest, BatchResult, BatchResults, JobStatus, ProviderFields, StateMachine,
    Transition,
};
use crate::store::{JobStore, validate_job_id};

/// Drives batch jobs from submission to reconciled results.
///
/// Every call reads the job store first; nothing about a job is cached
/// between calls, so a client built after a restart picks up where the last
/// one stopped.
#[derive(Debug)]
pub struct RelayClient {
    store: JobStore,
    providers: ProviderRegistry,
    defaults: ModelDefaults,
}

impl RelayClient {
    /// Create a client over the store at `root` with no providers registered.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            store: JobStore::open(root)?,
            providers: ProviderRegistry::new(),
            defaults: ModelDefaults::default(),
        })
    }

    /// Create a client from configuration, registering every provider that
    /// has an API key.
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        let mut client = Self::new(&config.root_dir)?.with_defaults(config.defaults.clone());

        if !config.openai_api_key.is_empty() {
            let key = config.openai_api_key.clone();
            let adapter = match &config.openai_base_url {
                Some(url) => OpenAiAdapter::with_base_url(key, url.clone())?,
                None => OpenAiAdapter::new(key)?,
            };
            client.register_provider(Arc::new(adapter));
        }
        if !config.anthropic_api_key.is_empty() {
            let key = config.anthropic_api_key.clone();
            let adapter = match &config.anthropic_base_url {
                Some(url) => AnthropicAdapter::with_base_url(key, url.clone())?,
                None => AnthropicAdapter::new(key)?,
            };
            client.register_provider(Arc::new(adapter));
        }

        debug!(providers = ?client.providers.names(), root = %config.root_dir.display(), "relay client ready");
        Ok(client)
    }

    pub fn with_provider(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.register_provider(adapter);
        self
    }

    pub fn with_defaults(mut self, defaults: ModelDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn register_provider(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.providers.register(adapter);
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Submit `requests` to `provider` as one batch job.
    ///
    /// The job record is created in `created` state before the provider is
    /// contacted, which reserves `job_id`: a second submission under the same
    /// id fails with [`RelayError::DuplicateJobId`] whatever the first job's
    /// status. If the provider rejects the batch the record ends up `failed`.
    pub async fn submit_batch(
        &self,
        requests: &[BatchRequest],
        job_id: Option<&str>,
        provider: &str,
        description: Option<&str>,
    ) -> Result<BatchJob> {
        validate_requests(requests)?;
        let job_id = job_id.map(str::to_string).unwrap_or_else(BatchJob::generate_id);
        validate_job_id(&job_id)?;
        let adapter = self.providers.get(provider).ok_or_else(|| {
            RelayError::Validation(format!(
                "unknown provider {provider:?} (configured: {})",
                self.providers.names().join(", ")
            ))
        })?;

        let job = BatchJob::new(
            job_id.clone(),
            adapter.name().to_string(),
            requests,
            description.map(str::to_string),
        );
        self.store.create(&job)?;
        info!(job_id = %job_id, provider = adapter.name(), n_requests = job.n_requests, "submitting batch");

        let mut defaults = self.defaults.clone();
        defaults.metadata.insert("relay_job_id".into(), job_id.clone());
        if let Some(description) = description {
            defaults
                .metadata
                .insert("description".into(), description.to_string());
        }

        match adapter.submit(requests, &defaults).await {
            Ok(provider_ref) => {
                let fields = ProviderFields {
                    provider_ref: Some(provider_ref.clone()),
                    ..Default::default()
                };
                let job = self
                    .store
                    .update_status(&job_id, JobStatus::Validating, fields)
                    .inspect_err(|e| {
                        error!(job_id = %job_id, provider_ref = %provider_ref, error = %e,
                            "provider accepted batch but the job record could not be updated");
                    })?;
                info!(job_id = %job_id, provider_ref = %provider_ref, "batch accepted");
                Ok(job)
            }
            Err(source) => {
                let source = source.into_submission_error();
                warn!(job_id = %job_id, error = %source, "provider rejected batch");
                let fields = ProviderFields {
                    error: Some(source.to_string()),
                    ..Default::default()
                };
                if let Err(e) = self.store.update_status(&job_id, JobStatus::Failed, fields) {
                    error!(job_id = %job_id, error = %e, "could not record failed submission");
                }
                Err(RelayError::Submission { job_id, source })
            }
        }
    }

    /// Ids of every job in the store. No network access.
    pub fn list_jobs(&self) -> Result<Vec<String>> {
        self.store.list()
    }

    /// The stored record for `job_id`. No network access.
    pub fn get_job(&self, job_id: &str) -> Result<BatchJob> {
        self.store.get(job_id)
    }

    /// Refresh a job's status with at most one provider poll.
    ///
    /// Terminal jobs are returned as stored. A transient poll failure returns
    /// the job unchanged so the caller can try again later; a permanent one
    /// marks the job `failed`.
    pub async fn monitor_batch(&self, job_id: &str) -> Result<BatchJob> {
        let job = self.store.get(job_id)?;
        if job.is_terminal() {
            debug!(job_id, status = %job.status, "job is terminal, skipping poll");
            return Ok(job);
        }
        let Some(provider_ref) = job.provider_ref.clone() else {
            warn!(job_id, status = %job.status, "job has no provider reference, submission was never confirmed");
            return Ok(job);
        };
        let adapter = self.adapter_for(&job)?;

        match adapter.poll(&provider_ref).await {
            Ok(remote) => {
                let updated = self.store.update(job_id, |j| {
                    let transition = StateMachine::next(j.status, &remote.state);
                    if let Transition::Fail(reason) = &transition {
                        j.error = Some(reason.clone());
                    }
                    j.status = StateMachine::resolve(j.status, &transition);
                    j.remote_status = Some(remote.raw.clone());
                })?;
                if updated.status != job.status {
                    info!(job_id, from = %job.status, to = %updated.status, remote = %remote.raw, "job status changed");
                } else {
                    debug!(job_id, status = %updated.status, remote = %remote.raw, "job status unchanged");
                }
                Ok(updated)
            }
            Err(e) if e.is_transient() => {
                warn!(job_id, error = %e, "transient poll failure, status unchanged");
                Ok(job)
            }
            Err(e) => {
                warn!(job_id, error = %e, "permanent poll failure, marking job failed");
                self.store.update(job_id, |j| {
                    if !j.is_terminal() {
                        j.status = JobStatus::Failed;
                        j.error = Some(e.to_string());
                    }
                })
            }
        }
    }

    /// Download the results of a completed job and match them to the
    /// original request ids.
    ///
    /// Missing results are not an error: they are listed in
    /// [`BatchResults::missing`]. A result for an id that was never submitted,
    /// or two results for one id, is a [`RelayError::Reconciliation`].
    pub async fn retrieve_batch_results(&self, job_id: &str) -> Result<BatchResults> {
        let job = self.store.get(job_id)?;
        if job.status != JobStatus::Completed {
            return Err(RelayError::ResultsNotReady {
                job_id: job_id.to_string(),
                status: job.status,
            });
        }
        let provider_ref = job
            .provider_ref
            .as_deref()
            .ok_or_else(|| RelayError::CorruptRecord {
                job_id: job_id.to_string(),
                reason: "completed job has no provider reference".into(),
            })?;
        let adapter = self.adapter_for(&job)?;

        let raw = adapter.fetch_results(provider_ref).await?;
        let results = reconcile(&job, raw)?;
        if results.is_partial() {
            warn!(
                job_id,
                expected = job.n_requests,
                received = results.len(),
                missing = ?results.missing,
                "provider returned fewer results than requests"
            );
        }

        self.store
            .update(job_id, |j| j.results_fetched_at = Some(Utc::now()))?;
        info!(job_id, results = results.len(), "retrieved batch results");
        Ok(results)
    }

    fn adapter_for(&self, job: &BatchJob) -> Result<Arc<dyn ProviderAdapter>> {
        self.providers.get(&job.provider).ok_or_else(|| {
            RelayError::Config(format!(
                "job {} uses provider {:?}, which is not configured",
                job.job_id, job.provider
            ))
        })
    }
}

/// Rejects empty request sets and empty or repeated request ids.
fn validate_requests(requests: &[BatchRequest]) -> Result<()> {
    if requests.is_empty() {
        return Err(RelayError::Validation("request set is empty".into()));
    }
    let mut seen = HashSet::with_capacity(requests.len());
    for (i, req) in requests.iter().enumerate() {
        if req.id.trim().is_empty() {
            return Err(RelayError::Validation(format!("request #{i} has an empty id")));
        }
        if !seen.insert(req.id.as_str()) {
            return Err(RelayError::Validation(format!(
                "duplicate request id {:?}",
                req.id
            )));
        }
    }
    Ok(())
}

/// Matches raw provider results to the job's request ids, in submission order.
fn reconcile(job: &BatchJob, raw: Vec<RawResult>) -> Result<BatchResults> {
    let known: HashSet<&str> = job.request_ids.iter().map(String::as_str).collect();
    let mut by_id: HashMap<String, RawResult> = HashMap::with_capacity(raw.len());

    for result in raw {
        if !known.contains(result.custom_id.as_str()) {
            return Err(RelayError::Reconciliation(format!(
                "job {} received a result for unknown request id {:?}",
                job.job_id, result.custom_id
            )));
        }
        if by_id.contains_key(&result.custom_id) {
            return Err(RelayError::Reconciliation(format!(
                "job {} received more than one result for request id {:?}",
                job.job_id, result.custom_id
            )));
        }
        by_id.insert(result.custom_id.clone(), result);
    }

    let mut results = Vec::with_capacity(by_id.len());
    let mut missing = Vec::new();
    for id in &job.request_ids {
        match by_id.remove(id) {
            Some(raw) => results.push(BatchResult {
                custom_id: raw.custom_id,
                response: raw.response,
                error: raw.error,
            }),
            None => missing.push(id.clone()),
        }
    }

    Ok(BatchResults {
        job_id: job.job_id.clone(),
        results,
        missing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    use crate::provider::ProviderError;
    use crate::state_machine::{RemoteState, RemoteStatus};

    // --- Mock adapter with call counters ---

    #[derive(Default)]
    struct MockProvider {
        reject_submit: bool,
        polls: Mutex<VecDeque<Result<RemoteStatus, ProviderError>>>,
        results: Mutex<Vec<RawResult>>,
        last_metadata: Mutex<Option<BTreeMap<String, String>>>,
        submit_calls: AtomicUsize,
        poll_calls: AtomicUsize,
        fetch_calls: AtomicUsize,
    }

    impl MockProvider {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn rejecting() -> Arc<Self> {
            Arc::new(Self {
                reject_submit: true,
                ..Default::default()
            })
        }

        fn queue_status(&self, state: RemoteState) {
            let raw = format!("{state:?}").to_lowercase();
            self.polls
                .lock()
                .unwrap()
                .push_back(Ok(RemoteStatus::new(state, raw)));
        }

        fn queue_error(&self, err: ProviderError) {
            self.polls.lock().unwrap().push_back(Err(err));
        }

        fn set_results(&self, ids: &[&str]) {
            *self.results.lock().unwrap() = ids
                .iter()
                .map(|id| RawResult {
                    custom_id: id.to_string(),
                    response: Some(json!({"status_code": 200, "body": {"output": format!("answer {id}")}})),
                    error: None,
                })
                .collect();
        }

        fn calls(&self) -> (usize, usize, usize) {
            (
                self.submit_calls.load(Ordering::SeqCst),
                self.poll_calls.load(Ordering::SeqCst),
                self.fetch_calls.load(Ordering::SeqCst),
            )
        }
    }

    #[async_trait]
    impl ProviderAdapter for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn submit(
            &self,
            requests: &[BatchRequest],
            defaults: &ModelDefaults,
        ) -> Result<String, ProviderError> {
            let n = self.submit_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_metadata.lock().unwrap() = Some(defaults.metadata.clone());
            if self.reject_submit {
                return Err(ProviderError::Submission("payload too large".into()));
            }
            Ok(format!("remote-{n}-{}", requests.len()))
        }

        async fn poll(&self, _provider_ref: &str) -> Result<RemoteStatus, ProviderError> {
            self.poll_calls.fetch_add(1, Ordering::SeqCst);
            self.polls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(RemoteStatus::new(RemoteState::InProgress, "in_progress")))
        }

        async fn fetch_results(&self, _provider_ref: &str) -> Result<Vec<RawResult>, ProviderError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.results.lock().unwrap().clone())
        }
    }

    fn client(dir: &TempDir, mock: &Arc<MockProvider>) -> RelayClient {
        RelayClient::new(dir.path())
            .unwrap()
            .with_provider(mock.clone())
    }

    fn requests(ids: &[&str]) -> Vec<BatchRequest> {
        ids.iter()
            .map(|id| BatchRequest::new(*id, "gpt-4o-mini", "You are a helpful assistant.", "Hello!"))
            .collect()
    }

    async fn completed_job(relay: &RelayClient, mock: &MockProvider, ids: &[&str]) -> BatchJob {
        relay
            .submit_batch(&requests(ids), Some("job-done"), "mock", None)
            .await
            .unwrap();
        mock.queue_status(RemoteState::Completed);
        let job = relay.monitor_batch("job-done").await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        job
    }

    // --- Submission ---

    #[tokio::test]
    async fn submit_then_monitor_is_non_terminal() {
        let dir = TempDir::new().unwrap();
        let mock = MockProvider::new();
        let relay = client(&dir, &mock);

        let job = relay
            .submit_batch(&requests(&["req-1", "req-2", "req-3"]), Some("example-batch-001"), "mock", Some("Example batch job"))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Validating);
        assert_eq!(job.provider, "mock");
        assert_eq!(job.provider_ref.as_deref(), Some("remote-0-3"));
        assert_eq!(job.description.as_deref(), Some("Example batch job"));

        let job = relay.monitor_batch("example-batch-001").await.unwrap();
        assert!(!job.is_terminal());
        assert_eq!(job.status, JobStatus::InProgress);
        assert_eq!(job.n_requests, 3);
    }

    #[tokio::test]
    async fn submit_passes_job_metadata_to_provider() {
        let dir = TempDir::new().unwrap();
        let mock = MockProvider::new();
        let relay = client(&dir, &mock);

        relay
            .submit_batch(&requests(&["a"]), Some("job-meta"), "mock", Some("nightly"))
            .await
            .unwrap();
        let metadata = mock.last_metadata.lock().unwrap().clone().unwrap();
        assert_eq!(metadata["relay_job_id"], "job-meta");
        assert_eq!(metadata["description"], "nightly");
    }

    #[tokio::test]
    async fn duplicate_job_id_is_rejected_and_original_kept() {
        let dir = TempDir::new().unwrap();
        let mock = MockProvider::new();
        let relay = client(&dir, &mock);

        let original = relay
            .submit_batch(&requests(&["req-1"]), Some("job-1"), "mock", None)
            .await
            .unwrap();
        let err = relay
            .submit_batch(&requests(&["x", "y"]), Some("job-1"), "mock", None)
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::DuplicateJobId(ref id) if id == "job-1"));
        assert_eq!(relay.get_job("job-1").unwrap(), original);
        assert_eq!(mock.calls().0, 1);
    }

    #[tokio::test]
    async fn failed_submission_is_recorded_and_id_stays_taken() {
        let dir = TempDir::new().unwrap();
        let mock = MockProvider::rejecting();
        let relay = client(&dir, &mock);

        let err = relay
            .submit_batch(&requests(&["req-1"]), Some("job-1"), "mock", None)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Submission { ref job_id, .. } if job_id == "job-1"));

        let stored = relay.get_job("job-1").unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.provider_ref.is_none());
        assert!(stored.error.unwrap().contains("payload too large"));

        let retry = relay
            .submit_batch(&requests(&["req-1"]), Some("job-1"), "mock", None)
            .await
            .unwrap_err();
        assert!(matches!(retry, RelayError::DuplicateJobId(_)));
    }

    #[tokio::test]
    async fn invalid_request_sets_are_rejected_before_any_io() {
        let dir = TempDir::new().unwrap();
        let mock = MockProvider::new();
        let relay = client(&dir, &mock);

        let cases: Vec<Vec<BatchRequest>> = vec![
            vec![],
            requests(&["req-1", ""]),
            requests(&["req-1", "req-2", "req-1"]),
        ];
        for reqs in cases {
            let err = relay
                .submit_batch(&reqs, Some("job-bad"), "mock", None)
                .await
                .unwrap_err();
            assert!(matches!(err, RelayError::Validation(_)), "{err}");
        }

        assert_eq!(mock.calls().0, 0);
        assert!(relay.list_jobs().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_provider_is_a_validation_error() {
        let dir = TempDir::new().unwrap();
        let mock = MockProvider::new();
        let relay = client(&dir, &mock);

        let err = relay
            .submit_batch(&requests(&["req-1"]), Some("job-1"), "gemini", None)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Validation(ref m) if m.contains("gemini")));
        assert!(relay.list_jobs().unwrap().is_empty());
    }

    #[tokio::test]
    async fn job_id_is_generated_when_omitted() {
        let dir = TempDir::new().unwrap();
        let mock = MockProvider::new();
        let relay = client(&dir, &mock);

        let job = relay
            .submit_batch(&requests(&["req-1"]), None, "mock", None)
            .await
            .unwrap();
        assert!(!job.job_id.is_empty());
        assert_eq!(relay.list_jobs().unwrap(), vec![job.job_id]);
    }

    // --- Monitoring ---

    #[tokio::test]
    async fn monitor_walks_the_lifecycle() {
        let dir = TempDir::new().unwrap();
        let mock = MockProvider::new();
        let relay = client(&dir, &mock);
        relay
            .submit_batch(&requests(&["req-1"]), Some("job-1"), "mock", None)
            .await
            .unwrap();

        mock.queue_status(RemoteState::Validating);
        mock.queue_status(RemoteState::InProgress);
        mock.queue_status(RemoteState::Finalizing);
        mock.queue_status(RemoteState::Completed);

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(relay.monitor_batch("job-1").await.unwrap().status);
        }
        assert_eq!(
            seen,
            vec![
                JobStatus::Validating,
                JobStatus::InProgress,
                JobStatus::Finalizing,
                JobStatus::Completed
            ]
        );
    }

    #[tokio::test]
    async fn terminal_jobs_are_not_polled() {
        let dir = TempDir::new().unwrap();
        let mock = MockProvider::new();
        let relay = client(&dir, &mock);
        completed_job(&relay, &mock, &["req-1"]).await;
        let polls_before = mock.calls().1;

        let job = relay.monitor_batch("job-done").await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(mock.calls().1, polls_before);

        relay
            .submit_batch(&requests(&["req-1"]), Some("job-failed"), "mock", None)
            .await
            .unwrap();
        mock.queue_status(RemoteState::Failed("expired".into()));
        let failed = relay.monitor_batch("job-failed").await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("expired"));

        let polls_before = mock.calls().1;
        let again = relay.monitor_batch("job-failed").await.unwrap();
        assert_eq!(again.status, JobStatus::Failed);
        assert_eq!(mock.calls().1, polls_before);
    }

    #[tokio::test]
    async fn transient_poll_failure_leaves_status_unchanged() {
        let dir = TempDir::new().unwrap();
        let mock = MockProvider::new();
        let relay = client(&dir, &mock);
        relay
            .submit_batch(&requests(&["req-1"]), Some("job-1"), "mock", None)
            .await
            .unwrap();

        mock.queue_error(ProviderError::TransientPoll("connection reset".into()));
        let job = relay.monitor_batch("job-1").await.unwrap();
        assert_eq!(job.status, JobStatus::Validating);
        assert_eq!(relay.get_job("job-1").unwrap().status, JobStatus::Validating);
    }

    #[tokio::test]
    async fn permanent_poll_failure_fails_the_job() {
        let dir = TempDir::new().unwrap();
        let mock = MockProvider::new();
        let relay = client(&dir, &mock);
        relay
            .submit_batch(&requests(&["req-1"]), Some("job-1"), "mock", None)
            .await
            .unwrap();

        mock.queue_error(ProviderError::PermanentPoll("batch not found".into()));
        let job = relay.monitor_batch("job-1").await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("batch not found"));
    }

    #[tokio::test]
    async fn monitoring_resumes_after_restart() {
        let dir = TempDir::new().unwrap();
        let mock = MockProvider::new();
        let submitted = {
            let relay = client(&dir, &mock);
            relay
                .submit_batch(&requests(&["req-1", "req-2"]), Some("job-1"), "mock", None)
                .await
                .unwrap()
        };

        let relay = client(&dir, &mock);
        assert_eq!(relay.get_job("job-1").unwrap(), submitted);
        mock.queue_status(RemoteState::Completed);
        let job = relay.monitor_batch("job-1").await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.submitted_at, submitted.submitted_at);
    }

    #[tokio::test]
    async fn unconfirmed_submission_is_returned_without_polling() {
        let dir = TempDir::new().unwrap();
        let mock = MockProvider::new();
        let relay = client(&dir, &mock);
        let orphan = BatchJob::new("job-orphan".into(), "mock".into(), &requests(&["a"]), None);
        relay.store().create(&orphan).unwrap();

        let job = relay.monitor_batch("job-orphan").await.unwrap();
        assert_eq!(job.status, JobStatus::Created);
        assert_eq!(mock.calls().1, 0);
    }

    #[tokio::test]
    async fn monitor_unknown_job_is_not_found() {
        let dir = TempDir::new().unwrap();
        let mock = MockProvider::new();
        let relay = client(&dir, &mock);
        assert!(matches!(
            relay.monitor_batch("ghost").await,
            Err(RelayError::JobNotFound(_))
        ));
    }

    // --- Retrieval ---

    #[tokio::test]
    async fn retrieve_returns_one_entry_per_request() {
        let dir = TempDir::new().unwrap();
        let mock = MockProvider::new();
        let relay = client(&dir, &mock);
        completed_job(&relay, &mock, &["req-1", "req-2", "req-3"]).await;
        mock.set_results(&["req-3", "req-1", "req-2"]);

        let results = relay.retrieve_batch_results("job-done").await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(!results.is_partial());
        let ids: Vec<&str> = results.results.iter().map(|r| r.custom_id.as_str()).collect();
        assert_eq!(ids, vec!["req-1", "req-2", "req-3"]);
        assert_eq!(
            results.get("req-2").unwrap().response.as_ref().unwrap()["body"]["output"],
            "answer req-2"
        );
        assert!(relay.get_job("job-done").unwrap().results_fetched_at.is_some());
    }

    #[tokio::test]
    async fn unknown_result_id_is_a_reconciliation_error() {
        let dir = TempDir::new().unwrap();
        let mock = MockProvider::new();
        let relay = client(&dir, &mock);
        completed_job(&relay, &mock, &["req-1", "req-2", "req-3"]).await;
        mock.set_results(&["req-1", "req-2", "req-9"]);

        let err = relay.retrieve_batch_results("job-done").await.unwrap_err();
        assert!(matches!(err, RelayError::Reconciliation(ref m) if m.contains("req-9")));
    }

    #[tokio::test]
    async fn duplicate_result_id_is_a_reconciliation_error() {
        let dir = TempDir::new().unwrap();
        let mock = MockProvider::new();
        let relay = client(&dir, &mock);
        completed_job(&relay, &mock, &["req-1", "req-2"]).await;
        mock.set_results(&["req-1", "req-1"]);

        let err = relay.retrieve_batch_results("job-done").await.unwrap_err();
        assert!(matches!(err, RelayError::Reconciliation(_)));
    }

    #[tokio::test]
    async fn partial_results_are_surfaced() {
        let dir = TempDir::new().unwrap();
        let mock = MockProvider::new();
        let relay = client(&dir, &mock);
        completed_job(&relay, &mock, &["req-1", "req-2", "req-3"]).await;
        mock.set_results(&["req-2"]);

        let results = relay.retrieve_batch_results("job-done").await.unwrap();
        assert!(results.is_partial());
        assert_eq!(results.len(), 1);
        assert_eq!(results.missing, vec!["req-1", "req-3"]);
    }

    #[tokio::test]
    async fn retrieve_before_completion_makes_no_provider_call() {
        let dir = TempDir::new().unwrap();
        let mock = MockProvider::new();
        let relay = client(&dir, &mock);
        relay
            .submit_batch(&requests(&["req-1"]), Some("job-1"), "mock", None)
            .await
            .unwrap();

        let err = relay.retrieve_batch_results("job-1").await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::ResultsNotReady { status: JobStatus::Validating, .. }
        ));
        assert_eq!(mock.calls().2, 0);
    }

    #[tokio::test]
    async fn job_with_unregistered_provider_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let mock = MockProvider::new();
        client(&dir, &mock)
            .submit_batch(&requests(&["req-1"]), Some("job-1"), "mock", None)
            .await
            .unwrap();

        let bare = RelayClient::new(dir.path()).unwrap();
        assert!(matches!(
            bare.monitor_batch("job-1").await,
            Err(RelayError::Config(_))
        ));
    }

    // --- Listing ---

    #[tokio::test]
    async fn list_contains_every_submitted_job() {
        let dir = TempDir::new().unwrap();
        let mock = MockProvider::new();
        let relay = client(&dir, &mock);
        let ids = ["job-c", "job-a", "job-b", "job-d"];
        for id in ids {
            relay
                .submit_batch(&requests(&["req-1"]), Some(id), "mock", None)
                .await
                .unwrap();
        }

        let listed: HashSet<String> = relay.list_jobs().unwrap().into_iter().collect();
        let expected: HashSet<String> = ids.iter().map(|s| s.to_string()).collect();
        assert_eq!(listed, expected);
    }

    #[test]
    fn reconcile_keeps_submission_order() {
        let job = BatchJob::new(
            "job-1".into(),
            "mock".into(),
            &requests(&["b", "a"]),
            None,
        );
        let raw = vec![
            RawResult { custom_id: "a".into(), response: Some(json!(1)), error: None },
            RawResult { custom_id: "b".into(), response: None, error: Some(json!("boom")) },
        ];
        let results = reconcile(&job, raw).unwrap();
        assert_eq!(results.results[0].custom_id, "b");
        assert!(!results.results[0].is_success());
        assert_eq!(results.results[1].custom_id, "a");
    }
}
