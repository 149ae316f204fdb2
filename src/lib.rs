//! Batch inference job manager for commercial LLM APIs.
//!
//! [`RelayClient`] submits a set of [`BatchRequest`]s to a provider as one
//! batch, persists the job under a storage root, refreshes its status on
//! demand and reconciles the provider's results back to the request ids.

pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod provider;
pub mod state_machine;
pub mod store;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use orchestrator::RelayClient;
pub use provider::{ModelDefaults, ProviderAdapter, ProviderError, RawResult};
pub use state_machine::{BatchJob, BatchRequest, BatchResult, BatchResults, JobStatus};
pub use store::JobStore;
