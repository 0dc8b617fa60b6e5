use std::sync::Arc;

use gadfly::{
    application::{dashboard::Dashboard, fetch::FetchError},
    cache::{CacheConfig, Endpoint, EntryStatus, MutationError, Payload, Snapshot},
    config::{LoadError, Settings},
    infra::{api_client::ApiClient, error::InfraError},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("request failed: {0}")]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error("failed to read input file {path}: {source}")]
    InputFile {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to render output: {0}")]
    Output(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// API client plus the dashboard that caches its reads.
pub struct Ctx {
    pub api: Arc<ApiClient>,
    pub dashboard: Dashboard,
}

impl Ctx {
    pub fn new(settings: &Settings) -> Result<Self, CliError> {
        let api = Arc::new(ApiClient::new(&settings.api)?);
        let dashboard = Dashboard::new(CacheConfig::from(&settings.cache), api.clone());
        Ok(Self { api, dashboard })
    }

    /// Resolve `endpoint` for the current selection and wait for the result.
    pub async fn load(&self, endpoint: Endpoint) -> Result<Arc<Payload>, CliError> {
        settled_payload(endpoint, self.dashboard.settled(endpoint).await)
    }
}

/// Turn a settled snapshot into its payload, surfacing a failed fetch.
pub fn settled_payload(endpoint: Endpoint, snapshot: Snapshot) -> Result<Arc<Payload>, CliError> {
    let Snapshot {
        status,
        value,
        error,
        ..
    } = snapshot;
    match (status, error, value) {
        (EntryStatus::Failed, Some(error), _) => Err(error.into()),
        (_, _, Some(value)) => Ok(value),
        (_, Some(error), None) => Err(error.into()),
        (_, None, None) => Ok(Arc::new(Payload::empty(endpoint))),
    }
}
