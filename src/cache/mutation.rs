//! Mutation invalidator.
//!
//! Runs writes through the [`Fetcher`](crate::application::fetch::Fetcher)
//! and, once a write succeeds, marks the keys it declared as affected stale.
//! A failed write invalidates nothing and is never retried here.

use std::sync::Arc;

use gadfly_api_types::DEFAULT_UPLOAD_JURISDICTION;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::fetch::{FetchError, Mutation, MutationResponse, UploadFile};

use super::config::CacheConfig;
use super::events::{EventClock, InvalidationEvent, InvalidationSet};
use super::keys::Endpoint;
use super::store::QueryCache;

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("{mutation} failed: {source}")]
    Failed {
        mutation: &'static str,
        #[source]
        source: FetchError,
    },
    #[error("invalid {mutation}: {message}")]
    InvalidInput {
        mutation: &'static str,
        message: String,
    },
}

impl MutationError {
    pub(crate) fn invalid(mutation: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            mutation,
            message: message.into(),
        }
    }

    /// The underlying request failure, if the write reached the executor.
    pub fn fetch_error(&self) -> Option<&FetchError> {
        match self {
            Self::Failed { source, .. } => Some(source),
            Self::InvalidInput { .. } => None,
        }
    }
}

/// Result of a successful mutation.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub response: MutationResponse,
    pub event: InvalidationEvent,
    /// Number of cache entries marked stale.
    pub invalidated: usize,
}

/// Executes mutations and applies their declared invalidation sets.
pub struct MutationInvalidator {
    config: CacheConfig,
    cache: Arc<QueryCache>,
    clock: EventClock,
}

impl MutationInvalidator {
    pub fn new(config: CacheConfig, cache: Arc<QueryCache>) -> Self {
        Self {
            config,
            cache,
            clock: EventClock::new(),
        }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Keys `mutation` declares stale on success.
    ///
    /// Summaries created by a summarize run are not known in advance, so the
    /// whole endpoint is invalidated regardless of parameters.
    pub fn invalidation_set(&self, mutation: &Mutation) -> InvalidationSet {
        match mutation {
            Mutation::Summarize { .. } => {
                let set = InvalidationSet::new().with_endpoint(Endpoint::Summaries);
                if self.config.invalidate_meetings_on_summarize {
                    set.with_endpoint(Endpoint::Meetings)
                } else {
                    set
                }
            }
            Mutation::Upload(_) => {
                if self.config.invalidate_on_upload {
                    InvalidationSet::new()
                        .with_endpoint(Endpoint::Jurisdictions)
                        .with_endpoint(Endpoint::Meetings)
                } else {
                    InvalidationSet::new()
                }
            }
        }
    }

    pub async fn mutate(&self, mutation: Mutation) -> Result<MutationOutcome, MutationError> {
        let mutation = normalize(mutation)?;
        let name = mutation.name();

        let response = match self.cache.fetcher().execute(&mutation).await {
            Ok(response) => response,
            Err(source) => {
                warn!(
                    mutation = name,
                    error = %source,
                    kind = ?source.kind(),
                    "Mutation failed; cache left unchanged"
                );
                return Err(MutationError::Failed {
                    mutation: name,
                    source,
                });
            }
        };

        let event = self.clock.stamp(name, self.invalidation_set(&mutation));
        let invalidated = self.cache.invalidate_set(&event.set);
        info!(
            mutation = name,
            event_id = %event.id,
            invalidated,
            "Mutation succeeded"
        );

        Ok(MutationOutcome {
            response,
            event,
            invalidated,
        })
    }

    pub async fn summarize(
        &self,
        meeting_id: &str,
        force: bool,
    ) -> Result<MutationOutcome, MutationError> {
        self.mutate(Mutation::Summarize {
            meeting_id: meeting_id.to_string(),
            force,
        })
        .await
    }

    pub async fn upload(&self, file: UploadFile) -> Result<MutationOutcome, MutationError> {
        self.mutate(Mutation::Upload(file)).await
    }
}

/// Reject writes that cannot succeed and fill in defaults.
fn normalize(mutation: Mutation) -> Result<Mutation, MutationError> {
    match mutation {
        Mutation::Summarize { meeting_id, force } => {
            let meeting_id = meeting_id.trim();
            if meeting_id.is_empty() {
                return Err(MutationError::invalid("summarize", "meeting id is required"));
            }
            Ok(Mutation::Summarize {
                meeting_id: meeting_id.to_string(),
                force,
            })
        }
        Mutation::Upload(mut file) => {
            if file.file_name.trim().is_empty() {
                return Err(MutationError::invalid("upload", "file name is required"));
            }
            if file.jurisdiction.trim().is_empty() {
                file.jurisdiction = DEFAULT_UPLOAD_JURISDICTION.to_string();
            }
            Ok(Mutation::Upload(file))
        }
    }
}
