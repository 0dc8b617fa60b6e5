//! Boundary between the query cache and the document-processing API.
//!
//! The cache never talks HTTP itself: every read and write goes through a
//! [`Fetcher`], which performs exactly one request and reports a normalized
//! [`FetchError`] on failure.

use std::time::Duration;

use async_trait::async_trait;
use gadfly_api_types::{SummarizeResponse, UploadResponse};
use serde::Serialize;
use thiserror::Error;

use crate::cache::{CacheKey, Payload};

/// Failure of a single request, normalized at the executor boundary.
///
/// Cloneable so it can be stored on a cache entry and handed to every
/// observer of that entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("server responded with status {status}: {body}")]
    Server { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Coarse classification of a [`FetchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Transport,
    Server,
    MalformedResponse,
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Transport(_) | Self::Timeout(_) => FetchErrorKind::Transport,
            Self::Server { .. } => FetchErrorKind::Server,
            Self::Malformed(_) => FetchErrorKind::MalformedResponse,
        }
    }

    pub fn server(status: u16, body: impl Into<String>) -> Self {
        Self::Server {
            status,
            body: body.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }
}

/// A file queued for `POST /api/upload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub contents: Vec<u8>,
    pub jurisdiction: String,
}

/// Write operations understood by the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Ask the server to (re)generate summaries for one meeting.
    Summarize { meeting_id: String, force: bool },
    /// Store a new meeting document under a jurisdiction.
    Upload(UploadFile),
}

impl Mutation {
    pub fn summarize(meeting_id: impl Into<String>) -> Self {
        Self::Summarize {
            meeting_id: meeting_id.into(),
            force: true,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Summarize { .. } => "summarize",
            Self::Upload(_) => "upload",
        }
    }
}

/// Decoded result of a successful [`Mutation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MutationResponse {
    Summarized(SummarizeResponse),
    Uploaded(UploadResponse),
}

/// Performs single reads and writes against the API. No caching of its own.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Read the collection identified by `key` and decode it into the payload
    /// shape of the key's endpoint.
    async fn fetch(&self, key: &CacheKey) -> Result<Payload, FetchError>;

    /// Perform a write.
    async fn execute(&self, mutation: &Mutation) -> Result<MutationResponse, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_classify_as_transport_failures() {
        let err = FetchError::Timeout(Duration::from_millis(250));
        assert_eq!(err.kind(), FetchErrorKind::Transport);
        assert_eq!(err.to_string(), "request timed out after 250ms");
    }

    #[test]
    fn server_and_malformed_errors_keep_their_kind() {
        assert_eq!(
            FetchError::server(502, "bad gateway").kind(),
            FetchErrorKind::Server
        );
        assert_eq!(
            FetchError::malformed("expected array").kind(),
            FetchErrorKind::MalformedResponse
        );
    }

    #[test]
    fn summarize_constructor_forces_regeneration() {
        let mutation = Mutation::summarize("Orting/budget.pdf");
        assert_eq!(
            mutation,
            Mutation::Summarize {
                meeting_id: "Orting/budget.pdf".into(),
                force: true,
            }
        );
        assert_eq!(mutation.name(), "summarize");
    }
}
