//! Shared request and response shapes for the Gadfly meeting-summary API.
//!
//! Every read endpoint returns a JSON array of one of the record types below.
//! Optional fields use `#[serde(default)]` so older servers that omit them
//! still decode.

use serde::{Deserialize, Serialize};

/// Default jurisdiction assigned to uploads that do not name one.
pub const DEFAULT_UPLOAD_JURISDICTION: &str = "Uploads";

/// A jurisdiction as listed by `GET /api/jurisdictions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jurisdiction {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Number of meetings known for the jurisdiction, when the server counts them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meetings: Option<u64>,
}

impl Jurisdiction {
    /// Name used to select the jurisdiction and to filter meetings.
    ///
    /// Falls back to the identifier when the server sends no name.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn meeting_count(&self) -> u64 {
        self.meetings.unwrap_or(0)
    }
}

/// A meeting as listed by `GET /api/meetings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: String,
    pub title: String,
    pub jurisdiction: String,
    #[serde(default)]
    pub date: Option<String>,
}

/// A generated summary as listed by `GET /api/summaries`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub id: String,
    pub preview: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    /// Modification time in seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<f64>,
}

/// Body of `POST /api/summarize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizeRequest {
    pub meeting_id: String,
    pub force: bool,
}

/// Result of `POST /api/summarize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizeResponse {
    pub status: String,
    #[serde(default)]
    pub meeting_id: Option<String>,
    #[serde(default)]
    pub force: bool,
}

/// Result of `POST /api/upload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub ok: bool,
    #[serde(default)]
    pub saved_to: Option<String>,
}

/// Result of `GET /api/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub ok: bool,
    #[serde(default)]
    pub timestamp: Option<String>,
}
