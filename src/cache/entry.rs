//! Cache entry state and the snapshots handed to observers.

use std::sync::Arc;

use gadfly_api_types::{Jurisdiction, Meeting, Summary};
use serde::Serialize;

use crate::application::fetch::FetchError;

use super::keys::Endpoint;

/// Freshness of a cache entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Never fetched.
    #[default]
    Empty,
    /// A fetch is in flight; any previous value is still presented.
    Loading,
    /// Holds the result of the latest fetch.
    Fresh,
    /// Holds a value known to be outdated; the next resolve refetches.
    Stale,
    /// The latest fetch failed; any previous value is still presented.
    Failed,
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Loading => "loading",
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::Failed => "failed",
        }
    }
}

/// Decoded body of a read endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Jurisdictions(Vec<Jurisdiction>),
    Meetings(Vec<Meeting>),
    Summaries(Vec<Summary>),
}

impl Payload {
    /// The empty collection for an endpoint.
    pub fn empty(endpoint: Endpoint) -> Self {
        match endpoint {
            Endpoint::Jurisdictions => Self::Jurisdictions(Vec::new()),
            Endpoint::Meetings => Self::Meetings(Vec::new()),
            Endpoint::Summaries => Self::Summaries(Vec::new()),
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        match self {
            Self::Jurisdictions(_) => Endpoint::Jurisdictions,
            Self::Meetings(_) => Endpoint::Meetings,
            Self::Summaries(_) => Endpoint::Summaries,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Jurisdictions(items) => items.len(),
            Self::Meetings(items) => items.len(),
            Self::Summaries(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn jurisdictions(&self) -> Option<&[Jurisdiction]> {
        match self {
            Self::Jurisdictions(items) => Some(items),
            _ => None,
        }
    }

    pub fn meetings(&self) -> Option<&[Meeting]> {
        match self {
            Self::Meetings(items) => Some(items),
            _ => None,
        }
    }

    pub fn summaries(&self) -> Option<&[Summary]> {
        match self {
            Self::Summaries(items) => Some(items),
            _ => None,
        }
    }
}

/// Point-in-time view of one entry.
///
/// Values are shared behind an `Arc`; a refetch replaces the pointer and
/// never mutates a payload that observers may still hold.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub status: EntryStatus,
    pub value: Option<Arc<Payload>>,
    pub error: Option<FetchError>,
    pub version: u64,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            status: EntryStatus::Empty,
            value: None,
            error: None,
            version: 0,
        }
    }

    /// Result of an idle query: an empty collection that never loads.
    pub fn idle(endpoint: Endpoint) -> Self {
        Self {
            status: EntryStatus::Fresh,
            value: Some(Arc::new(Payload::empty(endpoint))),
            error: None,
            version: 0,
        }
    }

    pub fn is_fetching(&self) -> bool {
        self.status == EntryStatus::Loading
    }

    pub fn is_failed(&self) -> bool {
        self.status == EntryStatus::Failed
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.value.as_deref()
    }
}

/// Entry bookkeeping owned by the query cache.
#[derive(Debug, Clone, Default)]
pub(crate) struct CacheEntry {
    pub(crate) status: EntryStatus,
    pub(crate) value: Option<Arc<Payload>>,
    pub(crate) error: Option<FetchError>,
    /// Bumped on every committed success.
    pub(crate) version: u64,
    /// Dispatch version of the newest fetch that has settled.
    pub(crate) settled_dispatch: u64,
    /// Dispatches numbered below this mark were issued before the latest
    /// invalidation and can never make the entry fresh.
    pub(crate) stale_mark: u64,
}

impl CacheEntry {
    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot {
            status: self.status,
            value: self.value.clone(),
            error: self.error.clone(),
            version: self.version,
        }
    }
}
