//! Cache key definitions.
//!
//! A [`CacheKey`] is an endpoint plus a canonical parameter set. Parameters
//! are kept in a `BTreeMap` with string values, so the order in which they
//! were supplied never affects equality or hashing.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Read endpoints of the API that the cache knows how to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Jurisdictions,
    Meetings,
    Summaries,
}

impl Endpoint {
    pub const ALL: [Endpoint; 3] = [Self::Jurisdictions, Self::Meetings, Self::Summaries];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jurisdictions => "jurisdictions",
            Self::Meetings => "meetings",
            Self::Summaries => "summaries",
        }
    }

    /// Request path relative to the API base URL.
    pub fn path(self) -> &'static str {
        match self {
            Self::Jurisdictions => "api/jurisdictions",
            Self::Meetings => "api/meetings",
            Self::Summaries => "api/summaries",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a cached query: endpoint plus canonical parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    endpoint: Endpoint,
    params: BTreeMap<String, String>,
}

impl CacheKey {
    /// Key for an endpoint without parameters.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            params: BTreeMap::new(),
        }
    }

    /// Build a key from arbitrary name/value pairs.
    ///
    /// Values are canonicalized through `ToString`; a repeated name keeps the
    /// last value supplied.
    pub fn from_params<I, K, V>(endpoint: Endpoint, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        params
            .into_iter()
            .fold(Self::new(endpoint), |key, (name, value)| {
                key.with_param(name, value)
            })
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn has_params(&self) -> bool {
        !self.params.is_empty()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint.as_str())?;
        let mut separator = '?';
        for (name, value) in &self.params {
            write!(f, "{separator}{name}={value}")?;
            separator = '&';
        }
        Ok(())
    }
}

/// What a view asks the cache for.
///
/// `Idle` stands in for a query that must not run at all (for example
/// summaries while no meeting is selected); resolving it yields an empty
/// result and never touches the network.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Fetch(CacheKey),
    Idle(Endpoint),
}

impl QueryKey {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            Self::Fetch(key) => key.endpoint(),
            Self::Idle(endpoint) => *endpoint,
        }
    }

    pub fn cache_key(&self) -> Option<&CacheKey> {
        match self {
            Self::Fetch(key) => Some(key),
            Self::Idle(_) => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle(_))
    }
}

impl From<CacheKey> for QueryKey {
    fn from(key: CacheKey) -> Self {
        Self::Fetch(key)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(key) => key.fmt(f),
            Self::Idle(endpoint) => write!(f, "{endpoint} (idle)"),
        }
    }
}
