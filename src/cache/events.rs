//! Invalidation sets and the events that broadcast them.
//!
//! A mutation declares up front which keys it affects; after the write
//! succeeds the invalidator wraps that declaration in an [`InvalidationEvent`]
//! and applies it to the query cache.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use super::keys::{CacheKey, Endpoint};

/// Monotonic ordering number for invalidation events within this process.
pub type Epoch = u64;

/// Matches cache keys affected by a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
    /// Exactly one key.
    Exact(CacheKey),
    /// Every key of an endpoint, regardless of parameters.
    Endpoint(Endpoint),
    /// Every key in the cache.
    All,
}

impl KeyPattern {
    pub fn matches(&self, key: &CacheKey) -> bool {
        match self {
            Self::Exact(exact) => exact == key,
            Self::Endpoint(endpoint) => key.endpoint() == *endpoint,
            Self::All => true,
        }
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(key) => key.fmt(f),
            Self::Endpoint(endpoint) => write!(f, "{endpoint}/*"),
            Self::All => f.write_str("*"),
        }
    }
}

/// The keys a mutation declares stale once it succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationSet {
    patterns: Vec<KeyPattern>,
}

impl InvalidationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, pattern: KeyPattern) -> Self {
        if !self.patterns.contains(&pattern) {
            self.patterns.push(pattern);
        }
        self
    }

    pub fn with_endpoint(self, endpoint: Endpoint) -> Self {
        self.with(KeyPattern::Endpoint(endpoint))
    }

    pub fn matches(&self, key: &CacheKey) -> bool {
        self.patterns.iter().any(|pattern| pattern.matches(key))
    }

    pub fn patterns(&self) -> &[KeyPattern] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl fmt::Display for InvalidationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (index, pattern) in self.patterns.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            pattern.fmt(f)?;
        }
        f.write_str("]")
    }
}

/// One applied invalidation, kept for observability.
#[derive(Debug, Clone)]
pub struct InvalidationEvent {
    /// Unique identifier (UUIDv4).
    pub id: Uuid,
    pub epoch: Epoch,
    /// Name of the mutation that triggered the event.
    pub mutation: &'static str,
    pub set: InvalidationSet,
    pub timestamp: OffsetDateTime,
}

/// Hands out epochs and stamps invalidation events.
#[derive(Debug, Default)]
pub struct EventClock {
    epoch_counter: AtomicU64,
}

impl EventClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Create and log an event for `set`.
    pub fn stamp(&self, mutation: &'static str, set: InvalidationSet) -> InvalidationEvent {
        let event = InvalidationEvent {
            id: Uuid::new_v4(),
            epoch: self.next_epoch(),
            mutation,
            set,
            timestamp: OffsetDateTime::now_utc(),
        };

        info!(
            event_id = %event.id,
            event_epoch = event.epoch,
            mutation,
            patterns = %event.set,
            "Cache invalidation broadcast"
        );

        event
    }
}
