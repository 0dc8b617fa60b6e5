//! Gadfly query cache.
//!
//! Keeps the dashboard's reads consistent while the user moves between
//! jurisdictions, meetings and summaries:
//!
//! - **Query cache** ([`QueryCache`]): one entry per endpoint and parameter
//!   set, with request deduplication and arrival-order protection.
//! - **Dependency graph** ([`deps`]): derives downstream keys from the
//!   current [`Selection`].
//! - **Mutation invalidator** ([`mutation`]): runs writes and marks their
//!   declared keys stale on success.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! max_entries = 256
//! invalidate_meetings_on_summarize = true
//! invalidate_on_upload = true
//! ```

mod config;
pub mod deps;
mod entry;
mod events;
mod keys;
pub mod mutation;
mod store;
mod subscription;

pub use config::CacheConfig;
pub use deps::{DependencyEdge, DependencyGraph, DerivedKeys, Selection, SelectionField, WhenUnset};
pub use entry::{EntryStatus, Payload, Snapshot};
pub use events::{Epoch, EventClock, InvalidationEvent, InvalidationSet, KeyPattern};
pub use keys::{CacheKey, Endpoint, QueryKey};
pub use mutation::{MutationError, MutationInvalidator, MutationOutcome};
pub use store::QueryCache;
pub use subscription::Subscription;
