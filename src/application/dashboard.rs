//! Dashboard controller.
//!
//! Owns the user's [`Selection`] and the keys derived from it, and is the
//! single entry point through which a view changes selection, reads cached
//! data or runs mutations.

use std::sync::Arc;

use gadfly_api_types::Meeting;
use tokio::sync::watch;
use tracing::info;

use crate::application::fetch::{Fetcher, Mutation};
use crate::application::filter::filter_meetings;
use crate::cache::{
    CacheConfig, DependencyGraph, DerivedKeys, Endpoint, MutationError, MutationInvalidator,
    MutationOutcome, Payload, QueryCache, QueryKey, Selection, SelectionField, Snapshot,
    Subscription,
};

/// Everything a view needs to decide what to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    pub selection: Selection,
    pub keys: DerivedKeys,
    /// Free-text meeting filter.
    pub search: String,
}

pub struct Dashboard {
    cache: Arc<QueryCache>,
    graph: DependencyGraph,
    invalidator: MutationInvalidator,
    view: watch::Sender<ViewState>,
}

impl Dashboard {
    pub fn new(config: CacheConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let cache = Arc::new(QueryCache::new(&config, fetcher));
        let invalidator = MutationInvalidator::new(config, Arc::clone(&cache));
        Self::with_parts(cache, DependencyGraph::standard(), invalidator)
    }

    pub fn with_parts(
        cache: Arc<QueryCache>,
        graph: DependencyGraph,
        invalidator: MutationInvalidator,
    ) -> Self {
        let selection = Selection::new();
        let keys = graph.derive(&selection);
        let (view, _) = watch::channel(ViewState {
            selection,
            keys,
            search: String::new(),
        });
        Self {
            cache,
            graph,
            invalidator,
            view,
        }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn view(&self) -> ViewState {
        self.view.borrow().clone()
    }

    /// Receiver notified whenever selection, keys or search change.
    pub fn watch_view(&self) -> watch::Receiver<ViewState> {
        self.view.subscribe()
    }

    pub fn selection(&self) -> Selection {
        self.view.borrow().selection.clone()
    }

    pub fn keys(&self) -> DerivedKeys {
        self.view.borrow().keys.clone()
    }

    pub fn key(&self, endpoint: Endpoint) -> QueryKey {
        self.view.borrow().keys.key(endpoint)
    }

    /// Change one selection field.
    ///
    /// Selection and every derived key are replaced together, so a view never
    /// sees keys from two different selections. All active keys are then
    /// resolved.
    pub fn set_selection(&self, field: SelectionField, value: Option<&str>) -> DerivedKeys {
        let mut moved = Vec::new();
        let modified = self.view.send_if_modified(|view| {
            if !view.selection.set(field, value) {
                return false;
            }
            let keys = self.graph.derive(&view.selection);
            moved = keys.changed_since(&view.keys);
            view.keys = keys;
            true
        });

        if modified {
            info!(
                field = field.as_str(),
                value = ?value,
                moved = ?moved,
                "Selection changed"
            );
        }
        self.refresh();
        self.keys()
    }

    pub fn set_search(&self, query: &str) {
        self.view.send_if_modified(|view| {
            if view.search == query {
                return false;
            }
            view.search = query.to_string();
            true
        });
    }

    /// Resolve the active key of `endpoint`, scheduling a fetch if needed.
    pub fn observe(&self, endpoint: Endpoint) -> Snapshot {
        self.cache.resolve(&self.key(endpoint))
    }

    pub fn subscribe(&self, endpoint: Endpoint) -> Subscription {
        self.cache.subscribe(&self.key(endpoint))
    }

    /// Resolve the active key of `endpoint` and wait for its fetch to settle.
    pub async fn settled(&self, endpoint: Endpoint) -> Snapshot {
        let key = self.key(endpoint);
        self.cache.settled(&key).await
    }

    /// Resolve every active key; keys whose last fetch failed are fetched
    /// again.
    pub fn refresh(&self) -> Vec<(Endpoint, Snapshot)> {
        self.keys()
            .iter()
            .map(|(endpoint, key)| {
                let snapshot = if self.cache.peek(key).is_failed() {
                    info!(key = %key, "Retrying failed query");
                    self.cache.refetch(key)
                } else {
                    self.cache.resolve(key)
                };
                (endpoint, snapshot)
            })
            .collect()
    }

    /// Cached meetings of the active key, narrowed by the search text.
    ///
    /// Never triggers a fetch.
    pub fn filtered_meetings(&self) -> Vec<Meeting> {
        let (key, search) = {
            let view = self.view.borrow();
            (view.keys.key(Endpoint::Meetings), view.search.clone())
        };
        let snapshot = self.cache.peek(&key);
        snapshot
            .payload()
            .and_then(Payload::meetings)
            .map(|meetings| filter_meetings(meetings, &search))
            .unwrap_or_default()
    }

    /// Run a mutation; on success the affected entries are invalidated and
    /// every active key is resolved again.
    pub async fn mutate(&self, mutation: Mutation) -> Result<MutationOutcome, MutationError> {
        let outcome = self.invalidator.mutate(mutation).await?;
        self.refresh();
        Ok(outcome)
    }

    /// Summarize the selected meeting, forcing regeneration.
    pub async fn summarize_selected(&self) -> Result<MutationOutcome, MutationError> {
        let Some(meeting) = self.selection().meeting().map(str::to_string) else {
            return Err(MutationError::invalid("summarize", "no meeting selected"));
        };
        self.mutate(Mutation::summarize(meeting)).await
    }
}
