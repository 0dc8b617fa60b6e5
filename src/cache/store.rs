//! Query cache storage.
//!
//! Maps each [`CacheKey`] to its latest value, freshness and in-flight fetch.
//! Every status transition happens synchronously under one lock, so observers
//! never see a half-applied update; only the network call itself runs on a
//! spawned task.
//!
//! Ordering rules:
//! - Each dispatch takes the next value of a process-wide counter. An entry
//!   only accepts a result whose dispatch number is higher than the last one
//!   it settled, so a slow response can never overwrite a newer one.
//! - Invalidation records the counter value as the entry's stale mark.
//!   Results from dispatches below the mark may update the value but leave
//!   the entry stale.
//! - An evicted entry forgets its settled dispatch, so it may only be
//!   recreated by the newest dispatch for its key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use lru::LruCache;
use metrics::{counter, histogram};
use tokio::sync::watch;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::application::fetch::{FetchError, Fetcher};
use crate::infra::telemetry::{
    METRIC_CACHE_DEDUP, METRIC_CACHE_DROPPED, METRIC_CACHE_EVICT, METRIC_CACHE_HIT,
    METRIC_CACHE_IDLE, METRIC_CACHE_INVALIDATED, METRIC_CACHE_MISS, METRIC_FETCH_MS,
};

use super::config::CacheConfig;
use super::entry::{CacheEntry, EntryStatus, Payload, Snapshot};
use super::events::InvalidationSet;
use super::keys::{CacheKey, QueryKey};
use super::subscription::Subscription;

const SOURCE: &str = "cache::store";

/// What `resolve` should do for a key.
enum Plan {
    Serve,
    Join,
    Dispatch,
}

struct CacheState {
    entries: LruCache<CacheKey, CacheEntry>,
    /// Newest dispatch number per key with a fetch still running.
    in_flight: HashMap<CacheKey, u64>,
    channels: HashMap<CacheKey, watch::Sender<Snapshot>>,
    next_dispatch: u64,
}

impl CacheState {
    fn new(config: &CacheConfig) -> Self {
        Self {
            entries: LruCache::new(config.max_entries_non_zero()),
            in_flight: HashMap::new(),
            channels: HashMap::new(),
            next_dispatch: 1,
        }
    }

    fn entry_mut(&mut self, key: &CacheKey) -> &mut CacheEntry {
        if !self.entries.contains(key) {
            if let Some((evicted, _)) = self.entries.push(key.clone(), CacheEntry::default()) {
                counter!(METRIC_CACHE_EVICT).increment(1);
                debug!(key = %evicted, "Evicted least recently used cache entry");
            }
        }
        self.entries.get_or_insert_mut(key.clone(), CacheEntry::default)
    }

    /// Entry for `key`, recreated if it was evicted.
    ///
    /// A recreated entry only accepts results from `floor` onwards; anything
    /// dispatched earlier was already superseded before the eviction.
    fn entry_from(&mut self, key: &CacheKey, floor: u64) -> &mut CacheEntry {
        let recreated = !self.entries.contains(key);
        let entry = self.entry_mut(key);
        if recreated {
            entry.settled_dispatch = floor.saturating_sub(1);
        }
        entry
    }

    fn snapshot(&self, key: &CacheKey) -> Snapshot {
        self.entries
            .peek(key)
            .map_or_else(Snapshot::empty, CacheEntry::snapshot)
    }

    fn plan(&mut self, key: &CacheKey) -> Plan {
        let Some(entry) = self.entries.get(key) else {
            if let Some(&dispatch) = self.in_flight.get(key) {
                // Evicted while its fetch is still running.
                self.entry_from(key, dispatch).status = EntryStatus::Loading;
                return Plan::Join;
            }
            return Plan::Dispatch;
        };

        match entry.status {
            EntryStatus::Empty => Plan::Dispatch,
            EntryStatus::Loading => Plan::Join,
            EntryStatus::Fresh | EntryStatus::Failed => Plan::Serve,
            EntryStatus::Stale => match self.in_flight.get(key) {
                Some(dispatch) if *dispatch >= entry.stale_mark => Plan::Join,
                _ => Plan::Dispatch,
            },
        }
    }

    fn begin_dispatch(&mut self, key: &CacheKey) -> u64 {
        let dispatch = self.next_dispatch;
        self.next_dispatch += 1;
        self.in_flight.insert(key.clone(), dispatch);

        let entry = self.entry_from(key, dispatch);
        entry.status = EntryStatus::Loading;
        let snapshot = entry.snapshot();
        self.publish(key, snapshot);
        dispatch
    }

    fn publish(&self, key: &CacheKey, snapshot: Snapshot) {
        if let Some(sender) = self.channels.get(key) {
            sender.send_replace(snapshot);
        }
    }
}

/// Per-key cache of API reads with request deduplication.
pub struct QueryCache {
    fetcher: Arc<dyn Fetcher>,
    state: Mutex<CacheState>,
}

impl QueryCache {
    pub fn new(config: &CacheConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            state: Mutex::new(CacheState::new(config)),
        }
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    /// Return the best snapshot available right now and schedule a fetch if
    /// the entry is empty or stale.
    ///
    /// A key that already has a current fetch in flight joins it instead of
    /// issuing a second request. Must be called from within a tokio runtime.
    pub fn resolve(self: &Arc<Self>, key: &QueryKey) -> Snapshot {
        let key = match key {
            QueryKey::Idle(endpoint) => {
                counter!(METRIC_CACHE_IDLE).increment(1);
                return Snapshot::idle(*endpoint);
            }
            QueryKey::Fetch(key) => key,
        };

        let (snapshot, dispatch) = {
            let mut state = self.lock_state("resolve");
            match state.plan(key) {
                Plan::Serve => {
                    counter!(METRIC_CACHE_HIT).increment(1);
                    (state.snapshot(key), None)
                }
                Plan::Join => {
                    counter!(METRIC_CACHE_DEDUP).increment(1);
                    debug!(key = %key, "Joined in-flight fetch");
                    (state.snapshot(key), None)
                }
                Plan::Dispatch => {
                    counter!(METRIC_CACHE_MISS).increment(1);
                    let dispatch = state.begin_dispatch(key);
                    (state.snapshot(key), Some(dispatch))
                }
            }
        };

        if let Some(dispatch) = dispatch {
            self.spawn_fetch(key.clone(), dispatch);
        }
        snapshot
    }

    /// Current snapshot without scheduling anything.
    pub fn peek(&self, key: &QueryKey) -> Snapshot {
        match key {
            QueryKey::Idle(endpoint) => Snapshot::idle(*endpoint),
            QueryKey::Fetch(key) => self.lock_state("peek").snapshot(key),
        }
    }

    /// Mark every cached entry matching `predicate` stale.
    ///
    /// Values are kept; the next `resolve` of each key refetches. Returns the
    /// number of entries marked.
    pub fn invalidate<F>(&self, predicate: F) -> usize
    where
        F: Fn(&CacheKey) -> bool,
    {
        let mut state = self.lock_state("invalidate");
        let mark = state.next_dispatch;

        let mut touched = Vec::new();
        for (key, entry) in state.entries.iter_mut() {
            if entry.status == EntryStatus::Empty || !predicate(key) {
                continue;
            }
            entry.stale_mark = mark;
            entry.status = EntryStatus::Stale;
            touched.push((key.clone(), entry.snapshot()));
        }

        let count = touched.len();
        for (key, snapshot) in touched {
            state.publish(&key, snapshot);
        }

        counter!(METRIC_CACHE_INVALIDATED).increment(count as u64);
        info!(count, stale_mark = mark, "Marked cache entries stale");
        count
    }

    pub fn invalidate_set(&self, set: &InvalidationSet) -> usize {
        self.invalidate(|key| set.matches(key))
    }

    /// Force a new fetch for `key` even if its entry is fresh.
    pub fn refetch(self: &Arc<Self>, key: &QueryKey) -> Snapshot {
        if let Some(cache_key) = key.cache_key() {
            self.invalidate(|candidate| candidate == cache_key);
        }
        self.resolve(key)
    }

    /// Subscribe to every status or version change of `key`.
    ///
    /// The subscription is released when dropped.
    pub fn subscribe(self: &Arc<Self>, key: &QueryKey) -> Subscription {
        let cache_key = match key {
            QueryKey::Idle(endpoint) => {
                return Subscription::detached(key.clone(), Snapshot::idle(*endpoint));
            }
            QueryKey::Fetch(cache_key) => cache_key,
        };

        let mut state = self.lock_state("subscribe");
        let snapshot = state.snapshot(cache_key);
        let receiver = state
            .channels
            .entry(cache_key.clone())
            .or_insert_with(|| watch::channel(snapshot).0)
            .subscribe();
        Subscription::attached(key.clone(), receiver, Arc::downgrade(self))
    }

    /// Resolve `key` and wait until no fetch for it is running.
    pub async fn settled(self: &Arc<Self>, key: &QueryKey) -> Snapshot {
        let mut subscription = self.subscribe(key);
        let snapshot = self.resolve(key);
        if !snapshot.is_fetching() {
            return snapshot;
        }
        subscription
            .wait_until(|snapshot| !snapshot.is_fetching())
            .await
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.lock_state("len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keys with a fetch still running.
    pub fn in_flight_len(&self) -> usize {
        self.lock_state("in_flight_len").in_flight.len()
    }

    pub(crate) fn release(&self, key: &CacheKey) {
        let mut state = self.lock_state("release");
        // The releasing subscription's receiver is still alive at this point.
        if state
            .channels
            .get(key)
            .is_some_and(|sender| sender.receiver_count() <= 1)
        {
            state.channels.remove(key);
        }
    }

    fn spawn_fetch(self: &Arc<Self>, key: CacheKey, dispatch: u64) {
        let cache = Arc::clone(self);
        let span = info_span!("cache.fetch", key = %key, dispatch);
        tokio::spawn(
            async move {
                let started_at = Instant::now();
                let result = cache.fetcher.fetch(&key).await;
                histogram!(METRIC_FETCH_MS, "endpoint" => key.endpoint().as_str())
                    .record(started_at.elapsed().as_secs_f64() * 1000.0);
                cache.settle(&key, dispatch, result);
            }
            .instrument(span),
        );
    }

    fn settle(&self, key: &CacheKey, dispatch: u64, result: Result<Payload, FetchError>) {
        let mut state = self.lock_state("settle");

        let newest = state.in_flight.get(key).copied();
        if newest == Some(dispatch) {
            state.in_flight.remove(key);
        }
        let superseded = newest.is_some_and(|newest| newest > dispatch);

        // An evicted entry lost its settled dispatch; only the newest
        // dispatch may bring it back.
        if !state.entries.contains(key) && newest != Some(dispatch) {
            counter!(METRIC_CACHE_DROPPED).increment(1);
            debug!(key = %key, dispatch, "Dropped response for an evicted entry");
            return;
        }

        let entry = state.entry_from(key, dispatch);
        if dispatch <= entry.settled_dispatch {
            counter!(METRIC_CACHE_DROPPED).increment(1);
            debug!(
                key = %key,
                dispatch,
                settled_dispatch = entry.settled_dispatch,
                "Dropped response from an older dispatch"
            );
            return;
        }
        entry.settled_dispatch = dispatch;
        let predates_invalidation = dispatch < entry.stale_mark;

        let settled_status = match result {
            Ok(payload) => {
                entry.value = Some(Arc::new(payload));
                entry.error = None;
                entry.version += 1;
                EntryStatus::Fresh
            }
            Err(error) => {
                warn!(
                    key = %key,
                    dispatch,
                    error = %error,
                    kind = ?error.kind(),
                    "Fetch failed"
                );
                entry.error = Some(error);
                EntryStatus::Failed
            }
        };

        entry.status = if superseded {
            EntryStatus::Loading
        } else if predates_invalidation {
            EntryStatus::Stale
        } else {
            settled_status
        };

        debug!(
            key = %key,
            dispatch,
            version = entry.version,
            status = entry.status.as_str(),
            "Fetch settled"
        );

        let snapshot = entry.snapshot();
        state.publish(key, snapshot);
    }

    fn lock_state(&self, op: &'static str) -> MutexGuard<'_, CacheState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(
                    op,
                    target_module = SOURCE,
                    lock_kind = "mutex.lock",
                    result = "poisoned_recovered",
                    "Recovered from poisoned query cache lock"
                );
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use gadfly_api_types::Meeting;
    use tokio::sync::oneshot;

    use super::*;
    use crate::application::fetch::{Mutation, MutationResponse};
    use crate::cache::keys::Endpoint;

    type Reply = Result<Payload, FetchError>;

    /// Fetcher whose responses are released one at a time by the test.
    #[derive(Default)]
    struct GatedFetcher {
        calls: AtomicUsize,
        gates: StdMutex<HashMap<usize, oneshot::Receiver<Reply>>>,
    }

    impl GatedFetcher {
        /// Register the reply channel for the `call`-th request (0-based).
        fn gate(&self, call: usize) -> oneshot::Sender<Reply> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().expect("gates").insert(call, rx);
            tx
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for GatedFetcher {
        async fn fetch(&self, _key: &CacheKey) -> Result<Payload, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.gates.lock().expect("gates").remove(&call);
            match gate {
                Some(rx) => rx
                    .await
                    .unwrap_or_else(|_| Err(FetchError::Transport("gate dropped".into()))),
                None => Ok(meetings(&["default"])),
            }
        }

        async fn execute(&self, _mutation: &Mutation) -> Result<MutationResponse, FetchError> {
            Err(FetchError::Transport("not used".into()))
        }
    }

    fn meetings(titles: &[&str]) -> Payload {
        Payload::Meetings(
            titles
                .iter()
                .map(|title| Meeting {
                    id: (*title).to_string(),
                    title: (*title).to_string(),
                    jurisdiction: "Orting".into(),
                    date: None,
                })
                .collect(),
        )
    }

    fn titles(snapshot: &Snapshot) -> Vec<String> {
        snapshot
            .payload()
            .and_then(Payload::meetings)
            .map(|items| items.iter().map(|m| m.title.clone()).collect())
            .unwrap_or_default()
    }

    fn setup(config: &CacheConfig) -> (Arc<GatedFetcher>, Arc<QueryCache>) {
        let fetcher = Arc::new(GatedFetcher::default());
        let cache = Arc::new(QueryCache::new(config, fetcher.clone()));
        (fetcher, cache)
    }

    fn orting() -> QueryKey {
        CacheKey::new(Endpoint::Meetings)
            .with_param("jurisdiction", "Orting")
            .into()
    }

    async fn wait_for_calls(fetcher: &GatedFetcher, expected: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while fetcher.calls() < expected {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("fetcher called in time");
    }

    async fn wait_for_status(cache: &Arc<QueryCache>, key: &QueryKey, status: EntryStatus) -> Snapshot {
        let mut subscription = cache.subscribe(key);
        tokio::time::timeout(
            Duration::from_secs(2),
            subscription.wait_until(|snapshot| snapshot.status == status),
        )
        .await
        .expect("status reached in time")
    }

    #[tokio::test]
    async fn concurrent_resolves_issue_one_request() {
        let (fetcher, cache) = setup(&CacheConfig::default());
        let reply = fetcher.gate(0);
        let key = orting();

        let first = cache.resolve(&key);
        let second = cache.resolve(&key);
        assert_eq!(first.status, EntryStatus::Loading);
        assert_eq!(second.status, EntryStatus::Loading);
        assert_eq!(cache.in_flight_len(), 1);

        reply.send(Ok(meetings(&["Budget Hearing"]))).expect("send");
        let settled = cache.settled(&key).await;

        assert_eq!(fetcher.calls(), 1);
        assert_eq!(settled.status, EntryStatus::Fresh);
        assert_eq!(settled.version, 1);
        assert_eq!(titles(&settled), vec!["Budget Hearing"]);
        assert_eq!(cache.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn fresh_entries_are_served_without_refetch() {
        let (fetcher, cache) = setup(&CacheConfig::default());
        let key = orting();

        cache.settled(&key).await;
        let again = cache.resolve(&key);

        assert_eq!(again.status, EntryStatus::Fresh);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn idle_keys_never_fetch() {
        let (fetcher, cache) = setup(&CacheConfig::default());
        let idle = QueryKey::Idle(Endpoint::Summaries);

        let snapshot = cache.resolve(&idle);
        let settled = cache.settled(&idle).await;

        assert_eq!(snapshot, Snapshot::idle(Endpoint::Summaries));
        assert_eq!(settled, snapshot);
        assert_eq!(fetcher.calls(), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn invalidation_marks_stale_and_keeps_value_until_refetch_lands() {
        let (fetcher, cache) = setup(&CacheConfig::default());
        let key = orting();
        let first = fetcher.gate(0);
        first.send(Ok(meetings(&["old"]))).expect("send");
        cache.settled(&key).await;

        let marked = cache.invalidate(|candidate| candidate.endpoint() == Endpoint::Meetings);
        assert_eq!(marked, 1);
        let stale = cache.peek(&key);
        assert_eq!(stale.status, EntryStatus::Stale);
        assert_eq!(titles(&stale), vec!["old"]);

        let reply = fetcher.gate(1);
        let refetching = cache.resolve(&key);
        assert!(refetching.is_fetching());
        assert_eq!(titles(&refetching), vec!["old"]);

        reply.send(Ok(meetings(&["new"]))).expect("send");
        let fresh = wait_for_status(&cache, &key, EntryStatus::Fresh).await;
        assert_eq!(titles(&fresh), vec!["new"]);
        assert_eq!(fresh.version, 2);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn older_dispatch_arriving_late_does_not_overwrite_newer() {
        let (fetcher, cache) = setup(&CacheConfig::default());
        let key = orting();
        let reply_a = fetcher.gate(0);
        let reply_b = fetcher.gate(1);

        cache.resolve(&key);
        wait_for_calls(&fetcher, 1).await;
        cache.invalidate(|_| true);
        let during = cache.resolve(&key);
        assert!(during.is_fetching());
        wait_for_calls(&fetcher, 2).await;

        reply_b.send(Ok(meetings(&["B"]))).expect("send B");
        let after_b = wait_for_status(&cache, &key, EntryStatus::Fresh).await;
        assert_eq!(titles(&after_b), vec!["B"]);

        reply_a.send(Ok(meetings(&["A"]))).expect("send A");
        tokio::time::sleep(Duration::from_millis(20)).await;

        let final_snapshot = cache.peek(&key);
        assert_eq!(titles(&final_snapshot), vec!["B"]);
        assert_eq!(final_snapshot.status, EntryStatus::Fresh);
        assert_eq!(final_snapshot.version, 1);
    }

    #[tokio::test]
    async fn older_dispatch_arriving_first_stays_loading_until_newest_lands() {
        let (fetcher, cache) = setup(&CacheConfig::default());
        let key = orting();
        let reply_a = fetcher.gate(0);
        let reply_b = fetcher.gate(1);

        cache.resolve(&key);
        wait_for_calls(&fetcher, 1).await;
        cache.invalidate(|_| true);
        cache.resolve(&key);
        wait_for_calls(&fetcher, 2).await;

        let mut subscription = cache.subscribe(&key);
        reply_a.send(Ok(meetings(&["A"]))).expect("send A");
        let interim = subscription.wait_until(|snapshot| snapshot.version == 1).await;
        assert_eq!(interim.status, EntryStatus::Loading);
        assert_eq!(titles(&interim), vec!["A"]);

        reply_b.send(Ok(meetings(&["B"]))).expect("send B");
        let fresh = subscription
            .wait_until(|snapshot| snapshot.status == EntryStatus::Fresh)
            .await;
        assert_eq!(titles(&fresh), vec!["B"]);
        assert_eq!(fresh.version, 2);
    }

    #[tokio::test]
    async fn fetch_landing_after_invalidation_leaves_entry_stale() {
        let (fetcher, cache) = setup(&CacheConfig::default());
        let key = orting();
        let reply = fetcher.gate(0);

        cache.resolve(&key);
        cache.invalidate(|_| true);
        reply.send(Ok(meetings(&["pre-mutation"]))).expect("send");
        let stale = wait_for_status(&cache, &key, EntryStatus::Stale).await;
        assert_eq!(stale.version, 1);

        let refetching = cache.resolve(&key);
        assert!(refetching.is_fetching());
        wait_for_calls(&fetcher, 2).await;
    }

    #[tokio::test]
    async fn failure_keeps_previous_value() {
        let (fetcher, cache) = setup(&CacheConfig::default());
        let key = orting();
        cache.settled(&key).await;

        cache.invalidate(|_| true);
        let reply = fetcher.gate(1);
        cache.resolve(&key);
        reply
            .send(Err(FetchError::server(500, "boom")))
            .expect("send");
        let failed = wait_for_status(&cache, &key, EntryStatus::Failed).await;

        assert_eq!(titles(&failed), vec!["default"]);
        assert_eq!(failed.error, Some(FetchError::server(500, "boom")));
        assert_eq!(failed.version, 1);

        // Failed entries are not retried implicitly.
        cache.resolve(&key);
        tokio::task::yield_now().await;
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn refetch_forces_new_dispatch_for_fresh_entry() {
        let (fetcher, cache) = setup(&CacheConfig::default());
        let key = orting();
        cache.settled(&key).await;

        let snapshot = cache.refetch(&key);
        assert!(snapshot.is_fetching());
        let settled = cache.settled(&key).await;
        assert_eq!(settled.version, 2);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn invalidate_set_only_touches_matching_endpoints() {
        let (_fetcher, cache) = setup(&CacheConfig::default());
        let meetings_key = orting();
        let jurisdictions_key: QueryKey = CacheKey::new(Endpoint::Jurisdictions).into();
        cache.settled(&meetings_key).await;
        cache.settled(&jurisdictions_key).await;

        let set = InvalidationSet::new().with_endpoint(Endpoint::Meetings);
        assert_eq!(cache.invalidate_set(&set), 1);
        assert_eq!(cache.peek(&meetings_key).status, EntryStatus::Stale);
        assert_eq!(cache.peek(&jurisdictions_key).status, EntryStatus::Fresh);
    }

    #[tokio::test]
    async fn lru_limit_evicts_oldest_entries() {
        let config = CacheConfig {
            max_entries: 2,
            ..Default::default()
        };
        let (fetcher, cache) = setup(&config);

        for jurisdiction in ["A", "B", "C"] {
            let key: QueryKey = CacheKey::new(Endpoint::Meetings)
                .with_param("jurisdiction", jurisdiction)
                .into();
            cache.settled(&key).await;
        }

        assert_eq!(cache.len(), 2);
        let evicted: QueryKey = CacheKey::new(Endpoint::Meetings)
            .with_param("jurisdiction", "A")
            .into();
        assert_eq!(cache.peek(&evicted).status, EntryStatus::Empty);
        cache.settled(&evicted).await;
        assert_eq!(fetcher.calls(), 4);
    }

    #[tokio::test]
    async fn older_dispatch_cannot_resurrect_evicted_entry() {
        let config = CacheConfig {
            max_entries: 1,
            ..Default::default()
        };
        let (fetcher, cache) = setup(&config);
        let key = orting();
        let reply_a = fetcher.gate(0);
        let reply_b = fetcher.gate(1);

        cache.resolve(&key);
        wait_for_calls(&fetcher, 1).await;
        cache.invalidate(|_| true);
        cache.resolve(&key);
        wait_for_calls(&fetcher, 2).await;
        reply_b.send(Ok(meetings(&["B"]))).expect("send B");
        wait_for_status(&cache, &key, EntryStatus::Fresh).await;

        let other: QueryKey = CacheKey::new(Endpoint::Jurisdictions).into();
        cache.settled(&other).await;
        assert_eq!(cache.peek(&key).status, EntryStatus::Empty);

        reply_a.send(Ok(meetings(&["A"]))).expect("send A");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.peek(&key).status, EntryStatus::Empty);

        let refetching = cache.resolve(&key);
        assert!(refetching.is_fetching());
        let settled = cache.settled(&key).await;
        assert_eq!(settled.status, EntryStatus::Fresh);
        assert_eq!(titles(&settled), vec!["default"]);
        assert_eq!(fetcher.calls(), 4);
    }

    #[tokio::test]
    async fn recreated_entry_ignores_dispatches_from_before_eviction() {
        let config = CacheConfig {
            max_entries: 1,
            ..Default::default()
        };
        let (fetcher, cache) = setup(&config);
        let key = orting();
        let reply_a = fetcher.gate(0);
        let reply_b = fetcher.gate(1);

        cache.resolve(&key);
        wait_for_calls(&fetcher, 1).await;
        cache.invalidate(|_| true);
        cache.resolve(&key);
        wait_for_calls(&fetcher, 2).await;
        reply_b.send(Ok(meetings(&["B"]))).expect("send B");
        wait_for_status(&cache, &key, EntryStatus::Fresh).await;

        let other: QueryKey = CacheKey::new(Endpoint::Jurisdictions).into();
        cache.settled(&other).await;
        let reply_c = fetcher.gate(3);
        let mut subscription = cache.subscribe(&key);
        cache.resolve(&key);
        wait_for_calls(&fetcher, 4).await;

        reply_a.send(Ok(meetings(&["A"]))).expect("send A");
        tokio::time::sleep(Duration::from_millis(20)).await;
        let interim = cache.peek(&key);
        assert_eq!(interim.status, EntryStatus::Loading);
        assert!(titles(&interim).is_empty());

        reply_c.send(Ok(meetings(&["C"]))).expect("send C");
        let fresh = subscription
            .wait_until(|snapshot| snapshot.status == EntryStatus::Fresh)
            .await;
        assert_eq!(titles(&fresh), vec!["C"]);
        assert_eq!(fresh.version, 1);
    }

    #[tokio::test]
    async fn dropping_last_subscription_releases_channel() {
        let (_fetcher, cache) = setup(&CacheConfig::default());
        let key = orting();
        let cache_key = key.cache_key().expect("fetch key").clone();

        let first = cache.subscribe(&key);
        let second = cache.subscribe(&key);
        drop(first);
        assert!(cache.lock_state("test").channels.contains_key(&cache_key));
        drop(second);
        assert!(!cache.lock_state("test").channels.contains_key(&cache_key));
    }

    #[tokio::test]
    async fn cache_recovers_from_poisoned_lock() {
        let (_fetcher, cache) = setup(&CacheConfig::default());

        let poisoner = Arc::clone(&cache);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.state.lock().expect("state lock should be acquired");
            panic!("poison state lock");
        })
        .join();

        let snapshot = cache.settled(&orting()).await;
        assert_eq!(snapshot.status, EntryStatus::Fresh);
    }
}
