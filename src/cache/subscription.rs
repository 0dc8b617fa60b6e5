use std::sync::Weak;

use tokio::sync::watch;

use super::entry::Snapshot;
use super::keys::QueryKey;
use super::store::QueryCache;

/// Live view of one cache entry.
///
/// Receives every status or version change of its key. Dropping the last
/// subscription for a key releases the channel held by the cache.
pub struct Subscription {
    key: QueryKey,
    receiver: watch::Receiver<Snapshot>,
    cache: Option<Weak<QueryCache>>,
}

impl Subscription {
    pub(crate) fn attached(
        key: QueryKey,
        receiver: watch::Receiver<Snapshot>,
        cache: Weak<QueryCache>,
    ) -> Self {
        Self {
            key,
            receiver,
            cache: Some(cache),
        }
    }

    /// A subscription that never changes, used for idle keys.
    pub(crate) fn detached(key: QueryKey, snapshot: Snapshot) -> Self {
        let (_sender, receiver) = watch::channel(snapshot);
        Self {
            key,
            receiver,
            cache: None,
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn current(&self) -> Snapshot {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change. Returns `None` once the cache is gone or the
    /// key can no longer change.
    pub async fn changed(&mut self) -> Option<Snapshot> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Wait until the current snapshot satisfies `predicate`.
    ///
    /// If the entry can no longer change, returns whatever it holds.
    pub async fn wait_until<F>(&mut self, mut predicate: F) -> Snapshot
    where
        F: FnMut(&Snapshot) -> bool,
    {
        let reached = match self.receiver.wait_for(&mut predicate).await {
            Ok(snapshot) => Some(snapshot.clone()),
            Err(_) => None,
        };
        reached.unwrap_or_else(|| self.current())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let QueryKey::Fetch(key) = &self.key else {
            return;
        };
        if let Some(cache) = self.cache.as_ref().and_then(Weak::upgrade) {
            cache.release(key);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("current", &*self.receiver.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::EntryStatus;
    use crate::cache::keys::Endpoint;

    #[tokio::test]
    async fn detached_subscription_reports_its_snapshot_and_never_changes() {
        let key = QueryKey::Idle(Endpoint::Summaries);
        let mut subscription = Subscription::detached(key.clone(), Snapshot::idle(Endpoint::Summaries));

        assert_eq!(subscription.key(), &key);
        assert_eq!(subscription.current().status, EntryStatus::Fresh);
        assert!(subscription.changed().await.is_none());

        let settled = subscription
            .wait_until(|snapshot| snapshot.status == EntryStatus::Failed)
            .await;
        assert_eq!(settled, Snapshot::idle(Endpoint::Summaries));
    }
}
