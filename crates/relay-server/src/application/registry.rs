//! ConnectionRegistry: the shared map of live connections.
//!
//! The registry is the only mutable state shared between sessions.  Every
//! session inserts itself when it opens and removes itself when it closes;
//! every broadcast takes a [`snapshot`](ConnectionRegistry::snapshot) and
//! iterates it without holding the lock, so concurrent adds and removes never
//! block or corrupt a fan-out in progress.
//!
//! # Invariant
//!
//! An entry exists exactly while its session loop is between registration and
//! deregistration.  Only the owning session removes its entry.  A broadcast
//! that fails to reach a peer does not remove the entry itself: it calls
//! [`Peer::evict`], which wakes the owning session, and that session then
//! deregisters on its way out.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use relay_core::ConnectionId;
use tokio::sync::{Notify, RwLock};

use crate::application::transport::PeerSink;

/// One registry entry: the send side of a connection plus its eviction signal.
///
/// Cloning is cheap (two `Arc`s and a `Copy` id), which is what makes
/// snapshots cheap.
#[derive(Clone)]
pub struct Peer {
    id: ConnectionId,
    sink: Arc<dyn PeerSink>,
    eviction: Arc<Notify>,
}

impl Peer {
    pub fn new(id: ConnectionId, sink: Arc<dyn PeerSink>) -> Self {
        Self {
            id,
            sink,
            eviction: Arc::new(Notify::new()),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn sink(&self) -> &Arc<dyn PeerSink> {
        &self.sink
    }

    /// Asks the owning session to shut down.
    ///
    /// `Notify::notify_one` stores a permit when nobody is waiting yet, so an
    /// eviction raised while the session is busy broadcasting is not lost.
    pub fn evict(&self) {
        self.eviction.notify_one();
    }

    /// Resolves once [`evict`](Self::evict) has been called.
    pub async fn evicted(&self) {
        self.eviction.notified().await;
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Concurrency-safe map from [`ConnectionId`] to [`Peer`].
///
/// Constructed once in `run_server` and handed to every session as an
/// `Arc<ConnectionRegistry>`.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    peers: RwLock<HashMap<ConnectionId, Peer>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `peer` under its identifier.
    ///
    /// # Panics
    ///
    /// Panics if the identifier is already registered.  Identifiers are random
    /// v4 UUIDs generated per connection, so a duplicate means a programming
    /// error, and overwriting the live entry would orphan its session.
    pub async fn add(&self, peer: Peer) {
        let mut peers = self.peers.write().await;
        match peers.entry(peer.id()) {
            Entry::Occupied(existing) => {
                panic!("connection {} is already registered", existing.key());
            }
            Entry::Vacant(slot) => {
                slot.insert(peer);
            }
        }
    }

    /// Removes the entry for `id`.  Returns `false` (not an error) if there
    /// was none.
    pub async fn remove(&self, id: ConnectionId) -> bool {
        self.peers.write().await.remove(&id).is_some()
    }

    /// Returns the entries registered at the instant of the call.
    ///
    /// The returned `Vec` is detached from the registry: peers added later are
    /// not in it, and peers removed while the caller iterates are still in it
    /// (sending to them simply fails).  No particular order.
    pub async fn snapshot(&self) -> Vec<Peer> {
        self.peers.read().await.values().cloned().collect()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.peers.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::RecordingSink;
    use std::time::Duration;

    fn make_peer() -> Peer {
        Peer::new(ConnectionId::new_random(), Arc::new(RecordingSink::new()))
    }

    #[tokio::test]
    async fn test_new_registry_is_empty() {
        let registry = ConnectionRegistry::new();
        assert!(registry.is_empty().await);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_add_then_contains() {
        // Arrange
        let registry = ConnectionRegistry::new();
        let peer = make_peer();
        let id = peer.id();

        // Act
        registry.add(peer).await;

        // Assert
        assert!(registry.contains(id).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    #[should_panic(expected = "already registered")]
    async fn test_add_duplicate_id_panics() {
        let registry = ConnectionRegistry::new();
        let peer = make_peer();
        registry.add(peer.clone()).await;
        registry.add(peer).await;
    }

    #[tokio::test]
    async fn test_remove_present_returns_true() {
        let registry = ConnectionRegistry::new();
        let peer = make_peer();
        let id = peer.id();
        registry.add(peer).await;

        assert!(registry.remove(id).await);
        assert!(!registry.contains(id).await);
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let registry = ConnectionRegistry::new();
        registry.add(make_peer()).await;

        assert!(!registry.remove(ConnectionId::new_random()).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_snapshot_contains_every_registered_peer() {
        let registry = ConnectionRegistry::new();
        let mut expected = Vec::new();
        for _ in 0..5 {
            let peer = make_peer();
            expected.push(peer.id());
            registry.add(peer).await;
        }

        let mut ids: Vec<_> = registry.snapshot().await.iter().map(Peer::id).collect();
        ids.sort();
        expected.sort();

        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_snapshot_is_detached_from_later_changes() {
        let registry = ConnectionRegistry::new();
        let first = make_peer();
        let first_id = first.id();
        registry.add(first).await;

        let snapshot = registry.snapshot().await;
        registry.remove(first_id).await;
        registry.add(make_peer()).await;

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), first_id);
    }

    #[tokio::test]
    async fn test_concurrent_add_remove_and_snapshot_stay_consistent() {
        // Arrange: many tasks hammering the same registry
        let registry = Arc::new(ConnectionRegistry::new());
        let mut handles = Vec::new();

        for _ in 0..32 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                let peer = make_peer();
                let id = peer.id();
                registry.add(peer).await;
                let _ = registry.snapshot().await;
                assert!(registry.remove(id).await);
            }));
        }

        // Act
        for handle in handles {
            handle.await.expect("task must not panic");
        }

        // Assert
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_evict_before_wait_is_not_lost() {
        let peer = make_peer();
        peer.evict();

        let waited = tokio::time::timeout(Duration::from_secs(1), peer.evicted()).await;

        assert!(waited.is_ok(), "stored permit must wake the waiter");
    }

    #[tokio::test]
    async fn test_evict_through_clone_wakes_original() {
        let peer = make_peer();
        let clone = peer.clone();

        let waiter = tokio::spawn(async move { peer.evicted().await });
        clone.evict();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter must wake")
            .expect("waiter must not panic");
    }

    #[test]
    fn test_debug_shows_id_only() {
        let peer = make_peer();
        let rendered = format!("{peer:?}");
        assert!(rendered.contains(&peer.id().to_string()));
    }
}
