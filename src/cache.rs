//! Reservation-based artifact cache.
//!
//! Every identifier carries a *reservation*: the request describing the
//! artifact that should currently exist for it. Fetches are deduplicated with
//! an in-flight set, completed artifacts are accepted only when they answer the
//! current reservation, and produced artifacts live in a strict LRU store.
//!
//! ```rust
//! use pathtile::{ArtifactCache, ObjectId};
//!
//! let mut cache: ArtifactCache<&str, u32> = ArtifactCache::new(8);
//! let id = ObjectId::named("p1");
//!
//! cache.reserve(id, "read-A");
//! assert_eq!(cache.collect_pending(&[id]), vec![(id, "read-A")]);
//! assert!(cache.collect_pending(&[id]).is_empty());
//!
//! assert!(cache.complete(id, &"read-A", 7));
//! assert_eq!(cache.get(&[id]), (vec![id], vec![7]));
//! ```

use crate::types::ObjectId;
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use std::hash::BuildHasherDefault;

/// Default number of artifacts kept in memory.
pub const DEFAULT_CACHE_CAPACITY: usize = 300;

type LruStore<A> = IndexMap<ObjectId, A, BuildHasherDefault<FxHasher>>;

/// Outcome of [`ArtifactCache::reserve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// No reservation existed before.
    Created,
    /// The request equals the current reservation; nothing changed.
    Unchanged,
    /// The request differs; in-flight state and the cached artifact were dropped.
    Replaced,
}

/// Cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Ids found in the artifact store by `get`
    pub hits: u64,
    /// Ids asked for by `get` but not cached
    pub misses: u64,
    /// Results stored by `complete`
    pub accepted: u64,
    /// Results dropped by `complete` as stale or unrequested
    pub rejected: u64,
    /// Artifacts pushed out by the capacity limit
    pub evictions: u64,
}

/// Reservation table, in-flight set and bounded LRU artifact store.
///
/// `R` is the request type and must compare structurally; `A` is the artifact
/// type, usually a cheaply clonable handle such as `Arc<TileImage>`.
#[derive(Debug)]
pub struct ArtifactCache<R, A> {
    reservations: FxHashMap<ObjectId, R>,
    requesting: FxHashSet<ObjectId>,
    /// Oldest entry first
    artifacts: LruStore<A>,
    capacity: usize,
    stats: CacheStats,
}

impl<R, A> ArtifactCache<R, A>
where
    R: PartialEq + Clone,
    A: Clone,
{
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Cache capacity must be greater than zero");
        Self {
            reservations: FxHashMap::default(),
            requesting: FxHashSet::default(),
            artifacts: LruStore::with_capacity_and_hasher(capacity, Default::default()),
            capacity,
            stats: CacheStats::default(),
        }
    }

    /// Declare the artifact that should exist for `id`.
    pub fn reserve(&mut self, id: ObjectId, request: R) -> Reservation {
        match self.reservations.get_mut(&id) {
            None => {
                self.reservations.insert(id, request);
                Reservation::Created
            }
            Some(current) if *current == request => Reservation::Unchanged,
            Some(current) => {
                *current = request;
                self.requesting.remove(&id);
                self.artifacts.shift_remove(&id);
                Reservation::Replaced
            }
        }
    }

    /// Reserved ids among `ids` that still need fetching.
    ///
    /// Returned ids are marked in flight, so a second call before
    /// [`complete`](ArtifactCache::complete) yields nothing for them.
    pub fn collect_pending(&mut self, ids: &[ObjectId]) -> Vec<(ObjectId, R)> {
        let mut pending = Vec::new();
        for id in ids {
            if self.requesting.contains(id) || self.artifacts.contains_key(id) {
                continue;
            }
            let Some(request) = self.reservations.get(id) else {
                continue;
            };
            self.requesting.insert(*id);
            pending.push((*id, request.clone()));
        }
        pending
    }

    /// Offer a produced artifact. Returns `true` if it was stored.
    ///
    /// The artifact is accepted only while `id` is in flight and `request`
    /// still equals its reservation; late answers to replaced requests are
    /// dropped.
    pub fn complete(&mut self, id: ObjectId, request: &R, artifact: A) -> bool {
        let current = self.reservations.get(&id);
        if !self.requesting.contains(&id) || current != Some(request) {
            log::trace!("Dropping stale or unrequested artifact for {}", id);
            self.stats.rejected += 1;
            return false;
        }

        self.requesting.remove(&id);
        self.store(id, artifact);
        self.stats.accepted += 1;
        true
    }

    /// Cached subset of `ids`, in the same order, refreshing their recency.
    pub fn get(&mut self, ids: &[ObjectId]) -> (Vec<ObjectId>, Vec<A>) {
        let mut present = Vec::new();
        let mut artifacts = Vec::new();
        for id in ids {
            match self.artifacts.shift_remove(id) {
                Some(artifact) => {
                    self.artifacts.insert(*id, artifact.clone());
                    present.push(*id);
                    artifacts.push(artifact);
                    self.stats.hits += 1;
                }
                None => self.stats.misses += 1,
            }
        }
        (present, artifacts)
    }

    /// Cached artifact for `id` without touching recency.
    pub fn peek(&self, id: &ObjectId) -> Option<&A> {
        self.artifacts.get(id)
    }

    /// Forget everything about `id`.
    pub fn evict(&mut self, id: &ObjectId) {
        self.reservations.remove(id);
        self.requesting.remove(id);
        self.artifacts.shift_remove(id);
    }

    /// Clear the in-flight flag of `id` so the next
    /// [`collect_pending`](ArtifactCache::collect_pending) issues it again.
    ///
    /// The cache never expires in-flight requests by itself; callers that
    /// detect a lost worker response use this to retry.
    pub fn reset_requesting(&mut self, id: &ObjectId) -> bool {
        self.requesting.remove(id)
    }

    pub fn reservation(&self, id: &ObjectId) -> Option<&R> {
        self.reservations.get(id)
    }

    pub fn is_requesting(&self, id: &ObjectId) -> bool {
        self.requesting.contains(id)
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.artifacts.contains_key(id)
    }

    /// Number of cached artifacts.
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    pub fn requesting_count(&self) -> usize {
        self.requesting.len()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Drop all reservations, in-flight markers and artifacts.
    pub fn clear(&mut self) {
        self.reservations.clear();
        self.requesting.clear();
        self.artifacts.clear();
    }

    fn store(&mut self, id: ObjectId, artifact: A) {
        self.artifacts.shift_remove(&id);
        while self.artifacts.len() >= self.capacity {
            let Some((evicted, _)) = self.artifacts.shift_remove_index(0) else {
                break;
            };
            log::trace!("Evicting least recently used artifact {}", evicted);
            self.stats.evictions += 1;
        }
        self.artifacts.insert(id, artifact);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> ObjectId {
        ObjectId::named(name)
    }

    fn filled(cache: &mut ArtifactCache<&'static str, u32>, name: &str, value: u32) {
        cache.reserve(id(name), "q");
        cache.collect_pending(&[id(name)]);
        assert!(cache.complete(id(name), &"q", value));
    }

    #[test]
    fn test_collect_pending_dedups() {
        let mut cache: ArtifactCache<&str, u32> = ArtifactCache::new(4);
        cache.reserve(id("a"), "Q");

        assert_eq!(cache.collect_pending(&[id("a")]), vec![(id("a"), "Q")]);
        assert!(cache.collect_pending(&[id("a")]).is_empty());
        assert!(cache.is_requesting(&id("a")));
    }

    #[test]
    fn test_collect_pending_skips_unreserved_and_duplicates() {
        let mut cache: ArtifactCache<&str, u32> = ArtifactCache::new(4);
        cache.reserve(id("a"), "Q");

        let pending = cache.collect_pending(&[id("x"), id("a"), id("a")]);
        assert_eq!(pending, vec![(id("a"), "Q")]);
    }

    #[test]
    fn test_stale_result_rejected() {
        let mut cache: ArtifactCache<&str, u32> = ArtifactCache::new(4);
        cache.reserve(id("a"), "Q1");
        cache.collect_pending(&[id("a")]);
        assert_eq!(cache.reserve(id("a"), "Q2"), Reservation::Replaced);

        assert!(!cache.complete(id("a"), &"Q1", 1));
        assert_eq!(cache.get(&[id("a")]), (vec![], vec![]));
        assert_eq!(cache.stats().rejected, 1);

        // The replaced reservation is fetched again
        assert_eq!(cache.collect_pending(&[id("a")]), vec![(id("a"), "Q2")]);
    }

    #[test]
    fn test_unrequested_result_rejected() {
        let mut cache: ArtifactCache<&str, u32> = ArtifactCache::new(4);
        cache.reserve(id("a"), "Q");
        assert!(!cache.complete(id("a"), &"Q", 1));
        assert!(!cache.complete(id("unknown"), &"Q", 1));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_equal_reservation_is_noop() {
        let mut cache: ArtifactCache<&str, u32> = ArtifactCache::new(4);
        filled(&mut cache, "a", 1);
        assert_eq!(cache.reserve(id("a"), "q"), Reservation::Unchanged);
        assert!(cache.contains(&id("a")));

        cache.reserve(id("b"), "q");
        cache.collect_pending(&[id("b")]);
        assert_eq!(cache.reserve(id("b"), "q"), Reservation::Unchanged);
        assert!(cache.is_requesting(&id("b")));
    }

    #[test]
    fn test_changed_reservation_evicts_artifact() {
        let mut cache: ArtifactCache<&str, u32> = ArtifactCache::new(4);
        filled(&mut cache, "a", 1);

        cache.reserve(id("a"), "other");
        assert!(!cache.contains(&id("a")));
        assert_eq!(cache.reservation(&id("a")), Some(&"other"));
    }

    #[test]
    fn test_lru_eviction_order() {
        let mut cache: ArtifactCache<&str, u32> = ArtifactCache::new(2);
        filled(&mut cache, "a", 1);
        filled(&mut cache, "b", 2);

        // Touch "a" so "b" becomes the oldest
        cache.get(&[id("a")]);
        filled(&mut cache, "c", 3);

        assert!(cache.contains(&id("a")));
        assert!(!cache.contains(&id("b")));
        assert!(cache.contains(&id("c")));
        assert_eq!(cache.stats().evictions, 1);

        // The reservation survives eviction, so "b" is pending again
        assert_eq!(cache.collect_pending(&[id("b")]), vec![(id("b"), "q")]);
    }

    #[test]
    fn test_peek_keeps_recency() {
        let mut cache: ArtifactCache<&str, u32> = ArtifactCache::new(2);
        filled(&mut cache, "a", 1);
        filled(&mut cache, "b", 2);

        assert_eq!(cache.peek(&id("a")), Some(&1));
        filled(&mut cache, "c", 3);

        assert!(cache.peek(&id("a")).is_none());
        assert_eq!(cache.peek(&id("b")), Some(&2));
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_get_preserves_order() {
        let mut cache: ArtifactCache<&str, u32> = ArtifactCache::new(4);
        filled(&mut cache, "a", 1);
        filled(&mut cache, "b", 2);

        let (ids, values) = cache.get(&[id("b"), id("missing"), id("a")]);
        assert_eq!(ids, vec![id("b"), id("a")]);
        assert_eq!(values, vec![2, 1]);
        assert_eq!(cache.stats().hits, 2);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_evict_removes_everything() {
        let mut cache: ArtifactCache<&str, u32> = ArtifactCache::new(4);
        filled(&mut cache, "a", 1);
        cache.evict(&id("a"));
        cache.evict(&id("never-seen"));

        assert!(cache.reservation(&id("a")).is_none());
        assert!(cache.collect_pending(&[id("a")]).is_empty());
        assert!(!cache.contains(&id("a")));
    }

    #[test]
    fn test_reset_requesting_allows_retry() {
        let mut cache: ArtifactCache<&str, u32> = ArtifactCache::new(4);
        cache.reserve(id("a"), "Q");
        cache.collect_pending(&[id("a")]);

        assert!(cache.reset_requesting(&id("a")));
        assert_eq!(cache.collect_pending(&[id("a")]).len(), 1);
    }
}
