//! Coarse grid bucket index with an exact-overlap filter.
//!
//! Objects register one or more [`Bound`]s (typically one per pyramid level).
//! Each bound is spread over the fixed-size grid cells it covers; a query
//! collects candidates from the cells it covers and keeps only those with at
//! least one registered bound overlapping the query. Bucket size therefore
//! only affects speed, never correctness.

use crate::types::{Bound, BucketKey, Layer, ObjectId};
use rustc_hash::{FxHashMap, FxHashSet};

/// Default edge length of a grid cell, in pixels.
pub const DEFAULT_BUCKET_SIZE: i64 = 256;

/// A single-layer bucket index.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    bucket_size: i64,
    /// Forward index: cell to the objects registered in it
    buckets: FxHashMap<BucketKey, FxHashSet<ObjectId>>,
    /// Reverse index used for removal
    object_buckets: FxHashMap<ObjectId, FxHashSet<BucketKey>>,
    /// Exact bounds registered per object
    object_bounds: FxHashMap<ObjectId, FxHashSet<Bound>>,
}

impl SpatialIndex {
    pub fn new(bucket_size: i64) -> Self {
        assert!(bucket_size > 0, "Bucket size must be greater than zero");
        Self {
            bucket_size,
            buckets: FxHashMap::default(),
            object_buckets: FxHashMap::default(),
            object_bounds: FxHashMap::default(),
        }
    }

    pub fn bucket_size(&self) -> i64 {
        self.bucket_size
    }

    /// Register `bounds` for `id`.
    ///
    /// Bounds already registered for `id` are kept; call [`unregister`] first
    /// to replace them.
    ///
    /// [`unregister`]: SpatialIndex::unregister
    pub fn register(&mut self, id: ObjectId, bounds: &[Bound]) {
        for bound in bounds {
            let reverse = self.object_buckets.entry(id).or_default();
            for key in bound.bucket_keys(self.bucket_size) {
                self.buckets.entry(key).or_default().insert(id);
                reverse.insert(key);
            }
            self.object_bounds.entry(id).or_default().insert(*bound);
        }
    }

    /// Remove every bound of `id`. Returns `false` if `id` was not registered.
    pub fn unregister(&mut self, id: ObjectId) -> bool {
        let Some(keys) = self.object_buckets.remove(&id) else {
            self.object_bounds.remove(&id);
            return false;
        };

        for key in keys {
            if let Some(bucket) = self.buckets.get_mut(&key) {
                bucket.remove(&id);
                if bucket.is_empty() {
                    self.buckets.remove(&key);
                }
            }
        }
        self.object_bounds.remove(&id);
        true
    }

    /// Objects with at least one bound overlapping any of `bounds`.
    pub fn query(&self, bounds: &[Bound]) -> FxHashSet<ObjectId> {
        let mut result = FxHashSet::default();

        for query in bounds {
            for key in query.bucket_keys(self.bucket_size) {
                let Some(bucket) = self.buckets.get(&key) else {
                    continue;
                };
                for id in bucket {
                    if result.contains(id) {
                        continue;
                    }
                    let hit = self
                        .object_bounds
                        .get(id)
                        .is_some_and(|registered| registered.iter().any(|b| b.overlaps(query)));
                    if hit {
                        result.insert(*id);
                    }
                }
            }
        }

        result
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.object_bounds.contains_key(id)
    }

    /// Exact bounds registered for `id`.
    pub fn bounds_of(&self, id: &ObjectId) -> Vec<Bound> {
        self.object_bounds
            .get(id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.object_bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.object_bounds.is_empty()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.object_buckets.clear();
        self.object_bounds.clear();
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET_SIZE)
    }
}

/// One [`SpatialIndex`] per [`Layer`].
#[derive(Debug, Clone)]
pub struct LayeredIndex {
    pathology: SpatialIndex,
    point: SpatialIndex,
    area: SpatialIndex,
    annotation_group: SpatialIndex,
}

impl LayeredIndex {
    pub fn new(bucket_size: i64) -> Self {
        Self {
            pathology: SpatialIndex::new(bucket_size),
            point: SpatialIndex::new(bucket_size),
            area: SpatialIndex::new(bucket_size),
            annotation_group: SpatialIndex::new(bucket_size),
        }
    }

    pub fn layer(&self, layer: Layer) -> &SpatialIndex {
        match layer {
            Layer::Pathology => &self.pathology,
            Layer::Point => &self.point,
            Layer::Area => &self.area,
            Layer::AnnotationGroup => &self.annotation_group,
        }
    }

    pub fn layer_mut(&mut self, layer: Layer) -> &mut SpatialIndex {
        match layer {
            Layer::Pathology => &mut self.pathology,
            Layer::Point => &mut self.point,
            Layer::Area => &mut self.area,
            Layer::AnnotationGroup => &mut self.annotation_group,
        }
    }

    pub fn bind(&mut self, id: ObjectId, bounds: &[Bound], layer: Layer) {
        self.layer_mut(layer).register(id, bounds);
    }

    pub fn unbind(&mut self, id: ObjectId, layer: Layer) -> bool {
        self.layer_mut(layer).unregister(id)
    }

    pub fn query(&self, bounds: &[Bound], layer: Layer) -> FxHashSet<ObjectId> {
        self.layer(layer).query(bounds)
    }

    pub fn stats(&self) -> IndexStats {
        let mut stats = IndexStats::default();
        for layer in Layer::ALL {
            let index = self.layer(layer);
            stats.objects += index.len();
            stats.buckets += index.bucket_count();
        }
        stats
    }

    pub fn clear(&mut self) {
        for layer in Layer::ALL {
            self.layer_mut(layer).clear();
        }
    }
}

impl Default for LayeredIndex {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET_SIZE)
    }
}

/// Statistics about the layered index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Registered objects across all layers
    pub objects: usize,
    /// Non-empty buckets across all layers
    pub buckets: usize,
}
