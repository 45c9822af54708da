//! Annotation records and the annotation-group tile manager.
//!
//! Annotations are stored in level-0 coordinates with the y axis pointing up.
//! For rendering they are grouped into fixed-size tiles, one grid per pyramid
//! level, and each tile carries a [`RasterizeTile`] request describing its
//! content in tile-local raster space. Whenever the members of a tile change
//! the request is rebuilt and reserved in the [`ArtifactCache`]; since
//! reserving an equal request is a no-op, only tiles whose content actually
//! changed are re-rasterized.

use crate::cache::{ArtifactCache, Reservation};
use crate::config::TileSize;
use crate::error::{Result, TileError};
use crate::request::{Palette, RasterizeTile, Request, TilePoint, TilePolygon};
use crate::slide::SlideInfo;
use crate::spatial_index::LayeredIndex;
use crate::types::{Bound, CategoryId, Layer, ObjectId};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::collections::BTreeSet;

/// Per-level bounds of one annotation.
pub type LevelBounds = SmallVec<[Bound; 8]>;

/// A point annotation in level-0 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointAnnotation {
    pub x: i64,
    pub y: i64,
    pub category: CategoryId,
}

/// A polygon annotation in level-0 coordinates.
///
/// `contour` holds the vertices relative to `(x, y)`, the bottom-left corner
/// of the circumscribed rectangle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaAnnotation {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub contour: Vec<(i64, i64)>,
    pub category: CategoryId,
}

impl AreaAnnotation {
    /// Build an area from absolute level-0 vertices.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::InvalidAnnotation`] for fewer than three vertices
    /// or a contour without area extent.
    pub fn from_vertices(vertices: &[(i64, i64)], category: CategoryId) -> Result<Self> {
        if vertices.len() < 3 {
            return Err(TileError::InvalidAnnotation(format!(
                "an area needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }

        let (mut min_x, mut min_y) = (i64::MAX, i64::MAX);
        let (mut max_x, mut max_y) = (i64::MIN, i64::MIN);
        for &(x, y) in vertices {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }

        let (width, height) = (max_x - min_x, max_y - min_y);
        if width == 0 || height == 0 {
            return Err(TileError::InvalidAnnotation(
                "area vertices are collinear along an axis".into(),
            ));
        }

        Ok(Self {
            x: min_x,
            y: min_y,
            width,
            height,
            contour: vertices.iter().map(|&(x, y)| (x - min_x, y - min_y)).collect(),
            category,
        })
    }

    /// Absolute level-0 vertices.
    pub fn vertices(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.contour.iter().map(|&(cx, cy)| (self.x + cx, self.y + cy))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnotationKind {
    Point,
    Area,
}

impl AnnotationKind {
    /// Index layer holding annotations of this kind.
    pub const fn layer(&self) -> Layer {
        match self {
            AnnotationKind::Point => Layer::Point,
            AnnotationKind::Area => Layer::Area,
        }
    }
}

/// Whether a tile has anything to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    Empty,
    Populated,
}

/// One annotation-group tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationTile {
    /// Bottom-left corner in level space
    pub origin_x: i64,
    pub origin_y: i64,
    pub level: u32,
    pub points: BTreeSet<ObjectId>,
    pub areas: BTreeSet<ObjectId>,
    /// Rasterization request derived from the current members
    pub request: RasterizeTile,
}

impl AnnotationTile {
    fn new(origin_x: i64, origin_y: i64, level: u32, tile: TileSize) -> Self {
        Self {
            origin_x,
            origin_y,
            level,
            points: BTreeSet::new(),
            areas: BTreeSet::new(),
            request: RasterizeTile::empty(tile.as_tuple()),
        }
    }

    pub fn state(&self) -> TileState {
        if self.points.is_empty() && self.areas.is_empty() {
            TileState::Empty
        } else {
            TileState::Populated
        }
    }

    pub fn bound(&self, tile: TileSize) -> Bound {
        Bound::new(
            self.origin_x,
            self.origin_y,
            self.origin_x + i64::from(tile.width),
            self.origin_y + i64::from(tile.height),
            self.level,
        )
    }

    fn members_mut(&mut self, kind: AnnotationKind) -> &mut BTreeSet<ObjectId> {
        match kind {
            AnnotationKind::Point => &mut self.points,
            AnnotationKind::Area => &mut self.areas,
        }
    }
}

/// Square bound of half extent `offset` around a point, one per level.
pub fn point_bounds(x: i64, y: i64, downsamples: &[u32], offset: i64) -> LevelBounds {
    downsamples
        .iter()
        .enumerate()
        .map(|(level, scale)| {
            let scale = i64::from(*scale);
            let (lx, ly) = (x.div_euclid(scale), y.div_euclid(scale));
            Bound::new(lx - offset, ly - offset, lx + offset, ly + offset, level as u32)
        })
        .collect()
}

/// Circumscribed rectangle of an area, one per level.
pub fn area_bounds(x: i64, y: i64, width: i64, height: i64, downsamples: &[u32]) -> LevelBounds {
    downsamples
        .iter()
        .enumerate()
        .map(|(level, scale)| {
            let scale = i64::from(*scale);
            let (lx, ly) = (x.div_euclid(scale), y.div_euclid(scale));
            let (w, h) = (width.div_euclid(scale), height.div_euclid(scale));
            Bound::new(lx, ly, lx + w, ly + h, level as u32)
        })
        .collect()
}

/// Map a level-0 coordinate into the raster space of a tile.
///
/// The tile origin is its bottom-left corner in level space (y up); raster
/// space has its origin top-left with y pointing down.
pub fn to_tile_coordinates(
    origin_x: i64,
    origin_y: i64,
    scale: i64,
    tile_height: u32,
    x: i64,
    y: i64,
) -> (i64, i64) {
    let tx = x.div_euclid(scale) - origin_x;
    let ty = i64::from(tile_height) - (y.div_euclid(scale) - origin_y);
    (tx, ty)
}

/// Annotation records plus the annotation-group tiles that render them.
#[derive(Debug, Clone)]
pub struct AnnotationTileManager {
    tile_size: TileSize,
    downsamples: Vec<u32>,
    palette: Palette,
    points: FxHashMap<ObjectId, PointAnnotation>,
    areas: FxHashMap<ObjectId, AreaAnnotation>,
    tiles: FxHashMap<ObjectId, AnnotationTile>,
    point_tiles: FxHashMap<ObjectId, FxHashSet<ObjectId>>,
    area_tiles: FxHashMap<ObjectId, FxHashSet<ObjectId>>,
}

impl AnnotationTileManager {
    pub fn new(tile_size: TileSize, palette: Palette) -> Self {
        Self {
            tile_size,
            downsamples: vec![1],
            palette,
            points: FxHashMap::default(),
            areas: FxHashMap::default(),
            tiles: FxHashMap::default(),
            point_tiles: FxHashMap::default(),
            area_tiles: FxHashMap::default(),
        }
    }

    /// Create a tile for every grid cell of every level of `info` and bind
    /// each one into [`Layer::AnnotationGroup`].
    ///
    /// Existing records and tiles are discarded. Empty tiles get no
    /// reservation; they are reserved the first time a member arrives.
    pub fn partition(&mut self, info: &SlideInfo, index: &mut LayeredIndex) -> Result<usize> {
        self.clear();
        self.downsamples = info.downsamples().to_vec();

        for level in info.levels() {
            let (cols, rows) = info.grid(level, self.tile_size)?;
            for col in 0..cols {
                for row in 0..rows {
                    let x = i64::from(col) * i64::from(self.tile_size.width);
                    let y = i64::from(row) * i64::from(self.tile_size.height);
                    let id = ObjectId::for_annotation_tile(info.display_name(), col, row, level);
                    let tile = AnnotationTile::new(x, y, level, self.tile_size);
                    index.bind(id, &[tile.bound(self.tile_size)], Layer::AnnotationGroup);
                    self.tiles.insert(id, tile);
                }
            }
        }

        log::debug!(
            "Partitioned {} into {} annotation tiles",
            info.display_name(),
            self.tiles.len()
        );
        Ok(self.tiles.len())
    }

    /// Store a point record. Returns the previous record with the same id.
    pub fn insert_point(&mut self, id: ObjectId, point: PointAnnotation) -> Option<PointAnnotation> {
        self.points.insert(id, point)
    }

    /// Store an area record. Returns the previous record with the same id.
    pub fn insert_area(&mut self, id: ObjectId, area: AreaAnnotation) -> Option<AreaAnnotation> {
        self.areas.insert(id, area)
    }

    pub fn remove_point(&mut self, id: &ObjectId) -> Option<PointAnnotation> {
        self.points.remove(id)
    }

    pub fn remove_area(&mut self, id: &ObjectId) -> Option<AreaAnnotation> {
        self.areas.remove(id)
    }

    pub fn point(&self, id: &ObjectId) -> Option<&PointAnnotation> {
        self.points.get(id)
    }

    pub fn area(&self, id: &ObjectId) -> Option<&AreaAnnotation> {
        self.areas.get(id)
    }

    pub fn tile(&self, id: &ObjectId) -> Option<&AnnotationTile> {
        self.tiles.get(id)
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn tile_size(&self) -> TileSize {
        self.tile_size
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Tiles currently holding annotation `id`.
    pub fn tiles_of(&self, id: &ObjectId, kind: AnnotationKind) -> Vec<ObjectId> {
        let mut tiles: Vec<_> = self
            .reverse(kind)
            .get(id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        tiles.sort();
        tiles
    }

    /// Level bounds of a stored annotation.
    pub fn bounds_of(&self, id: &ObjectId, kind: AnnotationKind, point_offset: i64) -> LevelBounds {
        match kind {
            AnnotationKind::Point => self
                .points
                .get(id)
                .map(|p| point_bounds(p.x, p.y, &self.downsamples, point_offset))
                .unwrap_or_default(),
            AnnotationKind::Area => self
                .areas
                .get(id)
                .map(|a| area_bounds(a.x, a.y, a.width, a.height, &self.downsamples))
                .unwrap_or_default(),
        }
    }

    /// Add annotation `id` to every tile overlapping `bounds` and reserve the
    /// rebuilt requests. Returns the tiles whose reservation changed.
    ///
    /// If `id` already belongs to tiles, it leaves the ones `bounds` no longer
    /// reach. Every affected tile is reserved once with its final request.
    ///
    /// The record must already be stored with [`insert_point`] or
    /// [`insert_area`].
    ///
    /// [`insert_point`]: AnnotationTileManager::insert_point
    /// [`insert_area`]: AnnotationTileManager::insert_area
    pub fn on_annotation_added<A: Clone>(
        &mut self,
        id: ObjectId,
        bounds: &[Bound],
        kind: AnnotationKind,
        index: &LayeredIndex,
        cache: &mut ArtifactCache<Request, A>,
    ) -> Vec<ObjectId> {
        let known = match kind {
            AnnotationKind::Point => self.points.contains_key(&id),
            AnnotationKind::Area => self.areas.contains_key(&id),
        };
        if !known {
            log::warn!("Ignoring {:?} annotation {} without a stored record", kind, id);
            return Vec::new();
        }

        let mut tile_ids: Vec<_> = index
            .query(bounds, Layer::AnnotationGroup)
            .into_iter()
            .collect();
        tile_ids.sort();

        let previous = self.reverse_mut(kind).remove(&id).unwrap_or_default();
        let mut affected: BTreeSet<ObjectId> = previous.iter().copied().collect();
        affected.extend(tile_ids.iter().copied());

        for tile_id in &previous {
            if let Some(tile) = self.tiles.get_mut(tile_id) {
                tile.members_mut(kind).remove(&id);
            }
        }
        for tile_id in &tile_ids {
            if let Some(tile) = self.tiles.get_mut(tile_id) {
                tile.members_mut(kind).insert(id);
            }
        }

        let changed: Vec<_> = affected
            .into_iter()
            .filter(|tile_id| self.refresh(tile_id, cache))
            .collect();

        self.reverse_mut(kind)
            .insert(id, tile_ids.iter().copied().collect());

        log::debug!(
            "{:?} annotation {} joined {} tiles, {} re-rasterized",
            kind,
            id,
            tile_ids.len(),
            changed.len()
        );
        changed
    }

    /// Remove annotation `id` from every tile holding it and reserve the
    /// rebuilt requests. Unknown ids are ignored.
    pub fn on_annotation_removed<A: Clone>(
        &mut self,
        id: ObjectId,
        kind: AnnotationKind,
        cache: &mut ArtifactCache<Request, A>,
    ) -> Vec<ObjectId> {
        let Some(tile_ids) = self.reverse_mut(kind).remove(&id) else {
            return Vec::new();
        };
        let mut tile_ids: Vec<_> = tile_ids.into_iter().collect();
        tile_ids.sort();

        let mut changed = Vec::new();
        for tile_id in &tile_ids {
            let Some(tile) = self.tiles.get_mut(tile_id) else {
                continue;
            };
            tile.members_mut(kind).remove(&id);
            if self.refresh(tile_id, cache) {
                changed.push(*tile_id);
            }
        }
        changed
    }

    /// Swap the palette and rebuild every populated tile.
    pub fn set_palette<A: Clone>(
        &mut self,
        palette: Palette,
        cache: &mut ArtifactCache<Request, A>,
    ) -> Vec<ObjectId> {
        self.palette = palette;
        let populated: Vec<_> = self
            .tiles
            .iter()
            .filter(|(_, tile)| tile.state() == TileState::Populated)
            .map(|(id, _)| *id)
            .collect();

        populated
            .into_iter()
            .filter(|tile_id| self.refresh(tile_id, cache))
            .collect()
    }

    /// Drop all records and tiles. Index and cache entries are the caller's.
    pub fn clear(&mut self) {
        self.points.clear();
        self.areas.clear();
        self.tiles.clear();
        self.point_tiles.clear();
        self.area_tiles.clear();
    }

    /// Rebuild the request of `tile_id` and reserve it.
    /// Returns `true` if the reservation changed.
    fn refresh<A: Clone>(&mut self, tile_id: &ObjectId, cache: &mut ArtifactCache<Request, A>) -> bool {
        let Some(tile) = self.tiles.get(tile_id) else {
            return false;
        };
        let request = derive_request(
            tile,
            &self.points,
            &self.areas,
            &self.palette,
            &self.downsamples,
            self.tile_size,
        );

        if let Some(tile) = self.tiles.get_mut(tile_id) {
            tile.request = request.clone();
        }
        cache.reserve(*tile_id, Request::RasterizeTile(request)) != Reservation::Unchanged
    }

    fn reverse(&self, kind: AnnotationKind) -> &FxHashMap<ObjectId, FxHashSet<ObjectId>> {
        match kind {
            AnnotationKind::Point => &self.point_tiles,
            AnnotationKind::Area => &self.area_tiles,
        }
    }

    fn reverse_mut(&mut self, kind: AnnotationKind) -> &mut FxHashMap<ObjectId, FxHashSet<ObjectId>> {
        match kind {
            AnnotationKind::Point => &mut self.point_tiles,
            AnnotationKind::Area => &mut self.area_tiles,
        }
    }
}

fn derive_request(
    tile: &AnnotationTile,
    points: &FxHashMap<ObjectId, PointAnnotation>,
    areas: &FxHashMap<ObjectId, AreaAnnotation>,
    palette: &Palette,
    downsamples: &[u32],
    tile_size: TileSize,
) -> RasterizeTile {
    let scale = downsamples
        .get(tile.level as usize)
        .map_or(1, |s| i64::from(*s));
    let project = |x: i64, y: i64| {
        to_tile_coordinates(tile.origin_x, tile.origin_y, scale, tile_size.height, x, y)
    };

    let points = tile
        .points
        .iter()
        .filter_map(|id| points.get(id))
        .map(|point| {
            let (x, y) = project(point.x, point.y);
            TilePoint {
                x,
                y,
                color: palette.color(point.category),
            }
        })
        .collect();

    let polygons = tile
        .areas
        .iter()
        .filter_map(|id| areas.get(id))
        .map(|area| TilePolygon {
            vertices: area.vertices().map(|(x, y)| project(x, y)).collect(),
            color: palette.color(area.category),
        })
        .collect();

    RasterizeTile {
        points,
        polygons,
        tile_size: tile_size.as_tuple(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rgba;

    const TILE: TileSize = TileSize::new(1024, 1024);

    struct Fixture {
        index: LayeredIndex,
        cache: ArtifactCache<Request, u32>,
        manager: AnnotationTileManager,
        info: SlideInfo,
    }

    fn fixture() -> Fixture {
        let info = SlideInfo::new("fixture.svs", vec![(2048, 2048), (512, 512)], vec![1, 4]).unwrap();
        let mut index = LayeredIndex::new(256);
        let mut manager = AnnotationTileManager::new(TILE, Palette::default_categories());
        manager.partition(&info, &mut index).unwrap();
        Fixture {
            index,
            cache: ArtifactCache::new(16),
            manager,
            info,
        }
    }

    fn tile_id(f: &Fixture, col: u32, row: u32, level: u32) -> ObjectId {
        ObjectId::for_annotation_tile(f.info.display_name(), col, row, level)
    }

    fn add_point(f: &mut Fixture, name: &str, x: i64, y: i64) -> (ObjectId, Vec<ObjectId>) {
        let id = ObjectId::named(name);
        let point = PointAnnotation {
            x,
            y,
            category: CategoryId(0),
        };
        f.manager.insert_point(id, point);
        let bounds = point_bounds(x, y, f.info.downsamples(), 4);
        let changed =
            f.manager
                .on_annotation_added(id, &bounds, AnnotationKind::Point, &f.index, &mut f.cache);
        (id, changed)
    }

    #[test]
    fn test_partition_creates_every_tile() {
        let f = fixture();
        // 3x3 at level 0, 1x1 at level 1
        assert_eq!(f.manager.tile_count(), 10);
        assert_eq!(f.index.layer(Layer::AnnotationGroup).len(), 10);
        assert_eq!(f.cache.reservation_count(), 0);
    }

    #[test]
    fn test_point_bounds_per_level() {
        let bounds = point_bounds(100, 40, &[1, 4], 4);
        assert_eq!(bounds[0], Bound::new(96, 36, 104, 44, 0));
        assert_eq!(bounds[1], Bound::new(21, 6, 29, 14, 1));
    }

    #[test]
    fn test_area_bounds_per_level() {
        let bounds = area_bounds(100, 40, 400, 80, &[1, 4]);
        assert_eq!(bounds[0], Bound::new(100, 40, 500, 120, 0));
        assert_eq!(bounds[1], Bound::new(25, 10, 125, 30, 1));
    }

    #[test]
    fn test_tile_coordinates_flip_vertical_axis() {
        // Bottom-left of the tile maps to the bottom row of the raster
        assert_eq!(to_tile_coordinates(1024, 0, 1, 1024, 1024, 0), (0, 1024));
        // Level 1 tile, downsample 4
        assert_eq!(to_tile_coordinates(0, 0, 4, 1024, 400, 400), (100, 924));
    }

    #[test]
    fn test_area_from_vertices() {
        let area =
            AreaAnnotation::from_vertices(&[(10, 20), (110, 20), (60, 220)], CategoryId(1)).unwrap();
        assert_eq!((area.x, area.y, area.width, area.height), (10, 20, 100, 200));
        assert_eq!(area.contour, vec![(0, 0), (100, 0), (50, 200)]);
        assert_eq!(area.vertices().collect::<Vec<_>>(), vec![(10, 20), (110, 20), (60, 220)]);

        assert!(AreaAnnotation::from_vertices(&[(0, 0), (1, 1)], CategoryId(1)).is_err());
        assert!(AreaAnnotation::from_vertices(&[(0, 0), (5, 0), (9, 0)], CategoryId(1)).is_err());
    }

    #[test]
    fn test_adding_point_changes_only_overlapping_tiles() {
        let mut f = fixture();
        let t1 = tile_id(&f, 0, 0, 0);
        let t2 = tile_id(&f, 1, 0, 0);
        let t3 = tile_id(&f, 2, 2, 0);
        let before_t1 = f.manager.tile(&t1).unwrap().request.clone();
        let before_t3 = f.manager.tile(&t3).unwrap().request.clone();

        // Straddles the border between the first two level-0 tiles
        let (_, changed) = add_point(&mut f, "p", 1022, 100);

        assert!(changed.contains(&t1));
        assert!(changed.contains(&t2));
        assert!(changed.contains(&tile_id(&f, 0, 0, 1)));
        assert_eq!(changed.len(), 3);

        assert_ne!(f.manager.tile(&t1).unwrap().request, before_t1);
        assert_eq!(f.manager.tile(&t3).unwrap().request, before_t3);
        assert!(f.cache.reservation(&t3).is_none());
        assert_eq!(f.manager.tile(&t3).unwrap().state(), TileState::Empty);
    }

    #[test]
    fn test_readding_point_moves_membership() {
        let mut f = fixture();
        let t1 = tile_id(&f, 0, 0, 0);
        let t2 = tile_id(&f, 1, 0, 0);
        let (id, _) = add_point(&mut f, "p", 1022, 100);

        // Same record again, nothing to rebuild
        let (_, changed) = add_point(&mut f, "p", 1022, 100);
        assert!(changed.is_empty());

        let (_, changed) = add_point(&mut f, "p", 100, 100);
        assert_eq!(changed.len(), 3);
        assert_eq!(
            f.manager.tiles_of(&id, AnnotationKind::Point),
            {
                let mut tiles = vec![t1, tile_id(&f, 0, 0, 1)];
                tiles.sort();
                tiles
            }
        );
        assert_eq!(f.manager.tile(&t2).unwrap().state(), TileState::Empty);
        assert_eq!(
            f.cache.reservation(&t2),
            Some(&Request::RasterizeTile(RasterizeTile::empty((1024, 1024))))
        );
    }

    #[test]
    fn test_derived_request_contents() {
        let mut f = fixture();
        let (_, _) = add_point(&mut f, "p", 1030, 100);

        let tile = f.manager.tile(&tile_id(&f, 1, 0, 0)).unwrap();
        assert_eq!(tile.state(), TileState::Populated);
        assert_eq!(
            tile.request.points,
            vec![TilePoint {
                x: 6,
                y: 924,
                color: Rgba::new(26, 188, 156, 200),
            }]
        );

        let reserved = f.cache.reservation(&tile_id(&f, 1, 0, 0)).unwrap();
        assert_eq!(reserved, &Request::RasterizeTile(tile.request.clone()));
    }

    #[test]
    fn test_area_joins_tiles() {
        let mut f = fixture();
        let id = ObjectId::named("area");
        let area = AreaAnnotation::from_vertices(
            &[(100, 100), (1500, 100), (1500, 300), (100, 300)],
            CategoryId(2),
        )
        .unwrap();
        let bounds = area_bounds(area.x, area.y, area.width, area.height, f.info.downsamples());
        f.manager.insert_area(id, area);

        let changed =
            f.manager
                .on_annotation_added(id, &bounds, AnnotationKind::Area, &f.index, &mut f.cache);
        assert_eq!(changed.len(), 3);
        assert_eq!(f.manager.tiles_of(&id, AnnotationKind::Area).len(), 3);

        let tile = f.manager.tile(&tile_id(&f, 0, 0, 1)).unwrap();
        assert_eq!(
            tile.request.polygons[0].vertices,
            vec![(25, 999), (375, 999), (375, 949), (25, 949)]
        );
    }

    #[test]
    fn test_removal_only_touches_member_tiles() {
        let mut f = fixture();
        let (near, _) = add_point(&mut f, "near", 100, 100);
        let (far, _) = add_point(&mut f, "far", 1900, 1900);

        let far_tile = tile_id(&f, 1, 1, 0);
        let far_request = f.manager.tile(&far_tile).unwrap().request.clone();

        let changed = f
            .manager
            .on_annotation_removed(near, AnnotationKind::Point, &mut f.cache);
        assert!(changed.contains(&tile_id(&f, 0, 0, 0)));
        assert!(!changed.contains(&far_tile));
        assert_eq!(f.manager.tile(&far_tile).unwrap().request, far_request);

        // The shared level-1 tile still holds the far point
        let top = f.manager.tile(&tile_id(&f, 0, 0, 1)).unwrap();
        assert_eq!(top.points.iter().copied().collect::<Vec<_>>(), vec![far]);
    }

    #[test]
    fn test_removal_empties_tile() {
        let mut f = fixture();
        let (id, _) = add_point(&mut f, "p", 100, 100);
        let t1 = tile_id(&f, 0, 0, 0);

        f.manager.on_annotation_removed(id, AnnotationKind::Point, &mut f.cache);
        f.manager.remove_point(&id);

        let tile = f.manager.tile(&t1).unwrap();
        assert_eq!(tile.state(), TileState::Empty);
        assert!(tile.request.is_empty());
        assert!(f.manager.tiles_of(&id, AnnotationKind::Point).is_empty());

        // Removing again is a no-op
        assert!(f
            .manager
            .on_annotation_removed(id, AnnotationKind::Point, &mut f.cache)
            .is_empty());
    }

    #[test]
    fn test_unknown_record_is_ignored() {
        let mut f = fixture();
        let id = ObjectId::named("ghost");
        let bounds = point_bounds(10, 10, f.info.downsamples(), 4);
        let changed =
            f.manager
                .on_annotation_added(id, &bounds, AnnotationKind::Point, &f.index, &mut f.cache);
        assert!(changed.is_empty());
    }

    #[test]
    fn test_palette_change_rebuilds_populated_tiles() {
        let mut f = fixture();
        add_point(&mut f, "p", 100, 100);

        let mut palette = Palette::new();
        palette.set(CategoryId(0), Rgba::new(255, 0, 0, 255));
        let changed = f.manager.set_palette(palette, &mut f.cache);

        assert_eq!(changed.len(), 2);
        let tile = f.manager.tile(&tile_id(&f, 0, 0, 0)).unwrap();
        assert_eq!(tile.request.points[0].color, Rgba::new(255, 0, 0, 255));
    }
}
