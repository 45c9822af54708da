//! The viewer model.
//!
//! [`Viewer`] owns the layered spatial index, the artifact cache and the
//! annotation tile manager, and drives them from slide loads, annotation edits
//! and viewport changes. It is single-threaded: every method takes
//! `&mut self` and slow work is handed to a [`WorkerPool`].

use crate::annotation::{AnnotationKind, AnnotationTileManager, AreaAnnotation, PointAnnotation};
use crate::cache::{ArtifactCache, Reservation};
use crate::config::Config;
use crate::error::{Result, TileError};
use crate::request::{Palette, Request};
use crate::slide::{PathologyTiles, SlideInfo};
use crate::spatial_index::LayeredIndex;
use crate::types::{Bound, CategoryId, Layer, ObjectId, Rgba, TileImage};
use crate::viewport::Viewport;
use crate::worker::{Completion, WorkerPool};
use rustc_hash::FxHashSet;
use std::sync::Arc;

/// Cache of produced tile images keyed by tile id.
pub type TileCache = ArtifactCache<Request, Arc<TileImage>>;

/// A cached tile image placed in window coordinates (bottom-left corner).
#[derive(Debug, Clone)]
pub struct PlacedTile {
    pub id: ObjectId,
    pub window: (i64, i64),
    pub image: Arc<TileImage>,
}

/// A visible point not yet covered by any cached annotation tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoosePoint {
    pub id: ObjectId,
    pub window: (i64, i64),
    pub color: Rgba,
}

/// A visible area not yet covered by any cached annotation tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LooseArea {
    pub id: ObjectId,
    pub window: Vec<(i64, i64)>,
    pub color: Rgba,
}

/// Everything needed to draw the annotation overlay of one frame.
#[derive(Debug, Clone, Default)]
pub struct AnnotationFrame {
    pub tiles: Vec<PlacedTile>,
    pub points: Vec<LoosePoint>,
    pub areas: Vec<LooseArea>,
}

/// Outcome of one [`Viewer::pump`] round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    pub dispatched: usize,
    pub accepted: usize,
    pub rejected: usize,
}

/// Whole-slide image viewer model.
///
/// # Examples
///
/// ```rust
/// use pathtile::{CategoryId, Config, SlideInfo, Viewer};
///
/// # fn main() -> pathtile::Result<()> {
/// let mut viewer = Viewer::new(Config::default())?;
/// viewer.load_slide(SlideInfo::new("slide.svs", vec![(4096, 4096), (1024, 1024)], vec![1, 4])?)?;
///
/// let point = viewer.add_point(500, 500, CategoryId(0))?;
/// assert!(viewer.annotations().point(&point).is_some());
///
/// // Base tiles and the annotation tiles holding the point need producing
/// let pending = viewer.pending_fetches((800, 600));
/// assert!(!pending.is_empty());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Viewer {
    config: Config,
    index: LayeredIndex,
    cache: TileCache,
    annotations: AnnotationTileManager,
    pathology: PathologyTiles,
    slide: Option<SlideInfo>,
    viewport: Viewport,
}

impl Viewer {
    pub fn new(config: Config) -> Result<Self> {
        Self::with_palette(config, Palette::default_categories())
    }

    pub fn with_palette(config: Config, palette: Palette) -> Result<Self> {
        config.validate().map_err(TileError::InvalidConfig)?;
        Ok(Self {
            index: LayeredIndex::new(config.bucket_size),
            cache: ArtifactCache::new(config.cache_capacity),
            annotations: AnnotationTileManager::new(config.annotation_tile_size, palette),
            pathology: PathologyTiles::default(),
            slide: None,
            viewport: Viewport::default(),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn slide(&self) -> Option<&SlideInfo> {
        self.slide.as_ref()
    }

    pub fn index(&self) -> &LayeredIndex {
        &self.index
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn annotations(&self) -> &AnnotationTileManager {
        &self.annotations
    }

    pub fn pathology(&self) -> &PathologyTiles {
        &self.pathology
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    /// Replace the current slide, discarding every annotation, tile and
    /// cached artifact.
    pub fn load_slide(&mut self, info: SlideInfo) -> Result<()> {
        self.index.clear();
        self.cache.clear();
        self.annotations.clear();
        self.viewport = Viewport::default();
        self.slide = None;

        self.pathology = PathologyTiles::build(&info, self.config.pathology_tile_size)?;
        for (id, tile) in self.pathology.iter() {
            let bound = tile.bound(self.config.pathology_tile_size);
            self.index.bind(*id, &[bound], Layer::Pathology);
            self.cache.reserve(*id, Request::ReadRegion(tile.request.clone()));
        }
        self.annotations.partition(&info, &mut self.index)?;

        log::debug!(
            "Loaded slide {} ({} levels, {} base tiles, {} annotation tiles)",
            info.display_name(),
            info.level_count(),
            self.pathology.len(),
            self.annotations.tile_count()
        );
        self.slide = Some(info);
        Ok(())
    }

    /// Add a point at level-0 coordinates (y axis up).
    pub fn add_point(&mut self, x: i64, y: i64, category: CategoryId) -> Result<ObjectId> {
        let slide = self.slide.as_ref().ok_or(TileError::SlideNotLoaded)?;
        let id = ObjectId::for_point(slide.display_name(), x, y, category);
        self.restore_point(id, PointAnnotation { x, y, category })?;
        Ok(id)
    }

    /// Add a polygon from absolute level-0 vertices (y axis up).
    pub fn add_area(&mut self, vertices: &[(i64, i64)], category: CategoryId) -> Result<ObjectId> {
        let slide = self.slide.as_ref().ok_or(TileError::SlideNotLoaded)?;
        let area = AreaAnnotation::from_vertices(vertices, category)?;
        let id = ObjectId::for_area(
            slide.display_name(),
            area.x,
            area.y,
            area.width,
            area.height,
            category,
        );
        self.restore_area(id, area)?;
        Ok(id)
    }

    /// Insert a point under a known id, replacing any point stored under it.
    /// Storing an identical record again leaves every tile untouched.
    pub fn restore_point(&mut self, id: ObjectId, point: PointAnnotation) -> Result<()> {
        if self.slide.is_none() {
            return Err(TileError::SlideNotLoaded);
        }
        match self.annotations.point(&id) {
            Some(stored) if *stored == point => return Ok(()),
            Some(_) => {
                self.index.unbind(id, Layer::Point);
            }
            None => {}
        }

        self.annotations.insert_point(id, point);
        let bounds = self.annotations.bounds_of(
            &id,
            AnnotationKind::Point,
            self.config.point_marker_offset,
        );
        self.index.bind(id, &bounds, Layer::Point);
        self.annotations.on_annotation_added(
            id,
            &bounds,
            AnnotationKind::Point,
            &self.index,
            &mut self.cache,
        );
        Ok(())
    }

    /// Insert an area under a known id, replacing any area stored under it.
    pub fn restore_area(&mut self, id: ObjectId, area: AreaAnnotation) -> Result<()> {
        if self.slide.is_none() {
            return Err(TileError::SlideNotLoaded);
        }
        if area.contour.len() < 3 || area.width <= 0 || area.height <= 0 {
            log::warn!("Rejecting area {} with a degenerate contour", id);
            return Err(TileError::InvalidAnnotation(format!(
                "area {} has {} vertices and a {}x{} extent",
                id,
                area.contour.len(),
                area.width,
                area.height
            )));
        }
        match self.annotations.area(&id) {
            Some(stored) if *stored == area => return Ok(()),
            Some(_) => {
                self.index.unbind(id, Layer::Area);
            }
            None => {}
        }

        self.annotations.insert_area(id, area);
        let bounds = self.annotations.bounds_of(&id, AnnotationKind::Area, 0);
        self.index.bind(id, &bounds, Layer::Area);
        self.annotations.on_annotation_added(
            id,
            &bounds,
            AnnotationKind::Area,
            &self.index,
            &mut self.cache,
        );
        Ok(())
    }

    /// Remove points. Unknown ids are skipped; returns how many were removed.
    pub fn delete_points(&mut self, ids: &[ObjectId]) -> usize {
        self.delete(ids, AnnotationKind::Point)
    }

    /// Remove areas. Unknown ids are skipped; returns how many were removed.
    pub fn delete_areas(&mut self, ids: &[ObjectId]) -> usize {
        self.delete(ids, AnnotationKind::Area)
    }

    fn delete(&mut self, ids: &[ObjectId], kind: AnnotationKind) -> usize {
        let mut removed = 0;
        for id in ids {
            let existed = match kind {
                AnnotationKind::Point => self.annotations.remove_point(id).is_some(),
                AnnotationKind::Area => self.annotations.remove_area(id).is_some(),
            };
            self.annotations
                .on_annotation_removed(*id, kind, &mut self.cache);
            self.index.unbind(*id, kind.layer());
            if existed {
                removed += 1;
            }
        }
        removed
    }

    /// Swap the category palette and re-reserve every populated tile.
    pub fn set_palette(&mut self, palette: Palette) -> usize {
        self.annotations.set_palette(palette, &mut self.cache).len()
    }

    pub fn zoom_in(&mut self, anchor: (i64, i64)) -> bool {
        let downsamples = self.downsamples();
        self.viewport.zoom_in(anchor, &downsamples)
    }

    pub fn zoom_out(&mut self, anchor: (i64, i64)) -> bool {
        let downsamples = self.downsamples();
        self.viewport.zoom_out(anchor, &downsamples)
    }

    pub fn pan(&mut self, dx: i64, dy: i64) {
        self.viewport.pan(dx, dy);
    }

    /// Requests that must be produced to draw a `window` sized view.
    /// Returned ids are marked in flight.
    pub fn pending_fetches(&mut self, window: (u32, u32)) -> Vec<(ObjectId, Request)> {
        let bound = self.viewport.window_bound(window.0, window.1);
        let mut ids = sorted(self.index.query(&[bound], Layer::Pathology));
        ids.extend(sorted(self.index.query(&[bound], Layer::AnnotationGroup)));
        self.cache.collect_pending(&ids)
    }

    /// Feed a finished artifact into the cache. Stale results return `false`.
    pub fn apply(&mut self, completion: Completion) -> bool {
        self.cache
            .complete(completion.id, &completion.request, completion.artifact)
    }

    /// Dispatch pending work for the current view and apply whatever the pool
    /// has finished.
    ///
    /// If dispatching fails the undelivered ids are released so a later pump
    /// retries them.
    pub fn pump(&mut self, pool: &WorkerPool, window: (u32, u32)) -> Result<PumpReport> {
        let mut report = PumpReport::default();
        let pending = self.pending_fetches(window);

        let mut jobs = pending.into_iter();
        while let Some((id, request)) = jobs.next() {
            if let Err(e) = pool.dispatch(id, request) {
                self.cache.reset_requesting(&id);
                for (id, _) in jobs {
                    self.cache.reset_requesting(&id);
                }
                return Err(e);
            }
            report.dispatched += 1;
        }

        for completion in pool.drain() {
            if self.apply(completion) {
                report.accepted += 1;
            } else {
                report.rejected += 1;
            }
        }

        if report.dispatched > 0 || report.accepted > 0 {
            log::debug!(
                "Pump dispatched {}, accepted {}, rejected {}",
                report.dispatched,
                report.accepted,
                report.rejected
            );
        }
        Ok(report)
    }

    /// Cached base tiles overlapping the view.
    pub fn visible_pathology(&mut self, window: (u32, u32)) -> Vec<PlacedTile> {
        let bound = self.viewport.window_bound(window.0, window.1);
        let ids = sorted(self.index.query(&[bound], Layer::Pathology));
        let (found, images) = self.cache.get(&ids);
        let downsamples = self.downsamples();

        found
            .into_iter()
            .zip(images)
            .filter_map(|(id, image)| {
                let tile = self.pathology.get(&id)?;
                Some(PlacedTile {
                    id,
                    window: self.viewport.to_window(tile.x, tile.y, tile.level, &downsamples),
                    image,
                })
            })
            .collect()
    }

    /// Cached annotation tiles overlapping the view, plus the visible points
    /// and areas no cached tile covers yet.
    pub fn annotation_frame(&mut self, window: (u32, u32)) -> AnnotationFrame {
        let bound = self.viewport.window_bound(window.0, window.1);
        let tile_ids = sorted(self.index.query(&[bound], Layer::AnnotationGroup));
        let (found, images) = self.cache.get(&tile_ids);
        let downsamples = self.downsamples();

        let mut frame = AnnotationFrame::default();
        let mut covered_points = FxHashSet::default();
        let mut covered_areas = FxHashSet::default();

        for (id, image) in found.into_iter().zip(images) {
            let Some(tile) = self.annotations.tile(&id) else {
                continue;
            };
            covered_points.extend(tile.points.iter().copied());
            covered_areas.extend(tile.areas.iter().copied());
            frame.tiles.push(PlacedTile {
                id,
                window: self
                    .viewport
                    .to_window(tile.origin_x, tile.origin_y, tile.level, &downsamples),
                image,
            });
        }

        let palette = self.annotations.palette();
        for id in sorted(self.index.query(&[bound], Layer::Point)) {
            if covered_points.contains(&id) {
                continue;
            }
            if let Some(point) = self.annotations.point(&id) {
                frame.points.push(LoosePoint {
                    id,
                    window: self.viewport.to_window(point.x, point.y, 0, &downsamples),
                    color: palette.color(point.category),
                });
            }
        }
        for id in sorted(self.index.query(&[bound], Layer::Area)) {
            if covered_areas.contains(&id) {
                continue;
            }
            if let Some(area) = self.annotations.area(&id) {
                frame.areas.push(LooseArea {
                    id,
                    window: area
                        .vertices()
                        .map(|(x, y)| self.viewport.to_window(x, y, 0, &downsamples))
                        .collect(),
                    color: palette.color(area.category),
                });
            }
        }

        frame
    }

    pub fn bind(&mut self, id: ObjectId, bounds: &[Bound], layer: Layer) {
        self.index.bind(id, bounds, layer);
    }

    pub fn unbind(&mut self, id: ObjectId, layer: Layer) -> bool {
        self.index.unbind(id, layer)
    }

    pub fn query(&self, bounds: &[Bound], layer: Layer) -> Vec<ObjectId> {
        sorted(self.index.query(bounds, layer))
    }

    pub fn reserve(&mut self, id: ObjectId, request: Request) -> Reservation {
        self.cache.reserve(id, request)
    }

    pub fn collect_pending(&mut self, ids: &[ObjectId]) -> Vec<(ObjectId, Request)> {
        self.cache.collect_pending(ids)
    }

    pub fn complete(&mut self, id: ObjectId, request: &Request, artifact: Arc<TileImage>) -> bool {
        self.cache.complete(id, request, artifact)
    }

    pub fn get(&mut self, ids: &[ObjectId]) -> (Vec<ObjectId>, Vec<Arc<TileImage>>) {
        self.cache.get(ids)
    }

    pub fn evict(&mut self, id: &ObjectId) {
        self.cache.evict(id);
    }

    /// Release an in-flight id whose worker response was lost.
    pub fn reset_requesting(&mut self, id: &ObjectId) -> bool {
        self.cache.reset_requesting(id)
    }

    fn downsamples(&self) -> Vec<u32> {
        self.slide
            .as_ref()
            .map_or_else(|| vec![1], |slide| slide.downsamples().to_vec())
    }
}

fn sorted(ids: FxHashSet<ObjectId>) -> Vec<ObjectId> {
    let mut ids: Vec<_> = ids.into_iter().collect();
    ids.sort();
    ids
}
