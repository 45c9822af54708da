//! Requests describing how an artifact is produced.
//!
//! A request is a plain value: two requests are equal exactly when they would
//! produce the same artifact, which is what the cache relies on to detect
//! stale results.

use crate::types::{CategoryId, Rgba};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Read a rectangle of the base image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadRegion {
    /// Top-left corner in level-0 slide coordinates (y axis pointing down)
    pub location: (i64, i64),
    pub level: u32,
    /// Width and height in pixels of `level`
    pub size: (u32, u32),
}

/// A point marker drawn into an annotation tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TilePoint {
    pub x: i64,
    pub y: i64,
    pub color: Rgba,
}

/// A filled polygon drawn into an annotation tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TilePolygon {
    pub vertices: Vec<(i64, i64)>,
    pub color: Rgba,
}

/// Rasterize a set of annotations into one tile.
///
/// All coordinates are tile-local raster coordinates (origin top-left, y axis
/// pointing down).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RasterizeTile {
    pub points: Vec<TilePoint>,
    pub polygons: Vec<TilePolygon>,
    pub tile_size: (u32, u32),
}

impl RasterizeTile {
    pub fn empty(tile_size: (u32, u32)) -> Self {
        Self {
            points: Vec::new(),
            polygons: Vec::new(),
            tile_size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.polygons.is_empty()
    }
}

/// Everything the worker pool knows how to produce.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Request {
    ReadRegion(ReadRegion),
    RasterizeTile(RasterizeTile),
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Request::ReadRegion(_) => "read-region",
            Request::RasterizeTile(_) => "rasterize-tile",
        }
    }
}

impl From<ReadRegion> for Request {
    fn from(request: ReadRegion) -> Self {
        Request::ReadRegion(request)
    }
}

impl From<RasterizeTile> for Request {
    fn from(request: RasterizeTile) -> Self {
        Request::RasterizeTile(request)
    }
}

/// Category to display color lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Palette {
    colors: FxHashMap<CategoryId, Rgba>,
    fallback: Rgba,
}

impl Palette {
    /// Annotation alpha used by [`Palette::default_categories`].
    pub const ANNOTATION_ALPHA: u8 = 200;

    const FLAT_UI: [[u8; 3]; 10] = [
        [26, 188, 156],
        [46, 204, 113],
        [52, 152, 219],
        [155, 89, 182],
        [52, 73, 94],
        [241, 196, 15],
        [230, 126, 34],
        [231, 76, 60],
        [236, 240, 241],
        [149, 165, 166],
    ];

    pub fn new() -> Self {
        Self::default()
    }

    /// Categories `0..10` mapped to a fixed set of distinguishable colors.
    pub fn default_categories() -> Self {
        let mut palette = Self::new();
        for (i, [r, g, b]) in Self::FLAT_UI.iter().enumerate() {
            palette.set(CategoryId(i as u32), Rgba::new(*r, *g, *b, Self::ANNOTATION_ALPHA));
        }
        palette
    }

    pub fn with_fallback(mut self, color: Rgba) -> Self {
        self.fallback = color;
        self
    }

    pub fn set(&mut self, category: CategoryId, color: Rgba) -> Option<Rgba> {
        self.colors.insert(category, color)
    }

    /// Color for `category`; unknown categories get the fallback (transparent
    /// unless configured).
    pub fn color(&self, category: CategoryId) -> Rgba {
        self.colors.get(&category).copied().unwrap_or(self.fallback)
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}
