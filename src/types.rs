//! Core value types shared by the index, the cache and the tile manager.

use crate::error::{Result, TileError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier of anything that can be indexed or cached.
///
/// Identifiers are UUID v5 values derived from a descriptive name, so the same
/// slide tile or annotation always maps to the same id across sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(Uuid);

impl ObjectId {
    const URI_ROOT: &'static str = "pathtile/v1";

    /// Derive an identifier from an arbitrary name.
    pub fn named(name: &str) -> Self {
        Self::from_uri(&format!("{}/object/{}", Self::URI_ROOT, name))
    }

    /// Identifier of a base-image tile of `slide`.
    pub fn for_pathology_tile(slide: &str, col: u32, row: u32, level: u32) -> Self {
        Self::from_uri(&format!(
            "{}/file/{}/pathology/level/{}/x/{}/y/{}",
            Self::URI_ROOT,
            slide,
            level,
            col,
            row
        ))
    }

    /// Identifier of an annotation-group tile of `slide`.
    pub fn for_annotation_tile(slide: &str, col: u32, row: u32, level: u32) -> Self {
        Self::from_uri(&format!(
            "{}/file/{}/groupedAnnotation/level/{}/x/{}/y/{}",
            Self::URI_ROOT,
            slide,
            level,
            col,
            row
        ))
    }

    /// Identifier of a point annotation.
    pub fn for_point(slide: &str, x: i64, y: i64, category: CategoryId) -> Self {
        Self::from_uri(&format!(
            "{}/file/{}/point/category/{}/x/{}/y/{}",
            Self::URI_ROOT,
            slide,
            category.0,
            x,
            y
        ))
    }

    /// Identifier of an area annotation, keyed by its circumscribed rectangle.
    pub fn for_area(
        slide: &str,
        x: i64,
        y: i64,
        width: i64,
        height: i64,
        category: CategoryId,
    ) -> Self {
        Self::from_uri(&format!(
            "{}/file/{}/area/category/{}/x/{}/y/{}/width/{}/height/{}",
            Self::URI_ROOT,
            slide,
            category.0,
            x,
            y,
            width,
            height
        ))
    }

    fn from_uri(uri: &str) -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_URL, uri.as_bytes()))
    }
}

impl From<Uuid> for ObjectId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Axis-aligned rectangle at one pyramid level.
///
/// Coordinates are in the level's own pixel space with the y axis pointing up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bound {
    pub left: i64,
    pub bottom: i64,
    pub right: i64,
    pub top: i64,
    pub level: u32,
}

impl Bound {
    pub const fn new(left: i64, bottom: i64, right: i64, top: i64, level: u32) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
            level,
        }
    }

    pub fn width(&self) -> i64 {
        self.right - self.left
    }

    pub fn height(&self) -> i64 {
        self.top - self.bottom
    }

    /// Closed-rectangle intersection test; bounds on different levels never overlap.
    pub fn overlaps(&self, other: &Bound) -> bool {
        self.level == other.level
            && !(self.right < other.left
                || self.top < other.bottom
                || other.right < self.left
                || other.top < self.bottom)
    }

    /// Inclusive range of grid cells covered by `[left, right) x [bottom, top)`.
    ///
    /// A degenerate bound still covers the cell holding its origin.
    pub fn cell_range(&self, bucket_size: i64) -> (i64, i64, i64, i64) {
        let right = (self.right - 1).max(self.left);
        let top = (self.top - 1).max(self.bottom);
        (
            self.left.div_euclid(bucket_size),
            self.bottom.div_euclid(bucket_size),
            right.div_euclid(bucket_size),
            top.div_euclid(bucket_size),
        )
    }

    /// Every bucket key covered by this bound.
    pub fn bucket_keys(&self, bucket_size: i64) -> impl Iterator<Item = BucketKey> + use<> {
        let (x0, y0, x1, y1) = self.cell_range(bucket_size);
        let level = self.level;
        (x0..=x1).flat_map(move |cell_x| {
            (y0..=y1).map(move |cell_y| BucketKey {
                cell_x,
                cell_y,
                level,
            })
        })
    }
}

/// Coarse grid cell used only to narrow candidate sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    pub cell_x: i64,
    pub cell_y: i64,
    pub level: u32,
}

/// Independently namespaced index layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layer {
    /// Base-image tiles read from the slide.
    Pathology,
    /// Point annotations.
    Point,
    /// Area (polygon) annotations.
    Area,
    /// Rasterized annotation-group tiles.
    AnnotationGroup,
}

impl Layer {
    pub const ALL: [Layer; 4] = [
        Layer::Pathology,
        Layer::Point,
        Layer::Area,
        Layer::AnnotationGroup,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Layer::Pathology => "pathology",
            Layer::Point => "point",
            Layer::Area => "area",
            Layer::AnnotationGroup => "annotation-group",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Annotation category, used to pick a display color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryId(pub u32);

/// Straight (non-premultiplied) RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba([0, 0, 0, 0]);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    pub const fn alpha(&self) -> u8 {
        self.0[3]
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Self::TRANSPARENT
    }
}

/// An RGBA8 raster, the artifact type produced by readers and rasterizers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileImage {
    width: u32,
    height: u32,
    pixels: Bytes,
}

impl TileImage {
    /// Wrap raw RGBA8 rows (top row first).
    pub fn from_rgba(width: u32, height: u32, pixels: impl Into<Bytes>) -> Result<Self> {
        let pixels = pixels.into();
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(TileError::Backend(format!(
                "expected {} bytes for a {}x{} RGBA image, got {}",
                expected,
                width,
                height,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn transparent(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: Bytes::from(vec![0u8; width as usize * height as usize * 4]),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &Bytes {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let px = &self.pixels[offset..offset + 4];
        Some(Rgba([px[0], px[1], px[2], px[3]]))
    }
}
