//! Slide pyramid description and base-image tiling.
//!
//! Level-space coordinates used by the index have the y axis pointing up,
//! while slide readers address regions with the y axis pointing down from
//! the top-left corner of level 0. [`read_region_for_tile`] converts between
//! the two.

use crate::config::TileSize;
use crate::error::{Result, TileError};
use crate::request::ReadRegion;
use crate::types::{Bound, ObjectId};
use rustc_hash::FxHashMap;

/// Pyramid geometry of an opened slide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideInfo {
    display_name: String,
    level_dimensions: Vec<(u32, u32)>,
    downsamples: Vec<u32>,
}

impl SlideInfo {
    /// Validate and wrap the geometry reported by a slide backend.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::InvalidSlide`] if there are no levels, if the two
    /// lists differ in length, or if the downsample factors are not
    /// `1` at level 0 and non-decreasing afterwards.
    pub fn new(
        display_name: impl Into<String>,
        level_dimensions: Vec<(u32, u32)>,
        downsamples: Vec<u32>,
    ) -> Result<Self> {
        let display_name = display_name.into();

        if level_dimensions.is_empty() {
            return Err(TileError::InvalidSlide("slide has no levels".into()));
        }
        if level_dimensions.len() != downsamples.len() {
            return Err(TileError::InvalidSlide(format!(
                "{} level dimensions but {} downsample factors",
                level_dimensions.len(),
                downsamples.len()
            )));
        }
        if downsamples[0] != 1 {
            return Err(TileError::InvalidSlide(
                "level 0 must have a downsample factor of 1".into(),
            ));
        }
        if downsamples.windows(2).any(|pair| pair[1] < pair[0]) {
            return Err(TileError::InvalidSlide(
                "downsample factors must not decrease".into(),
            ));
        }

        Ok(Self {
            display_name,
            level_dimensions,
            downsamples,
        })
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn level_count(&self) -> usize {
        self.level_dimensions.len()
    }

    pub fn level_dimensions(&self) -> &[(u32, u32)] {
        &self.level_dimensions
    }

    pub fn downsamples(&self) -> &[u32] {
        &self.downsamples
    }

    pub fn dimensions(&self, level: u32) -> Result<(u32, u32)> {
        self.level_dimensions
            .get(level as usize)
            .copied()
            .ok_or(TileError::UnknownLevel {
                level,
                levels: self.level_count(),
            })
    }

    pub fn downsample(&self, level: u32) -> Result<i64> {
        self.downsamples
            .get(level as usize)
            .map(|d| i64::from(*d))
            .ok_or(TileError::UnknownLevel {
                level,
                levels: self.level_count(),
            })
    }

    /// Columns and rows of the tile grid covering `level`.
    ///
    /// The grid always has one extra column and row so partially covered
    /// edges are tiled.
    pub fn grid(&self, level: u32, tile: TileSize) -> Result<(u32, u32)> {
        let (width, height) = self.dimensions(level)?;
        Ok((width / tile.width + 1, height / tile.height + 1))
    }

    pub fn levels(&self) -> impl Iterator<Item = u32> + use<> {
        0..self.level_count() as u32
    }
}

/// Base-image tile record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathologyTile {
    pub x: i64,
    pub y: i64,
    pub level: u32,
    pub request: ReadRegion,
}

impl PathologyTile {
    pub fn bound(&self, tile: TileSize) -> Bound {
        Bound::new(
            self.x,
            self.y,
            self.x + i64::from(tile.width),
            self.y + i64::from(tile.height),
            self.level,
        )
    }
}

/// Read-region request for the tile whose bottom-left corner is `(x, y)` in
/// level space.
pub fn read_region_for_tile(
    info: &SlideInfo,
    x: i64,
    y: i64,
    level: u32,
    tile: TileSize,
) -> Result<ReadRegion> {
    let (_, level_height) = info.dimensions(level)?;
    let mut slide_x = x;
    let mut slide_y = i64::from(level_height) - y - i64::from(tile.height);
    if level != 0 {
        let scale = info.downsample(level)?;
        slide_x *= scale;
        slide_y *= scale;
    }
    Ok(ReadRegion {
        location: (slide_x, slide_y),
        level,
        size: tile.as_tuple(),
    })
}

/// Every base-image tile of a slide, keyed by tile id.
#[derive(Debug, Clone, Default)]
pub struct PathologyTiles {
    tile_size: Option<TileSize>,
    tiles: FxHashMap<ObjectId, PathologyTile>,
}

impl PathologyTiles {
    /// Partition every level of `info` into `tile`-sized tiles.
    pub fn build(info: &SlideInfo, tile: TileSize) -> Result<Self> {
        let mut tiles = FxHashMap::default();

        for level in info.levels() {
            let (cols, rows) = info.grid(level, tile)?;
            for col in 0..cols {
                for row in 0..rows {
                    let x = i64::from(col) * i64::from(tile.width);
                    let y = i64::from(row) * i64::from(tile.height);
                    let id = ObjectId::for_pathology_tile(info.display_name(), col, row, level);
                    let request = read_region_for_tile(info, x, y, level, tile)?;
                    tiles.insert(
                        id,
                        PathologyTile {
                            x,
                            y,
                            level,
                            request,
                        },
                    );
                }
            }
        }

        log::debug!(
            "Partitioned {} into {} base tiles over {} levels",
            info.display_name(),
            tiles.len(),
            info.level_count()
        );

        Ok(Self {
            tile_size: Some(tile),
            tiles,
        })
    }

    pub fn get(&self, id: &ObjectId) -> Option<&PathologyTile> {
        self.tiles.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectId, &PathologyTile)> {
        self.tiles.iter()
    }

    pub fn tile_size(&self) -> Option<TileSize> {
        self.tile_size
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}
