//! Tile bookkeeping for whole-slide image viewers: a bucketed spatial index,
//! a reservation-based artifact cache and annotation-group tile invalidation.
//!
//! ```rust
//! use pathtile::{CategoryId, SlideInfo, ViewerBuilder};
//!
//! let info = SlideInfo::new("slide.svs", vec![(8192, 8192), (2048, 2048)], vec![1, 4])?;
//! let mut viewer = ViewerBuilder::new().slide(info).build()?;
//!
//! viewer.add_point(1200, 640, CategoryId(2))?;
//! for (id, request) in viewer.pending_fetches((1280, 720)) {
//!     println!("{} needs {}", id, request.kind());
//! }
//! # Ok::<(), pathtile::TileError>(())
//! ```

pub mod annotation;
pub mod builder;
pub mod cache;
pub mod config;
pub mod error;
pub mod raster;
pub mod request;
pub mod slide;
pub mod spatial_index;
pub mod types;
pub mod viewer;
pub mod viewport;
pub mod worker;

pub use annotation::{
    AnnotationKind, AnnotationTile, AnnotationTileManager, AreaAnnotation, PointAnnotation,
    TileState, area_bounds, point_bounds,
};
pub use builder::ViewerBuilder;
pub use cache::{ArtifactCache, CacheStats, DEFAULT_CACHE_CAPACITY, Reservation};
pub use config::{Config, TileSize};
pub use error::{Result, TileError};
pub use raster::SoftwareRasterizer;
pub use request::{Palette, RasterizeTile, ReadRegion, Request, TilePoint, TilePolygon};
pub use slide::{PathologyTile, PathologyTiles, SlideInfo};
pub use spatial_index::{DEFAULT_BUCKET_SIZE, IndexStats, LayeredIndex, SpatialIndex};
pub use types::{Bound, BucketKey, CategoryId, Layer, ObjectId, Rgba, TileImage};
pub use viewer::{AnnotationFrame, LooseArea, LoosePoint, PlacedTile, PumpReport, TileCache, Viewer};
pub use viewport::Viewport;
pub use worker::{Completion, Rasterizer, RegionReader, WorkerPool};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{Result, TileError, Viewer, ViewerBuilder};

    pub use crate::{Bound, CategoryId, Layer, ObjectId, Rgba, TileImage};

    pub use crate::{Config, Palette, SlideInfo, TileSize};

    pub use crate::{Completion, RegionReader, SoftwareRasterizer, WorkerPool};

    pub use std::sync::Arc;
}
