//! Software rasterizer for annotation-group tiles.
//!
//! Tiles are drawn into a transparent RGBA canvas. Point markers are drawn
//! first as a small cross, polygons are filled on top with the even-odd rule.
//! All drawing blends source-over.

use crate::error::{Result, TileError};
use crate::request::{RasterizeTile, TilePolygon};
use crate::types::{Rgba, TileImage};
use crate::worker::Rasterizer;

/// Half length of a point marker arm.
pub const MARKER_ARM: i64 = 8;
/// Half thickness of a point marker arm.
pub const MARKER_HALF_WIDTH: i64 = 2;

/// Largest tile edge accepted, keeps a single canvas below 256 MiB.
const MAX_TILE_EDGE: u32 = 8192;

/// Rasterizes tiles on the CPU.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareRasterizer;

impl Rasterizer for SoftwareRasterizer {
    fn rasterize(&mut self, request: &RasterizeTile) -> Result<TileImage> {
        rasterize(request)
    }
}

/// Render `request` into a new tile image.
pub fn rasterize(request: &RasterizeTile) -> Result<TileImage> {
    let (width, height) = request.tile_size;
    if width == 0 || height == 0 || width > MAX_TILE_EDGE || height > MAX_TILE_EDGE {
        return Err(TileError::Backend(format!(
            "cannot rasterize a {}x{} tile",
            width, height
        )));
    }

    let mut canvas = Canvas::new(width, height);
    for point in &request.points {
        canvas.fill_rect(
            point.x - MARKER_ARM,
            point.y - MARKER_HALF_WIDTH,
            point.x + MARKER_ARM,
            point.y + MARKER_HALF_WIDTH,
            point.color,
        );
        canvas.fill_rect(
            point.x - MARKER_HALF_WIDTH,
            point.y - MARKER_ARM,
            point.x + MARKER_HALF_WIDTH,
            point.y + MARKER_ARM,
            point.color,
        );
    }
    for polygon in &request.polygons {
        canvas.fill_polygon(polygon);
    }

    TileImage::from_rgba(width, height, canvas.pixels)
}

struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Canvas {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    /// Fill the inclusive rectangle `[x0, x1] x [y0, y1]`.
    fn fill_rect(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgba) {
        if color.alpha() == 0 {
            return;
        }
        let x0 = x0.max(0);
        let y0 = y0.max(0);
        let x1 = x1.min(i64::from(self.width) - 1);
        let y1 = y1.min(i64::from(self.height) - 1);
        for y in y0..=y1 {
            self.fill_span(y, x0, x1, color);
        }
    }

    /// Even-odd scanline fill sampled at pixel centers.
    fn fill_polygon(&mut self, polygon: &TilePolygon) {
        let vertices = &polygon.vertices;
        if vertices.len() < 3 || polygon.color.alpha() == 0 {
            return;
        }

        let (min_y, max_y) = vertices
            .iter()
            .fold((i64::MAX, i64::MIN), |(lo, hi), &(_, y)| (lo.min(y), hi.max(y)));
        let row_start = min_y.max(0);
        let row_end = max_y.min(i64::from(self.height) - 1);

        let mut crossings: Vec<f64> = Vec::with_capacity(vertices.len());
        for row in row_start..=row_end {
            let sample_y = row as f64 + 0.5;
            crossings.clear();

            for (i, &(ax, ay)) in vertices.iter().enumerate() {
                let (bx, by) = vertices[(i + 1) % vertices.len()];
                let (ay, by) = (ay as f64, by as f64);
                // Half-open in y so shared vertices count once
                if (ay <= sample_y) != (by <= sample_y) {
                    let t = (sample_y - ay) / (by - ay);
                    crossings.push(ax as f64 + t * (bx - ax) as f64);
                }
            }
            crossings.sort_by(|a, b| a.total_cmp(b));

            for pair in crossings.chunks_exact(2) {
                // Pixels whose center lies inside [pair[0], pair[1])
                let first = (pair[0] - 0.5).ceil() as i64;
                let last = (pair[1] - 0.5).ceil() as i64 - 1;
                let first = first.max(0);
                let last = last.min(i64::from(self.width) - 1);
                if first <= last {
                    self.fill_span(row, first, last, polygon.color);
                }
            }
        }
    }

    fn fill_span(&mut self, y: i64, x0: i64, x1: i64, color: Rgba) {
        if y < 0 || y >= i64::from(self.height) || x0 > x1 {
            return;
        }
        let row = y as usize * self.width as usize * 4;
        for x in x0..=x1 {
            let offset = row + x as usize * 4;
            blend_over(&mut self.pixels[offset..offset + 4], color);
        }
    }
}

/// Source-over blend of a straight-alpha color onto a straight-alpha pixel.
fn blend_over(dst: &mut [u8], color: Rgba) {
    let [sr, sg, sb, sa] = color.0;
    if sa == 255 || dst[3] == 0 {
        dst.copy_from_slice(&color.0);
        return;
    }

    let sa = u32::from(sa);
    let da = u32::from(dst[3]);
    // Scaled by 255
    let out_a = sa * 255 + da * (255 - sa);
    if out_a == 0 {
        dst.copy_from_slice(&[0; 4]);
        return;
    }

    for (channel, source) in dst.iter_mut().take(3).zip([sr, sg, sb]) {
        let value = u32::from(source) * sa * 255 + u32::from(*channel) * da * (255 - sa);
        *channel = ((value + out_a / 2) / out_a) as u8;
    }
    dst[3] = ((out_a + 127) / 255) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::TilePoint;

    const RED: Rgba = Rgba([255, 0, 0, 255]);

    fn tile(points: Vec<TilePoint>, polygons: Vec<TilePolygon>) -> RasterizeTile {
        RasterizeTile {
            points,
            polygons,
            tile_size: (64, 64),
        }
    }

    #[test]
    fn test_empty_tile_is_transparent() {
        let image = rasterize(&RasterizeTile::empty((16, 8))).unwrap();
        assert_eq!((image.width(), image.height()), (16, 8));
        assert!(image.pixels().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_point_marker_is_a_cross() {
        let image = rasterize(&tile(vec![TilePoint { x: 20, y: 20, color: RED }], vec![])).unwrap();

        assert_eq!(image.pixel(20, 20), Some(RED));
        assert_eq!(image.pixel(28, 22), Some(RED));
        assert_eq!(image.pixel(18, 12), Some(RED));
        // Outside both arms
        assert_eq!(image.pixel(28, 28), Some(Rgba::TRANSPARENT));
        assert_eq!(image.pixel(29, 20), Some(Rgba::TRANSPARENT));
    }

    #[test]
    fn test_translucent_marker_center_blends_twice() {
        let color = Rgba([255, 0, 0, 128]);
        let image = rasterize(&tile(vec![TilePoint { x: 20, y: 20, color }], vec![])).unwrap();

        assert_eq!(image.pixel(27, 20), Some(color));
        assert_eq!(image.pixel(20, 13), Some(color));
        // Arms overlap on the 5x5 center
        assert_eq!(image.pixel(20, 20), Some(Rgba([255, 0, 0, 192])));
        assert_eq!(image.pixel(22, 18), Some(Rgba([255, 0, 0, 192])));
        assert_eq!(image.pixel(23, 20), Some(color));
    }

    #[test]
    fn test_marker_clipped_at_tile_edge() {
        let image = rasterize(&tile(vec![TilePoint { x: 0, y: 63, color: RED }], vec![])).unwrap();
        assert_eq!(image.pixel(0, 63), Some(RED));
        assert_eq!(image.pixel(8, 63), Some(RED));
    }

    #[test]
    fn test_polygon_fill() {
        let square = TilePolygon {
            vertices: vec![(10, 10), (30, 10), (30, 30), (10, 30)],
            color: RED,
        };
        let image = rasterize(&tile(vec![], vec![square])).unwrap();

        assert_eq!(image.pixel(10, 10), Some(RED));
        assert_eq!(image.pixel(29, 29), Some(RED));
        assert_eq!(image.pixel(30, 20), Some(Rgba::TRANSPARENT));
        assert_eq!(image.pixel(20, 9), Some(Rgba::TRANSPARENT));
    }

    #[test]
    fn test_polygon_even_odd_hole() {
        // Outer square traced into an inner square and back
        let ring = TilePolygon {
            vertices: vec![
                (0, 0),
                (40, 0),
                (40, 40),
                (0, 40),
                (0, 0),
                (10, 10),
                (10, 30),
                (30, 30),
                (30, 10),
                (10, 10),
            ],
            color: RED,
        };
        let image = rasterize(&tile(vec![], vec![ring])).unwrap();
        assert_eq!(image.pixel(5, 20), Some(RED));
        assert_eq!(image.pixel(20, 20), Some(Rgba::TRANSPARENT));
    }

    #[test]
    fn test_translucent_blend() {
        let half = Rgba::new(0, 0, 255, 128);
        let polygons = vec![
            TilePolygon {
                vertices: vec![(0, 0), (8, 0), (8, 8), (0, 8)],
                color: half,
            },
            TilePolygon {
                vertices: vec![(0, 0), (8, 0), (8, 8), (0, 8)],
                color: half,
            },
        ];
        let image = rasterize(&tile(vec![], polygons)).unwrap();
        let pixel = image.pixel(4, 4).unwrap();
        assert_eq!(pixel.0[2], 255);
        assert!(pixel.alpha() > 128);
    }

    #[test]
    fn test_rejects_degenerate_size() {
        assert!(rasterize(&RasterizeTile::empty((0, 64))).is_err());
    }
}
