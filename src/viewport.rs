//! Viewport position over the slide pyramid.
//!
//! `(x, y)` is the bottom-left corner of the window in the coordinate space of
//! `level`, y axis pointing up.

use crate::types::Bound;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Viewport {
    pub x: i64,
    pub y: i64,
    pub level: u32,
}

impl Viewport {
    pub const fn new(x: i64, y: i64, level: u32) -> Self {
        Self { x, y, level }
    }

    /// Drag the image by `(dx, dy)` window pixels.
    pub fn pan(&mut self, dx: i64, dy: i64) {
        self.x -= dx;
        self.y -= dy;
    }

    pub fn can_zoom_in(&self) -> bool {
        self.level > 0
    }

    pub fn can_zoom_out(&self, downsamples: &[u32]) -> bool {
        (self.level as usize + 1) < downsamples.len()
    }

    /// Move one level up the pyramid keeping the window point `anchor` fixed.
    /// Returns `false` when already at level 0.
    pub fn zoom_in(&mut self, anchor: (i64, i64), downsamples: &[u32]) -> bool {
        if !self.can_zoom_in() {
            return false;
        }
        self.rescale(anchor, downsamples, self.level - 1)
    }

    /// Move one level down the pyramid keeping the window point `anchor`
    /// fixed. Returns `false` at the coarsest level.
    pub fn zoom_out(&mut self, anchor: (i64, i64), downsamples: &[u32]) -> bool {
        if !self.can_zoom_out(downsamples) {
            return false;
        }
        self.rescale(anchor, downsamples, self.level + 1)
    }

    fn rescale(&mut self, (ax, ay): (i64, i64), downsamples: &[u32], next: u32) -> bool {
        let (Some(current), Some(target)) = (
            downsamples.get(self.level as usize),
            downsamples.get(next as usize),
        ) else {
            return false;
        };
        let (current, target) = (i64::from(*current), i64::from(*target));
        if target == 0 {
            return false;
        }

        self.x = (self.x + ax) * current / target - ax;
        self.y = (self.y + ay) * current / target - ay;
        self.level = next;
        true
    }

    /// Level-space bound covered by a `width` x `height` window.
    pub fn window_bound(&self, width: u32, height: u32) -> Bound {
        Bound::new(
            self.x,
            self.y,
            self.x + i64::from(width),
            self.y + i64::from(height),
            self.level,
        )
    }

    /// Convert a window position to level-0 coordinates.
    pub fn to_level0(&self, window_x: i64, window_y: i64, downsamples: &[u32]) -> (i64, i64) {
        let scale = downsamples
            .get(self.level as usize)
            .map_or(1, |s| i64::from(*s));
        ((self.x + window_x) * scale, (self.y + window_y) * scale)
    }

    /// Convert a position in the space of `level` to window coordinates.
    pub fn to_window(&self, x: i64, y: i64, level: u32, downsamples: &[u32]) -> (i64, i64) {
        let scale_of = |l: u32| downsamples.get(l as usize).map_or(1, |s| i64::from(*s));
        let (current, given) = (scale_of(self.level), scale_of(level));

        if self.level == level {
            (x - self.x, y - self.y)
        } else if self.level > level {
            let scale = (current / given).max(1);
            (x.div_euclid(scale) - self.x, y.div_euclid(scale) - self.y)
        } else {
            let scale = (given / current).max(1);
            (x * scale - self.x, y * scale - self.y)
        }
    }
}
