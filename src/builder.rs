//! Viewer builder for flexible configuration
//!
//! This module provides a builder pattern for creating viewers from a config
//! file, a custom palette and an initial slide.

use crate::config::Config;
use crate::error::Result;
use crate::request::Palette;
use crate::slide::SlideInfo;
use crate::viewer::Viewer;
use std::path::PathBuf;

/// Builder for viewer configuration.
#[derive(Debug)]
pub struct ViewerBuilder {
    config: Config,
    config_path: Option<PathBuf>,
    cache_capacity: Option<usize>,
    palette: Option<Palette>,
    slide: Option<SlideInfo>,
}

impl ViewerBuilder {
    /// Create a new builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            config_path: None,
            cache_capacity: None,
            palette: None,
            slide: None,
        }
    }

    /// Set the viewer configuration (tile sizes, cache capacity, etc.).
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self.config_path = None;
        self
    }

    /// Load the configuration from a JSON (or TOML) file when building.
    pub fn config_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Override the cache capacity. Applies on top of a config file too.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    pub fn palette(mut self, palette: Palette) -> Self {
        self.palette = Some(palette);
        self
    }

    /// Open this slide right after construction.
    pub fn slide(mut self, info: SlideInfo) -> Self {
        self.slide = Some(info);
        self
    }

    /// Build the viewer. Reads the config file if one was set.
    pub fn build(self) -> Result<Viewer> {
        let mut config = match &self.config_path {
            Some(path) => Config::load(path)?,
            None => self.config,
        };
        if let Some(capacity) = self.cache_capacity {
            config = config.with_cache_capacity(capacity);
        }
        let palette = self.palette.unwrap_or_else(Palette::default_categories);

        let mut viewer = Viewer::with_palette(config, palette)?;
        if let Some(info) = self.slide {
            viewer.load_slide(info)?;
        }
        Ok(viewer)
    }
}

impl Default for ViewerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
