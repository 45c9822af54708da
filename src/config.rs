//! Viewer configuration.
//!
//! Configuration can be built in code with the `with_*` setters or loaded
//! from JSON (and TOML with the `toml` feature).
use crate::error::{Result, TileError};
use serde::de::Error;
use std::path::Path;

/// Tile viewer configuration
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Edge length of the coarse index grid cells, in pixels
    #[serde(default = "Config::default_bucket_size")]
    pub bucket_size: i64,

    /// Size of a rasterized annotation-group tile
    #[serde(default = "Config::default_tile_size")]
    pub annotation_tile_size: TileSize,

    /// Size of a base-image tile read from the slide
    #[serde(default = "Config::default_tile_size")]
    pub pathology_tile_size: TileSize,

    /// Maximum number of artifacts kept in memory
    #[serde(default = "Config::default_cache_capacity")]
    pub cache_capacity: usize,

    /// Half extent, in level pixels, of the bound registered for a point
    #[serde(default = "Config::default_point_marker_offset")]
    pub point_marker_offset: i64,

    /// Number of slide reader threads (one open slide handle each)
    #[serde(default = "Config::default_reader_workers")]
    pub reader_workers: usize,
}

/// Width and height of a tile in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TileSize {
    pub width: u32,
    pub height: u32,
}

impl TileSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn as_tuple(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Config {
    const fn default_bucket_size() -> i64 {
        256
    }

    const fn default_tile_size() -> TileSize {
        TileSize::new(1024, 1024)
    }

    const fn default_cache_capacity() -> usize {
        300
    }

    const fn default_point_marker_offset() -> i64 {
        4
    }

    const fn default_reader_workers() -> usize {
        4
    }

    pub fn with_bucket_size(mut self, bucket_size: i64) -> Self {
        assert!(bucket_size > 0, "Bucket size must be greater than zero");
        self.bucket_size = bucket_size;
        self
    }

    pub fn with_annotation_tile_size(mut self, width: u32, height: u32) -> Self {
        assert!(width > 0 && height > 0, "Tile size must be non-zero");
        self.annotation_tile_size = TileSize::new(width, height);
        self
    }

    pub fn with_pathology_tile_size(mut self, width: u32, height: u32) -> Self {
        assert!(width > 0 && height > 0, "Tile size must be non-zero");
        self.pathology_tile_size = TileSize::new(width, height);
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "Cache capacity must be greater than zero");

        if capacity > 10_000 {
            log::warn!(
                "Cache capacity of {} tiles is very large and may consume significant memory. \
                A 1024x1024 RGBA tile takes 4 MiB.",
                capacity
            );
        }

        self.cache_capacity = capacity;
        self
    }

    pub fn with_point_marker_offset(mut self, offset: i64) -> Self {
        assert!(offset >= 0, "Point marker offset cannot be negative");
        self.point_marker_offset = offset;
        self
    }

    pub fn with_reader_workers(mut self, workers: usize) -> Self {
        assert!(workers > 0, "Reader worker count must be greater than zero");
        self.reader_workers = workers;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.bucket_size <= 0 {
            return Err("Bucket size must be greater than zero".to_string());
        }

        for (name, size) in [
            ("Annotation tile", self.annotation_tile_size),
            ("Pathology tile", self.pathology_tile_size),
        ] {
            if size.width == 0 || size.height == 0 {
                return Err(format!("{} size must be non-zero", name));
            }
        }

        if self.cache_capacity == 0 {
            return Err("Cache capacity must be greater than zero".to_string());
        }

        if self.point_marker_offset < 0 {
            return Err("Point marker offset cannot be negative".to_string());
        }

        if self.reader_workers == 0 {
            return Err("Reader worker count must be greater than zero".to_string());
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(serde_json::Error::custom(e));
        }
        Ok(config)
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> std::result::Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Load a configuration file, picking the format from its extension.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Self::from_json(&contents)?),
            #[cfg(feature = "toml")]
            Some("toml") => {
                Self::from_toml(&contents).map_err(|e| TileError::InvalidConfig(e.to_string()))
            }
            other => Err(TileError::InvalidConfig(format!(
                "Unsupported configuration format: {}",
                other.unwrap_or("<none>")
            ))),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bucket_size: Self::default_bucket_size(),
            annotation_tile_size: Self::default_tile_size(),
            pathology_tile_size: Self::default_tile_size(),
            cache_capacity: Self::default_cache_capacity(),
            point_marker_offset: Self::default_point_marker_offset(),
            reader_workers: Self::default_reader_workers(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.bucket_size, 256);
        assert_eq!(config.annotation_tile_size, TileSize::new(1024, 1024));
        assert_eq!(config.cache_capacity, 300);
        assert_eq!(config.point_marker_offset, 4);
        assert_eq!(config.reader_workers, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default()
            .with_bucket_size(128)
            .with_cache_capacity(64)
            .with_annotation_tile_size(512, 256);

        let json = config.to_json().unwrap();
        let deserialized = Config::from_json(&json).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_config_partial_json_uses_defaults() {
        let config = Config::from_json(r#"{"cache_capacity": 10}"#).unwrap();
        assert_eq!(config.cache_capacity, 10);
        assert_eq!(config.bucket_size, 256);
    }

    #[test]
    fn test_config_rejects_invalid_values() {
        assert!(Config::from_json(r#"{"cache_capacity": 0}"#).is_err());
        assert!(Config::from_json(r#"{"bucket_size": -1}"#).is_err());
        assert!(Config::from_json(r#"{"unknown_field": 1}"#).is_err());
    }

    #[test]
    fn test_config_load_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"reader_workers": 2}}"#).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.reader_workers, 2);
    }

    #[test]
    fn test_config_load_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(TileError::InvalidConfig(_))
        ));
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_config_toml_roundtrip() {
        let config = Config::default().with_reader_workers(8);
        let text = config.to_toml().unwrap();
        assert_eq!(Config::from_toml(&text).unwrap(), config);
    }
}
