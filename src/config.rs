//! Service configuration.
//!
//! A single TOML document, read once at startup, enumerating the served
//! datasets and the HTTP front-end options. Validation happens before
//! any dataset is registered so a broken config fails the whole process.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::sample::Kernel;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    /// Cap on points per query, to keep request times bounded.
    #[serde(default = "default_max_locations")]
    pub max_locations_per_request: usize,
    /// Value for the access-control-allow-origin response header;
    /// omitted means no CORS headers at all.
    #[serde(default)]
    pub access_control_allow_origin: Option<String>,
    #[serde(default)]
    pub datasets: Vec<DatasetConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    /// URL-visible dataset identifier.
    pub name: String,
    #[serde(flatten)]
    pub source: SourceConfig,
    /// Kernel used when a query does not override it.
    #[serde(default = "default_kernel")]
    pub interpolation: Kernel,
    #[serde(default)]
    pub nodata_policy: NodataPolicy,
    /// Elevations are rounded to this many decimal places.
    #[serde(default = "default_decimal_places")]
    pub decimal_places: i32,
    /// Open raster handles pooled per dataset (LRU by path).
    #[serde(default = "default_handle_cache_size")]
    pub handle_cache_size: usize,
    /// When a group's pixel window would exceed this fraction of the
    /// tile, the engine reads per-point windows instead.
    #[serde(default = "default_max_window_fraction")]
    pub max_window_fraction: f64,
}

/// How a dataset's rasters are laid out on disk.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    /// One raster covers the whole extent.
    Single { path: PathBuf },
    /// Integer-degree tiles named by their southwest corner.
    Grid {
        directory: PathBuf,
        /// Filename template with `{N|S}`, `{lat}`, `{E|W}`, `{lng}`
        /// placeholders, e.g. `{N|S}{lat}{E|W}{lng}.hgt`.
        template: String,
        #[serde(default = "default_tile_degrees")]
        tile_degrees: u32,
    },
    /// A JSON manifest of bounding boxes and paths.
    Manifest { manifest: PathBuf },
}

/// What an uncovered point or a NODATA sample turns into: a `null`
/// elevation, or a per-point error message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodataPolicy {
    #[default]
    Null,
    Error,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_max_locations() -> usize {
    100
}

fn default_kernel() -> Kernel {
    Kernel::Bilinear
}

fn default_decimal_places() -> i32 {
    1
}

fn default_handle_cache_size() -> usize {
    64
}

fn default_max_window_fraction() -> f64 {
    0.5
}

fn default_tile_degrees() -> u32 {
    1
}

impl Config {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for dataset in &self.datasets {
            dataset.validate()?;
            if !seen.insert(dataset.name.as_str()) {
                return Err(ConfigError::Dataset {
                    name: dataset.name.clone(),
                    reason: "duplicate dataset name".into(),
                });
            }
        }
        Ok(())
    }
}

impl DatasetConfig {
    fn invalid(&self, reason: impl Into<String>) -> ConfigError {
        ConfigError::Dataset {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty()
            || !self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(self.invalid("name must be non-empty and URL-safe"));
        }
        if !(0..=6).contains(&self.decimal_places) {
            return Err(self.invalid("decimal_places must be between 0 and 6"));
        }
        if self.handle_cache_size == 0 {
            return Err(self.invalid("handle_cache_size must be at least 1"));
        }
        if !(self.max_window_fraction > 0.0 && self.max_window_fraction <= 1.0) {
            return Err(self.invalid("max_window_fraction must be in (0, 1]"));
        }
        if let SourceConfig::Grid {
            template,
            tile_degrees,
            ..
        } = &self.source
        {
            if !template.contains("{lat}") || !template.contains("{lng}") {
                return Err(self.invalid("grid template must contain {lat} and {lng}"));
            }
            if *tile_degrees == 0 {
                return Err(self.invalid("tile_degrees must be at least 1"));
            }
        }
        Ok(())
    }
}
