use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while opening or reading a single raster file.
///
/// A missing file is not represented here: the tile index treats absent
/// tiles as a coverage miss, so by the time a reader runs the path exists.
#[derive(Error, Debug)]
pub enum RasterError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TIFF decode error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Corrupt raster {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Unsupported raster format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid georeferencing: {0}")]
    Georeference(String),
}

/// Errors raised while loading the service configuration and building the
/// dataset registry. All of these are fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid dataset '{name}': {reason}")]
    Dataset { name: String, reason: String },

    #[error("Probing dataset '{name}' failed: {source}")]
    Probe {
        name: String,
        #[source]
        source: RasterError,
    },
}

/// Request-fatal query failures. Per-point conditions (bad latitude,
/// uncovered, NODATA) are carried in the result rows instead and never
/// abort a batch.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Dataset '{0}' not found")]
    DatasetNotFound(String),

    #[error("Raster error: {0}")]
    Raster(#[from] RasterError),
}
