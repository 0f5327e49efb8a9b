//! Tile location: resolving a point to the raster file that covers it.
//!
//! Built once per dataset at load time and shared read-only afterwards;
//! the only interior mutability is the uniform grid's memo of filesystem
//! existence checks.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::Deserialize;

/// One entry of a filename-index manifest: a geographic bounding box and
/// the raster that covers it. Containment is half-open on both axes, so
/// a point on the seam between two tiles belongs to the one whose
/// southwest corner it matches.
#[derive(Clone, Debug, Deserialize)]
pub struct ManifestEntry {
    pub path: PathBuf,
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl ManifestEntry {
    fn contains(&self, lat: f64, lng: f64) -> bool {
        lat >= self.min_lat && lat < self.max_lat && lng >= self.min_lng && lng < self.max_lng
    }
}

/// How a dataset maps points to raster files.
#[derive(Debug)]
pub enum TileIndex {
    /// One raster covers the whole dataset.
    Single { path: PathBuf },
    /// SRTM-style integer-degree tiles addressed by filename.
    Grid(GridIndex),
    /// An explicit list of bounding boxes.
    Manifest(ManifestIndex),
}

impl TileIndex {
    /// The raster covering `(lat, lng)`, if any. Longitude must already
    /// be canonicalized to [-180, 180).
    pub fn locate(&self, lat: f64, lng: f64) -> Option<PathBuf> {
        match self {
            TileIndex::Single { path } => Some(path.clone()),
            TileIndex::Grid(grid) => grid.locate(lat, lng),
            TileIndex::Manifest(manifest) => manifest.locate(lat, lng),
        }
    }
}

/// Uniform-grid index: `floor` the coordinates to the tile's southwest
/// corner, substitute the filename template, and check the file exists.
/// Both hits and misses are memoized to avoid repeated stat calls.
#[derive(Debug)]
pub struct GridIndex {
    directory: PathBuf,
    template: String,
    tile_degrees: u32,
    cache: RwLock<HashMap<(i32, i32), Option<PathBuf>>>,
}

impl GridIndex {
    pub fn new(directory: PathBuf, template: String, tile_degrees: u32) -> Self {
        Self {
            directory,
            template,
            tile_degrees: tile_degrees.max(1),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn locate(&self, lat: f64, lng: f64) -> Option<PathBuf> {
        let corner = tile_corner(lat, lng, self.tile_degrees);

        {
            let cache = self.cache.read().unwrap_or_else(|p| p.into_inner());
            if let Some(cached) = cache.get(&corner) {
                return cached.clone();
            }
        }

        let path = self
            .directory
            .join(substitute_template(&self.template, corner.0, corner.1));
        let entry = path.is_file().then_some(path);

        self.cache
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(corner, entry.clone());
        entry
    }
}

/// Filename index over non-overlapping boxes. Entries are kept sorted by
/// `min_lat`; a lookup binary-searches to the last candidate band and
/// walks back no further than the tallest tile, checking longitude on
/// the way.
#[derive(Debug)]
pub struct ManifestIndex {
    entries: Vec<ManifestEntry>,
    max_lat_span: f64,
}

impl ManifestIndex {
    pub fn new(mut entries: Vec<ManifestEntry>) -> Self {
        entries.sort_by(|a, b| a.min_lat.total_cmp(&b.min_lat));
        let max_lat_span = entries
            .iter()
            .map(|e| e.max_lat - e.min_lat)
            .fold(0.0, f64::max);
        Self {
            entries,
            max_lat_span,
        }
    }

    fn locate(&self, lat: f64, lng: f64) -> Option<PathBuf> {
        let end = self.entries.partition_point(|e| e.min_lat <= lat);
        let floor = lat - self.max_lat_span;
        self.entries[..end]
            .iter()
            .rev()
            .take_while(|e| e.min_lat >= floor)
            .find(|e| e.contains(lat, lng))
            .map(|e| e.path.clone())
    }
}

/// Southwest corner of the tile containing a point, floored to a
/// multiple of the tile size. Flooring realizes the boundary tie-break:
/// a point on a seam belongs to the tile whose corner it sits on.
fn tile_corner(lat: f64, lng: f64, tile_degrees: u32) -> (i32, i32) {
    let d = tile_degrees as f64;
    (
        ((lat / d).floor() * d) as i32,
        ((lng / d).floor() * d) as i32,
    )
}

/// Substitute `{N|S}`, `{lat}`, `{E|W}`, `{lng}` in a filename template.
/// Latitude is zero-padded to 2 digits and longitude to 3, the SRTM
/// convention.
fn substitute_template(template: &str, lat: i32, lng: i32) -> String {
    template
        .replace("{N|S}", if lat >= 0 { "N" } else { "S" })
        .replace("{E|W}", if lng >= 0 { "E" } else { "W" })
        .replace("{lat}", &format!("{:02}", lat.abs()))
        .replace("{lng}", &format!("{:03}", lng.abs()))
}

/// File extension of a grid template, used by the registry's probe scan.
pub(crate) fn template_extension(template: &str) -> Option<&str> {
    template.rsplit_once('.').map(|(_, ext)| ext)
}
