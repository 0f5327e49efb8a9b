//! Dataset registry: from validated config to ready-to-query handles.
//!
//! Loading resolves paths, probes one raster per dataset to catch format
//! and georeferencing problems up front, and builds the tile indices.
//! Any failure aborts startup; a broken dataset is never half-registered.
//! Once built, the registry is immutable and shared for the process
//! lifetime.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rayon::prelude::*;
use tracing::info;

use crate::config::{Config, DatasetConfig, NodataPolicy, SourceConfig};
use crate::error::{ConfigError, RasterError};
use crate::index::{template_extension, GridIndex, ManifestEntry, ManifestIndex, TileIndex};
use crate::raster::{RasterOpener, RasterReader};
use crate::sample::Kernel;

/// A named, queryable collection of rasters.
#[derive(Debug)]
pub struct Dataset {
    pub name: String,
    pub index: TileIndex,
    pub kernel: Kernel,
    pub nodata_policy: NodataPolicy,
    pub decimal_places: i32,
    pub max_window_fraction: f64,
    pub handles: HandleCache,
}

#[derive(Debug)]
pub struct Registry {
    datasets: HashMap<String, Arc<Dataset>>,
}

impl Registry {
    /// Build every configured dataset, probing in parallel. Publication
    /// is atomic: either all datasets load or the whole call fails.
    pub fn load(config: &Config, opener: Arc<dyn RasterOpener>) -> Result<Self, ConfigError> {
        let datasets = config
            .datasets
            .par_iter()
            .map(|dataset| build_dataset(dataset, &opener))
            .collect::<Result<Vec<_>, _>>()?;

        let datasets: HashMap<_, _> = datasets
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();
        info!(count = datasets.len(), "datasets registered");
        Ok(Self { datasets })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Dataset>> {
        self.datasets.get(name)
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(String::as_str)
    }
}

fn build_dataset(
    config: &DatasetConfig,
    opener: &Arc<dyn RasterOpener>,
) -> Result<Arc<Dataset>, ConfigError> {
    let name = &config.name;
    let index = match &config.source {
        SourceConfig::Single { path } => {
            probe(opener, path, name)?;
            TileIndex::Single { path: path.clone() }
        }
        SourceConfig::Grid {
            directory,
            template,
            tile_degrees,
        } => {
            let sample_tile = find_grid_tile(directory, template, name)?;
            probe(opener, &sample_tile, name)?;
            TileIndex::Grid(GridIndex::new(
                directory.clone(),
                template.clone(),
                *tile_degrees,
            ))
        }
        SourceConfig::Manifest { manifest } => {
            let entries = load_manifest(manifest, name)?;
            probe(opener, &entries[0].path, name)?;
            TileIndex::Manifest(ManifestIndex::new(entries))
        }
    };

    Ok(Arc::new(Dataset {
        name: name.clone(),
        index,
        kernel: config.interpolation,
        nodata_policy: config.nodata_policy,
        decimal_places: config.decimal_places,
        max_window_fraction: config.max_window_fraction,
        handles: HandleCache::new(config.handle_cache_size, opener.clone()),
    }))
}

/// Open one raster and throw the handle away; a dataset whose sample
/// tile cannot be opened must fail at startup, not at request time.
fn probe(opener: &Arc<dyn RasterOpener>, path: &Path, name: &str) -> Result<(), ConfigError> {
    let reader = opener.open(path).map_err(|source| ConfigError::Probe {
        name: name.to_string(),
        source,
    })?;
    let meta = reader.metadata();
    info!(
        dataset = %name,
        raster = %path.display(),
        dtype = %meta.dtype,
        width = meta.width,
        height = meta.height,
        "dataset probed"
    );
    Ok(())
}

/// First file in a grid directory with the template's extension.
fn find_grid_tile(directory: &Path, template: &str, name: &str) -> Result<PathBuf, ConfigError> {
    let wanted = template_extension(template).map(str::to_ascii_lowercase);
    let entries = std::fs::read_dir(directory).map_err(|e| ConfigError::Dataset {
        name: name.to_string(),
        reason: format!("cannot read tile directory {}: {e}", directory.display()),
    })?;

    let mut tiles: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && match (&wanted, path.extension().and_then(|e| e.to_str())) {
                    (Some(wanted), Some(ext)) => ext.eq_ignore_ascii_case(wanted),
                    (None, _) => true,
                    (Some(_), None) => false,
                }
        })
        .collect();
    tiles.sort();

    tiles.into_iter().next().ok_or_else(|| ConfigError::Dataset {
        name: name.to_string(),
        reason: format!("no tiles found in {}", directory.display()),
    })
}

fn load_manifest(path: &Path, name: &str) -> Result<Vec<ManifestEntry>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Dataset {
        name: name.to_string(),
        reason: format!("cannot read manifest {}: {e}", path.display()),
    })?;
    let mut entries: Vec<ManifestEntry> =
        serde_json::from_str(&text).map_err(|e| ConfigError::Dataset {
            name: name.to_string(),
            reason: format!("cannot parse manifest {}: {e}", path.display()),
        })?;

    if entries.is_empty() {
        return Err(ConfigError::Dataset {
            name: name.to_string(),
            reason: "manifest is empty".into(),
        });
    }
    for entry in &mut entries {
        if entry.min_lat >= entry.max_lat || entry.min_lng >= entry.max_lng {
            return Err(ConfigError::Dataset {
                name: name.to_string(),
                reason: format!("degenerate bounds for {}", entry.path.display()),
            });
        }
        // Relative manifest paths resolve against the manifest's directory
        if entry.path.is_relative() {
            if let Some(dir) = path.parent() {
                entry.path = dir.join(&entry.path);
            }
        }
    }
    Ok(entries)
}

/// Bounded pool of open raster handles, LRU by path. Shared by all
/// queries against one dataset; evicting drops the pool's reference and
/// the file closes once the last borrower is done with it.
#[derive(Debug)]
pub struct HandleCache {
    capacity: usize,
    opener: Arc<dyn RasterOpener>,
    inner: Mutex<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    handles: HashMap<PathBuf, Arc<Mutex<Box<dyn RasterReader>>>>,
    /// Most recently used at the back.
    order: Vec<PathBuf>,
}

impl HandleCache {
    pub fn new(capacity: usize, opener: Arc<dyn RasterOpener>) -> Self {
        Self {
            capacity: capacity.max(1),
            opener,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Borrow an open handle for `path`, opening it on a miss.
    pub fn checkout(
        &self,
        path: &Path,
    ) -> Result<Arc<Mutex<Box<dyn RasterReader>>>, RasterError> {
        {
            let mut inner = self.lock();
            if let Some(handle) = inner.handles.get(path).cloned() {
                inner.touch(path);
                return Ok(handle);
            }
        }

        // Open outside the lock so a slow open does not stall other tiles
        let handle = Arc::new(Mutex::new(self.opener.open(path)?));

        let mut inner = self.lock();
        if let Some(existing) = inner.handles.get(path).cloned() {
            // Another query opened it concurrently; keep theirs
            inner.touch(path);
            return Ok(existing);
        }
        while inner.handles.len() >= self.capacity {
            let oldest = inner.order.remove(0);
            inner.handles.remove(&oldest);
        }
        inner.handles.insert(path.to_path_buf(), handle.clone());
        inner.order.push(path.to_path_buf());
        Ok(handle)
    }

    pub fn len(&self) -> usize {
        self.lock().handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CacheInner {
    fn touch(&mut self, path: &Path) {
        if let Some(pos) = self.order.iter().position(|p| p == path) {
            let key = self.order.remove(pos);
            self.order.push(key);
        }
    }
}
