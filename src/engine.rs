//! The dataset query engine.
//!
//! A query runs synchronously: validate each point, resolve it to a tile,
//! group points per tile so repeated hits share one file open and one
//! window read, sample, and scatter results back into input order.
//! Per-point failures (bad latitude, uncovered, NODATA) become result
//! rows; only raster I/O failures abort the batch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::config::NodataPolicy;
use crate::error::QueryError;
use crate::geo::{valid_latitude, wrap_longitude};
use crate::raster::Window;
use crate::registry::{Dataset, Registry};
use crate::sample::{self, Kernel};

/// A query point echoed back in results, longitude canonicalized to
/// [-180, 180).
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

/// Outcome for one query point. `elevation` is `null` for uncovered
/// points and NODATA samples under the permissive policy; `error` is set
/// for invalid points and, under the strict policy, for the other
/// per-point failures.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PointResult {
    pub elevation: Option<f64>,
    pub location: Location,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct Engine {
    registry: Registry,
}

impl Engine {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Query a named dataset for a batch of `(lat, lng)` points.
    ///
    /// Returns one result per input point, in input order. Fails as a
    /// whole only for an unknown dataset or a raster I/O error.
    pub fn query(
        &self,
        dataset_name: &str,
        points: &[(f64, f64)],
        kernel_override: Option<Kernel>,
    ) -> Result<Vec<PointResult>, QueryError> {
        let dataset = self
            .registry
            .get(dataset_name)
            .ok_or_else(|| QueryError::DatasetNotFound(dataset_name.to_string()))?;
        let kernel = kernel_override.unwrap_or(dataset.kernel);

        let mut results: Vec<PointResult> = Vec::with_capacity(points.len());
        let mut groups: HashMap<PathBuf, Vec<(usize, Location)>> = HashMap::new();

        for (i, &(lat, lng)) in points.iter().enumerate() {
            if let Some(reason) = validate_point(lat, lng) {
                results.push(PointResult {
                    elevation: None,
                    location: Location { lat, lng },
                    error: Some(reason),
                });
                continue;
            }
            let location = Location {
                lat,
                lng: wrap_longitude(lng),
            };
            match dataset.index.locate(location.lat, location.lng) {
                Some(path) => {
                    groups.entry(path).or_default().push((i, location));
                    // Placeholder; the tile pass overwrites it
                    results.push(PointResult {
                        elevation: None,
                        location,
                        error: None,
                    });
                }
                None => results.push(uncovered(location, dataset.nodata_policy)),
            }
        }

        debug!(
            dataset = %dataset.name,
            points = points.len(),
            tiles = groups.len(),
            kernel = kernel.name(),
            "query grouped"
        );

        for (path, group) in &groups {
            query_tile(dataset, kernel, path, group, &mut results)?;
        }
        Ok(results)
    }
}

/// Sample every point of one tile group, writing results in place.
fn query_tile(
    dataset: &Dataset,
    kernel: Kernel,
    path: &Path,
    group: &[(usize, Location)],
    results: &mut [PointResult],
) -> Result<(), QueryError> {
    let handle = dataset.handles.checkout(path)?;
    let mut reader = handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let meta = reader.metadata().clone();

    // Center-based pixel positions. Points that miss the raster grid are
    // uncovered; that can happen for single-file datasets, whose index
    // never says no.
    let mut targets: Vec<(usize, f64, f64)> = Vec::with_capacity(group.len());
    for &(i, location) in group {
        let (col, row) = meta.inverse.forward(location.lng, location.lat);
        if col < 0.0 || col >= meta.width as f64 || row < 0.0 || row >= meta.height as f64 {
            results[i] = uncovered(location, dataset.nodata_policy);
        } else {
            targets.push((i, row - 0.5, col - 0.5));
        }
    }
    if targets.is_empty() {
        return Ok(());
    }

    // Union of the kernel footprints of every point in the group
    let (mut r_min, mut r_max) = (i64::MAX, i64::MIN);
    let (mut c_min, mut c_max) = (i64::MAX, i64::MIN);
    for &(_, row, col) in &targets {
        let (r0, r1) = kernel.tap_range(row);
        let (c0, c1) = kernel.tap_range(col);
        r_min = r_min.min(r0);
        r_max = r_max.max(r1);
        c_min = c_min.min(c0);
        c_max = c_max.max(c1);
    }
    let union = Window::new(
        r_min,
        c_min,
        (r_max - r_min + 1) as usize,
        (c_max - c_min + 1) as usize,
    );

    let tile_area = (meta.width * meta.height) as f64;
    if union.area() as f64 <= dataset.max_window_fraction * tile_area {
        let window = reader.read_window(union, f64::NAN)?;
        let view = window.view();
        for &(i, row, col) in &targets {
            let value = sample::sample(
                &view,
                row - union.row0 as f64,
                col - union.col0 as f64,
                kernel,
                meta.nodata,
            );
            let location = results[i].location;
            results[i] = finish(value, location, dataset);
        }
    } else {
        // Sparse group spanning most of the tile: per-point windows
        debug!(
            tile = %path.display(),
            points = targets.len(),
            window_area = union.area(),
            "window exceeds threshold, reading per point"
        );
        for &(i, row, col) in &targets {
            let (r0, r1) = kernel.tap_range(row);
            let (c0, c1) = kernel.tap_range(col);
            let window = reader.read_window(
                Window::new(r0, c0, (r1 - r0 + 1) as usize, (c1 - c0 + 1) as usize),
                f64::NAN,
            )?;
            let value = sample::sample(
                &window.view(),
                row - r0 as f64,
                col - c0 as f64,
                kernel,
                meta.nodata,
            );
            let location = results[i].location;
            results[i] = finish(value, location, dataset);
        }
    }
    Ok(())
}

fn validate_point(lat: f64, lng: f64) -> Option<String> {
    if !lat.is_finite() || !valid_latitude(lat) {
        Some(format!(
            "Invalid latitude '{lat}': must be between -90 and 90."
        ))
    } else if !lng.is_finite() {
        Some(format!("Invalid longitude '{lng}'."))
    } else {
        None
    }
}

fn finish(value: Option<f64>, location: Location, dataset: &Dataset) -> PointResult {
    match value {
        Some(v) => PointResult {
            elevation: Some(round_to(v, dataset.decimal_places)),
            location,
            error: None,
        },
        None => match dataset.nodata_policy {
            NodataPolicy::Null => PointResult {
                elevation: None,
                location,
                error: None,
            },
            NodataPolicy::Error => PointResult {
                elevation: None,
                location,
                error: Some("No data available at location.".to_string()),
            },
        },
    }
}

fn uncovered(location: Location, policy: NodataPolicy) -> PointResult {
    match policy {
        NodataPolicy::Null => PointResult {
            elevation: None,
            location,
            error: None,
        },
        NodataPolicy::Error => PointResult {
            elevation: None,
            location,
            error: Some("Location not covered by dataset.".to_string()),
        },
    }
}

fn round_to(value: f64, decimal_places: i32) -> f64 {
    let factor = 10f64.powi(decimal_places);
    (value * factor).round() / factor
}
