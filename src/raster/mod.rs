//! Raster file access.
//!
//! Each format implements [`RasterReader`]: report georeferencing, read a
//! rectangular pixel window, decode NODATA. Readers never load a whole
//! file for a window; only the blocks (or row segments) intersecting the
//! window are touched. Formats are selected by [`FsOpener`] from the file
//! extension; adding a format means implementing the trait and extending
//! the dispatch.

pub mod geotiff;
pub mod hgt;
pub mod memory;

use std::fmt;
use std::path::Path;

use ndarray::Array2;
use num_traits::NumCast;

use crate::error::RasterError;
use crate::geo::Affine;

/// Sample data types supported on disk. Samples of every type widen to
/// f64 exactly, so NODATA comparisons on the widened values are
/// bit-faithful to the stored samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DType {
    I16,
    U16,
    I32,
    U32,
    F32,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::I16 => "int16",
            DType::U16 => "uint16",
            DType::I32 => "int32",
            DType::U32 => "uint32",
            DType::F32 => "float32",
        };
        f.write_str(name)
    }
}

/// A rectangular pixel region. The origin may be negative and the region
/// may extend past the raster; reads fill the overhang instead of
/// failing, and kernel footprints near tile edges stay rectangular.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub row0: i64,
    pub col0: i64,
    pub nrows: usize,
    pub ncols: usize,
}

impl Window {
    pub fn new(row0: i64, col0: i64, nrows: usize, ncols: usize) -> Self {
        Self {
            row0,
            col0,
            nrows,
            ncols,
        }
    }

    pub fn area(&self) -> usize {
        self.nrows * self.ncols
    }
}

/// Georeferencing and shape of an open raster.
#[derive(Clone, Debug)]
pub struct RasterMetadata {
    /// Pixel (col, row) corner to geographic (lng, lat).
    pub transform: Affine,
    /// Geographic (lng, lat) to pixel (col, row); validated at open.
    pub inverse: Affine,
    pub width: usize,
    pub height: usize,
    pub dtype: DType,
    pub nodata: Option<f64>,
}

/// A single open raster file.
///
/// `read_window` accepts windows partially or fully outside the raster
/// and fills the out-of-bounds region with the raster's NODATA, or with
/// `fill` when the raster defines none. The returned array always has
/// the requested shape.
pub trait RasterReader: Send + fmt::Debug {
    fn metadata(&self) -> &RasterMetadata;

    fn read_window(&mut self, window: Window, fill: f64) -> Result<Array2<f64>, RasterError>;
}

/// The seam between the engine and the filesystem. Injected so tests can
/// count opens and substitute in-memory rasters.
pub trait RasterOpener: Send + Sync + fmt::Debug {
    fn open(&self, path: &Path) -> Result<Box<dyn RasterReader>, RasterError>;
}

/// Opens on-disk rasters, dispatching on the file extension.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsOpener;

impl RasterOpener for FsOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn RasterReader>, RasterError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("tif") | Some("tiff") => Ok(Box::new(geotiff::GeoTiffReader::open(path)?)),
            Some("hgt") => Ok(Box::new(hgt::HgtReader::open(path)?)),
            _ => Err(RasterError::UnsupportedFormat(format!(
                "no reader for '{}'",
                path.display()
            ))),
        }
    }
}

/// Widen decoded samples to f64. Exact for all supported dtypes.
pub(crate) fn widen<T: NumCast + Copy>(samples: &[T]) -> Vec<f64> {
    samples
        .iter()
        .map(|&v| NumCast::from(v).unwrap_or(f64::NAN))
        .collect()
}

/// The in-bounds intersection of a window with a raster grid, as
/// half-open `(rows, cols)` ranges in raster space. Empty ranges mean
/// the window lies entirely outside.
pub(crate) fn clip_window(
    window: Window,
    width: usize,
    height: usize,
) -> (std::ops::Range<i64>, std::ops::Range<i64>) {
    let r_lo = window.row0.max(0);
    let r_hi = (window.row0 + window.nrows as i64).min(height as i64);
    let c_lo = window.col0.max(0);
    let c_hi = (window.col0 + window.ncols as i64).min(width as i64);
    (r_lo..r_hi.max(r_lo), c_lo..c_hi.max(c_lo))
}
