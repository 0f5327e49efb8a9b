//! In-memory rasters behind the standard reader seam.
//!
//! Used by tests and benches to exercise the engine without touching the
//! filesystem, and to observe how many times it opens each raster.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::Array2;

use super::{clip_window, DType, RasterMetadata, RasterOpener, RasterReader, Window};
use crate::error::RasterError;
use crate::geo::Affine;

#[derive(Debug)]
pub struct MemoryRaster {
    meta: RasterMetadata,
    data: Array2<f64>,
}

impl MemoryRaster {
    pub fn new(
        data: Array2<f64>,
        transform: Affine,
        nodata: Option<f64>,
    ) -> Result<Self, RasterError> {
        let inverse = transform.inverse()?;
        let (height, width) = data.dim();
        Ok(Self {
            meta: RasterMetadata {
                transform,
                inverse,
                width,
                height,
                dtype: DType::F32,
                nodata,
            },
            data,
        })
    }
}

impl RasterReader for MemoryRaster {
    fn metadata(&self) -> &RasterMetadata {
        &self.meta
    }

    fn read_window(&mut self, window: Window, fill: f64) -> Result<Array2<f64>, RasterError> {
        let fill = self.meta.nodata.unwrap_or(fill);
        let mut out = Array2::from_elem((window.nrows, window.ncols), fill);

        let (rows, cols) = clip_window(window, self.meta.width, self.meta.height);
        for r in rows {
            for c in cols.clone() {
                out[((r - window.row0) as usize, (c - window.col0) as usize)] =
                    self.data[(r as usize, c as usize)];
            }
        }
        Ok(out)
    }
}

/// Opener over a fixed set of in-memory rasters, counting opens.
#[derive(Debug, Default)]
pub struct MemoryOpener {
    rasters: HashMap<PathBuf, (Array2<f64>, Affine, Option<f64>)>,
    opens: AtomicUsize,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        path: impl Into<PathBuf>,
        data: Array2<f64>,
        transform: Affine,
        nodata: Option<f64>,
    ) {
        self.rasters.insert(path.into(), (data, transform, nodata));
    }

    /// Total number of successful `open` calls so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl RasterOpener for MemoryOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn RasterReader>, RasterError> {
        let (data, transform, nodata) = self.rasters.get(path).ok_or_else(|| {
            RasterError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such raster: {}", path.display()),
            ))
        })?;
        let raster = MemoryRaster::new(data.clone(), *transform, *nodata)?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(raster))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_window_and_fill() {
        let data = array![[1.0, 2.0], [3.0, 4.0]];
        let transform = Affine::new(1.0, 0.0, 0.0, 0.0, -1.0, 2.0);
        let mut raster = MemoryRaster::new(data, transform, Some(-1.0)).unwrap();

        let win = raster
            .read_window(Window::new(0, 0, 2, 3), f64::NAN)
            .unwrap();
        assert_eq!(win[(0, 0)], 1.0);
        assert_eq!(win[(1, 1)], 4.0);
        assert_eq!(win[(0, 2)], -1.0);
    }

    #[test]
    fn test_opener_counts_opens() {
        let mut opener = MemoryOpener::new();
        opener.insert(
            "a.tif",
            array![[1.0]],
            Affine::new(1.0, 0.0, 0.0, 0.0, -1.0, 1.0),
            None,
        );

        assert!(opener.open(Path::new("a.tif")).is_ok());
        assert!(opener.open(Path::new("a.tif")).is_ok());
        assert!(opener.open(Path::new("missing.tif")).is_err());
        assert_eq!(opener.open_count(), 2);
    }
}
