//! Raw SRTM `.hgt` reading.
//!
//! An `.hgt` file is a bare square of big-endian signed 16-bit samples,
//! 1201x1201 (SRTM3) or 3601x3601 (SRTM1), named for its southwest
//! corner (`N34W118.hgt`). Samples are grid-registered: the 1201 samples
//! of a row span the closed 1 degree interval, so edge samples sit
//! exactly on tile corners and adjacent tiles share them. There is no
//! header; a window read seeks straight to the needed row segments.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};
use ndarray::Array2;

use super::{clip_window, DType, RasterMetadata, RasterReader, Window};
use crate::error::RasterError;
use crate::geo::Affine;

const SRTM1_SIDE: usize = 3601;
const SRTM3_SIDE: usize = 1201;
pub const HGT_NODATA: f64 = -32768.0;

#[derive(Debug)]
pub struct HgtReader {
    file: File,
    side: usize,
    meta: RasterMetadata,
    path: PathBuf,
}

impl HgtReader {
    pub fn open(path: &Path) -> Result<Self, RasterError> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let side = side_from_len(len).ok_or_else(|| RasterError::Corrupt {
            path: path.to_path_buf(),
            reason: format!("{len} bytes is neither SRTM1 nor SRTM3"),
        })?;

        let (sw_lat, sw_lng) = corner_from_filename(path)?;

        // Grid registration: row 0 runs along the northern edge and the
        // affine origin sits half a sample step outside the corner.
        let step = 1.0 / (side - 1) as f64;
        let transform = Affine::new(
            step,
            0.0,
            sw_lng as f64 - step / 2.0,
            0.0,
            -step,
            (sw_lat + 1) as f64 + step / 2.0,
        );
        let inverse = transform.inverse()?;

        Ok(Self {
            file,
            side,
            meta: RasterMetadata {
                transform,
                inverse,
                width: side,
                height: side,
                dtype: DType::I16,
                nodata: Some(HGT_NODATA),
            },
            path: path.to_path_buf(),
        })
    }
}

impl RasterReader for HgtReader {
    fn metadata(&self) -> &RasterMetadata {
        &self.meta
    }

    fn read_window(&mut self, window: Window, _fill: f64) -> Result<Array2<f64>, RasterError> {
        let mut out = Array2::from_elem((window.nrows, window.ncols), HGT_NODATA);

        let (rows, cols) = clip_window(window, self.side, self.side);
        if rows.is_empty() || cols.is_empty() {
            return Ok(out);
        }

        let ncols = (cols.end - cols.start) as usize;
        let mut bytes = vec![0u8; ncols * 2];
        for r in rows {
            let offset = (r as u64 * self.side as u64 + cols.start as u64) * 2;
            self.file.seek(SeekFrom::Start(offset))?;
            self.file.read_exact(&mut bytes).map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    RasterError::Corrupt {
                        path: self.path.clone(),
                        reason: format!("short read at row {r}"),
                    }
                } else {
                    RasterError::Io(e)
                }
            })?;

            let dst_row = (r - window.row0) as usize;
            let dst_col0 = (cols.start - window.col0) as usize;
            for i in 0..ncols {
                out[(dst_row, dst_col0 + i)] = BigEndian::read_i16(&bytes[i * 2..]) as f64;
            }
        }

        Ok(out)
    }
}

fn side_from_len(len: u64) -> Option<usize> {
    match len {
        l if l == (SRTM1_SIDE * SRTM1_SIDE * 2) as u64 => Some(SRTM1_SIDE),
        l if l == (SRTM3_SIDE * SRTM3_SIDE * 2) as u64 => Some(SRTM3_SIDE),
        _ => None,
    }
}

/// Parse the southwest corner from an `N34W118`-style file stem.
fn corner_from_filename(path: &Path) -> Result<(i32, i32), RasterError> {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    let bytes = stem.as_bytes();

    let parsed = (|| {
        if !stem.is_ascii() || bytes.len() != 7 {
            return None;
        }
        let lat_sign = match bytes[0].to_ascii_uppercase() {
            b'N' => 1,
            b'S' => -1,
            _ => return None,
        };
        let lng_sign = match bytes[3].to_ascii_uppercase() {
            b'E' => 1,
            b'W' => -1,
            _ => return None,
        };
        let lat: i32 = stem[1..3].parse().ok()?;
        let lng: i32 = stem[4..7].parse().ok()?;
        Some((lat_sign * lat, lng_sign * lng))
    })();

    parsed.ok_or_else(|| {
        RasterError::Georeference(format!(
            "cannot derive tile corner from filename '{}'",
            path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Write a small fake SRTM3 tile where sample (r, c) = r * 10 + c,
    /// with a NODATA hole at (2, 2).
    fn write_tile(path: &Path) {
        let mut bytes = Vec::with_capacity(SRTM3_SIDE * SRTM3_SIDE * 2);
        for r in 0..SRTM3_SIDE {
            for c in 0..SRTM3_SIDE {
                let v: i16 = if (r, c) == (2, 2) {
                    HGT_NODATA as i16
                } else {
                    ((r * 10 + c) % 30000) as i16
                };
                bytes.extend_from_slice(&v.to_be_bytes());
            }
        }
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_corner_from_filename() {
        let check = |name: &str, expect: (i32, i32)| {
            assert_eq!(
                corner_from_filename(Path::new(name)).unwrap(),
                expect,
                "for {name}"
            );
        };
        check("N34W118.hgt", (34, -118));
        check("N00E000.hgt", (0, 0));
        check("S51E001.hgt", (-51, 1));
        check("N45W180.hgt", (45, -180));
        check("n49w002.hgt", (49, -2));

        assert!(corner_from_filename(Path::new("elevation.hgt")).is_err());
        assert!(corner_from_filename(Path::new("N341W18.hgt")).is_err());
    }

    #[test]
    fn test_rejects_bad_file_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("N10E010.hgt");
        std::fs::write(&path, vec![0u8; 1000]).unwrap();
        assert!(matches!(
            HgtReader::open(&path),
            Err(RasterError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_georeferencing_puts_samples_on_the_grid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("N34W118.hgt");
        write_tile(&path);

        let reader = HgtReader::open(&path).unwrap();
        let inv = reader.metadata().inverse;

        // The northwest sample center is exactly (35N, 118W)
        let (col, row) = inv.forward(-118.0, 35.0);
        assert!((col - 0.5).abs() < 1e-9);
        assert!((row - 0.5).abs() < 1e-9);

        // The southeast sample center is exactly (34N, 117W)
        let (col, row) = inv.forward(-117.0, 34.0);
        assert!((col - (SRTM3_SIDE as f64 - 0.5)).abs() < 1e-6);
        assert!((row - (SRTM3_SIDE as f64 - 0.5)).abs() < 1e-6);
    }

    #[test]
    fn test_window_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("N34W118.hgt");
        write_tile(&path);

        let mut reader = HgtReader::open(&path).unwrap();
        let win = reader
            .read_window(Window::new(1, 3, 3, 2), f64::NAN)
            .unwrap();
        assert_eq!(win.dim(), (3, 2));
        assert_eq!(win[(0, 0)], 13.0);
        assert_eq!(win[(1, 1)], 24.0);
        assert_eq!(win[(2, 0)], 33.0);
        // The NODATA hole survives as the sentinel
        let win = reader
            .read_window(Window::new(2, 2, 1, 1), f64::NAN)
            .unwrap();
        assert_eq!(win[(0, 0)], HGT_NODATA);
    }

    #[test]
    fn test_window_read_fills_overhang() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("N34W118.hgt");
        write_tile(&path);

        let mut reader = HgtReader::open(&path).unwrap();
        let win = reader
            .read_window(Window::new(-2, -2, 4, 4), f64::NAN)
            .unwrap();
        assert_eq!(win[(0, 0)], HGT_NODATA);
        assert_eq!(win[(1, 3)], HGT_NODATA);
        assert_eq!(win[(2, 2)], 0.0);
        assert_eq!(win[(3, 3)], 11.0);
    }
}
