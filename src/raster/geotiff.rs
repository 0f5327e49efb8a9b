//! Windowed GeoTIFF reading.
//!
//! Handles both tiled and strip-organized files; a window read decodes
//! only the chunks that intersect it, never the whole image. Compression
//! (deflate, LZW) is handled by the `tiff` decoder.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tiff::ColorType;

use super::{clip_window, widen, DType, RasterMetadata, RasterReader, Window};
use crate::error::RasterError;
use crate::geo::Affine;

// GeoTIFF and GDAL private tags
const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_MODEL_TRANSFORMATION: u16 = 34264;
const TAG_GDAL_NODATA: u16 = 42113;

#[derive(Debug)]
pub struct GeoTiffReader {
    decoder: Decoder<BufReader<File>>,
    meta: RasterMetadata,
    path: PathBuf,
    /// Nominal chunk (strip or tile) shape as (width, height).
    chunk_w: usize,
    chunk_h: usize,
    chunks_across: usize,
}

impl GeoTiffReader {
    pub fn open(path: &Path) -> Result<Self, RasterError> {
        let file = File::open(path)?;
        let mut decoder = Decoder::new(BufReader::new(file))?.with_limits(read_limits());

        let (width, height) = decoder.dimensions()?;
        let dtype = read_dtype(&mut decoder, path)?;
        let transform = read_transform(&mut decoder, path)?;
        let inverse = transform.inverse()?;
        let nodata = read_nodata(&mut decoder);

        let (cw, ch) = decoder.chunk_dimensions();
        if cw == 0 || ch == 0 {
            return Err(RasterError::Corrupt {
                path: path.to_path_buf(),
                reason: "zero chunk dimensions".into(),
            });
        }

        Ok(Self {
            decoder,
            meta: RasterMetadata {
                transform,
                inverse,
                width: width as usize,
                height: height as usize,
                dtype,
                nodata,
            },
            path: path.to_path_buf(),
            chunk_w: cw as usize,
            chunk_h: ch as usize,
            chunks_across: (width as usize).div_ceil(cw as usize),
        })
    }

    fn corrupt(&self, reason: impl Into<String>) -> RasterError {
        RasterError::Corrupt {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }
}

impl RasterReader for GeoTiffReader {
    fn metadata(&self) -> &RasterMetadata {
        &self.meta
    }

    fn read_window(&mut self, window: Window, fill: f64) -> Result<Array2<f64>, RasterError> {
        let fill = self.meta.nodata.unwrap_or(fill);
        let mut out = Array2::from_elem((window.nrows, window.ncols), fill);

        let (rows, cols) = clip_window(window, self.meta.width, self.meta.height);
        if rows.is_empty() || cols.is_empty() {
            return Ok(out);
        }

        let (cw, ch) = (self.chunk_w as i64, self.chunk_h as i64);
        let cy_range = rows.start / ch..=(rows.end - 1) / ch;
        let cx_range = cols.start / cw..=(cols.end - 1) / cw;

        for cy in cy_range {
            for cx in cx_range.clone() {
                let index = cy as usize * self.chunks_across + cx as usize;
                let samples = match self.decoder.read_chunk(index as u32) {
                    Ok(result) => decode_samples(result),
                    Err(e) => return Err(RasterError::Tiff(e)),
                };

                // Edge chunks are clipped to the image; infer the row
                // stride from the buffer length in case the decoder
                // returned a padded tile instead.
                let data_w = cw.min(self.meta.width as i64 - cx * cw) as usize;
                let data_h = ch.min(self.meta.height as i64 - cy * ch) as usize;
                let stride = if samples.len() == data_w * data_h {
                    data_w
                } else if samples.len() == (cw * ch) as usize {
                    cw as usize
                } else {
                    return Err(self.corrupt(format!(
                        "chunk {index} decoded to {} samples, expected {}",
                        samples.len(),
                        data_w * data_h
                    )));
                };

                let r_lo = rows.start.max(cy * ch);
                let r_hi = rows.end.min(cy * ch + data_h as i64);
                let c_lo = cols.start.max(cx * cw);
                let c_hi = cols.end.min(cx * cw + data_w as i64);

                for r in r_lo..r_hi {
                    let src_row = (r - cy * ch) as usize;
                    let dst_row = (r - window.row0) as usize;
                    for c in c_lo..c_hi {
                        let src_col = (c - cx * cw) as usize;
                        let dst_col = (c - window.col0) as usize;
                        out[(dst_row, dst_col)] = samples[src_row * stride + src_col];
                    }
                }
            }
        }

        Ok(out)
    }
}

/// DEM tiles can be large; lift the decoder's default buffer limits.
fn read_limits() -> Limits {
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 1024 * 1024 * 1024;
    limits.intermediate_buffer_size = 1024 * 1024 * 1024;
    limits.ifd_value_size = 1024 * 1024 * 1024;
    limits
}

fn read_dtype<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    path: &Path,
) -> Result<DType, RasterError> {
    let color = decoder.colortype()?;
    let bits = match color {
        ColorType::Gray(bits) => bits,
        other => {
            return Err(RasterError::UnsupportedFormat(format!(
                "{}: expected single-band grayscale, got {:?}",
                path.display(),
                other
            )))
        }
    };
    // SampleFormat: 1 = unsigned int, 2 = signed int, 3 = float
    let format = decoder.get_tag_u32(Tag::SampleFormat).unwrap_or(1);
    match (bits, format) {
        (16, 1) => Ok(DType::U16),
        (16, 2) => Ok(DType::I16),
        (32, 1) => Ok(DType::U32),
        (32, 2) => Ok(DType::I32),
        (32, 3) => Ok(DType::F32),
        (bits, format) => Err(RasterError::UnsupportedFormat(format!(
            "{}: {bits}-bit samples with format {format}",
            path.display()
        ))),
    }
}

fn read_transform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    path: &Path,
) -> Result<Affine, RasterError> {
    // ModelTransformation is a full 4x4 matrix mapping (col, row, 0, 1)
    // to model space; it is the only way to express flipped or rotated
    // rasters, so it takes precedence.
    eprintln!("DEBUG raw transform tag = {:?}", decoder.get_tag(Tag::Unknown(TAG_MODEL_TRANSFORMATION)));
    eprintln!("DEBUG raw tiepoint tag = {:?}", decoder.get_tag(Tag::Unknown(TAG_MODEL_TIEPOINT)));
    eprintln!("DEBUG raw scale tag = {:?}", decoder.get_tag(Tag::Unknown(TAG_MODEL_PIXEL_SCALE)));
    if let Ok(m) = decoder.get_tag_f64_vec(Tag::Unknown(TAG_MODEL_TRANSFORMATION)) {
        if m.len() >= 16 {
            return Ok(Affine::new(m[0], m[1], m[3], m[4], m[5], m[7]));
        }
    }

    let tiepoint = decoder.get_tag_f64_vec(Tag::Unknown(TAG_MODEL_TIEPOINT));
    let scale = decoder.get_tag_f64_vec(Tag::Unknown(TAG_MODEL_PIXEL_SCALE));
    if let (Ok(tiepoint), Ok(scale)) = (tiepoint, scale) {
        if tiepoint.len() >= 6 && scale.len() >= 2 {
            // Tiepoint [i, j, k, x, y, z] anchors pixel (i, j) at (x, y);
            // pixel scale is (sx, sy) with sy positive for north-up.
            let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
            let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
            return Ok(Affine::new(scale[0], 0.0, origin_x, 0.0, -scale[1], origin_y));
        }
    }

    Err(RasterError::Georeference(format!(
        "{}: no ModelTransformation or ModelTiepoint/ModelPixelScale tags",
        path.display()
    )))
}

fn read_nodata<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    // GDAL_NODATA is an ASCII string, often NUL-terminated
    decoder
        .get_tag_ascii_string(Tag::Unknown(TAG_GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_end_matches('\0').trim().parse().ok())
}

fn decode_samples(result: DecodingResult) -> Vec<f64> {
    match result {
        DecodingResult::U8(v) => widen(&v),
        DecodingResult::U16(v) => widen(&v),
        DecodingResult::U32(v) => widen(&v),
        DecodingResult::U64(v) => widen(&v),
        DecodingResult::I8(v) => widen(&v),
        DecodingResult::I16(v) => widen(&v),
        DecodingResult::I32(v) => widen(&v),
        DecodingResult::I64(v) => widen(&v),
        DecodingResult::F32(v) => widen(&v),
        DecodingResult::F64(v) => v,
    }
}
