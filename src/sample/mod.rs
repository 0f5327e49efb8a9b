//! Interpolation kernels for sub-pixel elevation sampling.
//!
//! Every kernel operates on a pixel window already read by the engine and
//! a center-based position within it: coordinate `0.0` is the center of
//! the window's first pixel on that axis. The integer part of the
//! coordinate anchors the kernel footprint, the fractional part is the
//! interpolation weight.
//!
//! NODATA never blends: if any sample inside the footprint is NODATA (or
//! NaN, or outside the window) the kernel returns `None`. For nearest
//! only the single selected sample is checked.

pub mod bilinear;
pub mod cubic;
pub mod nearest;

use ndarray::ArrayView2;
use serde::Deserialize;

/// Available interpolation kernels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kernel {
    Nearest,
    Bilinear,
    Cubic,
}

impl Kernel {
    /// Parse from a string name.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "nearest" => Some(Self::Nearest),
            "bilinear" => Some(Self::Bilinear),
            "cubic" => Some(Self::Cubic),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Bilinear => "bilinear",
            Self::Cubic => "cubic",
        }
    }

    /// Inclusive range of pixel indices the footprint touches on one
    /// axis, for a center-based coordinate. The engine unions these
    /// ranges to size its window reads.
    pub fn tap_range(&self, coord: f64) -> (i64, i64) {
        match self {
            Self::Nearest => {
                let p = coord.round_ties_even() as i64;
                (p, p)
            }
            Self::Bilinear => {
                let p = coord.floor() as i64;
                (p, p + 1)
            }
            Self::Cubic => {
                let p = coord.floor() as i64;
                (p - 1, p + 2)
            }
        }
    }
}

/// Sample a window with the given kernel at a center-based position.
pub fn sample(
    window: &ArrayView2<'_, f64>,
    row: f64,
    col: f64,
    kernel: Kernel,
    nodata: Option<f64>,
) -> Option<f64> {
    match kernel {
        Kernel::Nearest => nearest::sample(window, row, col, nodata),
        Kernel::Bilinear => bilinear::sample(window, row, col, nodata),
        Kernel::Cubic => cubic::sample(window, row, col, nodata),
    }
}

/// NODATA test shared by the kernels. NaN marks fill pixels from
/// out-of-bounds window regions on rasters without a NODATA sentinel.
pub(crate) fn is_nodata(val: f64, nodata: Option<f64>) -> bool {
    if val.is_nan() {
        return true;
    }
    match nodata {
        Some(nd) => val == nd,
        None => false,
    }
}
