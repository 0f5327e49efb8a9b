//! Cubic convolution kernel (Keys 1981, a = -0.5).

use ndarray::ArrayView2;

use super::is_nodata;

/// Cubic convolution weight function.
///
/// ```text
/// W(t) = (a+2)|t|³ - (a+3)|t|² + 1       for 0 ≤ |t| ≤ 1
/// W(t) = a|t|³ - 5a|t|² + 8a|t| - 4a     for 1 < |t| ≤ 2
/// W(t) = 0                               for |t| > 2
/// ```
fn cubic_weight(t: f64) -> f64 {
    const A: f64 = -0.5;
    let t = t.abs();
    if t <= 1.0 {
        (A + 2.0) * t * t * t - (A + 3.0) * t * t + 1.0
    } else if t <= 2.0 {
        A * t * t * t - 5.0 * A * t * t + 8.0 * A * t - 4.0 * A
    } else {
        0.0
    }
}

/// Separable 4x4 cubic convolution around a center-based position,
/// row pass then column pass. The anchor is `floor()` of each
/// coordinate, with taps at offsets -1..=2.
///
/// Returns `None` if any of the 16 samples is outside the window or
/// NODATA.
pub fn sample(
    src: &ArrayView2<'_, f64>,
    row: f64,
    col: f64,
    nodata: Option<f64>,
) -> Option<f64> {
    let r0 = row.floor() as isize;
    let c0 = col.floor() as isize;

    let (rows, cols) = (src.nrows() as isize, src.ncols() as isize);
    if r0 - 1 < 0 || r0 + 2 >= rows || c0 - 1 < 0 || c0 + 2 >= cols {
        return None;
    }

    let dr = row - r0 as f64;
    let dc = col - c0 as f64;

    // 1D weight vectors; 8 weight evaluations instead of 16
    let wr: [f64; 4] = std::array::from_fn(|k| cubic_weight(dr - (k as f64 - 1.0)));
    let wc: [f64; 4] = std::array::from_fn(|k| cubic_weight(dc - (k as f64 - 1.0)));

    let mut acc = 0.0;
    for (jk, j) in (-1..=2_isize).enumerate() {
        let w_row = wr[jk];
        for (ik, i) in (-1..=2_isize).enumerate() {
            let val = src[((r0 + j) as usize, (c0 + i) as usize)];
            if is_nodata(val, nodata) {
                return None;
            }
            acc += w_row * wc[ik] * val;
        }
    }

    Some(acc)
}
