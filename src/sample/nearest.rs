//! Nearest-neighbor kernel.

use ndarray::ArrayView2;

use super::is_nodata;

/// Select the sample nearest to a center-based position.
///
/// Each axis is rounded half-to-even, so a point exactly between two
/// pixel centers resolves deterministically regardless of sign.
///
/// Returns `None` if the selected pixel is outside the window or NODATA.
pub fn sample(
    src: &ArrayView2<'_, f64>,
    row: f64,
    col: f64,
    nodata: Option<f64>,
) -> Option<f64> {
    let r = row.round_ties_even() as isize;
    let c = col.round_ties_even() as isize;

    let (rows, cols) = (src.nrows() as isize, src.ncols() as isize);
    if r < 0 || r >= rows || c < 0 || c >= cols {
        return None;
    }

    let val = src[(r as usize, c as usize)];
    if is_nodata(val, nodata) {
        return None;
    }
    Some(val)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_selects_nearest_center() {
        let arr = array![[1.0, 2.0], [3.0, 4.0]];
        let view = arr.view();

        assert_eq!(sample(&view, 0.0, 0.0, None), Some(1.0));
        assert_eq!(sample(&view, 0.2, 0.9, None), Some(2.0));
        assert_eq!(sample(&view, 0.9, 0.2, None), Some(3.0));
        assert_eq!(sample(&view, 1.4, 1.4, None), Some(4.0));
    }

    #[test]
    fn test_half_rounds_to_even() {
        let arr = array![
            [10.0, 20.0, 30.0],
            [40.0, 50.0, 60.0],
            [70.0, 80.0, 90.0],
        ];
        let view = arr.view();

        // 0.5 -> 0, 1.5 -> 2
        assert_eq!(sample(&view, 0.0, 0.5, None), Some(10.0));
        assert_eq!(sample(&view, 0.0, 1.5, None), Some(30.0));
        assert_eq!(sample(&view, 0.5, 0.0, None), Some(10.0));
        assert_eq!(sample(&view, 1.5, 0.0, None), Some(70.0));
    }

    #[test]
    fn test_out_of_window() {
        let arr = array![[1.0, 2.0], [3.0, 4.0]];
        let view = arr.view();

        assert_eq!(sample(&view, -0.6, 0.0, None), None);
        assert_eq!(sample(&view, 0.0, -0.6, None), None);
        assert_eq!(sample(&view, 1.6, 0.0, None), None);
        assert_eq!(sample(&view, 0.0, 1.6, None), None);
    }

    #[test]
    fn test_nodata() {
        let arr = array![[-9999.0, 2.0], [3.0, 4.0]];
        let view = arr.view();

        assert_eq!(sample(&view, 0.0, 0.0, Some(-9999.0)), None);
        assert_eq!(sample(&view, 0.0, 1.0, Some(-9999.0)), Some(2.0));
        // Without a sentinel the stored value is returned as-is
        assert_eq!(sample(&view, 0.0, 0.0, None), Some(-9999.0));
    }

    #[test]
    fn test_nan_is_always_nodata() {
        let arr = array![[f64::NAN, 2.0], [3.0, 4.0]];
        let view = arr.view();
        assert_eq!(sample(&view, 0.0, 0.0, None), None);
    }

    #[test]
    fn test_subpixel_offsets_select_same_pixel() {
        // For a grid where pixel(r, c) = r * 10 + c, offsets within half a
        // pixel of a center must always select that center.
        let mut arr = ndarray::Array2::zeros((8, 8));
        for r in 0..8 {
            for c in 0..8 {
                arr[(r, c)] = (r * 10 + c) as f64;
            }
        }
        let view = arr.view();

        for &dr in &[-0.49, -0.25, 0.0, 0.25, 0.49] {
            for &dc in &[-0.49, -0.25, 0.0, 0.25, 0.49] {
                let val = sample(&view, 3.0 + dr, 4.0 + dc, None).unwrap();
                assert_eq!(val, 34.0, "at ({}, {})", 3.0 + dr, 4.0 + dc);
            }
        }
    }
}
