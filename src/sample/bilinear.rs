//! Bilinear kernel.

use ndarray::ArrayView2;

use super::is_nodata;

/// Separable linear blend of the 2x2 neighborhood around a center-based
/// position. The anchor is `floor()` of each coordinate.
///
/// Returns `None` if any of the four samples is outside the window or
/// NODATA.
pub fn sample(
    src: &ArrayView2<'_, f64>,
    row: f64,
    col: f64,
    nodata: Option<f64>,
) -> Option<f64> {
    let r0 = row.floor() as isize;
    let c0 = col.floor() as isize;
    let r1 = r0 + 1;
    let c1 = c0 + 1;

    let (rows, cols) = (src.nrows() as isize, src.ncols() as isize);
    if r0 < 0 || r1 >= rows || c0 < 0 || c1 >= cols {
        return None;
    }

    let (r0u, c0u, r1u, c1u) = (r0 as usize, c0 as usize, r1 as usize, c1 as usize);
    let v00 = src[(r0u, c0u)];
    let v01 = src[(r0u, c1u)];
    let v10 = src[(r1u, c0u)];
    let v11 = src[(r1u, c1u)];

    if is_nodata(v00, nodata)
        || is_nodata(v01, nodata)
        || is_nodata(v10, nodata)
        || is_nodata(v11, nodata)
    {
        return None;
    }

    let dr = row - r0 as f64;
    let dc = col - c0 as f64;

    Some(
        v00 * (1.0 - dc) * (1.0 - dr)
            + v01 * dc * (1.0 - dr)
            + v10 * (1.0 - dc) * dr
            + v11 * dc * dr,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_pixel_center_exact() {
        let arr = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]];
        let view = arr.view();

        let val = sample(&view, 1.0, 1.0, None).unwrap();
        assert_relative_eq!(val, 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_midpoint() {
        let arr = array![[0.0, 10.0], [0.0, 10.0]];
        let view = arr.view();

        let val = sample(&view, 0.5, 0.5, None).unwrap();
        assert_relative_eq!(val, 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_out_of_window() {
        let arr = array![[1.0, 2.0], [3.0, 4.0]];
        let view = arr.view();

        // The 2x2 neighborhood must be fully inside the window
        assert!(sample(&view, -0.1, 0.5, None).is_none());
        assert!(sample(&view, 0.5, 1.1, None).is_none());
    }

    #[test]
    fn test_nodata_propagation() {
        let arr = array![[-9999.0, 2.0], [3.0, 4.0]];
        let view = arr.view();

        // A single NODATA neighbor poisons the blend
        assert!(sample(&view, 0.5, 0.5, Some(-9999.0)).is_none());
        // Without the sentinel the value participates
        assert!(sample(&view, 0.5, 0.5, None).unwrap() < 0.0);
    }

    #[test]
    fn test_nan_propagation() {
        let arr = array![[1.0, f64::NAN], [3.0, 4.0]];
        let view = arr.view();
        assert!(sample(&view, 0.5, 0.5, None).is_none());
    }

    #[test]
    fn test_linear_gradient_exact() {
        // Bilinear reproduces f(col, row) = a*col + b*row + c exactly
        let (a, b, c) = (3.0, -2.0, 7.0);
        let mut arr = ndarray::Array2::zeros((10, 10));
        for r in 0..10 {
            for col in 0..10 {
                arr[(r, col)] = a * col as f64 + b * r as f64 + c;
            }
        }
        let view = arr.view();

        for &row in &[0.0, 1.25, 3.5, 6.75, 8.0] {
            for &col in &[0.0, 1.25, 3.5, 6.75, 8.0] {
                let expected = a * col + b * row + c;
                let val = sample(&view, row, col, None).unwrap();
                assert_relative_eq!(val, expected, epsilon = 1e-10);
            }
        }
    }
}
