//! Geographic georeferencing and coordinate canonicalization.

use crate::error::RasterError;

/// A 2D affine transform mapping pixel coordinates to geographic
/// coordinates:
///
///   lng = a * col + b * row + c
///   lat = d * col + e * row + f
///
/// `(col, row)` are corner-based: pixel (0, 0) has its outer corner at
/// the transform origin and its center at (0.5, 0.5). For a north-up
/// raster `a > 0` and `e < 0`, but neither sign is assumed anywhere;
/// flipped and rotated rasters sample correctly as long as the transform
/// is invertible.
///
/// In GDAL geotransform order the same parameters appear as
/// `[c, a, b, f, d, e]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Affine {
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// Create from a GDAL-style geotransform array `[c, a, b, f, d, e]`.
    pub fn from_gdal(gt: &[f64; 6]) -> Self {
        Self {
            a: gt[1],
            b: gt[2],
            c: gt[0],
            d: gt[4],
            e: gt[5],
            f: gt[3],
        }
    }

    /// Apply the forward transform: (col, row) -> (lng, lat).
    pub fn forward(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.a * col + self.b * row + self.c;
        let y = self.d * col + self.e * row + self.f;
        (x, y)
    }

    /// Compute the inverse transform, mapping (lng, lat) -> (col, row).
    pub fn inverse(&self) -> Result<Affine, RasterError> {
        let det = self.a * self.e - self.b * self.d;
        if det.abs() < f64::EPSILON {
            return Err(RasterError::Georeference(
                "singular affine transform (determinant is zero)".into(),
            ));
        }
        let inv_det = 1.0 / det;
        Ok(Affine {
            a: self.e * inv_det,
            b: -self.b * inv_det,
            c: (self.b * self.f - self.e * self.c) * inv_det,
            d: -self.d * inv_det,
            e: self.a * inv_det,
            f: (self.d * self.c - self.a * self.f) * inv_det,
        })
    }
}

/// Canonicalize a longitude into [-180, 180) by wrapping modulo 360.
///
/// +180 maps to -180, so every antimeridian query resolves to the same
/// tile.
pub fn wrap_longitude(lng: f64) -> f64 {
    ((lng + 180.0).rem_euclid(360.0)) - 180.0
}

/// Latitudes outside [-90, 90] cannot be wrapped and are rejected.
pub fn valid_latitude(lat: f64) -> bool {
    (-90.0..=90.0).contains(&lat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_forward_north_up() {
        // 1 degree pixels, origin at (122E, 57N), north-up
        let aff = Affine::new(1.0, 0.0, 122.0, 0.0, -1.0, 57.0);
        let (lng, lat) = aff.forward(0.0, 0.0);
        assert_relative_eq!(lng, 122.0);
        assert_relative_eq!(lat, 57.0);

        let (lng, lat) = aff.forward(2.0, 2.0);
        assert_relative_eq!(lng, 124.0);
        assert_relative_eq!(lat, 55.0);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let aff = Affine::new(1.0 / 1200.0, 0.0, -118.0, 0.0, -1.0 / 1200.0, 35.0);
        let inv = aff.inverse().unwrap();
        let (lng, lat) = aff.forward(600.5, 600.5);
        let (col, row) = inv.forward(lng, lat);
        assert_relative_eq!(col, 600.5, epsilon = 1e-9);
        assert_relative_eq!(row, 600.5, epsilon = 1e-9);
    }

    #[test]
    fn test_inverse_flipped_axes() {
        // East-to-west storage: negative column step
        let aff = Affine::new(-2.0, 0.0, 125.0, 0.0, -2.0, 58.0);
        let inv = aff.inverse().unwrap();
        let (col, row) = inv.forward(123.9, 56.35);
        assert_relative_eq!(col, 0.55, epsilon = 1e-12);
        assert_relative_eq!(row, 0.825, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_transform() {
        let aff = Affine::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        assert!(aff.inverse().is_err());
    }

    #[test]
    fn test_gdal_order() {
        let gt = [-118.0, 1.0 / 1200.0, 0.0, 35.0, 0.0, -1.0 / 1200.0];
        let aff = Affine::from_gdal(&gt);
        assert_relative_eq!(aff.c, -118.0);
        assert_relative_eq!(aff.a, 1.0 / 1200.0);
        assert_relative_eq!(aff.e, -1.0 / 1200.0);
    }

    #[test]
    fn test_wrap_longitude() {
        assert_relative_eq!(wrap_longitude(0.0), 0.0);
        assert_relative_eq!(wrap_longitude(179.9), 179.9);
        assert_relative_eq!(wrap_longitude(180.0), -180.0);
        assert_relative_eq!(wrap_longitude(181.0), -179.0);
        assert_relative_eq!(wrap_longitude(-180.0), -180.0);
        assert_relative_eq!(wrap_longitude(360.0), 0.0);
        assert_relative_eq!(wrap_longitude(-539.0), -179.0);
        assert_relative_eq!(wrap_longitude(541.0), -179.0);
    }

    #[test]
    fn test_valid_latitude() {
        assert!(valid_latitude(0.0));
        assert!(valid_latitude(90.0));
        assert!(valid_latitude(-90.0));
        assert!(!valid_latitude(90.001));
        assert!(!valid_latitude(-91.0));
        assert!(!valid_latitude(f64::NAN));
    }
}
