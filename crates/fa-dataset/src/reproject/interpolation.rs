//! Interpolation methods for grid resampling.
//!
//! Source grids are row-major `(row, col)` slices. Fractional positions are
//! expressed in source index space. Cells equal to `nodata` never contribute.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Distance in cells outside the first/last row or column still sampled by bilinear
/// interpolation, absorbing round-off of the inverse transform.
const EDGE_TOLERANCE: f64 = 1e-6;

/// Resampling method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationMethod {
    Nearest,
    #[default]
    Bilinear,
}

impl InterpolationMethod {
    /// Parse a method name; unknown names fall back to bilinear.
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "nearest" | "near" => Self::Nearest,
            _ => Self::Bilinear,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Bilinear => "bilinear",
        }
    }

    /// Sample `data` at fractional position `(col, row)`.
    pub fn sample(
        &self,
        data: &[f64],
        width: usize,
        height: usize,
        col: f64,
        row: f64,
        nodata: f64,
    ) -> f64 {
        match self {
            Self::Nearest => nearest_interpolate(data, width, height, col, row, nodata),
            Self::Bilinear => bilinear_interpolate(data, width, height, col, row, nodata),
        }
    }
}

impl fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Nearest neighbor interpolation.
pub fn nearest_interpolate(
    data: &[f64],
    width: usize,
    height: usize,
    col: f64,
    row: f64,
    nodata: f64,
) -> f64 {
    if col < -0.5 || row < -0.5 {
        return nodata;
    }
    let c = col.round() as usize;
    let r = row.round() as usize;

    if c >= width || r >= height {
        return nodata;
    }

    data[r * width + c]
}

/// Bilinear interpolation.
///
/// Corners holding `nodata` are left out and the remaining weights are
/// renormalized; the result is `nodata` only when every corner is missing.
pub fn bilinear_interpolate(
    data: &[f64],
    width: usize,
    height: usize,
    col: f64,
    row: f64,
    nodata: f64,
) -> f64 {
    if width == 0 || height == 0 || col < -EDGE_TOLERANCE || row < -EDGE_TOLERANCE {
        return nodata;
    }
    let col = col.max(0.0);
    let row = row.max(0.0);
    let c0 = col.floor() as usize;
    let r0 = row.floor() as usize;
    if c0 >= width || r0 >= height {
        return nodata;
    }
    if col > (width - 1) as f64 + EDGE_TOLERANCE || row > (height - 1) as f64 + EDGE_TOLERANCE {
        return nodata;
    }
    let c1 = (c0 + 1).min(width - 1);
    let r1 = (r0 + 1).min(height - 1);

    let cf = col - c0 as f64;
    let rf = row - r0 as f64;

    let corners = [
        (data[r0 * width + c0], (1.0 - cf) * (1.0 - rf)),
        (data[r0 * width + c1], cf * (1.0 - rf)),
        (data[r1 * width + c0], (1.0 - cf) * rf),
        (data[r1 * width + c1], cf * rf),
    ];

    let mut sum = 0.0;
    let mut weight = 0.0;
    for (value, w) in corners {
        if value == nodata || value.is_nan() || w == 0.0 {
            continue;
        }
        sum += value * w;
        weight += w;
    }

    if weight > 0.0 {
        sum / weight
    } else {
        nodata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ND: f64 = -999.0;

    #[test]
    fn test_nearest_interpolate() {
        let data = vec![
            1.0, 2.0, 3.0,
            4.0, 5.0, 6.0,
            7.0, 8.0, 9.0,
        ];

        assert_eq!(nearest_interpolate(&data, 3, 3, 0.0, 0.0, ND), 1.0);
        assert_eq!(nearest_interpolate(&data, 3, 3, 1.0, 1.0, ND), 5.0);
        assert_eq!(nearest_interpolate(&data, 3, 3, 0.4, 0.4, ND), 1.0);
        assert_eq!(nearest_interpolate(&data, 3, 3, 0.6, 0.6, ND), 5.0);
        assert_eq!(nearest_interpolate(&data, 3, 3, 3.0, 0.0, ND), ND);
    }

    #[test]
    fn test_bilinear_interpolate() {
        let data = vec![
            1.0, 2.0,
            3.0, 4.0,
        ];

        // Corners
        assert_eq!(bilinear_interpolate(&data, 2, 2, 0.0, 0.0, ND), 1.0);
        assert_eq!(bilinear_interpolate(&data, 2, 2, 1.0, 0.0, ND), 2.0);
        assert_eq!(bilinear_interpolate(&data, 2, 2, 0.0, 1.0, ND), 3.0);
        assert_eq!(bilinear_interpolate(&data, 2, 2, 1.0, 1.0, ND), 4.0);

        // Center
        assert!((bilinear_interpolate(&data, 2, 2, 0.5, 0.5, ND) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_bilinear_skips_nodata_corners() {
        let data = vec![
            1.0, ND,
            3.0, ND,
        ];
        // Only the left column contributes
        assert!((bilinear_interpolate(&data, 2, 2, 0.5, 0.5, ND) - 2.0).abs() < 1e-12);

        let empty = vec![ND; 4];
        assert_eq!(bilinear_interpolate(&empty, 2, 2, 0.5, 0.5, ND), ND);
    }

    #[test]
    fn test_out_of_range_is_nodata() {
        let data = vec![1.0; 4];
        assert_eq!(bilinear_interpolate(&data, 2, 2, -0.1, 0.0, ND), ND);
        assert_eq!(bilinear_interpolate(&data, 2, 2, 0.0, 2.0, ND), ND);
        assert_eq!(bilinear_interpolate(&data, 2, 2, 1.5, 0.0, ND), ND);
        assert_eq!(bilinear_interpolate(&data, 2, 2, 1.0 + 1e-9, 0.0, ND), 1.0);
    }

    #[test]
    fn test_method_names() {
        assert_eq!(InterpolationMethod::from_str("Nearest"), InterpolationMethod::Nearest);
        assert_eq!(InterpolationMethod::from_str("cubic"), InterpolationMethod::Bilinear);
        assert_eq!(InterpolationMethod::Bilinear.to_string(), "bilinear");
    }
}
