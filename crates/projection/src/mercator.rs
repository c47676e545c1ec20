//! Spherical Mercator projection.
//!
//! Used for tropical FA domains and, with the WGS84 semi-major axis as
//! radius, as the web mercator reprojection target (EPSG:3857).

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use crate::error::{ProjectionError, Result};
use crate::normalize_dlon;

/// Latitudes beyond this are clamped out of the projection domain (degrees).
const MAX_LATITUDE: f64 = 89.5;

/// Spherical Mercator projection parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Mercator {
    /// Central meridian in degrees
    pub lon_0: f64,
    /// Latitude of true scale in degrees
    pub lat_ts: f64,
    /// Sphere radius (meters)
    pub radius: f64,
    /// False easting (meters)
    pub x_0: f64,
    /// False northing (meters)
    pub y_0: f64,
}

impl Mercator {
    pub fn new(lon_0: f64, lat_ts: f64, radius: f64) -> Result<Self> {
        if !(radius > 0.0) {
            return Err(ProjectionError::invalid_parameter("R", radius.to_string()));
        }
        if !lat_ts.is_finite() || lat_ts.abs() >= 90.0 {
            return Err(ProjectionError::invalid_parameter("lat_ts", lat_ts.to_string()));
        }
        Ok(Self {
            lon_0,
            lat_ts,
            radius,
            x_0: 0.0,
            y_0: 0.0,
        })
    }

    /// Web mercator (EPSG:3857) on the WGS84 sphere.
    pub fn web() -> Self {
        Self {
            lon_0: 0.0,
            lat_ts: 0.0,
            radius: crate::WGS84_SEMI_MAJOR,
            x_0: 0.0,
            y_0: 0.0,
        }
    }

    fn scale(&self) -> f64 {
        self.radius * self.lat_ts.to_radians().cos()
    }

    /// Project lon/lat degrees to meters. Returns `None` near the poles.
    pub fn forward(&self, lon_deg: f64, lat_deg: f64) -> Option<(f64, f64)> {
        if !lat_deg.is_finite() || lat_deg.abs() > MAX_LATITUDE {
            return None;
        }
        let k = self.scale();
        let dlon = normalize_dlon(lon_deg.to_radians() - self.lon_0.to_radians());
        let x = k * dlon + self.x_0;
        let y = k * (FRAC_PI_4 + lat_deg.to_radians() / 2.0).tan().ln() + self.y_0;
        Some((x, y))
    }

    /// Inverse projection from meters to lon/lat degrees.
    pub fn inverse(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let k = self.scale();
        let lon = self.lon_0.to_radians() + (x - self.x_0) / k;
        let lat = 2.0 * ((y - self.y_0) / k).exp().atan() - FRAC_PI_2;
        let (lon, lat) = (normalize_dlon(lon).to_degrees(), lat.to_degrees());
        if lon.is_finite() && lat.is_finite() {
            Some((lon, lat))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_web_mercator_known_point() {
        let proj = Mercator::web();
        let (x, y) = proj.forward(10.0, 54.0).unwrap();
        // Reference values from PROJ for EPSG:3857
        assert!((x - 1113194.9079).abs() < 0.01, "x = {}", x);
        assert!((y - 7170156.2948).abs() < 0.5, "y = {}", y);
    }

    #[test]
    fn test_roundtrip_with_true_scale_latitude() {
        let proj = Mercator::new(-30.0, 20.0, 6371229.0).unwrap();
        let (x, y) = proj.forward(-45.0, -12.5).unwrap();
        let (lon, lat) = proj.inverse(x, y).unwrap();
        assert!((lon + 45.0).abs() < 1e-9);
        assert!((lat + 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_poles_are_outside_domain() {
        assert!(Mercator::web().forward(0.0, 90.0).is_none());
        assert!(Mercator::web().forward(0.0, -89.9).is_none());
    }
}
