//! Spherical polar stereographic projection (north or south aspect).

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use crate::error::{ProjectionError, Result};
use crate::normalize_dlon;

/// Polar stereographic projection centred on one of the poles.
#[derive(Debug, Clone, PartialEq)]
pub struct PolarStereographic {
    /// True for the north-polar aspect (`+lat_0=90`)
    pub north: bool,
    /// Latitude of true scale in degrees
    pub lat_ts: f64,
    /// Straight vertical longitude in degrees
    pub lon_0: f64,
    /// Sphere radius (meters)
    pub radius: f64,
    /// Scale factor at the pole derived from `lat_ts`
    k0: f64,
}

impl PolarStereographic {
    /// Create a projection. `lat_0` must be +90 or -90.
    pub fn new(lat_0: f64, lat_ts: f64, lon_0: f64, radius: f64) -> Result<Self> {
        if (lat_0.abs() - 90.0).abs() > 1e-9 {
            return Err(ProjectionError::invalid_parameter("lat_0", lat_0.to_string()));
        }
        if !(radius > 0.0) {
            return Err(ProjectionError::invalid_parameter("R", radius.to_string()));
        }
        let north = lat_0 > 0.0;
        if !lat_ts.is_finite() || (north && lat_ts <= 0.0) || (!north && lat_ts >= 0.0) {
            return Err(ProjectionError::invalid_parameter("lat_ts", lat_ts.to_string()));
        }
        let k0 = (1.0 + lat_ts.abs().to_radians().sin()) / 2.0;
        Ok(Self {
            north,
            lat_ts,
            lon_0,
            radius,
            k0,
        })
    }

    /// Project lon/lat degrees to meters. Returns `None` at the opposite pole.
    pub fn forward(&self, lon_deg: f64, lat_deg: f64) -> Option<(f64, f64)> {
        let lat = lat_deg.to_radians();
        let dlon = normalize_dlon(lon_deg.to_radians() - self.lon_0.to_radians());
        let colat = if self.north {
            FRAC_PI_4 - lat / 2.0
        } else {
            FRAC_PI_4 + lat / 2.0
        };
        if colat >= FRAC_PI_2 - 1e-12 {
            return None;
        }
        let rho = 2.0 * self.radius * self.k0 * colat.tan();
        if self.north {
            Some((rho * dlon.sin(), -rho * dlon.cos()))
        } else {
            Some((rho * dlon.sin(), rho * dlon.cos()))
        }
    }

    /// Inverse projection from meters to lon/lat degrees.
    pub fn inverse(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let rho = (x * x + y * y).sqrt();
        let c = 2.0 * (rho / (2.0 * self.radius * self.k0)).atan();
        let (lat, theta) = if self.north {
            (FRAC_PI_2 - c, x.atan2(-y))
        } else {
            (c - FRAC_PI_2, x.atan2(y))
        };
        let lon = normalize_dlon(self.lon_0.to_radians() + theta);
        if lat.is_finite() && lon.is_finite() {
            Some((lon.to_degrees(), lat.to_degrees()))
        } else {
            None
        }
    }
}
