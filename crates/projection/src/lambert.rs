//! Lambert Conformal Conic projection.
//!
//! This is the projection of most limited-area FA files (ALADIN, AROME).
//! It maps a cone tangent or secant to the sphere onto a flat plane.
//!
//! The projection parameters include:
//! - Central meridian (lon_0)
//! - Standard parallel(s): lat_1 and lat_2 (equal for a tangent cone)
//! - Latitude of origin (lat_0), 0 when the definition omits it
//! - Sphere radius (R)
//! - False easting / northing (x_0, y_0)

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use crate::error::{ProjectionError, Result};
use crate::normalize_dlon;

/// Spherical Lambert Conformal Conic projection.
///
/// Projected coordinates are meters east/north of the origin
/// `(lat_0, lon_0)`, offset by the false easting and northing.
#[derive(Debug, Clone, PartialEq)]
pub struct LambertConformal {
    /// First standard parallel in degrees
    pub lat_1: f64,
    /// Second standard parallel in degrees
    pub lat_2: f64,
    /// Latitude of origin in degrees
    pub lat_0: f64,
    /// Central meridian in degrees
    pub lon_0: f64,
    /// Sphere radius (meters)
    pub radius: f64,
    /// False easting (meters)
    pub x_0: f64,
    /// False northing (meters)
    pub y_0: f64,
    /// Cone constant (n)
    n: f64,
    /// F constant
    f: f64,
    /// Rho at the latitude of origin
    rho0: f64,
}

impl LambertConformal {
    /// Create a projection from standard parallels, central meridian and radius.
    ///
    /// The latitude of origin defaults to the equator, like PROJ does for
    /// definitions without `+lat_0`.
    pub fn new(lat_1: f64, lat_2: f64, lon_0: f64, radius: f64) -> Result<Self> {
        Self::with_origin(lat_1, lat_2, 0.0, lon_0, radius, 0.0, 0.0)
    }

    /// Create a projection with an explicit latitude of origin and false origin.
    pub fn with_origin(
        lat_1: f64,
        lat_2: f64,
        lat_0: f64,
        lon_0: f64,
        radius: f64,
        x_0: f64,
        y_0: f64,
    ) -> Result<Self> {
        if !(radius > 0.0) {
            return Err(ProjectionError::invalid_parameter("R", radius.to_string()));
        }
        for (name, value) in [("lat_1", lat_1), ("lat_2", lat_2), ("lat_0", lat_0)] {
            if !value.is_finite() || value.abs() > 90.0 {
                return Err(ProjectionError::invalid_parameter(name, value.to_string()));
            }
        }
        if (lat_1 + lat_2).abs() < 1e-10 {
            // Standard parallels symmetric about the equator give a cylinder, not a cone.
            return Err(ProjectionError::invalid_parameter("lat_2", lat_2.to_string()));
        }

        let phi1 = lat_1.to_radians();
        let phi2 = lat_2.to_radians();
        let phi0 = lat_0.to_radians();

        // Compute cone constant n
        let n = if (phi1 - phi2).abs() < 1e-10 {
            // Tangent cone (single standard parallel)
            phi1.sin()
        } else {
            // Secant cone (two standard parallels)
            let ln_ratio = (phi1.cos() / phi2.cos()).ln();
            let tan_ratio =
                ((FRAC_PI_4 + phi2 / 2.0).tan() / (FRAC_PI_4 + phi1 / 2.0).tan()).ln();
            ln_ratio / tan_ratio
        };

        let f = phi1.cos() * (FRAC_PI_4 + phi1 / 2.0).tan().powf(n) / n;
        let rho0 = radius * f / (FRAC_PI_4 + phi0 / 2.0).tan().powf(n);

        Ok(Self {
            lat_1,
            lat_2,
            lat_0,
            lon_0,
            radius,
            x_0,
            y_0,
            n,
            f,
            rho0,
        })
    }

    /// Cone constant of the projection.
    pub fn cone_constant(&self) -> f64 {
        self.n
    }

    /// Project geographic coordinates (degrees) to map coordinates (meters).
    ///
    /// Returns `None` at the pole opposite to the cone apex, where the
    /// projection is undefined.
    pub fn forward(&self, lon_deg: f64, lat_deg: f64) -> Option<(f64, f64)> {
        let lat = lat_deg.to_radians();
        let dlon = normalize_dlon(lon_deg.to_radians() - self.lon_0.to_radians());

        let t = (FRAC_PI_4 + lat / 2.0).tan();
        if !(t > 0.0) {
            return None;
        }
        let rho = self.radius * self.f / t.powf(self.n);
        if !rho.is_finite() {
            return None;
        }

        let theta = self.n * dlon;
        let x = rho * theta.sin() + self.x_0;
        let y = self.rho0 - rho * theta.cos() + self.y_0;
        Some((x, y))
    }

    /// Inverse projection from map coordinates (meters) to lon/lat degrees.
    pub fn inverse(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let x = x - self.x_0;
        let dy = self.rho0 - (y - self.y_0);

        let sign = self.n.signum();
        let rho = sign * (x * x + dy * dy).sqrt();

        let lat = if rho == 0.0 {
            sign * FRAC_PI_2
        } else {
            2.0 * (self.radius * self.f / rho).powf(1.0 / self.n).atan() - FRAC_PI_2
        };
        let theta = (sign * x).atan2(sign * dy);
        let lon = self.lon_0.to_radians() + theta / self.n;

        let (lon, lat) = (normalize_dlon(lon).to_degrees(), lat.to_degrees());
        if lon.is_finite() && lat.is_finite() {
            Some((lon, lat))
        } else {
            None
        }
    }
}
