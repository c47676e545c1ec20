//! Coordinate reference system transformations.
//!
//! Implements the map projections used by ARPEGE/ALADIN/AROME model grids
//! from scratch, on a sphere, without binding to PROJ. CRS definitions are
//! read from PROJ4-style strings (`+proj=lcc +lat_1=... +R=...`) or from the
//! handful of EPSG codes that are useful as reprojection targets.

pub mod crs;
pub mod error;
pub mod lambert;
pub mod mercator;
pub mod polar;
pub mod transform;

pub use crs::{epsg_code, Crs};
pub use error::{ProjectionError, Result};
pub use lambert::LambertConformal;
pub use mercator::Mercator;
pub use polar::PolarStereographic;
pub use transform::Transformer;

/// Mean earth radius used when a definition carries no `+R` (meters).
pub const DEFAULT_EARTH_RADIUS: f64 = 6371229.0;

/// WGS84 semi-major axis, used as the sphere radius for web mercator (meters).
pub const WGS84_SEMI_MAJOR: f64 = 6378137.0;

/// Normalize a longitude difference (radians) to [-π, π].
pub(crate) fn normalize_dlon(mut dlon: f64) -> f64 {
    use std::f64::consts::PI;
    while dlon > PI {
        dlon -= 2.0 * PI;
    }
    while dlon < -PI {
        dlon += 2.0 * PI;
    }
    dlon
}
