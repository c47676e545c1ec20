//! Coordinate Reference System definitions and parsing.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{ProjectionError, Result};
use crate::{LambertConformal, Mercator, PolarStereographic, DEFAULT_EARTH_RADIUS, WGS84_SEMI_MAJOR};

/// A coordinate reference system the transformer can work with.
#[derive(Debug, Clone, PartialEq)]
pub enum Crs {
    /// Geographic lon/lat in degrees (EPSG:4326 and friends)
    Geographic,
    /// Lambert Conformal Conic (`+proj=lcc`)
    Lambert(LambertConformal),
    /// Mercator (`+proj=merc`)
    Mercator(Mercator),
    /// Polar stereographic (`+proj=stere` with `+lat_0=±90`)
    PolarStereographic(PolarStereographic),
}

impl Crs {
    /// Parse either a PROJ4 string or an `EPSG:xxxx` reference.
    ///
    /// Accepts formats like:
    /// - "+proj=lcc +lat_1=50.8 +lat_2=50.8 +lon_0=4.55 +R=6371229"
    /// - "EPSG:4326", "epsg:3857", "4326"
    /// - "CRS:84"
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.starts_with('+') {
            return Self::from_proj4(s);
        }

        match epsg_code(s) {
            Some(code) => Self::from_epsg(code),
            None => Err(ProjectionError::InvalidCrs(s.to_string())),
        }
    }

    /// Built-in definitions for the supported EPSG codes.
    pub fn from_epsg(code: u32) -> Result<Self> {
        match code {
            4326 | 4258 | 4269 => Ok(Crs::Geographic),
            3857 | 3785 | 900913 => Ok(Crs::Mercator(Mercator::web())),
            // Spherical approximations of the NSIDC sea-ice grids
            3413 => Ok(Crs::PolarStereographic(PolarStereographic::new(
                90.0,
                70.0,
                -45.0,
                WGS84_SEMI_MAJOR,
            )?)),
            3031 => Ok(Crs::PolarStereographic(PolarStereographic::new(
                -90.0,
                -71.0,
                0.0,
                WGS84_SEMI_MAJOR,
            )?)),
            other => Err(ProjectionError::UnsupportedEpsg(other)),
        }
    }

    /// Parse a PROJ4-style definition.
    pub fn from_proj4(s: &str) -> Result<Self> {
        let params = parse_proj4_params(s)?;
        let proj = params
            .get("proj")
            .and_then(|v| v.as_deref())
            .ok_or_else(|| ProjectionError::MissingParameter("proj".to_string()))?;

        let radius = sphere_radius(&params)?;

        match proj.to_lowercase().as_str() {
            "longlat" | "latlong" | "lonlat" | "latlon" => Ok(Crs::Geographic),
            "lcc" | "lambert" | "lambert_conformal_conic" => {
                let lat_1 = required(&params, "lat_1")?;
                let lat_2 = optional(&params, "lat_2")?.unwrap_or(lat_1);
                let lat_0 = optional(&params, "lat_0")?.unwrap_or(0.0);
                let lon_0 = optional(&params, "lon_0")?.unwrap_or(0.0);
                let x_0 = optional(&params, "x_0")?.unwrap_or(0.0);
                let y_0 = optional(&params, "y_0")?.unwrap_or(0.0);
                Ok(Crs::Lambert(LambertConformal::with_origin(
                    lat_1, lat_2, lat_0, lon_0, radius, x_0, y_0,
                )?))
            }
            "merc" | "mercator" => {
                let lon_0 = optional(&params, "lon_0")?.unwrap_or(0.0);
                let lat_ts = optional(&params, "lat_ts")?
                    .or(optional(&params, "lat_1")?)
                    .unwrap_or(0.0);
                let mut merc = Mercator::new(lon_0, lat_ts, radius)?;
                merc.x_0 = optional(&params, "x_0")?.unwrap_or(0.0);
                merc.y_0 = optional(&params, "y_0")?.unwrap_or(0.0);
                Ok(Crs::Mercator(merc))
            }
            "stere" | "polar_stereographic" => {
                let lat_0 = required(&params, "lat_0")?;
                let lat_ts = optional(&params, "lat_ts")?
                    .or(optional(&params, "lat_1")?)
                    .unwrap_or(lat_0);
                let lon_0 = optional(&params, "lon_0")?.unwrap_or(0.0);
                Ok(Crs::PolarStereographic(PolarStereographic::new(
                    lat_0, lat_ts, lon_0, radius,
                )?))
            }
            other => Err(ProjectionError::UnsupportedProjection(other.to_string())),
        }
    }

    /// Check if this is a geographic (lon/lat) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(self, Crs::Geographic)
    }

    /// EPSG code when the CRS matches one of the built-in definitions.
    pub fn epsg(&self) -> Option<u32> {
        match self {
            Crs::Geographic => Some(4326),
            Crs::Mercator(m) if *m == Mercator::web() => Some(3857),
            _ => None,
        }
    }

    /// Render the CRS back to a PROJ4 string.
    pub fn to_proj4(&self) -> String {
        match self {
            Crs::Geographic => "+proj=longlat +datum=WGS84 +no_defs".to_string(),
            Crs::Lambert(p) => {
                let mut s = format!("+proj=lcc +lat_1={} +lat_2={}", p.lat_1, p.lat_2);
                if p.lat_0 != 0.0 {
                    s.push_str(&format!(" +lat_0={}", p.lat_0));
                }
                s.push_str(&format!(" +lon_0={} +R={}", p.lon_0, p.radius));
                push_false_origin(&mut s, p.x_0, p.y_0);
                s
            }
            Crs::Mercator(p) => {
                let mut s = format!(
                    "+proj=merc +lat_ts={} +lon_0={} +R={}",
                    p.lat_ts, p.lon_0, p.radius
                );
                push_false_origin(&mut s, p.x_0, p.y_0);
                s
            }
            Crs::PolarStereographic(p) => format!(
                "+proj=stere +lat_0={} +lat_ts={} +lon_0={} +R={}",
                if p.north { 90 } else { -90 },
                p.lat_ts,
                p.lon_0,
                p.radius
            ),
        }
    }

    /// Project lon/lat degrees into this CRS.
    pub fn forward(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        match self {
            Crs::Geographic => Some((lon, lat)),
            Crs::Lambert(p) => p.forward(lon, lat),
            Crs::Mercator(p) => p.forward(lon, lat),
            Crs::PolarStereographic(p) => p.forward(lon, lat),
        }
    }

    /// Map coordinates in this CRS back to lon/lat degrees.
    pub fn inverse(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        match self {
            Crs::Geographic => Some((x, y)),
            Crs::Lambert(p) => p.inverse(x, y),
            Crs::Mercator(p) => p.inverse(x, y),
            Crs::PolarStereographic(p) => p.inverse(x, y),
        }
    }
}

impl FromStr for Crs {
    type Err = ProjectionError;

    fn from_str(s: &str) -> Result<Self> {
        Crs::parse(s)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.epsg() {
            Some(code) => write!(f, "EPSG:{}", code),
            None => write!(f, "{}", self.to_proj4()),
        }
    }
}

/// EPSG code named by a CRS reference (`"EPSG:3413"`, `"3413"`, `"CRS:84"`).
///
/// `None` for PROJ4 strings and anything else that is not a code. The code
/// is not checked against the built-in definitions.
pub fn epsg_code(s: &str) -> Option<u32> {
    let upper = s.trim().to_uppercase();
    if upper == "CRS:84" {
        return Some(4326);
    }
    upper
        .strip_prefix("EPSG:")
        .unwrap_or(&upper)
        .parse::<u32>()
        .ok()
}

fn push_false_origin(s: &mut String, x_0: f64, y_0: f64) {
    if x_0 != 0.0 {
        s.push_str(&format!(" +x_0={}", x_0));
    }
    if y_0 != 0.0 {
        s.push_str(&format!(" +y_0={}", y_0));
    }
}

type Proj4Params = HashMap<String, Option<String>>;

fn parse_proj4_params(s: &str) -> Result<Proj4Params> {
    let mut params = HashMap::new();
    for token in s.split_whitespace() {
        let token = token
            .strip_prefix('+')
            .ok_or_else(|| ProjectionError::InvalidCrs(s.to_string()))?;
        match token.split_once('=') {
            Some((key, value)) => params.insert(key.to_string(), Some(value.to_string())),
            None => params.insert(token.to_string(), None),
        };
    }
    Ok(params)
}

fn optional(params: &Proj4Params, name: &str) -> Result<Option<f64>> {
    match params.get(name) {
        None => Ok(None),
        Some(None) => Err(ProjectionError::invalid_parameter(name, "")),
        Some(Some(raw)) => raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| ProjectionError::invalid_parameter(name, raw.clone())),
    }
}

fn required(params: &Proj4Params, name: &str) -> Result<f64> {
    optional(params, name)?.ok_or_else(|| ProjectionError::MissingParameter(name.to_string()))
}

fn sphere_radius(params: &Proj4Params) -> Result<f64> {
    if let Some(r) = optional(params, "R")? {
        return Ok(r);
    }
    if let Some(a) = optional(params, "a")? {
        return Ok(a);
    }
    let wgs84 = |key: &str| {
        params
            .get(key)
            .and_then(|v| v.as_deref())
            .map(|v| v.eq_ignore_ascii_case("WGS84"))
            .unwrap_or(false)
    };
    if wgs84("datum") || wgs84("ellps") {
        Ok(WGS84_SEMI_MAJOR)
    } else {
        Ok(DEFAULT_EARTH_RADIUS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FA_PROJ4: &str = "+proj=lcc +lat_1=50.8 +lat_2=50.8 +lon_0=4.55 +R=6371229";

    #[test]
    fn test_parse_fa_lambert_string() {
        let crs = Crs::parse(FA_PROJ4).unwrap();
        match &crs {
            Crs::Lambert(p) => {
                assert_eq!(p.lat_1, 50.8);
                assert_eq!(p.lon_0, 4.55);
                assert_eq!(p.radius, 6371229.0);
                assert_eq!(p.lat_0, 0.0);
            }
            other => panic!("expected lambert, got {:?}", other),
        }
        assert_eq!(crs.epsg(), None);
    }

    #[test]
    fn test_proj4_roundtrip() {
        let crs = Crs::parse(FA_PROJ4).unwrap();
        assert_eq!(crs.to_proj4(), FA_PROJ4);
        assert_eq!(Crs::parse(&crs.to_proj4()).unwrap(), crs);
    }

    #[test]
    fn test_parse_epsg() {
        assert_eq!(Crs::parse("EPSG:4326").unwrap(), Crs::Geographic);
        assert_eq!(Crs::parse("epsg:4326").unwrap(), Crs::Geographic);
        assert_eq!(Crs::parse("CRS:84").unwrap(), Crs::Geographic);
        assert_eq!(Crs::parse("3857").unwrap().epsg(), Some(3857));
        assert_eq!(
            Crs::parse("EPSG:99999"),
            Err(ProjectionError::UnsupportedEpsg(99999))
        );
    }

    #[test]
    fn test_epsg_code() {
        assert_eq!(epsg_code("EPSG:3413"), Some(3413));
        assert_eq!(epsg_code(" epsg:4258 "), Some(4258));
        assert_eq!(epsg_code("3031"), Some(3031));
        assert_eq!(epsg_code("CRS:84"), Some(4326));
        assert_eq!(epsg_code(FA_PROJ4), None);
        assert_eq!(epsg_code("EPSG:north"), None);
    }

    #[test]
    fn test_geographic_proj4_matches_epsg() {
        let crs = Crs::parse("+proj=longlat +datum=WGS84 +no_defs").unwrap();
        assert_eq!(crs, Crs::from_epsg(4326).unwrap());
        assert_eq!(crs.to_string(), "EPSG:4326");
    }

    #[test]
    fn test_lambert_aliases_and_defaults() {
        let crs = Crs::parse("+proj=lambert +lat_1=45 +lon_0=0").unwrap();
        match crs {
            Crs::Lambert(p) => {
                assert_eq!(p.lat_2, 45.0);
                assert_eq!(p.radius, DEFAULT_EARTH_RADIUS);
            }
            other => panic!("expected lambert, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            Crs::parse("+proj=lcc +lon_0=4"),
            Err(ProjectionError::MissingParameter("lat_1".to_string()))
        );
        assert!(matches!(
            Crs::parse("+proj=lcc +lat_1=abc"),
            Err(ProjectionError::InvalidParameter { .. })
        ));
        assert_eq!(
            Crs::parse("+proj=geos +h=35785831"),
            Err(ProjectionError::UnsupportedProjection("geos".to_string()))
        );
        assert!(matches!(
            Crs::parse("not a crs"),
            Err(ProjectionError::InvalidCrs(_))
        ));
    }

    #[test]
    fn test_polar_from_proj4() {
        let crs = Crs::parse("+proj=stere +lat_0=90 +lat_ts=60 +lon_0=-45 +R=6371229").unwrap();
        assert!(matches!(crs, Crs::PolarStereographic(ref p) if p.north));
        assert_eq!(Crs::parse(&crs.to_proj4()).unwrap(), crs);
    }
}
