//! File-scope metadata emitted by the decoder.
//!
//! The R JSON writer boxes every scalar in a length-1 array
//! (`{"nlev": [90]}`), so every accessor here accepts both the boxed and the
//! bare form. Numbers may also arrive as numeric strings.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

use crate::dataset::{attrs, AttrValue};
use crate::error::{FaError, Result};

/// Datetime format used for persisted time values.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Keys copied into dataset attributes by dedicated fields.
const KNOWN_KEYS: &[&str] = &[
    "origin", "filepath", "validate", "basedate", "timestep", "leadtime", "nx", "ny", "dx", "dy",
    "ex", "ey", "projection", "lat_1", "lat_2", "lon_0", "proj_R", "center_lat", "center_lon",
    "nlev", "refpressure", "A_list", "B_list", "nfields",
];

/// Map projection parameters of an FA grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionParams {
    pub projection: String,
    pub lat_1: f64,
    pub lat_2: f64,
    pub lon_0: f64,
    pub proj_r: f64,
}

impl ProjectionParams {
    /// PROJ4 definition in the form `+proj=.. +lat_1=.. +lat_2=.. +lon_0=.. +R=..`.
    pub fn to_proj4(&self) -> String {
        format!(
            "+proj={} +lat_1={} +lat_2={} +lon_0={} +R={}",
            self.projection, self.lat_1, self.lat_2, self.lon_0, self.proj_r
        )
    }
}

/// Metadata of one FA file.
#[derive(Debug, Clone, PartialEq)]
pub struct FaMetadata {
    pub origin: String,
    pub filepath: String,
    pub validate: NaiveDateTime,
    pub basedate: NaiveDateTime,
    /// Model timestep in seconds; `None` for initialisation files.
    pub timestep: Option<i64>,
    pub leadtime: Duration,
    pub nx: usize,
    pub ny: usize,
    pub dx: Option<f64>,
    pub dy: Option<f64>,
    pub ex: Option<f64>,
    pub ey: Option<f64>,
    pub projection: Option<ProjectionParams>,
    pub center_lat: Option<f64>,
    pub center_lon: Option<f64>,
    pub nlev: i64,
    pub refpressure: Option<f64>,
    pub a_list: Vec<f64>,
    pub b_list: Vec<f64>,
    pub nfields: Option<i64>,
    /// Scalar keys without dedicated fields, kept verbatim.
    pub extra: BTreeMap<String, AttrValue>,
}

impl FaMetadata {
    /// Parse the decoder's metadata object.
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| FaError::invalid_metadata("metadata is not a JSON object"))?;

        let validate = required_time(obj, "validate")?;
        let basedate = required_time(obj, "basedate")?;

        let leadtime = match opt_f64(obj, "leadtime")? {
            // Leadtime is written in hours
            Some(hours) => Duration::seconds((hours * 3600.0).round() as i64),
            None => validate - basedate,
        };

        let projection = match opt_str(obj, "projection")? {
            Some(name) if !name.is_empty() => Some(ProjectionParams {
                lat_1: required_f64(obj, "lat_1")?,
                lat_2: required_f64(obj, "lat_2")?,
                lon_0: required_f64(obj, "lon_0")?,
                proj_r: required_f64(obj, "proj_R")?,
                projection: name,
            }),
            _ => None,
        };

        let mut extra = BTreeMap::new();
        for (key, raw) in obj {
            if KNOWN_KEYS.contains(&key.as_str()) {
                continue;
            }
            if let Some(attr) = scalar_attr(raw) {
                extra.insert(key.clone(), attr);
            }
        }

        Ok(Self {
            origin: opt_str(obj, "origin")?.unwrap_or_default(),
            filepath: opt_str(obj, "filepath")?.unwrap_or_default(),
            validate,
            basedate,
            timestep: opt_f64(obj, "timestep")?.map(|s| s as i64),
            leadtime,
            nx: required_count(obj, "nx")?,
            ny: required_count(obj, "ny")?,
            dx: opt_f64(obj, "dx")?,
            dy: opt_f64(obj, "dy")?,
            ex: opt_f64(obj, "ex")?,
            ey: opt_f64(obj, "ey")?,
            projection,
            center_lat: opt_f64(obj, "center_lat")?,
            center_lon: opt_f64(obj, "center_lon")?,
            nlev: required_f64(obj, "nlev")? as i64,
            refpressure: opt_f64(obj, "refpressure")?,
            a_list: float_list(obj, "A_list")?,
            b_list: float_list(obj, "B_list")?,
            nfields: opt_f64(obj, "nfields")?.map(|n| n as i64),
            extra,
        })
    }

    /// PROJ4 definition of the grid, when projection parameters are present.
    pub fn proj4_string(&self) -> Option<String> {
        self.projection.as_ref().map(|p| p.to_proj4())
    }

    /// Number of model time iterations between basedate and validate.
    pub fn time_iterations(&self) -> Option<i64> {
        match self.timestep {
            Some(step) if step > 0 => Some((self.validate - self.basedate).num_seconds() / step),
            _ => None,
        }
    }

    /// Dataset attributes for a freshly assembled single-file dataset.
    pub fn to_attrs(&self) -> BTreeMap<String, AttrValue> {
        let mut out = self.extra.clone();
        let mut put = |k: &str, v: AttrValue| {
            out.insert(k.to_string(), v);
        };

        put(attrs::ORIGIN, AttrValue::Str(self.origin.clone()));
        put(attrs::FILEPATH, AttrValue::Str(self.filepath.clone()));
        put(attrs::VALIDATE, AttrValue::Time(self.validate));
        put(attrs::BASEDATE, AttrValue::Time(self.basedate));
        put(attrs::LEADTIME, AttrValue::Duration(self.leadtime));
        if let Some(step) = self.timestep {
            put(attrs::TIMESTEP, AttrValue::Int(step));
        }
        put("nx", AttrValue::Int(self.nx as i64));
        put("ny", AttrValue::Int(self.ny as i64));
        for (key, value) in [
            ("dx", self.dx),
            ("dy", self.dy),
            ("ex", self.ex),
            ("ey", self.ey),
            ("center_lat", self.center_lat),
            ("center_lon", self.center_lon),
            ("refpressure", self.refpressure),
        ] {
            if let Some(v) = value {
                put(key, AttrValue::Float(v));
            }
        }
        if let Some(p) = &self.projection {
            put("projection", AttrValue::Str(p.projection.clone()));
            put("lat_1", AttrValue::Float(p.lat_1));
            put("lat_2", AttrValue::Float(p.lat_2));
            put("lon_0", AttrValue::Float(p.lon_0));
            put("proj_R", AttrValue::Float(p.proj_r));
            put(attrs::PROJ4STR, AttrValue::Str(p.to_proj4()));
        }
        put(attrs::NLEV, AttrValue::Int(self.nlev));
        put(attrs::A_LIST, AttrValue::Floats(self.a_list.clone()));
        put(attrs::B_LIST, AttrValue::Floats(self.b_list.clone()));
        if let Some(n) = self.nfields {
            put(attrs::NFIELDS, AttrValue::Int(n));
        }
        out
    }
}

/// Parse `YYYY-MM-DD HH:MM:SS` (also with a `T` separator) or `YYYY-MM-DD`.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Format a datetime the way it is persisted.
pub fn format_datetime(t: &NaiveDateTime) -> String {
    t.format(TIME_FORMAT).to_string()
}

/// Strip the length-1 array box the R JSON writer puts around scalars.
pub(crate) fn unbox(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) if items.len() == 1 => Some(&items[0]),
        Value::Array(items) if items.is_empty() => None,
        Value::Null => None,
        other => Some(other),
    }
}

pub(crate) fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn opt_str(obj: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match obj.get(key).and_then(unbox) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(FaError::invalid_metadata(format!(
            "metadata key {} should be a string, got {}",
            key, other
        ))),
    }
}

fn opt_f64(obj: &Map<String, Value>, key: &str) -> Result<Option<f64>> {
    match obj.get(key).and_then(unbox) {
        None => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(v) => value_as_f64(v).map(Some).ok_or_else(|| {
            FaError::invalid_metadata(format!("metadata key {} is not numeric: {}", key, v))
        }),
    }
}

fn required_f64(obj: &Map<String, Value>, key: &str) -> Result<f64> {
    opt_f64(obj, key)?
        .ok_or_else(|| FaError::invalid_metadata(format!("missing metadata key {}", key)))
}

fn required_count(obj: &Map<String, Value>, key: &str) -> Result<usize> {
    let value = required_f64(obj, key)?;
    if value < 1.0 || value.fract() != 0.0 {
        return Err(FaError::invalid_metadata(format!(
            "metadata key {} must be a positive integer, got {}",
            key, value
        )));
    }
    Ok(value as usize)
}

fn required_time(obj: &Map<String, Value>, key: &str) -> Result<NaiveDateTime> {
    let raw = opt_str(obj, key)?
        .ok_or_else(|| FaError::invalid_metadata(format!("missing metadata key {}", key)))?;
    parse_datetime(&raw).ok_or_else(|| {
        FaError::invalid_metadata(format!("could not parse {} datetime: {}", key, raw))
    })
}

fn float_list(obj: &Map<String, Value>, key: &str) -> Result<Vec<f64>> {
    let raw = obj
        .get(key)
        .ok_or_else(|| FaError::invalid_metadata(format!("missing metadata key {}", key)))?;
    let items: Vec<&Value> = match raw {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        single => vec![single],
    };
    items
        .into_iter()
        .map(|v| {
            value_as_f64(v).ok_or_else(|| {
                FaError::invalid_metadata(format!("non-numeric entry in {}: {}", key, v))
            })
        })
        .collect()
}

fn scalar_attr(raw: &Value) -> Option<AttrValue> {
    match unbox(raw)? {
        Value::String(s) => Some(AttrValue::Str(s.clone())),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(AttrValue::Int(i)),
            None => n.as_f64().map(AttrValue::Float),
        },
        Value::Bool(b) => Some(AttrValue::Int(*b as i64)),
        _ => None,
    }
}
