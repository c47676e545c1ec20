//! Labeled multidimensional dataset.
//!
//! A [`Dataset`] holds named coordinates (one per dimension), data variables
//! defined over a subset of those dimensions, and file-scope attributes.
//! Spatial dimensions are always the trailing axes of a variable: `(y, x)`
//! for 2D fields and `(level, y, x)` for 3D fields, optionally preceded by
//! the time dimensions `(basedate, validate)`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Duration, NaiveDateTime};
use ndarray::{ArrayD, IxDyn};

use crate::error::{FaError, Result};
use crate::metadata::TIME_FORMAT;

/// Dimension names.
pub mod dims {
    pub const X: &str = "x";
    pub const Y: &str = "y";
    pub const LEVEL: &str = "level";
    pub const VALIDATE: &str = "validate";
    pub const BASEDATE: &str = "basedate";

    /// Canonical dimension order after a merge.
    pub const CANONICAL_ORDER: [&str; 5] = [BASEDATE, VALIDATE, LEVEL, Y, X];
}

/// Attribute names with a meaning for the pipeline.
pub mod attrs {
    pub const ORIGIN: &str = "origin";
    pub const FILEPATH: &str = "filepath";
    pub const ORIGINS: &str = "origins";
    pub const FILEPATHS: &str = "filepaths";
    pub const VALIDATE: &str = "validate";
    pub const BASEDATE: &str = "basedate";
    pub const LEADTIME: &str = "leadtime";
    pub const TIMESTEP: &str = "timestep";
    pub const NLEV: &str = "nlev";
    pub const NFIELDS: &str = "nfields";
    pub const A_LIST: &str = "A_list";
    pub const B_LIST: &str = "B_list";
    pub const PROJ4STR: &str = "proj4str";
    pub const CRS: &str = "crs";
}

/// Values of a coordinate variable.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordValues {
    Float(Vec<f64>),
    Int(Vec<i64>),
    Time(Vec<NaiveDateTime>),
}

impl CoordValues {
    pub fn len(&self) -> usize {
        match self {
            CoordValues::Float(v) => v.len(),
            CoordValues::Int(v) => v.len(),
            CoordValues::Time(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_floats(&self) -> Option<&[f64]> {
        match self {
            CoordValues::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            CoordValues::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_times(&self) -> Option<&[NaiveDateTime]> {
        match self {
            CoordValues::Time(v) => Some(v),
            _ => None,
        }
    }

    /// Coordinate values as floats; times become seconds since the epoch.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            CoordValues::Float(v) => v.clone(),
            CoordValues::Int(v) => v.iter().map(|&i| i as f64).collect(),
            CoordValues::Time(v) => v
                .iter()
                .map(|t| t.and_utc().timestamp() as f64)
                .collect(),
        }
    }
}

/// File-scope attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Float(f64),
    Floats(Vec<f64>),
    Strs(Vec<String>),
    Time(NaiveDateTime),
    Duration(Duration),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Float(v) => Some(*v),
            AttrValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            AttrValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_floats(&self) -> Option<&[f64]> {
        match self {
            AttrValue::Floats(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<NaiveDateTime> {
        match self {
            AttrValue::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            AttrValue::Duration(d) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Str(s) => write!(f, "{}", s),
            AttrValue::Int(v) => write!(f, "{}", v),
            AttrValue::Float(v) => write!(f, "{}", v),
            AttrValue::Floats(v) => write!(f, "{:?}", v),
            AttrValue::Strs(v) => write!(f, "{:?}", v),
            AttrValue::Time(t) => write!(f, "{}", t.format(TIME_FORMAT)),
            AttrValue::Duration(d) => write!(f, "{}s", d.num_seconds()),
        }
    }
}

/// A data variable: an array with one named dimension per axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub dims: Vec<String>,
    pub data: ArrayD<f64>,
}

impl Variable {
    pub fn new(dims: &[&str], data: ArrayD<f64>) -> Result<Self> {
        if dims.len() != data.ndim() {
            return Err(FaError::invalid_metadata(format!(
                "{} dimension names for a {}-dimensional array",
                dims.len(),
                data.ndim()
            )));
        }
        Ok(Self {
            dims: dims.iter().map(|d| d.to_string()).collect(),
            data,
        })
    }

    /// Position of a named dimension.
    pub fn axis_of(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    pub fn has_dim(&self, dim: &str) -> bool {
        self.axis_of(dim).is_some()
    }

    /// Reorder axes to match `order`. Every dimension must appear exactly once.
    pub fn transposed(self, order: &[String]) -> Result<Self> {
        if order.len() != self.dims.len() {
            return Err(FaError::invalid_metadata(format!(
                "cannot transpose {:?} to {:?}",
                self.dims, order
            )));
        }
        let axes = order
            .iter()
            .map(|d| {
                self.axis_of(d).ok_or_else(|| {
                    FaError::invalid_metadata(format!(
                        "dimension {} not in {:?}",
                        d, self.dims
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let data = self.data.permuted_axes(IxDyn(&axes)).as_standard_layout().into_owned();
        Ok(Self {
            dims: order.to_vec(),
            data,
        })
    }

    /// Minimum over non-NaN cells.
    pub fn min(&self) -> Option<f64> {
        self.data
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.min(v))))
    }

    /// Maximum over non-NaN cells.
    pub fn max(&self) -> Option<f64> {
        self.data
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
    }
}

/// Container of coordinates, data variables and attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    coords: BTreeMap<String, CoordValues>,
    data_vars: BTreeMap<String, Variable>,
    attrs: BTreeMap<String, AttrValue>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- coordinates -------------------------------------------------------

    /// Add or replace a coordinate. Fails if a variable already uses the
    /// dimension with a different length.
    pub fn set_coord(&mut self, name: &str, values: CoordValues) -> Result<()> {
        for (var_name, var) in &self.data_vars {
            if let Some(axis) = var.axis_of(name) {
                if var.data.shape()[axis] != values.len() {
                    return Err(FaError::invalid_metadata(format!(
                        "coordinate {} has {} values but variable {} has {} along it",
                        name,
                        values.len(),
                        var_name,
                        var.data.shape()[axis]
                    )));
                }
            }
        }
        self.coords.insert(name.to_string(), values);
        Ok(())
    }

    pub fn coord(&self, name: &str) -> Option<&CoordValues> {
        self.coords.get(name)
    }

    pub fn coords(&self) -> &BTreeMap<String, CoordValues> {
        &self.coords
    }

    pub fn has_coord(&self, name: &str) -> bool {
        self.coords.contains_key(name)
    }

    /// Remove a coordinate that no variable depends on.
    pub fn remove_coord(&mut self, name: &str) -> Option<CoordValues> {
        if self.data_vars.values().any(|v| v.has_dim(name)) {
            return None;
        }
        self.coords.remove(name)
    }

    /// Float values of the `x` coordinate.
    pub fn x(&self) -> Option<&[f64]> {
        self.coord(dims::X).and_then(|c| c.as_floats())
    }

    /// Float values of the `y` coordinate.
    pub fn y(&self) -> Option<&[f64]> {
        self.coord(dims::Y).and_then(|c| c.as_floats())
    }

    /// Length of a dimension (taken from its coordinate).
    pub fn dim_len(&self, name: &str) -> Option<usize> {
        self.coords.get(name).map(|c| c.len())
    }

    /// Dimension names in canonical order, unknown dimensions after the
    /// vertical axis and before the spatial ones.
    pub fn dims(&self) -> Vec<String> {
        let names: Vec<String> = self.coords.keys().cloned().collect();
        canonical_order(&names)
    }

    // ---- variables ---------------------------------------------------------

    /// Insert a data variable. All of its dimensions must have coordinates of
    /// matching length.
    pub fn insert_var(&mut self, name: &str, var: Variable) -> Result<()> {
        if self.coords.contains_key(name) {
            return Err(FaError::invalid_metadata(format!(
                "variable {} collides with a coordinate",
                name
            )));
        }
        for (axis, dim) in var.dims.iter().enumerate() {
            match self.coords.get(dim) {
                Some(coord) if coord.len() == var.data.shape()[axis] => {}
                Some(coord) => {
                    return Err(FaError::invalid_metadata(format!(
                        "variable {} has {} values along {} but the coordinate has {}",
                        name,
                        var.data.shape()[axis],
                        dim,
                        coord.len()
                    )))
                }
                None => {
                    return Err(FaError::invalid_metadata(format!(
                        "variable {} uses dimension {} which has no coordinate",
                        name, dim
                    )))
                }
            }
        }
        self.data_vars.insert(name.to_string(), var);
        Ok(())
    }

    pub fn var(&self, name: &str) -> Option<&Variable> {
        self.data_vars.get(name)
    }

    pub fn remove_var(&mut self, name: &str) -> Option<Variable> {
        self.data_vars.remove(name)
    }

    pub fn data_vars(&self) -> &BTreeMap<String, Variable> {
        &self.data_vars
    }

    /// Names of the physical fields (never coordinates).
    pub fn fieldnames(&self) -> Vec<String> {
        self.data_vars.keys().cloned().collect()
    }

    /// Field defined on a single level.
    pub fn is_2d_field(&self, name: &str) -> bool {
        self.var(name)
            .map(|v| v.has_dim(dims::Y) && v.has_dim(dims::X) && !v.has_dim(dims::LEVEL))
            .unwrap_or(false)
    }

    /// Field with a vertical axis.
    pub fn is_3d_field(&self, name: &str) -> bool {
        self.var(name)
            .map(|v| v.has_dim(dims::LEVEL))
            .unwrap_or(false)
    }

    // ---- attributes --------------------------------------------------------

    pub fn attrs(&self) -> &BTreeMap<String, AttrValue> {
        &self.attrs
    }

    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    pub fn set_attr(&mut self, name: &str, value: AttrValue) {
        self.attrs.insert(name.to_string(), value);
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<AttrValue> {
        self.attrs.remove(name)
    }

    // ---- time --------------------------------------------------------------

    /// Basedate values, from the coordinate when promoted, else the attribute.
    pub fn basedate(&self) -> Option<Vec<NaiveDateTime>> {
        self.time_values(dims::BASEDATE)
    }

    /// Validity time values, from the coordinate when promoted, else the attribute.
    pub fn validate(&self) -> Option<Vec<NaiveDateTime>> {
        self.time_values(dims::VALIDATE)
    }

    fn time_values(&self, name: &str) -> Option<Vec<NaiveDateTime>> {
        if let Some(times) = self.coord(name).and_then(|c| c.as_times()) {
            return Some(times.to_vec());
        }
        self.attr(name).and_then(|a| a.as_time()).map(|t| vec![t])
    }

    /// Leadtime of a single-snapshot dataset, computed as `validate - basedate`.
    ///
    /// A stored `leadtime` attribute is returned as-is when time has not
    /// been promoted. Returns `None` when the dataset holds several
    /// basedates or validity times; see [`Dataset::leadtimes`].
    pub fn leadtime(&self) -> Option<Duration> {
        if let Some(d) = self.attr(attrs::LEADTIME).and_then(|a| a.as_duration()) {
            return Some(d);
        }
        match (self.basedate()?.as_slice(), self.validate()?.as_slice()) {
            ([basedate], [validate]) => Some(*validate - *basedate),
            _ => None,
        }
    }

    /// Leadtimes for every `(basedate, validate)` pair, basedate-major.
    pub fn leadtimes(&self) -> Vec<Duration> {
        let (Some(basedates), Some(validates)) = (self.basedate(), self.validate()) else {
            return Vec::new();
        };
        basedates
            .iter()
            .flat_map(|b| validates.iter().map(move |v| *v - *b))
            .collect()
    }

    // ---- geospatial --------------------------------------------------------

    /// PROJ4 definition of the current CRS.
    pub fn proj4str(&self) -> Option<&str> {
        self.attr(attrs::PROJ4STR).and_then(|a| a.as_str())
    }

    /// True when x/y are longitudes/latitudes.
    pub fn in_latlon(&self) -> bool {
        self.proj4str()
            .and_then(|s| projection::Crs::parse(s).ok())
            .map(|crs| crs.is_geographic())
            .unwrap_or(false)
    }
}

/// Sort dimension names into the canonical `basedate, validate, level, y, x`
/// order. Names outside that set keep their relative order and go after
/// `level`.
pub fn canonical_order(names: &[String]) -> Vec<String> {
    let rank = |name: &str| match name {
        dims::BASEDATE => 0,
        dims::VALIDATE => 1,
        dims::LEVEL => 2,
        dims::Y => 4,
        dims::X => 5,
        _ => 3,
    };
    let mut sorted = names.to_vec();
    sorted.sort_by_key(|n| rank(n));
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ndarray::Array2;

    fn t(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 10)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn small() -> Dataset {
        let mut ds = Dataset::new();
        ds.set_coord(dims::X, CoordValues::Float(vec![0.0, 1.0, 2.0])).unwrap();
        ds.set_coord(dims::Y, CoordValues::Float(vec![10.0, 11.0])).unwrap();
        let data = Array2::from_shape_vec((2, 3), vec![1.0, 2.0, f64::NAN, -4.0, 5.0, 6.0])
            .unwrap()
            .into_dyn();
        ds.insert_var("T2M", Variable::new(&[dims::Y, dims::X], data).unwrap())
            .unwrap();
        ds
    }

    #[test]
    fn test_insert_var_checks_shape() {
        let mut ds = small();
        let wrong = Array2::<f64>::zeros((3, 3)).into_dyn();
        let err = ds
            .insert_var("BAD", Variable::new(&[dims::Y, dims::X], wrong).unwrap())
            .unwrap_err();
        assert!(matches!(err, FaError::InvalidMetadata(_)));
    }

    #[test]
    fn test_insert_var_requires_coordinates() {
        let mut ds = small();
        let data = ndarray::Array3::<f64>::zeros((4, 2, 3)).into_dyn();
        let var = Variable::new(&[dims::LEVEL, dims::Y, dims::X], data).unwrap();
        assert!(ds.insert_var("WIND", var).is_err());
    }

    #[test]
    fn test_field_rank_helpers() {
        let ds = small();
        assert!(ds.is_2d_field("T2M"));
        assert!(!ds.is_3d_field("T2M"));
        assert!(!ds.is_2d_field("missing"));
        assert_eq!(ds.fieldnames(), vec!["T2M".to_string()]);
    }

    #[test]
    fn test_min_max_skip_nan() {
        let ds = small();
        let var = ds.var("T2M").unwrap();
        assert_eq!(var.min(), Some(-4.0));
        assert_eq!(var.max(), Some(6.0));
    }

    #[test]
    fn test_transposed() {
        let ds = small();
        let var = ds.var("T2M").unwrap().clone();
        let t = var
            .transposed(&[dims::X.to_string(), dims::Y.to_string()])
            .unwrap();
        assert_eq!(t.data.shape(), &[3, 2]);
        assert_eq!(t.data[[1, 0]], 2.0);
        assert_eq!(t.data[[0, 1]], -4.0);
    }

    #[test]
    fn test_leadtime_from_attrs_and_coords() {
        let mut ds = small();
        ds.set_attr(attrs::BASEDATE, AttrValue::Time(t(0)));
        ds.set_attr(attrs::VALIDATE, AttrValue::Time(t(14)));
        assert_eq!(ds.leadtime(), Some(Duration::hours(14)));

        ds.remove_attr(attrs::BASEDATE);
        ds.remove_attr(attrs::VALIDATE);
        ds.set_coord(dims::BASEDATE, CoordValues::Time(vec![t(0)])).unwrap();
        ds.set_coord(dims::VALIDATE, CoordValues::Time(vec![t(3), t(6)])).unwrap();
        assert_eq!(ds.leadtime(), None);
        assert_eq!(ds.leadtimes(), vec![Duration::hours(3), Duration::hours(6)]);
    }

    #[test]
    fn test_canonical_order() {
        let names: Vec<String> = ["x", "level", "member", "validate", "y", "basedate"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            canonical_order(&names),
            vec!["basedate", "validate", "level", "member", "y", "x"]
        );
    }

    #[test]
    fn test_in_latlon() {
        let mut ds = small();
        assert!(!ds.in_latlon());
        ds.set_attr(
            attrs::PROJ4STR,
            AttrValue::Str("+proj=longlat +datum=WGS84 +no_defs".to_string()),
        );
        assert!(ds.in_latlon());
    }
}
