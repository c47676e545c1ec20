//! NetCDF persistence of datasets.
//!
//! Layout: one dimension per coordinate, a coordinate variable of the same
//! name, one `f64` variable per field and the dataset attributes as global
//! attributes. Time coordinates are stored as integer seconds since the Unix
//! epoch with CF `units`; a `dtype` attribute on every coordinate records the
//! in-memory kind so reading gives back the same [`CoordValues`] variant.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime};
use ndarray::{ArrayD, IxDyn};
use netcdf::AttributeValue;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dataset::{attrs, AttrValue, CoordValues, Dataset, Variable};
use crate::error::{FaError, Result};
use crate::metadata::{format_datetime, parse_datetime};

const DTYPE_ATTR: &str = "dtype";
const TIME_UNITS: &str = "seconds since 1970-01-01 00:00:00";

/// Attributes that are always lists, whatever their length.
const FLOAT_LIST_ATTRS: &[&str] = &[attrs::A_LIST, attrs::B_LIST];
const STR_LIST_ATTRS: &[&str] = &[attrs::ORIGINS, attrs::FILEPATHS];

/// Write `ds` to `path` and return the path actually written.
///
/// `.nc` is appended when `path` has another or no extension. The file is
/// written under a temporary name next to the target and renamed into place
/// once complete.
pub fn save_netcdf(ds: &Dataset, path: impl AsRef<Path>, overwrite: bool) -> Result<PathBuf> {
    let path = with_nc_extension(path.as_ref());
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if !parent.is_dir() {
        return Err(FaError::invalid_metadata(format!(
            "output directory does not exist: {}",
            parent.display()
        )));
    }
    if path.exists() {
        if !overwrite {
            return Err(FaError::OutputExists(path));
        }
        debug!(path = %path.display(), "Overwriting existing file");
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "dataset.nc".to_string());
    let partial = parent.join(format!(
        ".{}.partial-{}",
        file_name,
        Uuid::new_v4().simple()
    ));

    if let Err(e) = write_dataset(ds, &partial) {
        if let Err(rm) = std::fs::remove_file(&partial) {
            if rm.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %partial.display(), error = %rm, "Failed to remove partial file");
            }
        }
        return Err(e);
    }
    std::fs::rename(&partial, &path)?;

    info!(
        path = %path.display(),
        fields = ds.data_vars().len(),
        dims = ?ds.dims(),
        "Wrote NetCDF file"
    );
    Ok(path)
}

fn with_nc_extension(path: &Path) -> PathBuf {
    match path.extension() {
        Some(ext) if ext == "nc" => path.to_path_buf(),
        _ => {
            let mut name = OsString::from(path.as_os_str());
            name.push(".nc");
            PathBuf::from(name)
        }
    }
}

fn write_dataset(ds: &Dataset, path: &Path) -> Result<()> {
    let mut file = netcdf::create(path)?;

    for (name, values) in ds.coords() {
        file.add_dimension(name, values.len())?;
    }

    for (name, values) in ds.coords() {
        let dims = [name.as_str()];
        match values {
            CoordValues::Float(v) => {
                let mut var = file.add_variable::<f64>(name, &dims)?;
                var.put_attribute(DTYPE_ATTR, "float")?;
                var.put_values(v, ..)?;
            }
            CoordValues::Int(v) => {
                let mut var = file.add_variable::<i64>(name, &dims)?;
                var.put_attribute(DTYPE_ATTR, "int")?;
                var.put_values(v, ..)?;
            }
            CoordValues::Time(v) => {
                let seconds: Vec<i64> = v.iter().map(|t| t.and_utc().timestamp()).collect();
                let mut var = file.add_variable::<i64>(name, &dims)?;
                var.put_attribute(DTYPE_ATTR, "datetime")?;
                var.put_attribute("units", TIME_UNITS)?;
                var.put_attribute("calendar", "standard")?;
                var.put_values(&seconds, ..)?;
            }
        }
    }

    for (name, var) in ds.data_vars() {
        let dims: Vec<&str> = var.dims.iter().map(String::as_str).collect();
        let mut nc_var = file.add_variable::<f64>(name, &dims)?;
        let values: Vec<f64> = var.data.iter().copied().collect();
        nc_var.put_values(&values, ..)?;
    }

    for (name, value) in ds.attrs() {
        match to_nc_attr(value) {
            Some(v) => {
                file.add_attribute(name, v)?;
            }
            None => debug!(attr = %name, "Skipping empty attribute"),
        }
    }

    Ok(())
}

fn to_nc_attr(value: &AttrValue) -> Option<AttributeValue> {
    Some(match value {
        AttrValue::Str(s) => AttributeValue::Str(s.clone()),
        AttrValue::Int(i) => AttributeValue::Longlong(*i),
        AttrValue::Float(f) => AttributeValue::Double(*f),
        AttrValue::Floats(v) => AttributeValue::Doubles(v.clone()),
        AttrValue::Strs(v) if v.is_empty() => return None,
        AttrValue::Strs(v) => AttributeValue::Strs(v.clone()),
        AttrValue::Time(t) => AttributeValue::Str(format_datetime(t)),
        AttrValue::Duration(d) => AttributeValue::Longlong(d.num_seconds()),
    })
}

/// Read a file written by [`save_netcdf`].
pub fn read_netcdf(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(FaError::SourceNotFound(path.to_path_buf()));
    }
    let file = netcdf::open(path)?;
    let mut ds = Dataset::new();

    // Coordinates first: variables named after their only dimension
    for var in file.variables() {
        let name = var.name();
        let var_dims = var.dimensions();
        if var_dims.len() != 1 || var_dims[0].name() != name {
            continue;
        }
        let dtype = match var.attribute_value(DTYPE_ATTR) {
            Some(Ok(AttributeValue::Str(s))) => s,
            _ => "float".to_string(),
        };
        let values = match dtype.as_str() {
            "int" => CoordValues::Int(var.get_values::<i64, _>(..)?),
            "datetime" => {
                let times = var
                    .get_values::<i64, _>(..)?
                    .into_iter()
                    .map(|s| from_timestamp(s, &name))
                    .collect::<Result<Vec<_>>>()?;
                CoordValues::Time(times)
            }
            _ => CoordValues::Float(var.get_values::<f64, _>(..)?),
        };
        ds.set_coord(&name, values)?;
    }

    for dim in file.dimensions() {
        let name = dim.name();
        if !ds.has_coord(&name) {
            debug!(dim = %name, "Dimension without coordinate, using an index");
            ds.set_coord(&name, CoordValues::Int((0..dim.len() as i64).collect()))?;
        }
    }

    for var in file.variables() {
        let name = var.name();
        if ds.has_coord(&name) {
            continue;
        }
        let var_dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
        if var_dims.is_empty() {
            debug!(variable = %name, "Skipping scalar variable");
            continue;
        }
        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        let values = var.get_values::<f64, _>(..)?;
        let data = ArrayD::from_shape_vec(IxDyn(&shape), values)?;
        ds.insert_var(
            &name,
            Variable {
                dims: var_dims,
                data,
            },
        )?;
    }

    for attr in file.attributes() {
        let name = attr.name().to_string();
        match attr.value() {
            Ok(value) => {
                if let Some(v) = from_nc_attr(&name, value) {
                    ds.set_attr(&name, v);
                }
            }
            Err(e) => warn!(attr = %name, error = %e, "Unreadable attribute"),
        }
    }

    debug!(path = %path.display(), fields = ds.data_vars().len(), "Read NetCDF file");
    Ok(ds)
}

fn from_timestamp(seconds: i64, name: &str) -> Result<NaiveDateTime> {
    DateTime::from_timestamp(seconds, 0)
        .map(|t| t.naive_utc())
        .ok_or_else(|| {
            FaError::invalid_metadata(format!("time value {} of {} out of range", seconds, name))
        })
}

fn from_nc_attr(name: &str, value: AttributeValue) -> Option<AttrValue> {
    let name = name.trim();
    if FLOAT_LIST_ATTRS.contains(&name) {
        return numbers(value).map(AttrValue::Floats);
    }
    if STR_LIST_ATTRS.contains(&name) {
        return match value {
            AttributeValue::Str(s) => Some(AttrValue::Strs(vec![s])),
            AttributeValue::Strs(v) => Some(AttrValue::Strs(v)),
            _ => None,
        };
    }
    if name == attrs::VALIDATE || name == attrs::BASEDATE {
        if let AttributeValue::Str(s) = &value {
            if let Some(t) = parse_datetime(s) {
                return Some(AttrValue::Time(t));
            }
        }
    }
    if name == attrs::LEADTIME {
        if let Some(seconds) = integer(&value) {
            return Some(AttrValue::Duration(Duration::seconds(seconds)));
        }
    }

    match value {
        AttributeValue::Str(s) => Some(AttrValue::Str(s)),
        AttributeValue::Strs(v) => Some(AttrValue::Strs(v)),
        AttributeValue::Double(d) => Some(AttrValue::Float(d)),
        AttributeValue::Float(f) => Some(AttrValue::Float(f as f64)),
        other => match integer(&other) {
            Some(i) => Some(AttrValue::Int(i)),
            None => numbers(other).map(AttrValue::Floats),
        },
    }
}

fn integer(value: &AttributeValue) -> Option<i64> {
    match value {
        AttributeValue::Longlong(v) => Some(*v),
        AttributeValue::Int(v) => Some(*v as i64),
        AttributeValue::Short(v) => Some(*v as i64),
        AttributeValue::Schar(v) => Some(*v as i64),
        AttributeValue::Uint(v) => Some(*v as i64),
        AttributeValue::Ushort(v) => Some(*v as i64),
        AttributeValue::Uchar(v) => Some(*v as i64),
        _ => None,
    }
}

fn numbers(value: AttributeValue) -> Option<Vec<f64>> {
    match value {
        AttributeValue::Doubles(v) => Some(v),
        AttributeValue::Double(d) => Some(vec![d]),
        AttributeValue::Floats(v) => Some(v.into_iter().map(f64::from).collect()),
        AttributeValue::Float(f) => Some(vec![f as f64]),
        AttributeValue::Ints(v) => Some(v.into_iter().map(f64::from).collect()),
        AttributeValue::Longlongs(v) => Some(v.into_iter().map(|i| i as f64).collect()),
        AttributeValue::Shorts(v) => Some(v.into_iter().map(f64::from).collect()),
        other => integer(&other).map(|i| vec![i as f64]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nc_extension() {
        assert_eq!(with_nc_extension(Path::new("out/run.nc")), PathBuf::from("out/run.nc"));
        assert_eq!(with_nc_extension(Path::new("out/run")), PathBuf::from("out/run.nc"));
        assert_eq!(
            with_nc_extension(Path::new("ICMSHAR13+0014")),
            PathBuf::from("ICMSHAR13+0014.nc")
        );
        assert_eq!(with_nc_extension(Path::new("run.grb")), PathBuf::from("run.grb.nc"));
    }

    #[test]
    fn test_attr_mapping() {
        assert_eq!(
            from_nc_attr("A_list", AttributeValue::Double(0.5)),
            Some(AttrValue::Floats(vec![0.5]))
        );
        assert_eq!(
            from_nc_attr("origins", AttributeValue::Str("ICMSHAR13+0014".to_string())),
            Some(AttrValue::Strs(vec!["ICMSHAR13+0014".to_string()]))
        );
        assert_eq!(
            from_nc_attr("leadtime", AttributeValue::Longlong(50400)),
            Some(AttrValue::Duration(Duration::hours(14)))
        );
        assert_eq!(
            from_nc_attr("nlev", AttributeValue::Longlong(87)),
            Some(AttrValue::Int(87))
        );
        assert_eq!(
            from_nc_attr("dx", AttributeValue::Double(1300.0)),
            Some(AttrValue::Float(1300.0))
        );
        assert!(matches!(
            from_nc_attr("validate", AttributeValue::Str("2023-11-20 14:00:00".to_string())),
            Some(AttrValue::Time(_))
        ));
    }

    #[test]
    fn test_save_into_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing").join("out.nc");
        assert!(matches!(
            save_netcdf(&Dataset::new(), &target, false),
            Err(FaError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_existing_output_requires_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.nc");
        std::fs::write(&target, b"existing").unwrap();
        assert!(matches!(
            save_netcdf(&Dataset::new(), &target, false),
            Err(FaError::OutputExists(_))
        ));
        // Untouched
        assert_eq!(std::fs::read(&target).unwrap(), b"existing");
    }

    #[test]
    fn test_read_missing_file() {
        assert!(matches!(
            read_netcdf("/nonexistent/run.nc"),
            Err(FaError::SourceNotFound(_))
        ));
    }
}
