//! The file contract between the importer and the external decoder.
//!
//! After the decoder exits, its output directory holds:
//! - `fields.json`: array of field records (`name`, optional `index`,
//!   `spectral`, `nbits`)
//! - `metadata.json`: file-scope metadata object
//! - optionally, field data as `FAdata.json` or `FA.nc`
//!
//! Everything is validated here once, right after the process returns.

use std::collections::BTreeMap;
use std::path::Path;

use ndarray::{ArrayD, IxDyn};
use serde_json::Value;
use tracing::debug;

use crate::catalog::FieldRecord;
use crate::dataset::dims;
use crate::error::{FaError, Result};
use crate::metadata::FaMetadata;

pub const FIELDS_FILE: &str = "fields.json";
pub const METADATA_FILE: &str = "metadata.json";
pub const DATA_JSON_FILE: &str = "FAdata.json";
pub const DATA_NC_FILE: &str = "FA.nc";
/// Selection file written by the importer for the decoder.
pub const SELECTION_FILE: &str = "selection.json";

/// How a field was decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    TwoD,
    ThreeD,
    Pseudo3D,
}

impl FieldKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "2d" => Some(Self::TwoD),
            "3d" => Some(Self::ThreeD),
            "pseudo_3d" | "pseudo3d" | "pseudo-3d" => Some(Self::Pseudo3D),
            _ => None,
        }
    }
}

/// Values of one decoded field, in the layout the decoder wrote them.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValues {
    /// Row-major `(y, x)` values, stride = number of x coordinates.
    Flat(Vec<f64>),
    /// Nested `[x][y]`.
    Nested2(Vec<Vec<f64>>),
    /// Nested `[x][y][level]`.
    Nested3(Vec<Vec<Vec<f64>>>),
    /// NetCDF variable with dimensions among `x`, `y`, `level`.
    Labeled { dims: Vec<String>, data: ArrayD<f64> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawField {
    pub kind: Option<FieldKind>,
    pub values: RawValues,
}

/// Decoded field data and its coordinate vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFieldData {
    pub xcoords: Vec<f64>,
    pub ycoords: Vec<f64>,
    pub zcoords: Option<Vec<f64>>,
    pub fields: BTreeMap<String, RawField>,
}

/// Read `fields.json` and `metadata.json`.
///
/// Both files missing means the decoder produced nothing usable.
pub fn read_catalog_output(dir: &Path) -> Result<(Vec<FieldRecord>, FaMetadata)> {
    let fields_path = dir.join(FIELDS_FILE);
    let metadata_path = dir.join(METADATA_FILE);

    match (fields_path.exists(), metadata_path.exists()) {
        (false, false) => {
            return Err(FaError::decode_failure(format!(
                "no {} or {} in {}",
                FIELDS_FILE,
                METADATA_FILE,
                dir.display()
            )))
        }
        (false, true) => {
            return Err(FaError::decode_failure(format!(
                "decoder wrote {} but no {}",
                METADATA_FILE, FIELDS_FILE
            )))
        }
        (true, false) => {
            return Err(FaError::decode_failure(format!(
                "decoder wrote {} but no {}",
                FIELDS_FILE, METADATA_FILE
            )))
        }
        (true, true) => {}
    }

    let fields: Value = serde_json::from_str(&std::fs::read_to_string(&fields_path)?)?;
    let records = match fields {
        Value::Array(items) => items
            .iter()
            .map(FieldRecord::from_json)
            .collect::<Result<Vec<_>>>()?,
        other => {
            return Err(FaError::invalid_metadata(format!(
                "{} should hold an array, got {}",
                FIELDS_FILE,
                type_name(&other)
            )))
        }
    };

    let metadata: Value = serde_json::from_str(&std::fs::read_to_string(&metadata_path)?)?;
    let metadata = FaMetadata::from_json(&metadata)?;

    debug!(records = records.len(), dir = %dir.display(), "Read decoder catalog output");
    Ok((records, metadata))
}

/// Read decoded field data. `Ok(None)` when the decoder wrote no data file,
/// which means the requested fields are not in the file.
pub fn read_field_data(dir: &Path) -> Result<Option<RawFieldData>> {
    let json_path = dir.join(DATA_JSON_FILE);
    if json_path.exists() {
        let value: Value = serde_json::from_str(&std::fs::read_to_string(&json_path)?)?;
        return parse_data_json(&value).map(Some);
    }
    let nc_path = dir.join(DATA_NC_FILE);
    if nc_path.exists() {
        return read_data_netcdf(&nc_path).map(Some);
    }
    Ok(None)
}

/// Parse the `FAdata.json` layout.
pub fn parse_data_json(value: &Value) -> Result<RawFieldData> {
    let obj = value
        .as_object()
        .ok_or_else(|| FaError::invalid_metadata(format!("{} is not an object", DATA_JSON_FILE)))?;

    let coords = |key: &str| -> Result<Option<Vec<f64>>> {
        match obj.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => flat_numbers(v, key).map(Some),
        }
    };
    let xcoords = coords("xcoords")?
        .ok_or_else(|| FaError::invalid_metadata("decoded data has no xcoords"))?;
    let ycoords = coords("ycoords")?
        .ok_or_else(|| FaError::invalid_metadata("decoded data has no ycoords"))?;
    let zcoords = coords("zcoords")?;

    let mut fields = BTreeMap::new();
    let entries = obj
        .get("fields")
        .and_then(|f| f.as_object())
        .ok_or_else(|| FaError::invalid_metadata("decoded data has no fields object"))?;

    for (name, entry) in entries {
        let (kind, data) = match entry {
            Value::Object(o) => {
                let kind = o
                    .get("type")
                    .and_then(crate::metadata::unbox)
                    .and_then(|t| t.as_str())
                    .and_then(FieldKind::from_str);
                let data = o.get("data").ok_or_else(|| {
                    FaError::invalid_metadata(format!("field {} has no data", name))
                })?;
                (kind, data)
            }
            bare => (None, bare),
        };
        let values = parse_values(data, name)?;
        fields.insert(name.trim().to_string(), RawField { kind, values });
    }

    Ok(RawFieldData {
        xcoords,
        ycoords,
        zcoords,
        fields,
    })
}

fn parse_values(data: &Value, name: &str) -> Result<RawValues> {
    let items = data
        .as_array()
        .ok_or_else(|| FaError::invalid_metadata(format!("data of {} is not an array", name)))?;

    match items.first() {
        None => Ok(RawValues::Flat(Vec::new())),
        Some(Value::Array(inner)) => {
            if matches!(inner.first(), Some(Value::Array(_))) {
                let cube = items
                    .iter()
                    .map(|col| {
                        as_array(col, name)?
                            .iter()
                            .map(|row| flat_numbers(row, name))
                            .collect::<Result<Vec<_>>>()
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(RawValues::Nested3(cube))
            } else {
                let grid = items
                    .iter()
                    .map(|col| flat_numbers(col, name))
                    .collect::<Result<Vec<_>>>()?;
                Ok(RawValues::Nested2(grid))
            }
        }
        Some(_) => flat_numbers(data, name).map(RawValues::Flat),
    }
}

fn as_array<'a>(value: &'a Value, name: &str) -> Result<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| FaError::invalid_metadata(format!("ragged data in {}", name)))
}

/// Array of numbers; `null` (and JSON "NA"/"NaN" strings) become NaN.
fn flat_numbers(value: &Value, name: &str) -> Result<Vec<f64>> {
    as_array(value, name)?
        .iter()
        .map(|v| match v {
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| FaError::invalid_metadata(format!("bad number in {}", name))),
            Value::Null => Ok(f64::NAN),
            Value::String(s) if matches!(s.as_str(), "NA" | "NaN" | "nan") => Ok(f64::NAN),
            other => Err(FaError::invalid_metadata(format!(
                "non-numeric value in {}: {}",
                name, other
            ))),
        })
        .collect()
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Map the decoder's NetCDF dimension names onto dataset dimensions.
fn map_nc_dim(name: &str) -> Option<&'static str> {
    match name {
        "xdim" | "x" => Some(dims::X),
        "ydim" | "y" => Some(dims::Y),
        "zdim" | "lvl" | "level" => Some(dims::LEVEL),
        _ => None,
    }
}

/// Read the `FA.nc` layout: dimensions `xdim`, `ydim`, optionally `zdim`,
/// coordinate variables of the same names, one variable per field and a
/// global `fillvalue` attribute marking missing cells.
pub fn read_data_netcdf(path: &Path) -> Result<RawFieldData> {
    let file = netcdf::open(path)?;

    let fill = file
        .attribute("fillvalue")
        .and_then(|a| a.value().ok())
        .and_then(|v| match v {
            netcdf::AttributeValue::Double(d) => Some(d),
            netcdf::AttributeValue::Float(f) => Some(f as f64),
            netcdf::AttributeValue::Int(i) => Some(i as f64),
            netcdf::AttributeValue::Short(s) => Some(s as f64),
            netcdf::AttributeValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        });

    let read_coord = |names: &[&str]| -> Result<Option<Vec<f64>>> {
        for name in names {
            if let Some(var) = file.variable(name) {
                return Ok(Some(var.get_values::<f64, _>(..)?));
            }
        }
        Ok(None)
    };

    let xcoords = read_coord(&["xdim", "x"])?
        .ok_or_else(|| FaError::invalid_metadata(format!("{} has no xdim coordinate", DATA_NC_FILE)))?;
    let ycoords = read_coord(&["ydim", "y"])?
        .ok_or_else(|| FaError::invalid_metadata(format!("{} has no ydim coordinate", DATA_NC_FILE)))?;
    let zcoords = read_coord(&["zdim", "lvl", "level"])?;

    let mut fields = BTreeMap::new();
    for var in file.variables() {
        let name = var.name();
        if map_nc_dim(&name).is_some() {
            continue;
        }
        let mut var_dims = Vec::new();
        let mut shape = Vec::new();
        for dim in var.dimensions() {
            let mapped = map_nc_dim(&dim.name()).ok_or_else(|| {
                FaError::invalid_metadata(format!(
                    "field {} uses unknown dimension {}",
                    name,
                    dim.name()
                ))
            })?;
            var_dims.push(mapped.to_string());
            shape.push(dim.len());
        }
        let mut values: Vec<f64> = var.get_values::<f64, _>(..)?;
        if let Some(fill) = fill {
            for v in values.iter_mut().filter(|v| **v == fill) {
                *v = f64::NAN;
            }
        }
        let data = ArrayD::from_shape_vec(IxDyn(&shape), values)?;
        let kind = if var_dims.iter().any(|d| d == dims::LEVEL) {
            FieldKind::ThreeD
        } else {
            FieldKind::TwoD
        };
        fields.insert(
            name.trim().to_string(),
            RawField {
                kind: Some(kind),
                values: RawValues::Labeled {
                    dims: var_dims,
                    data,
                },
            },
        );
    }

    Ok(RawFieldData {
        xcoords,
        ycoords,
        zcoords,
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_flat_and_nested() {
        let value = json!({
            "xcoords": [0.0, 1.0, 2.0],
            "ycoords": [10.0, 20.0],
            "zcoords": [1, 2],
            "fields": {
                "CLSTEMPERATURE": {"type": "2d", "data": [1, 2, 3, 4, null, 6]},
                "WIND.U.PHYS": {"type": "3d", "data": [
                    [[1, 2], [3, 4]],
                    [[5, 6], [7, 8]],
                    [[9, 10], [11, 12]]
                ]},
                "  SURFACCPLUIE ": [[1, 2], [3, 4], [5, 6]]
            }
        });
        let data = parse_data_json(&value).unwrap();
        assert_eq!(data.xcoords.len(), 3);
        assert_eq!(data.zcoords, Some(vec![1.0, 2.0]));

        match &data.fields["CLSTEMPERATURE"].values {
            RawValues::Flat(v) => {
                assert_eq!(v.len(), 6);
                assert!(v[4].is_nan());
            }
            other => panic!("expected flat, got {:?}", other),
        }
        assert_eq!(data.fields["CLSTEMPERATURE"].kind, Some(FieldKind::TwoD));
        assert!(matches!(
            data.fields["WIND.U.PHYS"].values,
            RawValues::Nested3(ref c) if c.len() == 3 && c[0].len() == 2 && c[0][0].len() == 2
        ));
        assert!(matches!(
            data.fields["SURFACCPLUIE"].values,
            RawValues::Nested2(ref g) if g.len() == 3
        ));
        assert_eq!(data.fields["SURFACCPLUIE"].kind, None);
    }

    #[test]
    fn test_missing_coords_is_invalid() {
        let value = json!({"ycoords": [1.0], "fields": {}});
        assert!(matches!(
            parse_data_json(&value),
            Err(FaError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_non_numeric_data_is_invalid() {
        let value = json!({
            "xcoords": [0.0], "ycoords": [0.0],
            "fields": {"A": {"data": ["x"]}}
        });
        assert!(parse_data_json(&value).is_err());
    }

    #[test]
    fn test_catalog_output_missing_is_decode_failure() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_catalog_output(dir.path()),
            Err(FaError::ExternalDecodeFailure(_))
        ));
        std::fs::write(dir.path().join(FIELDS_FILE), "[]").unwrap();
        assert!(matches!(
            read_catalog_output(dir.path()),
            Err(FaError::ExternalDecodeFailure(_))
        ));
    }

    #[test]
    fn test_no_data_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_field_data(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_read_catalog_output() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(FIELDS_FILE),
            r#"[{"name": "CLSTEMPERATURE", "index": 1}, {"name": "S001TKE"}]"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join(METADATA_FILE),
            r#"{"validate": ["2024-01-01 06:00:00"], "basedate": ["2024-01-01 00:00:00"],
                "nx": [2], "ny": [2], "nlev": [1], "A_list": [0], "B_list": [1]}"#,
        )
        .unwrap();
        let (records, metadata) = read_catalog_output(dir.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].index, Some(1));
        assert_eq!(metadata.nlev, 1);
    }

    const NC_FILL: f64 = -999.0;

    /// Decoder-style `FA.nc`: fields stored `(xdim, ydim[, zdim])`.
    fn write_fa_nc(dir: &Path, fill: netcdf::AttributeValue) {
        let mut file = netcdf::create(dir.join(DATA_NC_FILE)).unwrap();
        file.add_dimension("xdim", 3).unwrap();
        file.add_dimension("ydim", 2).unwrap();
        file.add_dimension("zdim", 2).unwrap();
        for (name, values) in [
            ("xdim", vec![0.0, 2500.0, 5000.0]),
            ("ydim", vec![0.0, 2500.0]),
            ("zdim", vec![10.0, 20.0]),
        ] {
            let mut var = file.add_variable::<f64>(name, &[name]).unwrap();
            var.put_values(&values, ..).unwrap();
        }

        // value = 10 * y + x, one missing cell at x = 1, y = 0
        let mut t = Vec::new();
        for i in 0..3 {
            for j in 0..2 {
                t.push(if (i, j) == (1, 0) { NC_FILL } else { (10 * j + i) as f64 });
            }
        }
        let mut var = file
            .add_variable::<f64>("CLSTEMPERATURE", &["xdim", "ydim"])
            .unwrap();
        var.put_values(&t, ..).unwrap();

        // value = 100 * level + 10 * y + x, missing at the last cell
        let mut u = Vec::new();
        for i in 0..3 {
            for j in 0..2 {
                for k in 0..2 {
                    u.push(if (i, j, k) == (2, 1, 1) {
                        NC_FILL
                    } else {
                        (100 * k + 10 * j + i) as f64
                    });
                }
            }
        }
        let mut var = file
            .add_variable::<f64>("WIND.U.PHYS", &["xdim", "ydim", "zdim"])
            .unwrap();
        var.put_values(&u, ..).unwrap();

        file.add_attribute("fillvalue", fill).unwrap();
    }

    #[test]
    fn test_read_fa_nc_with_string_fillvalue() {
        let dir = tempfile::tempdir().unwrap();
        write_fa_nc(dir.path(), netcdf::AttributeValue::Str("-999".to_string()));

        let data = read_field_data(dir.path()).unwrap().unwrap();
        assert_eq!(data.xcoords, vec![0.0, 2500.0, 5000.0]);
        assert_eq!(data.ycoords, vec![0.0, 2500.0]);
        assert_eq!(data.zcoords, Some(vec![10.0, 20.0]));
        assert_eq!(data.fields.len(), 2);

        let t = &data.fields["CLSTEMPERATURE"];
        assert_eq!(t.kind, Some(FieldKind::TwoD));
        match &t.values {
            RawValues::Labeled { dims, data } => {
                assert_eq!(dims, &vec!["x".to_string(), "y".to_string()]);
                assert_eq!(data.shape(), &[3, 2]);
                assert_eq!(data[[2, 1]], 12.0);
                assert!(data[[1, 0]].is_nan());
            }
            other => panic!("unexpected layout {:?}", other),
        }

        let u = &data.fields["WIND.U.PHYS"];
        assert_eq!(u.kind, Some(FieldKind::ThreeD));
        match &u.values {
            RawValues::Labeled { dims, data } => {
                assert_eq!(dims, &vec!["x", "y", "level"]);
                assert_eq!(data.shape(), &[3, 2, 2]);
                assert_eq!(data[[1, 1, 1]], 111.0);
                assert!(data[[2, 1, 1]].is_nan());
            }
            other => panic!("unexpected layout {:?}", other),
        }
    }

    #[test]
    fn test_fa_nc_assembles_to_canonical_order() {
        use crate::assemble::GridAssembler;
        use crate::catalog::FieldCatalog;
        use crate::dataset::CoordValues;
        use crate::selection::{resolve, FieldSelection};

        let dir = tempfile::tempdir().unwrap();
        write_fa_nc(dir.path(), netcdf::AttributeValue::Double(NC_FILL));
        let data = read_field_data(dir.path()).unwrap().unwrap();

        let catalog = FieldCatalog::classify(
            &["CLSTEMPERATURE", "S001WIND.U.PHYS", "S002WIND.U.PHYS"],
            2,
        )
        .unwrap();
        let metadata = FaMetadata::from_json(&json!({
            "origin": "FIXTURE",
            "validate": "2024-01-10 06:00:00",
            "basedate": "2024-01-10 00:00:00",
            "nx": 3, "ny": 2, "nlev": 2,
            "A_list": [0.0, 1.0], "B_list": [1.0, 0.0]
        }))
        .unwrap();
        let selection = resolve(
            &catalog,
            &FieldSelection::only(["CLSTEMPERATURE", "WIND.U.PHYS"]),
            "FIXTURE",
            10,
        )
        .unwrap();
        let ds = GridAssembler::new(&catalog, &metadata)
            .assemble(&selection, data)
            .unwrap();

        let t = ds.var("CLSTEMPERATURE").unwrap();
        assert_eq!(t.dims, vec!["y", "x"]);
        assert_eq!(t.data.shape(), &[2, 3]);
        assert_eq!(t.data[[1, 2]], 12.0);
        assert_eq!(t.data[[0, 2]], 2.0);
        assert!(t.data[[0, 1]].is_nan());
        assert_eq!(t.data.iter().filter(|v| v.is_nan()).count(), 1);

        let u = ds.var("WIND.U.PHYS").unwrap();
        assert_eq!(u.dims, vec!["level", "y", "x"]);
        assert_eq!(u.data.shape(), &[2, 2, 3]);
        assert_eq!(u.data[[1, 0, 2]], 102.0);
        assert_eq!(u.data[[0, 1, 2]], 12.0);
        assert!(u.data[[1, 1, 2]].is_nan());
        assert_eq!(u.data.iter().filter(|v| v.is_nan()).count(), 1);

        // Level values come from the file's zdim coordinate
        assert_eq!(ds.coord(dims::LEVEL), Some(&CoordValues::Int(vec![10, 20])));
    }

    #[test]
    fn test_fields_json_must_be_array() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(FIELDS_FILE), r#"{"name": "A"}"#).unwrap();
        std::fs::write(dir.path().join(METADATA_FILE), "{}").unwrap();
        assert!(matches!(
            read_catalog_output(dir.path()),
            Err(FaError::InvalidMetadata(_))
        ));
    }
}
