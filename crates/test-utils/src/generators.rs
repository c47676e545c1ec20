//! Test data generators: synthetic grids and decoder output.
//!
//! [`FaFixture`] describes a small FA file and writes the files the R
//! decoder would produce (`fields.json`, `metadata.json`, `FAdata.json`),
//! so the import pipeline can be tested without R or a real FA file.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use serde_json::{json, Map, Value};

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`, in row-major order
/// (row 0 first).
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50);
/// assert_eq!(grid[1], 1000.0); // col=1, row=0
/// assert_eq!(grid[10], 1.0);   // col=0, row=1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f64> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f64);
        }
    }
    data
}

/// Zeros with NaN at the given `(col, row)` positions.
pub fn create_grid_with_nans(width: usize, height: usize, nan_positions: &[(usize, usize)]) -> Vec<f64> {
    let mut data = vec![0.0; width * height];
    for &(col, row) in nan_positions {
        if col < width && row < height {
            data[row * width + col] = f64::NAN;
        }
    }
    data
}

/// A synthetic FA file, described by what its decoder would emit.
#[derive(Debug, Clone)]
pub struct FaFixture {
    nx: usize,
    ny: usize,
    nlev: usize,
    xcoords: Vec<f64>,
    ycoords: Vec<f64>,
    metadata: Map<String, Value>,
    /// Catalog records in listing order.
    records: Vec<Value>,
    /// Row-major `(y, x)` values per full field name.
    values: BTreeMap<String, Vec<f64>>,
}

impl FaFixture {
    /// Empty file on an `nx` x `ny` grid with `nlev` model levels,
    /// 1300 m spacing, valid 2023-11-20 14:00 from the 00 UTC run.
    pub fn new(nx: usize, ny: usize, nlev: usize) -> Self {
        let mut fixture = Self {
            nx,
            ny,
            nlev,
            xcoords: (0..nx).map(|i| i as f64 * 1300.0).collect(),
            ycoords: (0..ny).map(|j| j as f64 * 1300.0).collect(),
            metadata: Map::new(),
            records: Vec::new(),
            values: BTreeMap::new(),
        };
        let a_list: Vec<f64> = (0..=nlev).map(|k| k as f64 * 100.0).collect();
        let b_list: Vec<f64> = (0..=nlev).map(|k| k as f64 / nlev.max(1) as f64).collect();
        fixture
            .meta("validate", json!(["2023-11-20 14:00:00"]))
            .meta("basedate", json!(["2023-11-20 00:00:00"]))
            .meta("timestep", json!([50]))
            .meta("nx", json!([nx]))
            .meta("ny", json!([ny]))
            .meta("dx", json!([1300]))
            .meta("dy", json!([1300]))
            .meta("nlev", json!([nlev]))
            .meta("refpressure", json!([101325]))
            .meta("A_list", json!(a_list))
            .meta("B_list", json!(b_list));
        fixture
    }

    /// Set (or replace) a metadata key. Scalars should be boxed the way R
    /// writes them (`json!([value])`).
    pub fn meta(&mut self, key: &str, value: Value) -> &mut Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Remove a metadata key.
    pub fn without_meta(&mut self, key: &str) -> &mut Self {
        self.metadata.remove(key);
        self
    }

    pub fn validity(&mut self, validate: &str, basedate: &str) -> &mut Self {
        self.meta("validate", json!([validate]))
            .meta("basedate", json!([basedate]))
    }

    /// Lambert projection parameters.
    pub fn lambert(&mut self, lat: f64, lon: f64, radius: f64) -> &mut Self {
        self.meta("projection", json!(["lcc"]))
            .meta("lat_1", json!([lat]))
            .meta("lat_2", json!([lat]))
            .meta("lon_0", json!([lon]))
            .meta("proj_R", json!([radius]))
            .meta("center_lat", json!([lat]))
            .meta("center_lon", json!([lon]))
    }

    /// Replace the projected coordinates.
    pub fn coords(&mut self, xcoords: Vec<f64>, ycoords: Vec<f64>) -> &mut Self {
        assert_eq!(xcoords.len(), self.nx, "x coordinate count");
        assert_eq!(ycoords.len(), self.ny, "y coordinate count");
        self.xcoords = xcoords;
        self.ycoords = ycoords;
        self
    }

    /// Single-level field with [`create_test_grid`] values.
    pub fn field_2d(&mut self, name: &str) -> &mut Self {
        let values = create_test_grid(self.nx, self.ny);
        self.field_2d_values(name, values)
    }

    /// Single-level field with explicit row-major values.
    pub fn field_2d_values(&mut self, name: &str, values: Vec<f64>) -> &mut Self {
        assert_eq!(values.len(), self.nx * self.ny, "values for {}", name);
        self.records.push(json!({
            "name": [name],
            "index": [self.records.len() + 1],
            "spectral": [false],
            "nbits": [16]
        }));
        self.values.insert(name.to_string(), values);
        self
    }

    /// Field on every model level (`S001<basename>` ...). Level `k` holds
    /// [`create_test_grid`] values plus `k * 100000`.
    pub fn field_3d(&mut self, basename: &str) -> &mut Self {
        let levels: Vec<usize> = (1..=self.nlev).collect();
        self.field_levels(basename, &levels)
    }

    /// Field on the given levels only.
    pub fn field_levels(&mut self, basename: &str, levels: &[usize]) -> &mut Self {
        for &level in levels {
            let values: Vec<f64> = create_test_grid(self.nx, self.ny)
                .into_iter()
                .map(|v| v + level as f64 * 100_000.0)
                .collect();
            self.field_2d_values(&level_name(level, basename), values);
        }
        self
    }

    /// Names of every catalog record.
    pub fn names(&self) -> Vec<String> {
        self.records
            .iter()
            .filter_map(|r| r["name"][0].as_str().map(str::to_string))
            .collect()
    }

    /// Write `fields.json` and `metadata.json`.
    pub fn write_catalog(&self, dir: &Path) -> io::Result<()> {
        let mut metadata = self.metadata.clone();
        metadata.insert("nfields".to_string(), json!([self.records.len()]));
        write_json(&dir.join("fields.json"), &Value::Array(self.records.clone()))?;
        write_json(&dir.join("metadata.json"), &Value::Object(metadata))
    }

    /// Write `FAdata.json` with the requested fields.
    ///
    /// A request is a full name (2D data) or a basename present at every
    /// level (3D data, nested `[x][y][level]`). Nothing is written when no
    /// request matches; returns whether a file was written.
    pub fn write_data(&self, dir: &Path, requests: &[String]) -> io::Result<bool> {
        let mut fields = Map::new();
        for request in requests {
            let request = request.trim();
            if let Some(values) = self.values.get(request) {
                fields.insert(
                    request.to_string(),
                    json!({"type": "2d", "data": values_json(values)}),
                );
                continue;
            }
            let members: Vec<&Vec<f64>> = (1..=self.nlev)
                .filter_map(|level| self.values.get(&level_name(level, request)))
                .collect();
            if self.nlev > 0 && members.len() == self.nlev {
                fields.insert(
                    request.to_string(),
                    json!({"type": "3d", "data": self.cube_json(&members)}),
                );
            }
        }
        if fields.is_empty() {
            return Ok(false);
        }

        let data = json!({
            "xcoords": self.xcoords,
            "ycoords": self.ycoords,
            "zcoords": (1..=self.nlev).collect::<Vec<_>>(),
            "fields": fields,
        });
        write_json(&dir.join("FAdata.json"), &data)?;
        Ok(true)
    }

    fn cube_json(&self, levels: &[&Vec<f64>]) -> Value {
        let cube: Vec<Vec<Vec<Value>>> = (0..self.nx)
            .map(|i| {
                (0..self.ny)
                    .map(|j| {
                        levels
                            .iter()
                            .map(|plane| number_json(plane[j * self.nx + i]))
                            .collect()
                    })
                    .collect()
            })
            .collect();
        json!(cube)
    }
}

/// `S` + zero-padded level + basename.
pub fn level_name(level: usize, basename: &str) -> String {
    format!("S{:03}{}", level, basename)
}

/// Requests encoded in a decoder selection argument: a JSON selection file
/// (`{"whitelist": [...]}`) or a single field name.
pub fn requests_from_selection(arg: &str) -> io::Result<Vec<String>> {
    let path = Path::new(arg);
    if path.extension().is_some_and(|e| e == "json") && path.is_file() {
        let value: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        let names = value["whitelist"]
            .as_array()
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| n.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        return Ok(names);
    }
    Ok(vec![arg.to_string()])
}

fn number_json(v: f64) -> Value {
    if v.is_nan() {
        Value::Null
    } else {
        json!(v)
    }
}

fn values_json(values: &[f64]) -> Value {
    Value::Array(values.iter().copied().map(number_json).collect())
}

fn write_json(path: &Path, value: &Value) -> io::Result<()> {
    std::fs::write(path, serde_json::to_string(value)?)
}
