//! Build a [`Dataset`] from decoded field data.
//!
//! 2D fields become `(y, x)` arrays and 3D fields `(level, y, x)` arrays, so
//! the spatial axes are always trailing.

use std::collections::BTreeMap;

use ndarray::{Array2, Array3, ArrayD, Axis};
use tracing::{debug, info, warn};

use crate::catalog::FieldCatalog;
use crate::contract::{FieldKind, RawField, RawFieldData, RawValues};
use crate::dataset::{dims, CoordValues, Dataset, Variable};
use crate::error::{FaError, Result};
use crate::metadata::FaMetadata;
use crate::selection::{not_found, ResolvedSelection};

/// Assembles decoded fields of one FA file.
pub struct GridAssembler<'a> {
    catalog: &'a FieldCatalog,
    metadata: &'a FaMetadata,
    max_listed: usize,
}

impl<'a> GridAssembler<'a> {
    pub fn new(catalog: &'a FieldCatalog, metadata: &'a FaMetadata) -> Self {
        Self {
            catalog,
            metadata,
            max_listed: 100,
        }
    }

    /// Number of catalog names listed in "field not found" errors.
    pub fn with_max_listed(mut self, max_listed: usize) -> Self {
        self.max_listed = max_listed;
        self
    }

    /// Build the dataset. Requested fields missing from `data` are logged;
    /// it is an error only when none of them were decoded.
    pub fn assemble(&self, selection: &ResolvedSelection, data: RawFieldData) -> Result<Dataset> {
        let source = self.source_name();
        if data.fields.is_empty() {
            return Err(not_found(
                self.catalog,
                &selection.decoder_names(),
                source,
                self.max_listed,
            ));
        }

        let nx = data.xcoords.len();
        let ny = data.ycoords.len();
        if nx != self.metadata.nx || ny != self.metadata.ny {
            warn!(
                nx, ny,
                metadata_nx = self.metadata.nx,
                metadata_ny = self.metadata.ny,
                "Decoded grid size differs from metadata, using decoded coordinates"
            );
        }

        let mut ds = Dataset::new();
        ds.set_coord(dims::X, CoordValues::Float(data.xcoords))?;
        ds.set_coord(dims::Y, CoordValues::Float(data.ycoords))?;

        let missing: Vec<String> = selection
            .decoder_names()
            .into_iter()
            .filter(|name| !data.fields.contains_key(name))
            .collect();
        if !missing.is_empty() {
            warn!(source = %source, fields = ?missing, "Requested fields absent from decoder output");
        }

        for (name, field) in data.fields {
            if !selection.contains(&name) {
                debug!(field = %name, "Decoder returned an unrequested field, keeping it");
            }
            let three_d = self.is_3d(&name, &field, selection);
            let var = if three_d {
                let array = materialize_3d(&field.values, nx, ny, &name)?;
                self.ensure_level_coord(&mut ds, array.len_of(Axis(0)), data.zcoords.as_deref(), &name)?;
                Variable::new(&[dims::LEVEL, dims::Y, dims::X], array.into_dyn())?
            } else {
                let array = materialize_2d(&field.values, nx, ny, &name)?;
                Variable::new(&[dims::Y, dims::X], array.into_dyn())?
            };
            ds.insert_var(&name, var)?;
        }

        for (key, value) in self.metadata.to_attrs() {
            ds.set_attr(&key, value);
        }

        info!(
            source = %source,
            fields = ds.data_vars().len(),
            levels = ds.dim_len(dims::LEVEL).unwrap_or(0),
            "Assembled dataset"
        );
        Ok(ds)
    }

    fn source_name(&self) -> &str {
        if self.metadata.origin.is_empty() {
            &self.metadata.filepath
        } else {
            &self.metadata.origin
        }
    }

    fn is_3d(&self, name: &str, field: &RawField, selection: &ResolvedSelection) -> bool {
        match &field.values {
            RawValues::Nested3(_) => true,
            RawValues::Labeled { dims: d, .. } => d.iter().any(|d| d == dims::LEVEL),
            RawValues::Nested2(_) => false,
            RawValues::Flat(_) => {
                field.kind == Some(FieldKind::ThreeD)
                    || selection.basenames_3d.contains(name)
                    || self.catalog.is_pure_3d_basename(name)
            }
        }
    }

    /// Add the `level` coordinate on first use; later fields must agree.
    fn ensure_level_coord(
        &self,
        ds: &mut Dataset,
        size: usize,
        zcoords: Option<&[f64]>,
        name: &str,
    ) -> Result<()> {
        if let Some(existing) = ds.dim_len(dims::LEVEL) {
            if existing != size {
                return Err(FaError::invalid_metadata(format!(
                    "field {} has {} levels, other 3D fields have {}",
                    name, size, existing
                )));
            }
            return Ok(());
        }

        let coord = match zcoords {
            Some(z) if z.len() == size => level_coord_from(z),
            _ if size as i64 == self.metadata.nlev => {
                CoordValues::Int((1..=self.metadata.nlev).collect())
            }
            _ => {
                return Err(FaError::invalid_metadata(format!(
                    "field {} has {} levels but the file declares nlev = {} and no matching level coordinates",
                    name, size, self.metadata.nlev
                )))
            }
        };
        ds.set_coord(dims::LEVEL, coord)
    }
}

/// Integral level values become an integer coordinate.
fn level_coord_from(values: &[f64]) -> CoordValues {
    if values.iter().all(|v| v.fract() == 0.0) {
        CoordValues::Int(values.iter().map(|v| *v as i64).collect())
    } else {
        CoordValues::Float(values.to_vec())
    }
}

/// `(y, x)` array of a 2D field.
fn materialize_2d(values: &RawValues, nx: usize, ny: usize, name: &str) -> Result<Array2<f64>> {
    match values {
        RawValues::Flat(v) => {
            if v.len() != nx * ny {
                return Err(FaError::invalid_metadata(format!(
                    "field {} has {} values for a {}x{} grid",
                    name,
                    v.len(),
                    ny,
                    nx
                )));
            }
            // Row-major with the x length as stride
            Ok(Array2::from_shape_vec((ny, nx), v.clone())?)
        }
        RawValues::Nested2(columns) => {
            check_columns(columns.len(), nx, name)?;
            if columns.iter().any(|c| c.len() != ny) {
                return Err(FaError::invalid_metadata(format!(
                    "field {} has ragged columns, expected {} values each",
                    name, ny
                )));
            }
            Ok(Array2::from_shape_fn((ny, nx), |(j, i)| columns[i][j]))
        }
        RawValues::Nested3(_) => Err(FaError::invalid_metadata(format!(
            "field {} is 3D but was requested as a single level",
            name
        ))),
        RawValues::Labeled { dims: d, data } => {
            let var = Variable {
                dims: d.clone(),
                data: data.clone(),
            }
            .transposed(&[dims::Y.to_string(), dims::X.to_string()])?;
            Ok(var.data.into_dimensionality()?)
        }
    }
}

/// `(level, y, x)` array of a 3D field, from the decoder's `[x][y][level]`.
fn materialize_3d(values: &RawValues, nx: usize, ny: usize, name: &str) -> Result<Array3<f64>> {
    match values {
        RawValues::Nested3(cube) => {
            check_columns(cube.len(), nx, name)?;
            let nlev = cube
                .first()
                .and_then(|col| col.first())
                .map(|cell| cell.len())
                .unwrap_or(0);
            let regular = cube
                .iter()
                .all(|col| col.len() == ny && col.iter().all(|cell| cell.len() == nlev));
            if !regular || nlev == 0 {
                return Err(FaError::invalid_metadata(format!(
                    "field {} is not a regular {}x{}xN cube",
                    name, nx, ny
                )));
            }
            Ok(Array3::from_shape_fn((nlev, ny, nx), |(k, j, i)| cube[i][j][k]))
        }
        RawValues::Flat(v) => {
            let plane = nx * ny;
            if plane == 0 || v.is_empty() || v.len() % plane != 0 {
                return Err(FaError::invalid_metadata(format!(
                    "field {} has {} values, not a multiple of the {}x{} grid",
                    name,
                    v.len(),
                    ny,
                    nx
                )));
            }
            // Level-major planes, each row-major
            Ok(Array3::from_shape_vec((v.len() / plane, ny, nx), v.clone())?)
        }
        RawValues::Nested2(_) => Err(FaError::invalid_metadata(format!(
            "field {} was decoded on a single level",
            name
        ))),
        RawValues::Labeled { dims: d, data } => {
            let var = Variable {
                dims: d.clone(),
                data: data.clone(),
            }
            .transposed(&[
                dims::LEVEL.to_string(),
                dims::Y.to_string(),
                dims::X.to_string(),
            ])?;
            Ok(var.data.into_dimensionality()?)
        }
    }
}

fn check_columns(found: usize, nx: usize, name: &str) -> Result<()> {
    if found != nx {
        return Err(FaError::invalid_metadata(format!(
            "field {} has {} columns but there are {} x coordinates",
            name, found, nx
        )));
    }
    Ok(())
}

/// Gather pseudo-3D levels into one 3D variable per basename.
///
/// Each basename with at least two imported levels becomes a
/// `(level, y, x)` variable spanning `1..=nlev` (or the existing level
/// coordinate), NaN where the level was not imported. The per-level
/// variables are dropped. Single imported levels are left alone.
pub fn consolidate_pseudo_3d(ds: &Dataset, catalog: &FieldCatalog) -> Result<Dataset> {
    let mut groups: BTreeMap<String, Vec<(u32, String)>> = BTreeMap::new();
    for name in ds.fieldnames() {
        if !catalog.pseudo_3d_names().contains(&name) || !ds.is_2d_field(&name) {
            continue;
        }
        if let Some(class) = catalog.class_of(&name) {
            if let (Some(basename), Some(level)) = (class.basename(), class.level()) {
                groups
                    .entry(basename.to_string())
                    .or_default()
                    .push((level, name.clone()));
            }
        }
    }
    groups.retain(|_, members| members.len() >= 2);

    let mut out = ds.clone();
    if groups.is_empty() {
        debug!("No pseudo-3D groups to consolidate");
        return Ok(out);
    }

    let levels: Vec<i64> = match ds.coord(dims::LEVEL) {
        Some(CoordValues::Int(values)) => values.clone(),
        Some(other) => other.to_f64_vec().iter().map(|v| *v as i64).collect(),
        None => {
            let levels: Vec<i64> = (1..=catalog.nlev() as i64).collect();
            out.set_coord(dims::LEVEL, CoordValues::Int(levels.clone()))?;
            levels
        }
    };

    for (basename, members) in groups {
        if out.has_coord(&basename) || out.var(&basename).is_some() {
            warn!(basename = %basename, "Name already taken, pseudo-3D levels left unconsolidated");
            continue;
        }

        let first = &members[0].1;
        let template = out
            .var(first)
            .ok_or_else(|| FaError::invalid_metadata(format!("variable {} vanished", first)))?;
        let leading_dims: Vec<String> = template
            .dims
            .iter()
            .filter(|d| *d != dims::Y && *d != dims::X)
            .cloned()
            .collect();

        let mut shape = template.data.shape().to_vec();
        let level_axis = shape.len() - 2;
        shape.insert(level_axis, levels.len());
        let mut cube = ArrayD::from_elem(shape, f64::NAN);

        for (level, name) in &members {
            let Some(idx) = levels.iter().position(|l| *l == *level as i64) else {
                warn!(field = %name, level, "Level outside the level coordinate, not consolidated");
                continue;
            };
            if let Some(var) = out.remove_var(name) {
                let mut order = leading_dims.clone();
                order.push(dims::Y.to_string());
                order.push(dims::X.to_string());
                let var = var.transposed(&order)?;
                cube.index_axis_mut(Axis(level_axis), idx).assign(&var.data);
            }
        }

        let mut var_dims: Vec<&str> = leading_dims.iter().map(|s| s.as_str()).collect();
        var_dims.extend([dims::LEVEL, dims::Y, dims::X]);
        info!(
            basename = %basename,
            present = members.len(),
            levels = levels.len(),
            "Consolidated pseudo-3D field"
        );
        out.insert_var(&basename, Variable::new(&var_dims, cube)?)?;
    }

    Ok(out)
}

/// Integer-truncated minimum of a variable (NaN skipped).
pub fn truncated_min(var: &Variable) -> Option<i64> {
    var.min().map(|v| v.trunc() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::{resolve, FieldSelection};
    use serde_json::json;

    fn metadata(nlev: i64) -> FaMetadata {
        FaMetadata::from_json(&json!({
            "origin": "FIXTURE",
            "validate": "2024-01-10 06:00:00",
            "basedate": "2024-01-10 00:00:00",
            "nx": 3, "ny": 2, "nlev": nlev,
            "A_list": [0.0, 1.0], "B_list": [1.0, 0.0]
        }))
        .unwrap()
    }

    fn catalog() -> FieldCatalog {
        FieldCatalog::classify(
            &[
                "CLSTEMPERATURE",
                "S001WIND.U.PHYS",
                "S002WIND.U.PHYS",
                "S001RAYT SOL CL",
                "S002RAYT SOL CL",
                "S004RAYT SOL CL",
            ],
            2,
        )
        .unwrap()
    }

    fn raw() -> RawFieldData {
        let mut fields = BTreeMap::new();
        fields.insert(
            "CLSTEMPERATURE".to_string(),
            RawField {
                kind: Some(FieldKind::TwoD),
                values: RawValues::Flat(vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0]),
            },
        );
        // [x][y][level]
        let cube = (0..3)
            .map(|i| {
                (0..2)
                    .map(|j| (0..2).map(|k| (k * 100 + j * 10 + i) as f64).collect())
                    .collect()
            })
            .collect();
        fields.insert(
            "WIND.U.PHYS".to_string(),
            RawField {
                kind: Some(FieldKind::ThreeD),
                values: RawValues::Nested3(cube),
            },
        );
        RawFieldData {
            xcoords: vec![0.0, 1.0, 2.0],
            ycoords: vec![0.0, 1.0],
            zcoords: None,
            fields,
        }
    }

    #[test]
    fn test_assemble_dimension_order() {
        let catalog = catalog();
        let md = metadata(2);
        let selection = resolve(
            &catalog,
            &FieldSelection::only(["CLSTEMPERATURE", "WIND.U.PHYS"]),
            "FIXTURE",
            10,
        )
        .unwrap();
        let ds = GridAssembler::new(&catalog, &md).assemble(&selection, raw()).unwrap();

        let t = ds.var("CLSTEMPERATURE").unwrap();
        assert_eq!(t.dims, vec!["y", "x"]);
        assert_eq!(t.data[[1, 0]], 10.0);
        assert_eq!(t.data[[0, 2]], 2.0);

        let w = ds.var("WIND.U.PHYS").unwrap();
        assert_eq!(w.dims, vec!["level", "y", "x"]);
        assert_eq!(w.data.shape(), &[2, 2, 3]);
        assert_eq!(w.data[[1, 1, 2]], 112.0);
        assert_eq!(ds.coord(dims::LEVEL), Some(&CoordValues::Int(vec![1, 2])));
        assert_eq!(ds.attr("origin").and_then(|a| a.as_str()), Some("FIXTURE"));
    }

    #[test]
    fn test_assemble_wrong_size_is_invalid() {
        let catalog = catalog();
        let md = metadata(2);
        let selection = resolve(&catalog, &FieldSelection::only(["CLSTEMPERATURE"]), "F", 10).unwrap();
        let mut data = raw();
        data.fields.get_mut("CLSTEMPERATURE").unwrap().values = RawValues::Flat(vec![1.0; 5]);
        assert!(matches!(
            GridAssembler::new(&catalog, &md).assemble(&selection, data),
            Err(FaError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_assemble_without_data_is_field_not_found() {
        let catalog = catalog();
        let md = metadata(2);
        let selection = resolve(&catalog, &FieldSelection::only(["CLSTEMPERATURE"]), "F", 10).unwrap();
        let mut data = raw();
        data.fields.clear();
        assert!(matches!(
            GridAssembler::new(&catalog, &md).assemble(&selection, data),
            Err(FaError::FieldNotFound(_))
        ));
    }

    #[test]
    fn test_level_count_mismatch() {
        let catalog = catalog();
        let md = metadata(5);
        let selection = resolve(&catalog, &FieldSelection::only(["CLSTEMPERATURE"]), "F", 10).unwrap();
        assert!(matches!(
            GridAssembler::new(&catalog, &md).assemble(&selection, raw()),
            Err(FaError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_consolidate_pseudo_3d() {
        let catalog = FieldCatalog::classify(
            &["S001RAYT SOL CL", "S003RAYT SOL CL", "S002OTHER", "CLSTEMPERATURE"],
            4,
        )
        .unwrap();
        let mut ds = Dataset::new();
        ds.set_coord(dims::X, CoordValues::Float(vec![0.0, 1.0])).unwrap();
        ds.set_coord(dims::Y, CoordValues::Float(vec![0.0])).unwrap();
        for (name, v) in [("S001RAYT SOL CL", 1.0), ("S003RAYT SOL CL", 3.0), ("S002OTHER", 2.0)] {
            let data = Array2::from_elem((1, 2), v).into_dyn();
            ds.insert_var(name, Variable::new(&[dims::Y, dims::X], data).unwrap())
                .unwrap();
        }

        let out = consolidate_pseudo_3d(&ds, &catalog).unwrap();
        assert!(out.var("S001RAYT SOL CL").is_none());
        assert!(out.var("S003RAYT SOL CL").is_none());
        // A lone level stays 2D
        assert!(out.is_2d_field("S002OTHER"));

        let cube = out.var("RAYT SOL CL").unwrap();
        assert_eq!(cube.dims, vec!["level", "y", "x"]);
        assert_eq!(cube.data.shape(), &[4, 1, 2]);
        assert_eq!(cube.data[[0, 0, 1]], 1.0);
        assert!(cube.data[[1, 0, 0]].is_nan());
        assert_eq!(cube.data[[2, 0, 0]], 3.0);
        assert!(cube.data[[3, 0, 1]].is_nan());
        assert_eq!(out.coord(dims::LEVEL), Some(&CoordValues::Int(vec![1, 2, 3, 4])));
    }

    #[test]
    fn test_truncated_min() {
        let data = Array2::from_shape_vec((1, 3), vec![-5.7, 0.2, 9.9]).unwrap().into_dyn();
        let var = Variable::new(&[dims::Y, dims::X], data).unwrap();
        assert_eq!(truncated_min(&var), Some(-5));

        let missing = Array2::from_elem((1, 2), f64::NAN).into_dyn();
        let empty = Variable::new(&[dims::Y, dims::X], missing).unwrap();
        assert_eq!(truncated_min(&empty), None);
    }
}
