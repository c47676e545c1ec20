//! Reprojection of datasets between coordinate reference systems.
//!
//! The warp works on `(y, x)` planes only. Every other dimension is iterated
//! over, and its coordinate is carried to the result by label.

mod interpolation;

pub use interpolation::{bilinear_interpolate, nearest_interpolate, InterpolationMethod};

use ndarray::{ArrayD, IxDyn};
use projection::{epsg_code, Crs, Transformer};
use tracing::{debug, info};

use crate::config::FaConfig;
use crate::dataset::{attrs, dims, AttrValue, CoordValues, Dataset, Variable};
use crate::error::{FaError, Result};

/// Warps datasets onto a target CRS.
///
/// The output grid keeps the input pixel count. Its extent is the bounding
/// box of the transformed source perimeter.
#[derive(Debug, Clone, Copy)]
pub struct Reprojector {
    nodata: f64,
    method: InterpolationMethod,
}

impl Default for Reprojector {
    fn default() -> Self {
        Self::new(-999.0, InterpolationMethod::Bilinear)
    }
}

impl Reprojector {
    pub fn new(nodata: f64, method: InterpolationMethod) -> Self {
        Self { nodata, method }
    }

    pub fn from_config(config: &FaConfig) -> Self {
        Self::new(config.nodata, config.interpolation)
    }

    pub fn nodata(&self) -> f64 {
        self.nodata
    }

    pub fn method(&self) -> InterpolationMethod {
        self.method
    }

    /// Reproject `ds` onto `target` (`"EPSG:4326"`, a bare code or a PROJ4
    /// string).
    ///
    /// Missing cells go through the warp as the nodata sentinel and every
    /// sentinel cell of the result is NaN. A dataset already in the target
    /// CRS is returned with its values untouched.
    pub fn reproject(&self, ds: &Dataset, target: &str) -> Result<Dataset> {
        let src = source_crs(ds)?;
        let dst = Crs::parse(target)?;

        let xs = ds
            .x()
            .filter(|x| !x.is_empty())
            .ok_or_else(|| FaError::invalid_metadata("dataset has no x coordinate"))?
            .to_vec();
        let ys = ds
            .y()
            .filter(|y| !y.is_empty())
            .ok_or_else(|| FaError::invalid_metadata("dataset has no y coordinate"))?
            .to_vec();

        // Snapshot every non-spatial coordinate before the warp
        let mut out = Dataset::new();
        for (name, values) in ds.coords() {
            if name != dims::X && name != dims::Y {
                out.set_coord(name, values.clone())?;
            }
        }

        let transformer = Transformer::new(src, dst.clone());
        if transformer.is_identity() {
            debug!(target = %target, "Dataset already in target CRS, skipping warp");
            out.set_coord(dims::X, CoordValues::Float(xs))?;
            out.set_coord(dims::Y, CoordValues::Float(ys))?;
            for (name, var) in ds.data_vars() {
                out.insert_var(name, var.clone())?;
            }
        } else {
            let (min_x, min_y, max_x, max_y) =
                transformer.transform_bounds(&xs, &ys).ok_or_else(|| {
                    FaError::undefined_projection(format!(
                        "no point of the grid maps into {}",
                        target
                    ))
                })?;

            let out_x = linspace(min_x, max_x, xs.len(), is_ascending(&xs));
            let out_y = linspace(min_y, max_y, ys.len(), is_ascending(&ys));

            let lut = source_lookup(&transformer.inverse(), &xs, &ys, &out_x, &out_y)?;
            debug!(
                valid = lut.iter().filter(|c| c.is_some()).count(),
                total = lut.len(),
                "Computed reprojection lookup"
            );

            out.set_coord(dims::X, CoordValues::Float(out_x))?;
            out.set_coord(dims::Y, CoordValues::Float(out_y))?;
            for (name, var) in ds.data_vars() {
                let warped = self.warp_variable(var, &lut, xs.len(), ys.len())?;
                out.insert_var(name, warped)?;
            }
        }

        for (key, value) in ds.attrs() {
            out.set_attr(key, value.clone());
        }
        out.set_attr(attrs::PROJ4STR, AttrValue::Str(dst.to_proj4()));
        // The requested code wins: several codes share one built-in definition
        let label = match epsg_code(target) {
            Some(code) => format!("EPSG:{}", code),
            None => dst.to_string(),
        };
        out.set_attr(attrs::CRS, AttrValue::Str(label));

        info!(
            target = %target,
            method = %self.method,
            fields = out.data_vars().len(),
            "Reprojected dataset"
        );
        Ok(out)
    }

    /// Warp every `(y, x)` plane of a variable through the lookup table.
    fn warp_variable(
        &self,
        var: &Variable,
        lut: &[Option<(f64, f64)>],
        width: usize,
        height: usize,
    ) -> Result<Variable> {
        if !var.has_dim(dims::X) || !var.has_dim(dims::Y) {
            return Ok(var.clone());
        }

        let original = var.dims.clone();
        let mut order: Vec<String> = original
            .iter()
            .filter(|d| *d != dims::X && *d != dims::Y)
            .cloned()
            .collect();
        order.push(dims::Y.to_string());
        order.push(dims::X.to_string());

        let planar = var.clone().transposed(&order)?;
        let shape = planar.data.shape().to_vec();

        let values: Vec<f64> = planar
            .data
            .iter()
            .map(|v| if v.is_nan() { self.nodata } else { *v })
            .collect();

        let mut warped = Vec::with_capacity(values.len());
        for plane in values.chunks(width * height) {
            for cell in lut {
                let value = match cell {
                    Some((col, row)) => {
                        self.method
                            .sample(plane, width, height, *col, *row, self.nodata)
                    }
                    None => self.nodata,
                };
                warped.push(if value == self.nodata { f64::NAN } else { value });
            }
        }

        let data = ArrayD::from_shape_vec(IxDyn(&shape), warped)?;
        Variable { dims: order, data }.transposed(&original)
    }
}

/// Reproject with the nodata value and method from `config`.
pub fn reproject(ds: &Dataset, target: &str, config: &FaConfig) -> Result<Dataset> {
    Reprojector::from_config(config).reproject(ds, target)
}

/// CRS of a dataset, from its `proj4str` attribute or else its `crs`
/// attribute.
pub fn source_crs(ds: &Dataset) -> Result<Crs> {
    let definition = ds
        .proj4str()
        .or_else(|| ds.attr(attrs::CRS).and_then(|a| a.as_str()))
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            FaError::undefined_projection("dataset has no proj4str or crs attribute")
        })?;
    Ok(Crs::parse(definition)?)
}

/// Regularly spaced source axis, mapping coordinates to fractional indices.
struct RegularAxis {
    start: f64,
    step: f64,
}

impl RegularAxis {
    fn new(values: &[f64], name: &str) -> Result<Self> {
        let first = values[0];
        let last = values[values.len() - 1];
        if values.len() == 1 {
            return Ok(Self {
                start: first,
                step: 1.0,
            });
        }
        let step = (last - first) / (values.len() - 1) as f64;
        if step == 0.0 || !step.is_finite() {
            return Err(FaError::invalid_metadata(format!(
                "coordinate {} is degenerate",
                name
            )));
        }
        Ok(Self { start: first, step })
    }

    fn index_of(&self, value: f64) -> f64 {
        (value - self.start) / self.step
    }
}

/// Fractional source `(col, row)` for every output cell, row-major.
fn source_lookup(
    inverse: &Transformer,
    src_x: &[f64],
    src_y: &[f64],
    out_x: &[f64],
    out_y: &[f64],
) -> Result<Vec<Option<(f64, f64)>>> {
    let axis_x = RegularAxis::new(src_x, dims::X)?;
    let axis_y = RegularAxis::new(src_y, dims::Y)?;

    let mut lut = Vec::with_capacity(out_x.len() * out_y.len());
    for &y in out_y {
        for &x in out_x {
            lut.push(
                inverse
                    .transform(x, y)
                    .map(|(sx, sy)| (axis_x.index_of(sx), axis_y.index_of(sy))),
            );
        }
    }
    Ok(lut)
}

fn is_ascending(values: &[f64]) -> bool {
    values.len() < 2 || values[values.len() - 1] >= values[0]
}

fn linspace(min: f64, max: f64, n: usize, ascending: bool) -> Vec<f64> {
    if n == 1 {
        return vec![(min + max) / 2.0];
    }
    let step = (max - min) / (n - 1) as f64;
    let values = (0..n).map(|i| min + step * i as f64);
    if ascending {
        values.collect()
    } else {
        values.rev().collect()
    }
}
