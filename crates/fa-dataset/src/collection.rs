//! Merging several single-file datasets along the validity time.
//!
//! Members must share the hybrid-level definition (`A_list`/`B_list`). They
//! are time-normalized, sorted by validity time and concatenated along
//! `validate`; every other coordinate is outer-joined, so a field missing
//! from a member is NaN over that member's slice.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDateTime;
use ndarray::{ArrayD, IxDyn};
use tracing::{debug, info, warn};

use crate::dataset::{attrs, canonical_order, dims, AttrValue, CoordValues, Dataset, Variable};
use crate::error::{FaError, Result};
use crate::time::{promote_time_coords, with_time_axes};

/// Attributes describing a single file or a single time, never carried as
/// merged attributes.
const PER_MEMBER_ATTRS: &[&str] = &[
    attrs::ORIGIN,
    attrs::FILEPATH,
    attrs::ORIGINS,
    attrs::FILEPATHS,
    attrs::VALIDATE,
    attrs::BASEDATE,
    attrs::LEADTIME,
];

/// Ordered datasets plus their merged form once computed.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    datasets: Vec<Dataset>,
    merged: Option<Dataset>,
}

impl Collection {
    pub fn new(datasets: Vec<Dataset>) -> Self {
        Self {
            datasets,
            merged: None,
        }
    }

    /// Add a dataset. Invalidates a previous merge.
    pub fn push(&mut self, ds: Dataset) {
        self.datasets.push(ds);
        self.merged = None;
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn datasets(&self) -> &[Dataset] {
        &self.datasets
    }

    pub fn merged(&self) -> Option<&Dataset> {
        self.merged.as_ref()
    }

    /// Merge the members by validity time and keep the result.
    pub fn merge(&mut self) -> Result<&Dataset> {
        let merged = merge_by_validate(self.datasets.clone())?;
        Ok(&*self.merged.insert(merged))
    }

    pub fn into_merged(self) -> Result<Dataset> {
        match self.merged {
            Some(ds) => Ok(ds),
            None => merge_by_validate(self.datasets),
        }
    }
}

/// Merge two or more datasets along `validate`.
pub fn merge_by_validate(datasets: Vec<Dataset>) -> Result<Dataset> {
    if datasets.len() < 2 {
        return Err(FaError::incompatible_merge(format!(
            "combine requires at least 2 datasets, got {}",
            datasets.len()
        )));
    }
    check_vertical_definitions(&datasets)?;

    let mut members = datasets
        .into_iter()
        .map(promote_time_coords)
        .collect::<Result<Vec<_>>>()?;
    members.sort_by_key(first_validate);

    let mut merged = Dataset::new();

    // validate is concatenated, every other coordinate outer-joined
    let mut validates: Vec<NaiveDateTime> = Vec::new();
    let mut offsets = Vec::with_capacity(members.len());
    for member in &members {
        offsets.push(validates.len());
        validates.extend(member.validate().unwrap_or_default());
    }
    merged.set_coord(dims::VALIDATE, CoordValues::Time(validates))?;

    let coord_names: BTreeSet<String> = members
        .iter()
        .flat_map(|m| m.coords().keys().cloned())
        .filter(|name| name != dims::VALIDATE)
        .collect();
    for name in &coord_names {
        let values: Vec<&CoordValues> = members.iter().filter_map(|m| m.coord(name)).collect();
        merged.set_coord(name, union_coord(name, &values)?)?;
    }

    let var_names: BTreeSet<String> = members.iter().flat_map(|m| m.fieldnames()).collect();
    for name in &var_names {
        let var = merge_variable(name, &members, &offsets, &merged)?;
        merged.insert_var(name, var)?;
    }

    merge_attrs(&members, &mut merged);

    info!(
        members = members.len(),
        validates = merged.dim_len(dims::VALIDATE).unwrap_or(0),
        fields = merged.data_vars().len(),
        "Merged datasets by validate"
    );
    Ok(merged)
}

fn check_vertical_definitions(datasets: &[Dataset]) -> Result<()> {
    let reference = &datasets[0];
    for (i, ds) in datasets.iter().enumerate().skip(1) {
        for key in [attrs::A_LIST, attrs::B_LIST] {
            if ds.attr(key) != reference.attr(key) {
                return Err(FaError::incompatible_merge(format!(
                    "incompatible vertical coordinate definitions: {} of dataset {} differs from dataset 0",
                    key, i
                )));
            }
        }
    }
    Ok(())
}

fn first_validate(ds: &Dataset) -> Option<NaiveDateTime> {
    ds.validate().and_then(|v| v.first().copied())
}

/// Identical coordinates are kept; otherwise the sorted union, ordered like
/// the first member's axis.
fn union_coord(name: &str, values: &[&CoordValues]) -> Result<CoordValues> {
    let first = values[0];
    if values.iter().all(|v| *v == first) {
        return Ok(first.clone());
    }
    debug!(coord = %name, "Outer-joining differing coordinate");

    match first {
        CoordValues::Float(f) => {
            let mut all = Vec::new();
            for v in values {
                all.extend_from_slice(v.as_floats().ok_or_else(|| mixed_types(name))?);
            }
            all.sort_by(|a, b| a.total_cmp(b));
            all.dedup();
            Ok(CoordValues::Float(orient(all, descending(f))))
        }
        CoordValues::Int(i) => {
            let mut all = BTreeSet::new();
            for v in values {
                all.extend(v.as_ints().ok_or_else(|| mixed_types(name))?.iter().copied());
            }
            Ok(CoordValues::Int(orient(all.into_iter().collect(), descending(i))))
        }
        CoordValues::Time(t) => {
            let mut all = BTreeSet::new();
            for v in values {
                all.extend(v.as_times().ok_or_else(|| mixed_types(name))?.iter().copied());
            }
            Ok(CoordValues::Time(orient(all.into_iter().collect(), descending(t))))
        }
    }
}

fn mixed_types(name: &str) -> FaError {
    FaError::incompatible_merge(format!("coordinate {} has different types across datasets", name))
}

fn descending<T: PartialOrd>(values: &[T]) -> bool {
    values.len() >= 2 && values[values.len() - 1] < values[0]
}

fn orient<T>(mut sorted: Vec<T>, descending: bool) -> Vec<T> {
    if descending {
        sorted.reverse();
    }
    sorted
}

/// Positions of a member's coordinate values inside the merged coordinate.
fn positions(name: &str, member: &CoordValues, merged: &CoordValues) -> Result<Vec<usize>> {
    let missing = || FaError::incompatible_merge(format!("coordinate {} could not be aligned", name));
    match (member, merged) {
        (CoordValues::Float(m), CoordValues::Float(all)) => {
            let index: HashMap<u64, usize> =
                all.iter().enumerate().map(|(i, v)| (v.to_bits(), i)).collect();
            m.iter()
                .map(|v| index.get(&v.to_bits()).copied().ok_or_else(missing))
                .collect()
        }
        (CoordValues::Int(m), CoordValues::Int(all)) => {
            let index: HashMap<i64, usize> = all.iter().enumerate().map(|(i, v)| (*v, i)).collect();
            m.iter()
                .map(|v| index.get(v).copied().ok_or_else(missing))
                .collect()
        }
        (CoordValues::Time(m), CoordValues::Time(all)) => {
            let index: BTreeMap<NaiveDateTime, usize> =
                all.iter().enumerate().map(|(i, v)| (*v, i)).collect();
            m.iter()
                .map(|v| index.get(v).copied().ok_or_else(missing))
                .collect()
        }
        _ => Err(mixed_types(name)),
    }
}

/// Outer-joined variable over the merged coordinates.
fn merge_variable(
    name: &str,
    members: &[Dataset],
    offsets: &[usize],
    merged: &Dataset,
) -> Result<Variable> {
    let parts: Vec<(usize, &Dataset, Variable)> = members
        .iter()
        .enumerate()
        .filter_map(|(i, m)| m.var(name).map(|v| (i, m, with_time_axes(v.clone()))))
        .collect();

    let dim_set: BTreeSet<&String> = parts.iter().flat_map(|(_, _, v)| v.dims.iter()).collect();
    let order = canonical_order(&dim_set.into_iter().cloned().collect::<Vec<_>>());

    let shape = order
        .iter()
        .map(|d| {
            merged
                .dim_len(d)
                .ok_or_else(|| FaError::incompatible_merge(format!("no merged coordinate for {}", d)))
        })
        .collect::<Result<Vec<_>>>()?;
    let mut out = ArrayD::from_elem(IxDyn(&shape), f64::NAN);

    for (i, member, var) in parts {
        if var.dims.len() != order.len() {
            return Err(FaError::incompatible_merge(format!(
                "field {} has dimensions {:?} in one dataset and {:?} in another",
                name, var.dims, order
            )));
        }
        let var = var.transposed(&order)?;

        let maps = order
            .iter()
            .map(|d| {
                if d == dims::VALIDATE {
                    let n = member.dim_len(d).unwrap_or(1);
                    return Ok((offsets[i]..offsets[i] + n).collect::<Vec<_>>());
                }
                match (member.coord(d), merged.coord(d)) {
                    (Some(own), Some(all)) => positions(d, own, all),
                    _ => Err(FaError::incompatible_merge(format!(
                        "field {} uses {} without a coordinate",
                        name, d
                    ))),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let mut target = vec![0usize; order.len()];
        for (idx, value) in var.data.indexed_iter() {
            for (axis, map) in maps.iter().enumerate() {
                target[axis] = map[idx[axis]];
            }
            out[IxDyn(&target)] = *value;
        }
    }

    Ok(Variable { dims: order, data: out })
}

fn member_list(ds: &Dataset, list_key: &str, single_key: &str) -> Vec<String> {
    match ds.attr(list_key) {
        Some(AttrValue::Strs(items)) => items.clone(),
        _ => ds
            .attr(single_key)
            .map(|a| vec![a.to_string()])
            .unwrap_or_default(),
    }
}

fn merge_attrs(members: &[Dataset], merged: &mut Dataset) {
    let origins: Vec<String> = members
        .iter()
        .flat_map(|m| member_list(m, attrs::ORIGINS, attrs::ORIGIN))
        .collect();
    let filepaths: Vec<String> = members
        .iter()
        .flat_map(|m| member_list(m, attrs::FILEPATHS, attrs::FILEPATH))
        .collect();
    merged.set_attr(attrs::ORIGINS, AttrValue::Strs(origins));
    merged.set_attr(attrs::FILEPATHS, AttrValue::Strs(filepaths));

    let keys: BTreeSet<&String> = members.iter().flat_map(|m| m.attrs().keys()).collect();
    for key in keys {
        if PER_MEMBER_ATTRS.contains(&key.as_str()) {
            continue;
        }
        let values: Vec<&AttrValue> = members.iter().filter_map(|m| m.attr(key)).collect();
        if values.iter().all(|v| *v == values[0]) {
            merged.set_attr(key, values[0].clone());
        } else {
            warn!(attribute = %key, "Attribute differs between merged datasets, dropped");
        }
    }
}
