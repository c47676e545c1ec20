//! Time dimension normalization.
//!
//! A freshly assembled dataset carries `validate`, `basedate` and `leadtime`
//! as scalar attributes. Promotion turns the two timestamps into singleton
//! coordinates and removes all three attributes, so datasets can later be
//! concatenated along `validate`. `leadtime` is derived on demand from the
//! coordinates ([`Dataset::leadtime`]).

use ndarray::Axis;
use tracing::debug;

use crate::dataset::{attrs, dims, AttrValue, CoordValues, Dataset, Variable};
use crate::error::{FaError, Result};

/// Promote scalar time attributes to singleton coordinates.
///
/// Idempotent: an already promoted dataset only has stale time attributes
/// removed.
pub fn promote_time_coords(mut ds: Dataset) -> Result<Dataset> {
    for (attr, dim) in [
        (attrs::BASEDATE, dims::BASEDATE),
        (attrs::VALIDATE, dims::VALIDATE),
    ] {
        if ds.has_coord(dim) {
            ds.remove_attr(attr);
            continue;
        }
        let value = match ds.remove_attr(attr) {
            Some(AttrValue::Time(t)) => t,
            Some(other) => {
                return Err(FaError::invalid_metadata(format!(
                    "attribute {} is not a timestamp: {}",
                    attr, other
                )))
            }
            None => {
                return Err(FaError::invalid_metadata(format!(
                    "dataset has no {} to promote",
                    attr
                )))
            }
        };
        ds.set_coord(dim, CoordValues::Time(vec![value]))?;
    }
    ds.remove_attr(attrs::LEADTIME);

    debug!(
        basedate = ?ds.basedate(),
        validate = ?ds.validate(),
        "Promoted time attributes to coordinates"
    );
    Ok(ds)
}

/// True when `validate` and `basedate` exist only as coordinates.
pub fn is_time_normalized(ds: &Dataset) -> bool {
    ds.has_coord(dims::VALIDATE)
        && ds.has_coord(dims::BASEDATE)
        && ds.attr(attrs::VALIDATE).is_none()
        && ds.attr(attrs::BASEDATE).is_none()
        && ds.attr(attrs::LEADTIME).is_none()
}

/// Give a variable leading `basedate` and `validate` axes of length one
/// where it lacks them.
pub(crate) fn with_time_axes(mut var: Variable) -> Variable {
    for dim in [dims::VALIDATE, dims::BASEDATE] {
        if !var.has_dim(dim) {
            var.data.insert_axis_inplace(Axis(0));
            var.dims.insert(0, dim.to_string());
        }
    }
    var
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use ndarray::Array2;

    fn t(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 11, 20)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn assembled() -> Dataset {
        let mut ds = Dataset::new();
        ds.set_coord(dims::X, CoordValues::Float(vec![0.0, 1.0])).unwrap();
        ds.set_coord(dims::Y, CoordValues::Float(vec![0.0])).unwrap();
        let data = Array2::from_elem((1, 2), 1.0).into_dyn();
        ds.insert_var("T", Variable::new(&[dims::Y, dims::X], data).unwrap())
            .unwrap();
        ds.set_attr(attrs::BASEDATE, AttrValue::Time(t(0)));
        ds.set_attr(attrs::VALIDATE, AttrValue::Time(t(14)));
        ds.set_attr(attrs::LEADTIME, AttrValue::Duration(Duration::hours(14)));
        ds
    }

    #[test]
    fn test_promote_moves_time_to_coords() {
        let ds = promote_time_coords(assembled()).unwrap();
        assert!(is_time_normalized(&ds));
        assert_eq!(ds.validate(), Some(vec![t(14)]));
        assert_eq!(ds.basedate(), Some(vec![t(0)]));
        assert_eq!(ds.leadtime(), Some(Duration::hours(14)));
        // Variables keep their spatial dims
        assert_eq!(ds.var("T").unwrap().dims, vec!["y", "x"]);
    }

    #[test]
    fn test_promote_is_idempotent() {
        let once = promote_time_coords(assembled()).unwrap();
        let twice = promote_time_coords(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_promote_without_timestamps_fails() {
        let mut ds = assembled();
        ds.remove_attr(attrs::VALIDATE);
        assert!(matches!(
            promote_time_coords(ds),
            Err(FaError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_with_time_axes() {
        let var = Variable::new(&[dims::Y, dims::X], Array2::zeros((2, 3)).into_dyn()).unwrap();
        let var = with_time_axes(var);
        assert_eq!(var.dims, vec!["basedate", "validate", "y", "x"]);
        assert_eq!(var.data.shape(), &[1, 1, 2, 3]);
    }
}
