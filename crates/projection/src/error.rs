//! Projection error types.

use thiserror::Error;

/// Errors raised while parsing or applying a CRS definition.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    /// The `+proj=` name is not one of the supported projections.
    #[error("unsupported projection: {0}")]
    UnsupportedProjection(String),

    /// The EPSG code has no built-in definition.
    #[error("unsupported EPSG code: EPSG:{0}")]
    UnsupportedEpsg(u32),

    /// A required PROJ4 parameter is absent.
    #[error("missing projection parameter: +{0}")]
    MissingParameter(String),

    /// A PROJ4 parameter could not be parsed as a number or is out of range.
    #[error("invalid projection parameter +{name}={value}")]
    InvalidParameter { name: String, value: String },

    /// The string is neither a PROJ4 definition nor an EPSG reference.
    #[error("invalid CRS definition: {0}")]
    InvalidCrs(String),
}

impl ProjectionError {
    /// Create an InvalidParameter error.
    pub fn invalid_parameter(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
