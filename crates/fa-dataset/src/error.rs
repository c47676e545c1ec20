//! Error types for FA import, transformation and persistence.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while turning an FA file into a dataset.
///
/// Every variant aborts the current operation; none is retried.
#[derive(Error, Debug)]
pub enum FaError {
    /// Malformed or missing catalog/metadata content.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// The file declares zero fields.
    #[error("empty field catalog in {0}")]
    EmptyCatalog(String),

    /// A requested field is absent after whitelist/blacklist resolution.
    /// The message carries the list of available names.
    #[error("field not found: {0}")]
    FieldNotFound(String),

    /// Fewer than two datasets, or incompatible vertical coordinates.
    #[error("incompatible merge: {0}")]
    IncompatibleMerge(String),

    /// Reprojection attempted on a dataset without a source CRS.
    #[error("undefined projection: {0}")]
    UndefinedProjection(String),

    /// The external decoder did not produce usable output.
    #[error("external decoder failed: {0}")]
    ExternalDecodeFailure(String),

    /// The destination file exists and overwriting was not requested.
    #[error("output file already exists: {}", .0.display())]
    OutputExists(PathBuf),

    /// The FA file to open does not exist.
    #[error("FA file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// NetCDF library error.
    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    /// CRS parsing or transformation error.
    #[error("projection error: {0}")]
    Projection(#[from] projection::ProjectionError),
}

impl FaError {
    /// Create an InvalidMetadata error.
    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }

    /// Create a FieldNotFound error.
    pub fn field_not_found(msg: impl Into<String>) -> Self {
        Self::FieldNotFound(msg.into())
    }

    /// Create an IncompatibleMerge error.
    pub fn incompatible_merge(msg: impl Into<String>) -> Self {
        Self::IncompatibleMerge(msg.into())
    }

    /// Create an UndefinedProjection error.
    pub fn undefined_projection(msg: impl Into<String>) -> Self {
        Self::UndefinedProjection(msg.into())
    }

    /// Create an ExternalDecodeFailure error.
    pub fn decode_failure(msg: impl Into<String>) -> Self {
        Self::ExternalDecodeFailure(msg.into())
    }

    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<serde_json::Error> for FaError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidMetadata(err.to_string())
    }
}

impl From<ndarray::ShapeError> for FaError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::InvalidMetadata(format!("array shape mismatch: {}", err))
    }
}

impl From<serde_yaml::Error> for FaError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for FA dataset operations.
pub type Result<T> = std::result::Result<T, FaError>;
