//! FA (Fichier ARPEGE) files as labeled multidimensional datasets.
//!
//! This crate provides:
//! - Field catalog classification (2D, 3D, pseudo-3D)
//! - Dataset assembly from the external decoder's output
//! - Time dimension normalization
//! - Reprojection onto a target CRS
//! - Merging of several files along the validity time
//! - NetCDF persistence and a text description of FA files
//!
//! # Example
//!
//! ```ignore
//! use fa_dataset::{FaConfig, FieldSelection, ImportOptions, Importer, RscriptDecoder};
//!
//! let config = FaConfig::from_env();
//! let decoder = RscriptDecoder::from_config(&config)?;
//! let importer = Importer::new(&decoder, &config);
//!
//! let source = importer.open("ICMSHAR13+0014")?;
//! let ds = importer.import(
//!     &source,
//!     &FieldSelection::only(["CLSTEMPERATURE", "WIND.U.PHYS"]),
//!     &ImportOptions::default().reproject_to("EPSG:4326"),
//! )?;
//! fa_dataset::save_netcdf(&ds, "ICMSHAR13+0014.nc", false)?;
//! ```

pub mod assemble;
pub mod catalog;
pub mod collection;
pub mod config;
pub mod contract;
pub mod dataset;
pub mod decoder;
pub mod describe;
pub mod error;
pub mod importer;
pub mod metadata;
pub mod netcdf_io;
pub mod reproject;
pub mod scratch;
pub mod selection;
pub mod source;
pub mod time;

pub use assemble::{consolidate_pseudo_3d, truncated_min, GridAssembler};
pub use catalog::{FieldCatalog, FieldNameClass, FieldRecord};
pub use collection::{merge_by_validate, Collection};
pub use config::FaConfig;
pub use dataset::{AttrValue, CoordValues, Dataset, Variable};
pub use decoder::{locate_rscript, DecodeRequest, DecodeSelection, FaDecoder, RscriptDecoder};
pub use describe::{describe, FaDescription};
pub use error::{FaError, Result};
pub use importer::{ImportOptions, Importer};
pub use metadata::FaMetadata;
pub use netcdf_io::{read_netcdf, save_netcdf};
pub use reproject::{InterpolationMethod, Reprojector};
pub use scratch::ScratchDir;
pub use selection::{resolve, FieldSelection, ResolvedSelection};
pub use source::FaSource;
pub use time::{is_time_normalized, promote_time_coords};
