//! The import pipeline.
//!
//! `resolve → decode → assemble → promote time → [reproject] → [consolidate]`.
//! Each step is a public function of its own module; the importer only runs
//! them in order inside one scratch directory.

use std::path::Path;

use tracing::{debug, info};

use crate::assemble::{consolidate_pseudo_3d, GridAssembler};
use crate::collection::Collection;
use crate::config::FaConfig;
use crate::contract::{read_field_data, SELECTION_FILE};
use crate::dataset::Dataset;
use crate::decoder::{DecodeRequest, DecodeSelection, FaDecoder};
use crate::error::Result;
use crate::reproject::Reprojector;
use crate::scratch::ScratchDir;
use crate::selection::{not_found, resolve, FieldSelection, ResolvedSelection};
use crate::source::FaSource;
use crate::time::promote_time_coords;

/// Optional post-processing steps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportOptions {
    /// Target CRS (`EPSG:xxxx` or a PROJ4 string).
    pub reproject_to: Option<String>,
    /// Gather pseudo-3D levels into 3D variables.
    pub consolidate_pseudo_3d: bool,
}

impl ImportOptions {
    pub fn reproject_to(mut self, target: impl Into<String>) -> Self {
        self.reproject_to = Some(target.into());
        self
    }

    pub fn consolidated(mut self) -> Self {
        self.consolidate_pseudo_3d = true;
        self
    }
}

/// Imports FA files through a decoder.
pub struct Importer<'a> {
    decoder: &'a dyn FaDecoder,
    config: &'a FaConfig,
}

impl<'a> Importer<'a> {
    pub fn new(decoder: &'a dyn FaDecoder, config: &'a FaConfig) -> Self {
        Self { decoder, config }
    }

    /// Open a file in metadata mode.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<FaSource> {
        FaSource::open(path, self.decoder, self.config)
    }

    /// Import the selected fields of `source`.
    pub fn import(
        &self,
        source: &FaSource,
        selection: &FieldSelection,
        options: &ImportOptions,
    ) -> Result<Dataset> {
        let resolved = resolve(
            source.catalog(),
            selection,
            source.name(),
            self.config.max_listed_fields,
        )?;
        let decode_selection = |scratch: &ScratchDir| -> Result<DecodeSelection> {
            write_selection_file(scratch, &resolved)
        };
        self.run(source, &resolved, decode_selection, options)
    }

    /// Import a single field (full name or 3D basename).
    pub fn import_field(
        &self,
        source: &FaSource,
        name: &str,
        options: &ImportOptions,
    ) -> Result<Dataset> {
        let resolved = resolve(
            source.catalog(),
            &FieldSelection::only([name]),
            source.name(),
            self.config.max_listed_fields,
        )?;
        let names = resolved.decoder_names();
        let decode_selection = |scratch: &ScratchDir| -> Result<DecodeSelection> {
            match names.as_slice() {
                [single] => Ok(DecodeSelection::Field(single.clone())),
                // A pseudo-3D basename expands to several levels
                _ => write_selection_file(scratch, &resolved),
            }
        };
        self.run(source, &resolved, decode_selection, options)
    }

    /// Import every field of `source`.
    pub fn import_all(&self, source: &FaSource, options: &ImportOptions) -> Result<Dataset> {
        self.import(source, &FieldSelection::all(), options)
    }

    /// Open and import several files with the same selection.
    pub fn import_files<P: AsRef<Path>>(
        &self,
        paths: &[P],
        selection: &FieldSelection,
        options: &ImportOptions,
    ) -> Result<Collection> {
        let mut collection = Collection::default();
        for path in paths {
            let source = self.open(path)?;
            collection.push(self.import(&source, selection, options)?);
        }
        Ok(collection)
    }

    fn run(
        &self,
        source: &FaSource,
        resolved: &ResolvedSelection,
        decode_selection: impl FnOnce(&ScratchDir) -> Result<DecodeSelection>,
        options: &ImportOptions,
    ) -> Result<Dataset> {
        let scratch = ScratchDir::from_config(self.config)?;
        let selection = decode_selection(&scratch)?;
        self.decoder.decode(&DecodeRequest {
            source: source.path(),
            selection,
            output_dir: scratch.path(),
        })?;

        let data = match read_field_data(scratch.path())? {
            Some(data) => data,
            None => {
                return Err(not_found(
                    source.catalog(),
                    &resolved.decoder_names(),
                    source.name(),
                    self.config.max_listed_fields,
                ))
            }
        };
        // Everything needed from the scratch directory has been read
        drop(scratch);

        let mut ds = GridAssembler::new(source.catalog(), source.metadata())
            .with_max_listed(self.config.max_listed_fields)
            .assemble(resolved, data)?;
        ds = promote_time_coords(ds)?;

        if let Some(target) = &options.reproject_to {
            ds = Reprojector::from_config(self.config).reproject(&ds, target)?;
        }

        if options.consolidate_pseudo_3d {
            ds = consolidate_pseudo_3d(&ds, source.catalog())?;
        } else {
            let levels = resolved
                .fields_2d
                .iter()
                .filter(|n| source.catalog().pseudo_3d_names().contains(*n))
                .count();
            if levels > 1 {
                debug!(
                    source = %source.name(),
                    levels,
                    "Pseudo-3D levels kept as separate 2D variables"
                );
            }
        }

        info!(
            source = %source.name(),
            fields = ds.data_vars().len(),
            reprojected = options.reproject_to.is_some(),
            "Imported FA file"
        );
        Ok(ds)
    }
}

/// Write the resolved names as the decoder's selection file.
fn write_selection_file(scratch: &ScratchDir, resolved: &ResolvedSelection) -> Result<DecodeSelection> {
    let path = scratch.join(SELECTION_FILE);
    let request = FieldSelection::only(resolved.decoder_names());
    std::fs::write(&path, serde_json::to_string_pretty(&request)?)?;
    Ok(DecodeSelection::SelectionFile(path))
}
