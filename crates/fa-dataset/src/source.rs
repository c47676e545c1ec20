//! An opened FA file: its field records, metadata and classified catalog.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::catalog::{FieldCatalog, FieldRecord};
use crate::config::FaConfig;
use crate::contract::read_catalog_output;
use crate::decoder::{DecodeRequest, DecodeSelection, FaDecoder};
use crate::error::{FaError, Result};
use crate::metadata::FaMetadata;
use crate::scratch::ScratchDir;

/// Read-only description of one FA file.
#[derive(Debug, Clone)]
pub struct FaSource {
    path: PathBuf,
    records: Vec<FieldRecord>,
    metadata: FaMetadata,
    catalog: FieldCatalog,
}

impl FaSource {
    /// Run the decoder in metadata mode and classify the file's fields.
    pub fn open(path: impl AsRef<Path>, decoder: &dyn FaDecoder, config: &FaConfig) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(FaError::SourceNotFound(path.to_path_buf()));
        }

        let scratch = ScratchDir::from_config(config)?;
        decoder.decode(&DecodeRequest {
            source: path,
            selection: DecodeSelection::Metadata,
            output_dir: scratch.path(),
        })?;
        let (records, metadata) = read_catalog_output(scratch.path())?;

        let source = Self::from_parts(path, records, metadata)?;
        info!(
            source = %source.name(),
            fields = source.catalog.len(),
            nlev = source.catalog.nlev(),
            decoder = decoder.name(),
            "Opened FA file"
        );
        Ok(source)
    }

    /// Build from already decoded catalog output.
    ///
    /// Duplicate records keep the last occurrence. Empty `origin`/`filepath`
    /// metadata is filled in from `path`.
    pub fn from_parts(
        path: impl Into<PathBuf>,
        records: Vec<FieldRecord>,
        mut metadata: FaMetadata,
    ) -> Result<Self> {
        let path = path.into();
        if records.is_empty() {
            return Err(FaError::EmptyCatalog(path.display().to_string()));
        }
        let catalog = FieldCatalog::from_records(&records, metadata.nlev)?;

        let mut unique: Vec<FieldRecord> = Vec::with_capacity(records.len());
        let mut position: HashMap<String, usize> = HashMap::new();
        for record in records {
            match position.get(&record.name) {
                Some(&i) => unique[i] = record,
                None => {
                    position.insert(record.name.clone(), unique.len());
                    unique.push(record);
                }
            }
        }

        if metadata.origin.is_empty() {
            metadata.origin = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
        }
        if metadata.filepath.is_empty() {
            metadata.filepath = path.display().to_string();
        }

        Ok(Self {
            path,
            records: unique,
            metadata,
            catalog,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.metadata.origin
    }

    pub fn records(&self) -> &[FieldRecord] {
        &self.records
    }

    pub fn record(&self, name: &str) -> Option<&FieldRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn metadata(&self) -> &FaMetadata {
        &self.metadata
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata() -> FaMetadata {
        FaMetadata::from_json(&json!({
            "validate": "2024-01-10 06:00:00",
            "basedate": "2024-01-10 00:00:00",
            "nx": 2, "ny": 2, "nlev": 2,
            "A_list": [0, 1], "B_list": [1, 0]
        }))
        .unwrap()
    }

    #[test]
    fn test_duplicates_keep_last_record() {
        let mut second = FieldRecord::new("CLSTEMPERATURE");
        second.nbits = Some(16);
        let records = vec![
            FieldRecord::new("CLSTEMPERATURE"),
            FieldRecord::new("S001TKE"),
            second,
        ];
        let source = FaSource::from_parts("/data/ICMSHAR13+0014", records, metadata()).unwrap();
        assert_eq!(source.records().len(), 2);
        assert_eq!(source.record("CLSTEMPERATURE").unwrap().nbits, Some(16));
        assert_eq!(source.catalog().duplicates(), &["CLSTEMPERATURE".to_string()]);
        assert_eq!(source.name(), "ICMSHAR13+0014");
        assert_eq!(source.metadata().filepath, "/data/ICMSHAR13+0014");
    }

    #[test]
    fn test_empty_records() {
        assert!(matches!(
            FaSource::from_parts("/data/empty", Vec::new(), metadata()),
            Err(FaError::EmptyCatalog(_))
        ));
    }
}
