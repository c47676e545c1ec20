//! Configuration for FA import.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::reproject::InterpolationMethod;

/// Configuration shared by the importer, the decoder and the reprojector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaConfig {
    /// Directory under which per-import scratch directories are created.
    pub scratch_location: PathBuf,

    /// Name of the scratch directory before collision suffixes.
    pub scratch_prefix: String,

    /// Leave scratch directories on disk after import (debugging).
    pub keep_scratch: bool,

    /// R script that decodes FA files into JSON/NetCDF.
    pub decoder_script: PathBuf,

    /// Explicit Rscript binary. Located through `R.home("bin")` when unset.
    pub rscript: Option<PathBuf>,

    /// Attempts when querying the R installation for its binary directory.
    pub interpreter_lookup_attempts: u32,

    /// Delay between interpreter lookup attempts in milliseconds.
    pub interpreter_retry_delay_ms: u64,

    /// Sentinel written into missing cells before reprojection.
    pub nodata: f64,

    /// Resampling method used by the reprojector.
    pub interpolation: InterpolationMethod,

    /// Number of available field names listed in "field not found" errors.
    pub max_listed_fields: usize,
}

impl Default for FaConfig {
    fn default() -> Self {
        Self {
            scratch_location: PathBuf::from("."),
            scratch_prefix: "tmp_fajson".to_string(),
            keep_scratch: false,
            decoder_script: PathBuf::from("rfa_scripts/fa_decode.R"),
            rscript: None,
            interpreter_lookup_attempts: 3,
            interpreter_retry_delay_ms: 500,
            nodata: -999.0,
            interpolation: InterpolationMethod::Bilinear,
            max_listed_fields: 100,
        }
    }
}

impl FaConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("FA_SCRATCH_DIR") {
            config.scratch_location = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("FA_SCRATCH_PREFIX") {
            config.scratch_prefix = val;
        }

        if let Ok(val) = std::env::var("FA_KEEP_SCRATCH") {
            config.keep_scratch = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("FA_DECODER_SCRIPT") {
            config.decoder_script = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("FA_RSCRIPT") {
            if !val.is_empty() {
                config.rscript = Some(PathBuf::from(val));
            }
        }

        if let Ok(val) = std::env::var("FA_INTERPRETER_ATTEMPTS") {
            if let Ok(n) = val.parse() {
                config.interpreter_lookup_attempts = n;
            }
        }

        if let Ok(val) = std::env::var("FA_INTERPRETER_RETRY_MS") {
            if let Ok(ms) = val.parse() {
                config.interpreter_retry_delay_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("FA_NODATA") {
            if let Ok(nodata) = val.parse() {
                config.nodata = nodata;
            }
        }

        if let Ok(val) = std::env::var("FA_INTERPOLATION") {
            config.interpolation = InterpolationMethod::from_str(&val);
        }

        if let Ok(val) = std::env::var("FA_MAX_LISTED_FIELDS") {
            if let Ok(n) = val.parse() {
                config.max_listed_fields = n;
            }
        }

        config
    }

    /// Load configuration from a YAML file. Missing keys keep their defaults.
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.scratch_prefix.is_empty() {
            return Err("scratch_prefix must not be empty".to_string());
        }

        if self.scratch_prefix.contains(std::path::MAIN_SEPARATOR) {
            return Err("scratch_prefix must be a plain directory name".to_string());
        }

        if self.interpreter_lookup_attempts == 0 {
            return Err("interpreter_lookup_attempts must be > 0".to_string());
        }

        if !self.nodata.is_finite() || self.nodata.fract() != 0.0 {
            return Err(format!(
                "nodata must be an integer-valued number, got {}",
                self.nodata
            ));
        }

        if self.max_listed_fields == 0 {
            return Err("max_listed_fields must be > 0".to_string());
        }

        Ok(())
    }

    /// Delay between interpreter lookup attempts.
    pub fn interpreter_retry_delay(&self) -> Duration {
        Duration::from_millis(self.interpreter_retry_delay_ms)
    }
}
