//! The external FA decoder.
//!
//! FA files are decoded by an R script. The decoder writes its results into
//! an output directory (see [`crate::contract`]); the importer reads them
//! only after the process has exited.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};

use crate::config::FaConfig;
use crate::error::{FaError, Result};

/// Selection argument understood by the decoder in metadata-only mode.
pub const METADATA_MODE: &str = "_metadata";

/// What the decoder should extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeSelection {
    /// Catalog and metadata only.
    Metadata,
    /// A single field, by full name or 3D basename.
    Field(String),
    /// JSON selection file written by the importer.
    SelectionFile(PathBuf),
}

impl DecodeSelection {
    /// Positional command-line argument.
    pub fn as_arg(&self) -> OsString {
        match self {
            DecodeSelection::Metadata => OsString::from(METADATA_MODE),
            DecodeSelection::Field(name) => OsString::from(name),
            DecodeSelection::SelectionFile(path) => path.clone().into_os_string(),
        }
    }
}

/// One decoder invocation.
#[derive(Debug, Clone)]
pub struct DecodeRequest<'a> {
    pub source: &'a Path,
    pub selection: DecodeSelection,
    pub output_dir: &'a Path,
}

/// Something that turns an FA file into the decoder output files.
pub trait FaDecoder {
    /// Run to completion. Output files are validated by the caller, so an
    /// `Ok` return only means the decoder ran.
    fn decode(&self, request: &DecodeRequest<'_>) -> Result<()>;

    fn name(&self) -> &str {
        "decoder"
    }
}

/// Decoder running the R script through `Rscript`.
#[derive(Debug, Clone)]
pub struct RscriptDecoder {
    rscript: PathBuf,
    script: PathBuf,
}

impl RscriptDecoder {
    pub fn new(rscript: impl Into<PathBuf>, script: impl Into<PathBuf>) -> Self {
        Self {
            rscript: rscript.into(),
            script: script.into(),
        }
    }

    /// Decoder with the configured script and a located interpreter.
    pub fn from_config(config: &FaConfig) -> Result<Self> {
        let rscript = locate_rscript(config)?;
        Ok(Self::new(rscript, config.decoder_script.clone()))
    }

    pub fn rscript(&self) -> &Path {
        &self.rscript
    }

    pub fn script(&self) -> &Path {
        &self.script
    }
}

impl FaDecoder for RscriptDecoder {
    fn decode(&self, request: &DecodeRequest<'_>) -> Result<()> {
        if !self.script.is_file() {
            return Err(FaError::decode_failure(format!(
                "decoder script not found: {}",
                self.script.display()
            )));
        }

        info!(
            source = %request.source.display(),
            selection = ?request.selection,
            "Running FA decoder"
        );

        // Blocks until the process exits
        let output = Command::new(&self.rscript)
            .arg(&self.script)
            .arg(request.source)
            .arg(request.selection.as_arg())
            .arg(request.output_dir)
            .output()
            .map_err(|e| {
                FaError::decode_failure(format!(
                    "could not start {}: {}",
                    self.rscript.display(),
                    e
                ))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!(stdout = %stdout.trim(), "Decoder output");
        }
        if output.status.success() {
            debug!("Decoder finished");
        } else {
            warn!(
                status = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Decoder exited with an error"
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Rscript"
    }
}

fn rscript_binary() -> &'static str {
    if cfg!(windows) {
        "Rscript.exe"
    } else {
        "Rscript"
    }
}

/// Path of the `Rscript` binary.
///
/// The configured path wins. Otherwise the R installation is asked for its
/// binary directory, retried with a fixed delay since this is the one step
/// that can fail for transient reasons.
pub fn locate_rscript(config: &FaConfig) -> Result<PathBuf> {
    if let Some(path) = &config.rscript {
        return Ok(path.clone());
    }

    let attempts = config.interpreter_lookup_attempts.max(1);
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match query_r_home_bin() {
            Ok(bin) => {
                let rscript = bin.join(rscript_binary());
                debug!(path = %rscript.display(), attempt, "Located Rscript");
                return Ok(rscript);
            }
            Err(e) => {
                warn!(attempt, attempts, error = %e, "Could not locate the R installation");
                last_error = e;
            }
        }
        if attempt < attempts {
            std::thread::sleep(config.interpreter_retry_delay());
        }
    }

    Err(FaError::decode_failure(format!(
        "could not locate Rscript after {} attempts: {}",
        attempts, last_error
    )))
}

fn query_r_home_bin() -> std::result::Result<PathBuf, String> {
    let output = Command::new(rscript_binary())
        .args(["-e", "cat(R.home(\"bin\"))"])
        .output()
        .map_err(|e| e.to_string())?;
    if !output.status.success() {
        return Err(format!("Rscript exited with {:?}", output.status.code()));
    }
    parse_r_home_output(&String::from_utf8_lossy(&output.stdout))
        .ok_or_else(|| "empty answer from R.home(\"bin\")".to_string())
}

/// Accepts both `cat()` output and the quoted form R prints for a bare
/// `R.home("bin")` (`[1] "/usr/lib/R/bin"`).
fn parse_r_home_output(stdout: &str) -> Option<PathBuf> {
    let trimmed = stdout.trim();
    let path = match trimmed.split('"').nth(1) {
        Some(quoted) => quoted,
        None => trimmed,
    };
    (!path.is_empty()).then(|| PathBuf::from(path))
}
