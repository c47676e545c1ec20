//! Per-import scratch directories.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::FaConfig;
use crate::error::{FaError, Result};

/// Attempts at finding a free directory name before giving up.
const MAX_NAME_ROUNDS: usize = 16;

/// A scratch directory removed (recursively) when dropped.
///
/// The name is `prefix` when free, otherwise `prefix` followed by four
/// random uppercase alphanumeric characters. Creation itself is the
/// existence check, so concurrent callers never share a directory.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    keep: bool,
}

impl ScratchDir {
    pub fn create(location: &Path, prefix: &str) -> Result<Self> {
        let mut candidate = location.join(prefix);
        for _ in 0..MAX_NAME_ROUNDS {
            match std::fs::create_dir(&candidate) {
                Ok(()) => {
                    debug!(path = %candidate.display(), "Created scratch directory");
                    return Ok(Self {
                        path: candidate,
                        keep: false,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    candidate = location.join(format!("{}{}", prefix, random_suffix()));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(FaError::Io(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!(
                "no free scratch directory name for {} in {}",
                prefix,
                location.display()
            ),
        )))
    }

    /// Scratch directory as configured; kept on disk when `keep_scratch` is set.
    pub fn from_config(config: &FaConfig) -> Result<Self> {
        let mut dir = Self::create(&config.scratch_location, &config.scratch_prefix)?;
        if config.keep_scratch {
            dir.keep();
        }
        Ok(dir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.path.join(name)
    }

    /// Leave the directory in place when dropped.
    pub fn keep(&mut self) {
        self.keep = true;
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.keep {
            info!(path = %self.path.display(), "Keeping scratch directory");
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed scratch directory"),
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove scratch directory"
            ),
        }
    }
}

fn random_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..4].to_uppercase()
}
