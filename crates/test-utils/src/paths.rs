//! Where tests find FA files, the decoder and scratch space.

use std::path::PathBuf;

/// Workspace root, two levels above this crate's manifest.
pub fn workspace_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    match manifest_dir.ancestors().nth(2) {
        Some(root) => root.to_path_buf(),
        None => manifest_dir,
    }
}

/// First existing candidate for a test file named `name`:
/// `$TEST_DATA_DIR/name`, then `crates/fa-dataset/testdata/name`, then
/// `testdata/name` at the workspace root.
pub fn find_test_file(name: &str) -> Option<PathBuf> {
    let root = workspace_root();
    std::env::var_os("TEST_DATA_DIR")
        .map(|dir| PathBuf::from(dir).join(name))
        .into_iter()
        .chain([
            root.join("crates/fa-dataset/testdata").join(name),
            root.join("testdata").join(name),
        ])
        .find(|path| path.exists())
}

/// The R decoder script, if present.
///
/// `FA_DECODER_SCRIPT` overrides the default `rfa_scripts/fa_decode.R`.
pub fn find_decoder_script() -> Option<PathBuf> {
    let path = match std::env::var("FA_DECODER_SCRIPT") {
        Ok(p) => PathBuf::from(p),
        Err(_) => workspace_root().join("rfa_scripts").join("fa_decode.R"),
    };
    path.is_file().then_some(path)
}

/// True when an `Rscript` binary can be started from `PATH`.
pub fn rscript_available() -> bool {
    std::process::Command::new("Rscript")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Fresh temporary directory, removed when dropped.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("fa_test_")
        .tempdir()
        .expect("create temporary directory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_root_has_manifest() {
        let root = workspace_root();
        assert!(root.join("Cargo.toml").is_file(), "{}", root.display());
        assert!(root.join("crates").join("test-utils").is_dir());
    }

    #[test]
    fn test_missing_file() {
        assert!(find_test_file("definitely-not-an-fa-file-0000").is_none());
    }

    #[test]
    fn test_temp_test_dir() {
        let dir = temp_test_dir();
        let name = dir.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("fa_test_"));
        assert!(dir.path().is_dir());
    }
}
