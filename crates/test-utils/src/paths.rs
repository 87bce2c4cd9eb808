//! Path utilities for test output.

use std::path::PathBuf;

/// Returns the workspace root directory.
///
/// This is determined by walking up from the test-utils manifest directory.
pub fn workspace_root() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir)
        .parent() // crates/
        .and_then(|p| p.parent()) // workspace root
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from(manifest_dir))
}

/// Path to the sample configuration shipped with the workspace.
pub fn sample_config_path() -> PathBuf {
    workspace_root().join("config").join("inventory.yaml")
}

/// A temporary directory and a SQLite database path inside it.
///
/// Keep the `TempDir` alive for as long as the database is used.
pub fn temp_db_path(name: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::Builder::new()
        .prefix("obs_inventory_")
        .tempdir()
        .expect("Failed to create temporary test directory");
    let path = dir.path().join(name);
    (dir, path)
}
