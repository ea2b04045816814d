//! Test fixture loading utilities

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Get the path to a fixture file or directory
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("test_fixtures")
        .join(name)
}

/// Copy a fixture database into `target` so tests can modify it
pub fn copy_fixture_database(name: &str, target: &Path) {
    let source = fixture_path(name);
    for entry in WalkDir::new(&source) {
        let entry = entry.unwrap_or_else(|e| panic!("Failed to walk fixture {}: {}", name, e));
        let relative = entry.path().strip_prefix(&source).unwrap();
        let destination = target.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&destination).unwrap();
        } else {
            std::fs::copy(entry.path(), &destination).unwrap();
        }
    }
}

/// A fresh temporary copy of a fixture database
pub fn temp_database(name: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    copy_fixture_database(name, dir.path());
    dir
}
