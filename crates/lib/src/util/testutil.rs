//! Test utilities for plainpack-lib.
//!
//! Helpers for laying out throwaway project directories.

use std::fs;
use std::path::{Path, PathBuf};

/// Write a file relative to `root`, creating parent directories.
pub fn write_file(root: &Path, relative_path: &str, content: &str) -> PathBuf {
  let path = root.join(relative_path);
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).unwrap();
  }
  fs::write(&path, content).unwrap();
  path
}

/// Mark a file as executable.
#[cfg(unix)]
pub fn make_executable(path: &Path) {
  use std::os::unix::fs::PermissionsExt;
  let mut perms = fs::metadata(path).unwrap().permissions();
  perms.set_mode(0o755);
  fs::set_permissions(path, perms).unwrap();
}

#[cfg(windows)]
pub fn make_executable(_path: &Path) {}
