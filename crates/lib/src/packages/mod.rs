//! Package name validation.
//!
//! Package names end up interpolated into a shell-executed install command, so
//! anything outside a narrow character class is rejected before a plan is built.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static PACKAGE_NAME: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[a-z0-9.+-]+").expect("package name pattern is valid"));

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PackageError {
  #[error("invalid package name: {name:?}")]
  InvalidPackageName { name: String },
}

/// Validate a single raw line of package input.
///
/// Strips a `#` comment suffix and surrounding whitespace. Returns `Ok(None)`
/// for lines that are empty after stripping.
pub fn validate_line(line: &str) -> Result<Option<String>, PackageError> {
  let package = line.split('#').next().unwrap_or_default().trim();
  if package.is_empty() {
    return Ok(None);
  }

  if !PACKAGE_NAME.is_match(package) {
    return Err(PackageError::InvalidPackageName {
      name: package.to_string(),
    });
  }

  Ok(Some(package.to_string()))
}

/// Parse the contents of an `apt.txt` file.
///
/// Any invalid line fails the whole list.
pub fn parse_apt_txt(contents: &str) -> Result<Vec<String>, PackageError> {
  let mut packages = Vec::new();
  for line in contents.lines() {
    if let Some(package) = validate_line(line)? {
      packages.push(package);
    }
  }
  Ok(packages)
}

/// Validate a list of package names and return them deduplicated and sorted.
pub fn normalize<I, S>(names: I) -> Result<Vec<String>, PackageError>
where
  I: IntoIterator<Item = S>,
  S: AsRef<str>,
{
  let mut set = BTreeSet::new();
  for name in names {
    if let Some(package) = validate_line(name.as_ref())? {
      set.insert(package);
    }
  }
  Ok(set.into_iter().collect())
}
