//! Types for build context archives.

use std::collections::BTreeMap;
use std::io;
use std::fs;
use std::path::{Path, PathBuf};

use tar::{EntryType, Header};
use thiserror::Error;
use tracing::info;

use crate::consts::{DEFAULT_UID, GID_BUILD_ARG, NORMALIZED_MTIME, UID_BUILD_ARG};
use crate::util::hash::{ContentHash, hash_bytes};

/// Errors that can occur while building a context archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
  #[error("failed to read {path}: {message}")]
  Read { path: String, message: String },

  #[error("failed to walk directory: {message}")]
  Walk { message: String },

  /// A file name that cannot be stored in the archive without being altered.
  #[error("path is not valid UTF-8: {path}")]
  NonUtf8Path { path: String },

  /// A uid/gid build arg that is not a non-negative integer.
  #[error("build arg {arg} must be a numeric id, got {value:?}")]
  InvalidOwnership { arg: String, value: String },

  #[error("failed to write archive: {0}")]
  Write(#[source] io::Error),
}

impl ArchiveError {
  pub(crate) fn read(path: &Path, err: io::Error) -> Self {
    ArchiveError::Read {
      path: path.display().to_string(),
      message: err.to_string(),
    }
  }
}

/// Numeric owner stamped on every archive entry.
///
/// The same values are passed to the engine as `NB_UID`/`NB_GID` build args,
/// so both sides agree on who owns the files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
  pub uid: u64,
  pub gid: u64,
}

impl Default for Ownership {
  fn default() -> Self {
    Self {
      uid: DEFAULT_UID,
      gid: DEFAULT_UID,
    }
  }
}

impl Ownership {
  /// Read ownership from build args.
  ///
  /// `NB_UID` defaults to 1000; `NB_GID` defaults to the uid.
  pub fn from_build_args(build_args: &BTreeMap<String, String>) -> Result<Self, ArchiveError> {
    let uid = parse_id(build_args, UID_BUILD_ARG)?.unwrap_or(DEFAULT_UID);
    let gid = parse_id(build_args, GID_BUILD_ARG)?.unwrap_or(uid);
    Ok(Self { uid, gid })
  }
}

fn parse_id(build_args: &BTreeMap<String, String>, arg: &str) -> Result<Option<u64>, ArchiveError> {
  build_args
    .get(arg)
    .map(|value| {
      value.trim().parse::<u64>().map_err(|_| ArchiveError::InvalidOwnership {
        arg: arg.to_string(),
        value: value.clone(),
      })
    })
    .transpose()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
  /// Contents held in memory, such as the rendered Dockerfile.
  Bytes(Vec<u8>),
  /// A file on disk, read only when the archive is written.
  File(PathBuf),
  Directory,
  Symlink(String),
}

/// One archive member. Ownership and timestamps are not stored per entry;
/// they are uniform across the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
  pub path: String,
  pub kind: EntryKind,
  pub mode: u32,
}

/// The ordered entries of a build context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
  entries: Vec<ArchiveEntry>,
  ownership: Ownership,
}

impl Archive {
  pub(crate) fn new(entries: Vec<ArchiveEntry>, ownership: Ownership) -> Self {
    Self { entries, ownership }
  }

  pub fn entries(&self) -> &[ArchiveEntry] {
    &self.entries
  }

  pub fn ownership(&self) -> Ownership {
    self.ownership
  }

  /// Serialize into a tar stream.
  ///
  /// Files are read one at a time as they are appended, so only the output
  /// and a single file are held in memory.
  pub fn into_context(self) -> Result<BuildContext, ArchiveError> {
    let mut builder = tar::Builder::new(Vec::new());

    for entry in &self.entries {
      let mut header = Header::new_gnu();
      header.set_mode(entry.mode);
      header.set_uid(self.ownership.uid);
      header.set_gid(self.ownership.gid);
      header.set_mtime(NORMALIZED_MTIME);
      header.set_username("").map_err(ArchiveError::Write)?;
      header.set_groupname("").map_err(ArchiveError::Write)?;

      match &entry.kind {
        EntryKind::Bytes(data) => append_file(&mut builder, &mut header, &entry.path, data)?,
        EntryKind::File(source) => {
          let data = fs::read(source).map_err(|e| ArchiveError::read(source, e))?;
          append_file(&mut builder, &mut header, &entry.path, &data)?;
        }
        EntryKind::Directory => {
          header.set_entry_type(EntryType::Directory);
          header.set_size(0);
          builder
            .append_data(&mut header, &entry.path, io::empty())
            .map_err(ArchiveError::Write)?;
        }
        EntryKind::Symlink(target) => {
          header.set_entry_type(EntryType::Symlink);
          header.set_size(0);
          builder
            .append_link(&mut header, &entry.path, target)
            .map_err(ArchiveError::Write)?;
        }
      }
    }

    let bytes = builder.into_inner().map_err(ArchiveError::Write)?;
    let context = BuildContext::new(bytes);
    info!(size = context.len(), digest = %context.digest().short(), "wrote build context");
    Ok(context)
  }
}

fn append_file(
  builder: &mut tar::Builder<Vec<u8>>,
  header: &mut Header,
  path: &str,
  data: &[u8],
) -> Result<(), ArchiveError> {
  header.set_entry_type(EntryType::Regular);
  header.set_size(data.len() as u64);
  builder.append_data(header, path, data).map_err(ArchiveError::Write)
}

/// A finished tar stream, handed by value to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
  bytes: Vec<u8>,
  digest: ContentHash,
}

impl BuildContext {
  pub fn new(bytes: Vec<u8>) -> Self {
    let digest = hash_bytes(&bytes);
    Self { bytes, digest }
  }

  pub fn digest(&self) -> &ContentHash {
    &self.digest
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.bytes
  }

  pub fn into_bytes(self) -> Vec<u8> {
    self.bytes
  }

  pub fn len(&self) -> usize {
    self.bytes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bytes.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn args(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
  }

  #[test]
  fn ownership_defaults_to_1000() {
    assert_eq!(
      Ownership::from_build_args(&BTreeMap::new()).unwrap(),
      Ownership { uid: 1000, gid: 1000 }
    );
  }

  #[test]
  fn gid_follows_uid_unless_set() {
    assert_eq!(
      Ownership::from_build_args(&args(&[("NB_UID", "1001")])).unwrap(),
      Ownership { uid: 1001, gid: 1001 }
    );
    assert_eq!(
      Ownership::from_build_args(&args(&[("NB_UID", "1001"), ("NB_GID", "100")])).unwrap(),
      Ownership { uid: 1001, gid: 100 }
    );
  }

  #[test]
  fn non_numeric_ids_are_rejected() {
    let err = Ownership::from_build_args(&args(&[("NB_UID", "jovyan")])).unwrap_err();
    assert!(matches!(err, ArchiveError::InvalidOwnership { ref arg, .. } if arg == "NB_UID"));
  }

  #[test]
  fn empty_archive_serializes() {
    let context = Archive::new(Vec::new(), Ownership::default()).into_context().unwrap();
    // Two zero blocks terminate a tar stream.
    assert_eq!(context.len(), 1024);
    assert!(context.as_bytes().iter().all(|b| *b == 0));
  }
}
