//! Deterministic build context archives.
//!
//! The archive holds the rendered Dockerfile, the staged manifest files and
//! the project source tree. Ownership, owner names, timestamps and permission
//! bits are normalized so identical inputs give byte-identical archives on any
//! host.

mod types;

pub use types::{Archive, ArchiveEntry, ArchiveError, BuildContext, EntryKind, Ownership};

use std::fs;
use std::path::Path;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::consts::{DOCKERFILE_NAME, SOURCE_PREFIX};
use crate::plan::{FileManifest, staged_path};

const DIR_MODE: u32 = 0o755;
const EXEC_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;

/// Collect every entry of a build context.
///
/// # Arguments
///
/// * `document` - The rendered instruction document
/// * `manifest` - Staged files, keyed by destination in the image
/// * `source_root` - The project directory placed under `src/`
/// * `ownership` - Numeric owner stamped on every entry
pub fn archive(
  document: &str,
  manifest: &FileManifest,
  source_root: &Path,
  ownership: Ownership,
) -> Result<Archive, ArchiveError> {
  let mut entries = vec![ArchiveEntry {
    path: DOCKERFILE_NAME.to_string(),
    kind: EntryKind::Bytes(document.as_bytes().to_vec()),
    mode: FILE_MODE,
  }];

  for (dest, source) in manifest {
    let prefix = staged_path(dest);
    debug!(dest = %dest, source = %source.display(), "staging file");
    collect_tree(source, &prefix, &mut entries)?;
  }

  collect_tree(source_root, SOURCE_PREFIX, &mut entries)?;

  info!(entries = entries.len(), "collected build context");
  Ok(Archive::new(entries, ownership))
}

/// Add `root` under `prefix`. A file root becomes a single entry; a directory
/// root is walked in file name order.
fn collect_tree(root: &Path, prefix: &str, entries: &mut Vec<ArchiveEntry>) -> Result<(), ArchiveError> {
  let metadata = fs::symlink_metadata(root).map_err(|e| ArchiveError::read(root, e))?;
  if metadata.is_file() {
    entries.push(file_entry(root, prefix.to_string(), &metadata));
    return Ok(());
  }

  let walker = WalkDir::new(root).follow_links(false).sort_by_file_name();
  for entry in walker {
    let entry = entry.map_err(|e| ArchiveError::Walk { message: e.to_string() })?;
    let rel_path = entry.path().strip_prefix(root).unwrap_or(entry.path());

    let path = if rel_path.as_os_str().is_empty() {
      prefix.to_string()
    } else {
      format!("{}/{}", prefix, to_archive_path(rel_path)?)
    };

    let file_type = entry.file_type();
    if file_type.is_dir() {
      entries.push(ArchiveEntry {
        path,
        kind: EntryKind::Directory,
        mode: DIR_MODE,
      });
    } else if file_type.is_symlink() {
      let target = fs::read_link(entry.path()).map_err(|e| ArchiveError::read(entry.path(), e))?;
      entries.push(ArchiveEntry {
        path,
        kind: EntryKind::Symlink(link_target(&target)?),
        mode: EXEC_MODE,
      });
    } else if file_type.is_file() {
      let metadata = entry.metadata().map_err(|e| ArchiveError::Walk { message: e.to_string() })?;
      entries.push(file_entry(entry.path(), path, &metadata));
    } else {
      debug!(path = %entry.path().display(), "skipping special file");
    }
  }

  Ok(())
}

fn file_entry(source: &Path, path: String, metadata: &fs::Metadata) -> ArchiveEntry {
  ArchiveEntry {
    path,
    kind: EntryKind::File(source.to_path_buf()),
    mode: if is_executable(metadata) { EXEC_MODE } else { FILE_MODE },
  }
}

/// Archive paths always use `/`, whatever the host separator. Names that are
/// not valid UTF-8 are rejected rather than rewritten.
fn to_archive_path(path: &Path) -> Result<String, ArchiveError> {
  let parts = path
    .components()
    .map(|c| {
      c.as_os_str().to_str().ok_or_else(|| ArchiveError::NonUtf8Path {
        path: path.display().to_string(),
      })
    })
    .collect::<Result<Vec<_>, _>>()?;
  Ok(parts.join("/"))
}

/// Link targets are stored as written, relative or absolute.
fn link_target(target: &Path) -> Result<String, ArchiveError> {
  let text = target.to_str().ok_or_else(|| ArchiveError::NonUtf8Path {
    path: target.display().to_string(),
  })?;
  Ok(if cfg!(windows) { text.replace('\\', "/") } else { text.to_string() })
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
  use std::os::unix::fs::PermissionsExt;
  metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
  false
}
