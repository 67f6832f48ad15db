//! Loading a project directory into plan inputs.
//!
//! Configuration lives in `binder/`, `.binder/` or the project root, in that
//! order of preference. Every file in it is optional:
//! - `apt.txt`: extra system packages, one per line
//! - `postBuild`: a script run after assembly
//! - `start`: a script run at container start
//! - `plainpack.toml`: declarative settings, see [`ProjectConfig`]

mod types;

pub use types::{BuildSettings, ProjectConfig, ProjectError, ScriptConfig};

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::consts::{APT_FILENAME, BINDER_DIRS, CONFIG_FILENAME, POST_BUILD_FILENAME, START_FILENAME};
use crate::plan::PlanInputs;

/// A loaded project, ready for assembly.
#[derive(Debug, Clone)]
pub struct Project {
  pub root: PathBuf,
  pub config_dir: PathBuf,
  pub inputs: PlanInputs,
  pub build: BuildSettings,
}

impl Project {
  /// Load the project rooted at `root`.
  pub fn load(root: &Path) -> Result<Self, ProjectError> {
    let metadata = fs::metadata(root).map_err(|e| ProjectError::read(root, e))?;
    if !metadata.is_dir() {
      return Err(ProjectError::NotADirectory {
        path: root.display().to_string(),
      });
    }

    let config_dir = config_dir(root);
    debug!(config_dir = %config_dir.display(), "resolved configuration directory");

    let config = match read_optional(&config_dir.join(CONFIG_FILENAME))? {
      Some(text) => toml::from_str::<ProjectConfig>(&text).map_err(|e| ProjectError::Parse {
        path: config_dir.join(CONFIG_FILENAME).display().to_string(),
        message: e.to_string(),
      })?,
      None => ProjectConfig::default(),
    };

    let (mut inputs, build) = config.into_inputs(root);
    inputs.apt_txt = read_optional(&config_dir.join(APT_FILENAME))?;

    if config_dir.join(POST_BUILD_FILENAME).is_file() {
      inputs.post_build_scripts = vec![relative_script(root, &config_dir, POST_BUILD_FILENAME)];
    }
    if config_dir.join(START_FILENAME).is_file() {
      inputs.start_script = Some(relative_script(root, &config_dir, START_FILENAME));
    }

    info!(
      root = %root.display(),
      apt_txt = inputs.apt_txt.is_some(),
      post_build = !inputs.post_build_scripts.is_empty(),
      start = inputs.start_script.is_some(),
      "loaded project"
    );

    Ok(Self {
      root: root.to_path_buf(),
      config_dir,
      inputs,
      build,
    })
  }
}

fn config_dir(root: &Path) -> PathBuf {
  BINDER_DIRS
    .iter()
    .map(|dir| root.join(dir))
    .find(|dir| dir.is_dir())
    .unwrap_or_else(|| root.to_path_buf())
}

/// Read a file that may legitimately be absent.
fn read_optional(path: &Path) -> Result<Option<String>, ProjectError> {
  match fs::read_to_string(path) {
    Ok(text) => Ok(Some(text)),
    Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
    Err(e) => Err(ProjectError::read(path, e)),
  }
}

/// Script path relative to the project root, `/`-separated, as seen from the
/// repo dir inside the image.
fn relative_script(root: &Path, config_dir: &Path, name: &str) -> String {
  match config_dir.strip_prefix(root) {
    Ok(rel) if !rel.as_os_str().is_empty() => {
      let mut parts: Vec<String> = rel.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
      parts.push(name.to_string());
      parts.join("/")
    }
    _ => name.to_string(),
  }
}
