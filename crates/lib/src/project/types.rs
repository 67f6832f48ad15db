//! Types for project configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::plan::{PlanInputs, ScriptStep};

/// Errors raised while loading a project.
#[derive(Debug, Error)]
pub enum ProjectError {
  #[error("failed to read {path}: {message}")]
  Read { path: String, message: String },

  #[error("failed to parse {path}: {message}")]
  Parse { path: String, message: String },

  #[error("project path is not a directory: {path}")]
  NotADirectory { path: String },
}

impl ProjectError {
  pub(crate) fn read(path: &Path, err: std::io::Error) -> Self {
    ProjectError::Read {
      path: path.display().to_string(),
      message: err.to_string(),
    }
  }
}

/// Ordered script lists per phase, as `{ user, run }` tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptConfig {
  pub build: Vec<ScriptStep>,
  pub preassemble: Vec<ScriptStep>,
  pub assemble: Vec<ScriptStep>,
}

/// Settings consumed when invoking the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSettings {
  pub tag: Option<String>,
  /// Left untyped here; the engine layer rejects anything but an integer.
  pub memory_limit: Value,
  pub build_args: BTreeMap<String, String>,
  pub cache_from: Vec<String>,
  pub extra: BTreeMap<String, Value>,
}

/// Contents of `plainpack.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
  pub set_up_apt: bool,
  pub set_up_locales: bool,
  pub base_packages: Vec<String>,
  pub packages: Vec<String>,
  pub path: Vec<String>,
  pub build_env: Vec<(String, String)>,
  pub env: Vec<(String, String)>,
  pub labels: BTreeMap<String, String>,
  /// Destination in the image -> host source, relative to the project root.
  pub files: BTreeMap<String, PathBuf>,
  /// Destination under the repo dir -> source inside the project.
  pub preassemble_files: BTreeMap<String, String>,
  pub workdir: Option<String>,
  pub entrypoint: Option<Vec<String>>,
  pub cmd: Option<Vec<String>>,
  pub scripts: ScriptConfig,
  pub build: BuildSettings,
}

impl ProjectConfig {
  /// Plan inputs with every host path resolved against `root`.
  pub(crate) fn into_inputs(self, root: &Path) -> (PlanInputs, BuildSettings) {
    let build_files = self
      .files
      .into_iter()
      .map(|(dest, source)| {
        let source = if source.is_absolute() { source } else { root.join(source) };
        (dest, source)
      })
      .collect();

    let inputs = PlanInputs {
      set_up_apt: self.set_up_apt,
      set_up_locales: self.set_up_locales,
      base_packages: self.base_packages,
      packages: self.packages,
      path: self.path,
      build_env: self.build_env,
      build_files,
      build_scripts: self.scripts.build,
      workdir: self.workdir,
      env: self.env,
      preassemble_files: self.preassemble_files,
      preassemble_scripts: self.scripts.preassemble,
      assemble_scripts: self.scripts.assemble,
      labels: self.labels,
      entrypoint: self.entrypoint,
      cmd: self.cmd,
      ..Default::default()
    };

    (inputs, self.build)
  }
}
