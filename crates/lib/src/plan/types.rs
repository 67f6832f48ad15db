//! Types for build plans.
//!
//! A [`BuildPlan`] is the ordered, validated sequence of [`Directive`]s produced
//! by assembly and consumed by rendering. It is built fresh per invocation and
//! never mutated after assembly.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::packages::PackageError;

/// A named stage of the build with its own ordered script list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
  BaseSetup,
  PreAssemble,
  Assemble,
  PostBuild,
}

impl std::fmt::Display for Phase {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      Phase::BaseSetup => "base-setup",
      Phase::PreAssemble => "pre-assemble",
      Phase::Assemble => "assemble",
      Phase::PostBuild => "post-build",
    };
    f.write_str(name)
  }
}

/// One script executed as a given user.
///
/// Order among steps in a phase is significant and preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptStep {
  pub user: String,
  #[serde(rename = "run")]
  pub script: String,
}

impl ScriptStep {
  pub fn new(user: impl Into<String>, script: impl Into<String>) -> Self {
    Self {
      user: user.into(),
      script: script.into(),
    }
  }
}

/// Files to stage into the image, keyed by destination path.
///
/// The [`BTreeMap`] keeps destinations unique and iterates them in sorted
/// order, which keeps both the plan and the archive deterministic.
pub type FileManifest = BTreeMap<String, PathBuf>;

/// One atomic build-time instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Directive {
  /// Base image declaration.
  From(String),
  /// Switch the user subsequent instructions run as.
  UserSwitch(String),
  /// Run commands in one instruction, chained so the first failure stops it.
  RunBatch(Vec<String>),
  /// Copy a path from the build context into the image.
  CopyFile { src: String, dst: String },
  /// Environment assignment. The value may reference other variables.
  EnvSet { key: String, value: String },
  /// Image label. Both key and value are literal.
  Label { key: String, value: String },
  WorkDir(String),
  Entrypoint(Vec<String>),
  Cmd(Vec<String>),
}

/// The ordered directive sequence produced by assembly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPlan {
  directives: Vec<Directive>,
}

impl BuildPlan {
  pub(crate) fn new(directives: Vec<Directive>) -> Self {
    Self { directives }
  }

  pub fn directives(&self) -> &[Directive] {
    &self.directives
  }

  pub fn len(&self) -> usize {
    self.directives.len()
  }

  pub fn is_empty(&self) -> bool {
    self.directives.is_empty()
  }
}

/// Errors that abort plan assembly.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
  #[error(transparent)]
  Package(#[from] PackageError),

  /// A user name that would not survive an unquoted `USER` instruction.
  #[error("invalid user name in {phase} phase: {user:?}")]
  InvalidUser { phase: Phase, user: String },

  /// An environment variable name outside `[A-Za-z_][A-Za-z0-9_]*`.
  #[error("invalid environment variable name: {key:?}")]
  InvalidEnvName { key: String },

  #[error("invalid working directory: {path:?}")]
  InvalidWorkdir { path: String },
}
