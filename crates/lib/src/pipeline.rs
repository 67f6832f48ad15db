//! End-to-end composition: project -> plan -> document -> context -> engine.
//!
//! Each stage consumes only the previous stage's output, and the first failure
//! stops the pipeline. Nothing is sent to the engine unless every earlier stage
//! succeeded.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::archive::{self, ArchiveError, BuildContext, Ownership};
use crate::consts::APP_NAME;
use crate::engine::{BuildRequest, DockerEngine, EngineError, EventStream, ResourceLimits};
use crate::plan::{self, BuildPlan, PlanError};
use crate::project::{Project, ProjectError};
use crate::render::render;
use crate::util::hash::{ContentHash, hash_bytes};

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error(transparent)]
  Project(#[from] ProjectError),

  #[error(transparent)]
  Plan(#[from] PlanError),

  #[error(transparent)]
  Archive(#[from] ArchiveError),

  #[error(transparent)]
  Engine(#[from] EngineError),
}

/// The rendered instruction document of a project.
#[derive(Debug, Clone)]
pub struct Rendered {
  pub plan: BuildPlan,
  pub document: String,
  pub digest: ContentHash,
}

/// Assemble and render a project without touching the filesystem beyond it.
pub fn render_project(project: &Project) -> Result<Rendered, PipelineError> {
  let plan = plan::assemble(&project.inputs)?;
  let document = render(&plan);
  let digest = hash_bytes(document.as_bytes());
  info!(directives = plan.len(), digest = %digest.short(), "rendered document");
  Ok(Rendered { plan, document, digest })
}

/// A rendered project together with its build context.
#[derive(Debug, Clone)]
pub struct Prepared {
  pub rendered: Rendered,
  pub context: BuildContext,
}

/// Render a project and package it into a build context.
pub fn prepare(project: &Project, ownership: Ownership) -> Result<Prepared, PipelineError> {
  let rendered = render_project(project)?;
  let context = archive::archive(
    &rendered.document,
    &project.inputs.build_files,
    &project.root,
    ownership,
  )?
  .into_context()?;
  Ok(Prepared { rendered, context })
}

/// Engine settings for one build, starting from the project's `[build]` table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildOptions {
  /// Image tag. Derived from the document digest when unset.
  pub tag: Option<String>,
  pub memory_limit: Value,
  pub build_args: BTreeMap<String, String>,
  pub cache_from: Vec<String>,
  pub extra: BTreeMap<String, Value>,
}

impl BuildOptions {
  pub fn from_project(project: &Project) -> Self {
    let build = project.build.clone();
    Self {
      tag: build.tag,
      memory_limit: build.memory_limit,
      build_args: build.build_args,
      cache_from: build.cache_from,
      extra: build.extra,
    }
  }
}

/// Run the whole pipeline and start a build.
///
/// Resource limits and ownership are validated before the archive is
/// produced, so a bad limit never costs a context walk.
pub async fn build(engine: &DockerEngine, project: &Project, options: &BuildOptions) -> Result<EventStream, PipelineError> {
  let limits = ResourceLimits::from_memory_limit(&options.memory_limit)?;
  let ownership = Ownership::from_build_args(&options.build_args)?;
  let prepared = prepare(project, ownership)?;

  let tag = options
    .tag
    .clone()
    .unwrap_or_else(|| format!("{}-{}", APP_NAME, prepared.rendered.digest.short()));

  let request = BuildRequest {
    tag,
    limits,
    build_args: options.build_args.clone(),
    cache_from: options.cache_from.clone(),
    extra: options.extra.clone(),
  };

  Ok(engine.build(prepared.context, &request).await?)
}
