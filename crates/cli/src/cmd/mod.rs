mod build;
mod context;
mod render;

pub use build::{BuildArgs, cmd_build};
pub use context::cmd_context;
pub use render::cmd_render;

use std::path::Path;

use anyhow::{Context, Result};

use plainpack_lib::project::Project;

/// Resolve and load a project directory.
pub(crate) fn load_project(path: &Path) -> Result<Project> {
  let root = dunce::canonicalize(path).with_context(|| format!("Project not found: {}", path.display()))?;
  Project::load(&root).with_context(|| format!("Failed to load project: {}", root.display()))
}
