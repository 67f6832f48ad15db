//! Implementation of the `plainpack render` command.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use plainpack_lib::pipeline::render_project;

use super::load_project;

/// Print the Dockerfile for the project at `path` to stdout.
pub fn cmd_render(path: &Path) -> Result<()> {
  let project = load_project(path)?;
  let rendered = render_project(&project).context("Failed to generate Dockerfile")?;
  info!(digest = %rendered.digest, "rendered");
  print!("{}", rendered.document);
  Ok(())
}
