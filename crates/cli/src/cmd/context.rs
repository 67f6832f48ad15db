//! Implementation of the `plainpack context` command.
//!
//! Writes the exact archive `plainpack build` would submit, so it can be
//! inspected or fed to another engine.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use plainpack_lib::archive::Ownership;
use plainpack_lib::pipeline::{BuildOptions, prepare};

use super::load_project;
use crate::output::{format_bytes, print_stat, print_success};

pub fn cmd_context(path: &Path, output: &Path) -> Result<()> {
  let project = load_project(path)?;
  let options = BuildOptions::from_project(&project);
  let ownership = Ownership::from_build_args(&options.build_args).context("Invalid build args")?;

  let prepared = prepare(&project, ownership).context("Failed to prepare build context")?;
  fs::write(output, prepared.context.as_bytes())
    .with_context(|| format!("Failed to write archive: {}", output.display()))?;

  print_success(&format!("Wrote {}", output.display()));
  print_stat("Size", &format_bytes(prepared.context.len() as u64));
  print_stat("Dockerfile", prepared.rendered.digest.short());
  println!("{}", prepared.context.digest());
  Ok(())
}
