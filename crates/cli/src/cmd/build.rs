//! Implementation of the `plainpack build` command.
//!
//! Loads the project, packages its build context and streams the engine's
//! events to the terminal as they arrive.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use clap::Args;
use futures::StreamExt;
use serde_json::Value;
use tracing::debug;

use plainpack_lib::engine::DockerEngine;
use plainpack_lib::pipeline::{self, BuildOptions};

use super::load_project;
use crate::output::{OutputFormat, format_duration, print_event, print_info, print_json_line, print_success};

#[derive(Args, Debug)]
pub struct BuildArgs {
  /// Project directory
  #[arg(default_value = ".")]
  pub project: PathBuf,

  /// Image tag (defaults to the [build] tag, then a digest-derived name)
  #[arg(short, long)]
  pub tag: Option<String>,

  /// Memory limit for build containers, in bytes
  #[arg(long)]
  pub memory_limit: Option<u64>,

  /// Build arg passed to the engine (repeatable)
  #[arg(long = "build-arg", value_name = "KEY=VALUE", value_parser = parse_key_val)]
  pub build_args: Vec<(String, String)>,

  /// Image to use as a cache source (repeatable)
  #[arg(long)]
  pub cache_from: Vec<String>,

  /// Engine endpoint (defaults to PLAINPACK_ENGINE, then DOCKER_HOST)
  #[arg(long)]
  pub engine: Option<String>,

  /// Output format
  #[arg(long, value_enum, default_value = "text")]
  pub format: OutputFormat,
}

fn parse_key_val(s: &str) -> Result<(String, String)> {
  let (key, value) = s
    .split_once('=')
    .ok_or_else(|| anyhow!("expected KEY=VALUE, got {:?}", s))?;
  if key.is_empty() {
    return Err(anyhow!("empty build arg name in {:?}", s));
  }
  Ok((key.to_string(), value.to_string()))
}

/// Merge command-line overrides over the project's `[build]` table.
fn build_options(args: &BuildArgs, mut options: BuildOptions) -> BuildOptions {
  if let Some(tag) = &args.tag {
    options.tag = Some(tag.clone());
  }
  if let Some(limit) = args.memory_limit {
    options.memory_limit = Value::from(limit);
  }
  options.build_args.extend(args.build_args.iter().cloned());
  options.cache_from.extend(args.cache_from.iter().cloned());
  options
}

pub fn cmd_build(args: BuildArgs) -> Result<()> {
  let project = load_project(&args.project)?;
  let options = build_options(&args, BuildOptions::from_project(&project));
  let engine = match &args.engine {
    Some(endpoint) => DockerEngine::new(endpoint.clone()),
    None => DockerEngine::from_env(),
  };
  debug!(endpoint = engine.endpoint(), ?options, "starting build");

  if !args.format.is_json() {
    print_info(&format!("Building {} via {}", project.root.display(), engine.endpoint()));
  }

  let started = Instant::now();
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let events = rt.block_on(async {
    let mut stream = pipeline::build(&engine, &project, &options)
      .await
      .context("Failed to start build")?;

    let mut count = 0usize;
    while let Some(event) = stream.next().await {
      let event = event.context("Build failed")?;
      count += 1;
      if args.format.is_json() {
        print_json_line(&event)?;
      } else {
        print_event(&event);
      }
    }
    Ok::<_, anyhow::Error>(count)
  })?;

  if !args.format.is_json() {
    print_success(&format!(
      "Build finished in {} ({} events)",
      format_duration(started.elapsed()),
      events
    ));
  }
  Ok(())
}
