mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{BuildArgs, cmd_build, cmd_context, cmd_render};
use output::print_error;

/// plainpack - build container images from plain project directories
#[derive(Parser)]
#[command(name = "plainpack")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Print the Dockerfile generated for a project
  Render {
    /// Project directory
    #[arg(default_value = ".")]
    project: PathBuf,
  },

  /// Write the build context archive for a project
  Context {
    /// Project directory
    #[arg(default_value = ".")]
    project: PathBuf,

    /// Where to write the tar archive
    #[arg(short, long)]
    output: PathBuf,
  },

  /// Build an image from a project
  Build(BuildArgs),
}

fn main() {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  if let Err(err) = run(cli.command) {
    print_error(&format!("{:#}", err));
    std::process::exit(1);
  }
}

fn run(command: Commands) -> Result<()> {
  match command {
    Commands::Render { project } => cmd_render(&project),
    Commands::Context { project, output } => cmd_context(&project, &output),
    Commands::Build(args) => cmd_build(args),
  }
}
