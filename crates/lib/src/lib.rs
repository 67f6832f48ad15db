//! plainpack-lib: build plans and build contexts for plain container images
//!
//! This crate turns a project directory into an image build:
//! - `project`: loads `apt.txt`, `postBuild`, `start` and `plainpack.toml`
//! - `packages`: validates and normalizes system package names
//! - `plan`: assembles ordered build directives from every phase
//! - `render`: prints a plan as a Dockerfile
//! - `archive`: packages the Dockerfile and sources into a reproducible tar
//! - `engine`: submits the archive to a container engine and streams events
//! - `pipeline`: composes all of the above, stopping at the first failure

pub mod archive;
pub mod consts;
pub mod engine;
pub mod packages;
pub mod pipeline;
pub mod plan;
pub mod project;
pub mod render;
pub mod util;
