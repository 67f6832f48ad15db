//! Build plan compilation.
//!
//! This module turns declarative inputs into a [`BuildPlan`]:
//! - `types`: directives, phases, script steps and plan errors
//! - `group`: collapsing (user, script) steps into directives
//! - `assemble`: composing every phase into one ordered plan

mod assemble;
mod group;
mod types;

pub use assemble::{PlanInputs, assemble};
pub use group::{Grouped, dedent, group_steps, group_steps_from};
pub use types::{BuildPlan, Directive, FileManifest, Phase, PlanError, ScriptStep};

use crate::consts::STAGED_FILES_PREFIX;
use crate::util::hash::hash_bytes;

/// Path inside the build context for a staged file with the given destination.
///
/// The path is named by the digest of the destination string, so distinct
/// destinations never share a context path, including `/etc/a` and `etc/a`.
pub fn staged_path(dest: &str) -> String {
  format!("{}/{}", STAGED_FILES_PREFIX, hash_bytes(dest.as_bytes()))
}
