//! Collapsing ordered (user, script) steps into directives.
//!
//! Each script becomes its own `RunBatch`; a `UserSwitch` is emitted only when
//! the user actually changes. The current user is threaded through a fold so
//! independent groupings never share state.

use crate::consts::ROOT_USER;

use super::types::{Directive, ScriptStep};

/// Directives for one phase, plus the user in effect after them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouped {
  pub directives: Vec<Directive>,
  pub final_user: String,
}

/// Group steps starting from `root`.
///
/// An empty step list produces no directives.
pub fn group_steps(steps: &[ScriptStep]) -> Vec<Directive> {
  group_steps_from(ROOT_USER, steps).directives
}

/// Group steps starting from `initial_user`.
pub fn group_steps_from(initial_user: &str, steps: &[ScriptStep]) -> Grouped {
  let (directives, final_user) = steps.iter().fold(
    (Vec::with_capacity(steps.len()), initial_user.to_string()),
    |(mut directives, current_user), step| {
      let user = if step.user != current_user {
        directives.push(Directive::UserSwitch(step.user.clone()));
        step.user.clone()
      } else {
        current_user
      };
      directives.push(Directive::RunBatch(vec![dedent(&step.script)]));
      (directives, user)
    },
  );

  Grouped { directives, final_user }
}

/// Strip surrounding blank lines and remove the whitespace margin shared by
/// every non-blank line.
pub fn dedent(script: &str) -> String {
  let script = script.trim_matches('\n');
  let margin = script
    .lines()
    .filter(|line| !line.trim().is_empty())
    .map(|line| &line[..line.len() - line.trim_start().len()])
    .reduce(|common, indent| {
      let shared = common
        .char_indices()
        .zip(indent.chars())
        .find(|((_, a), b)| a != b)
        .map(|((idx, _), _)| idx)
        .unwrap_or(common.len().min(indent.len()));
      &common[..shared]
    })
    .unwrap_or("");

  script
    .lines()
    .map(|line| {
      if line.trim().is_empty() {
        ""
      } else {
        line.strip_prefix(margin).unwrap_or(line)
      }
    })
    .collect::<Vec<_>>()
    .join("\n")
    .trim_end()
    .to_string()
}
