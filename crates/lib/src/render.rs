//! Rendering a [`BuildPlan`] into a Dockerfile.
//!
//! Every directive maps to exactly one instruction and order is kept 1:1. No
//! inclusion decisions are made here; those belong to assembly.

use serde_json::Value;

use crate::plan::{BuildPlan, Directive};
use crate::util::shell::double_quote;

const CONTINUATION: &str = " && \\\n    ";

/// Render a plan into instruction text. Pure and deterministic.
pub fn render(plan: &BuildPlan) -> String {
  let mut out = String::new();
  for directive in plan.directives() {
    out.push_str(&render_directive(directive));
    out.push('\n');
  }
  out
}

/// Render a single directive as one (possibly multi-line) instruction.
pub fn render_directive(directive: &Directive) -> String {
  match directive {
    Directive::From(image) => format!("FROM {}", image),
    Directive::UserSwitch(user) => format!("USER {}", user),
    Directive::RunBatch(commands) => render_run(commands),
    Directive::CopyFile { src, dst } => {
      if is_plain_word(src) && is_plain_word(dst) {
        format!("COPY {} {}", src, dst)
      } else {
        format!("COPY {}", json_array(&[src.clone(), dst.clone()]))
      }
    }
    Directive::EnvSet { key, value } => format!("ENV {}={}", key, double_quote(value, false)),
    Directive::Label { key, value } => {
      format!("LABEL {}={}", double_quote(key, true), double_quote(value, true))
    }
    Directive::WorkDir(path) => format!("WORKDIR {}", path),
    Directive::Entrypoint(args) => format!("ENTRYPOINT {}", json_array(args)),
    Directive::Cmd(args) => format!("CMD {}", json_array(args)),
  }
}

/// Shell form while every command fits on one line; exec form through
/// `/bin/sh -c` otherwise, so embedded newlines reach the shell intact
/// instead of ending the instruction.
fn render_run(commands: &[String]) -> String {
  let multiline = commands
    .iter()
    .any(|c| c.contains(['\n', '\r']) || c.trim_end().ends_with('\\'));

  if multiline {
    let script = commands.join(" && ");
    return format!("RUN {}", json_array(&["/bin/sh".to_string(), "-c".to_string(), script]));
  }

  format!("RUN {}", commands.join(CONTINUATION))
}

fn json_array(items: &[String]) -> String {
  let parts: Vec<String> = items.iter().map(|s| Value::String(s.clone()).to_string()).collect();
  format!("[{}]", parts.join(", "))
}

fn is_plain_word(word: &str) -> bool {
  !word.is_empty() && !word.chars().any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\'))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::plan::{PlanInputs, ScriptStep, assemble};

  fn run(cmds: &[&str]) -> Directive {
    Directive::RunBatch(cmds.iter().map(|c| c.to_string()).collect())
  }

  #[test]
  fn empty_plan_renders_base_image_only() {
    let plan = assemble(&PlanInputs::default()).unwrap();
    assert_eq!(render(&plan), "FROM buildpack-deps:bionic\n");
  }

  #[test]
  fn single_command_uses_shell_form() {
    assert_eq!(render_directive(&run(&["echo hi"])), "RUN echo hi");
  }

  #[test]
  fn batches_use_line_continuations() {
    assert_eq!(
      render_directive(&run(&["apt-get -qq update", "apt-get -qq clean"])),
      "RUN apt-get -qq update && \\\n    apt-get -qq clean"
    );
  }

  #[test]
  fn multiline_script_uses_exec_form() {
    let rendered = render_directive(&run(&["if true; then\n  echo \"yes\"\nfi"]));
    assert_eq!(rendered, r#"RUN ["/bin/sh", "-c", "if true; then\n  echo \"yes\"\nfi"]"#);
    assert_eq!(rendered.lines().count(), 1);
  }

  #[test]
  fn trailing_backslash_cannot_swallow_next_instruction() {
    let rendered = render_directive(&run(&["echo a \\"]));
    assert!(rendered.starts_with("RUN [\"/bin/sh\""));
  }

  #[test]
  fn env_values_are_quoted_but_expand() {
    let directive = Directive::EnvSet {
      key: "PATH".into(),
      value: "/opt/bin:${PATH}".into(),
    };
    assert_eq!(render_directive(&directive), r#"ENV PATH="/opt/bin:${PATH}""#);

    let directive = Directive::EnvSet {
      key: "GREETING".into(),
      value: "say \"hi\"\nRUN rm -rf /".into(),
    };
    let rendered = render_directive(&directive);
    assert_eq!(rendered.lines().count(), 1);
    assert_eq!(rendered, r#"ENV GREETING="say \"hi\"\\nRUN rm -rf /""#);
  }

  #[test]
  fn env_values_with_stray_dollar_stay_parseable() {
    let directive = Directive::EnvSet {
      key: "PRICE".into(),
      value: "cost ${".into(),
    };
    assert_eq!(render_directive(&directive), r#"ENV PRICE="cost \${""#);

    let directive = Directive::EnvSet {
      key: "HOME_DIR".into(),
      value: "${HOME:-/root} $5".into(),
    };
    assert_eq!(render_directive(&directive), r#"ENV HOME_DIR="${HOME:-/root} \$5""#);
  }

  #[test]
  fn labels_are_literal() {
    let directive = Directive::Label {
      key: "org.example/owner".into(),
      value: "$HOME \"me\"".into(),
    };
    assert_eq!(render_directive(&directive), r#"LABEL "org.example/owner"="\$HOME \"me\"""#);
  }

  #[test]
  fn copy_switches_to_json_for_awkward_paths() {
    let plain = Directive::CopyFile {
      src: "src/environment.yml".into(),
      dst: "${REPO_DIR}/environment.yml".into(),
    };
    assert_eq!(render_directive(&plain), "COPY src/environment.yml ${REPO_DIR}/environment.yml");

    let spaced = Directive::CopyFile {
      src: "src/my file".into(),
      dst: "/srv/my file".into(),
    };
    assert_eq!(render_directive(&spaced), r#"COPY ["src/my file", "/srv/my file"]"#);
  }

  #[test]
  fn entrypoint_and_cmd_use_exec_form() {
    assert_eq!(
      render_directive(&Directive::Entrypoint(vec!["/usr/local/bin/entry".into()])),
      r#"ENTRYPOINT ["/usr/local/bin/entry"]"#
    );
    assert_eq!(
      render_directive(&Directive::Cmd(vec!["jupyter".into(), "lab".into()])),
      r#"CMD ["jupyter", "lab"]"#
    );
  }

  #[test]
  fn scenario_packages_script_and_start() {
    let inputs = PlanInputs {
      packages: vec!["git".into(), "curl".into()],
      build_scripts: vec![ScriptStep::new("root", "echo hi")],
      start_script: Some("run.sh".into()),
      ..Default::default()
    };
    let document = render(&assemble(&inputs).unwrap());

    assert_eq!(document.matches("apt-get -qq install --yes curl git > /dev/null").count(), 1);
    assert!(document.contains("\nRUN echo hi\n"));
    assert!(!document.contains("USER"));
    assert!(document.contains(r#"RUN chmod +x "${REPO_DIR}/run.sh""#));
    assert!(document.contains(r#"ENV R2D_ENTRYPOINT="${REPO_DIR}/run.sh""#));
  }

  #[test]
  fn order_is_preserved() {
    let plan = assemble(&PlanInputs {
      build_scripts: vec![ScriptStep::new("jovyan", "first"), ScriptStep::new("root", "second")],
      ..Default::default()
    })
    .unwrap();
    assert_eq!(
      render(&plan),
      "FROM buildpack-deps:bionic\nUSER jovyan\nRUN first\nUSER root\nRUN second\n"
    );
  }
}
