//! Composing the phases of a build into one [`BuildPlan`].
//!
//! Assembly decides what is included; rendering only prints it. Every value
//! that ends up in a shell-executed instruction is validated or quoted here,
//! and any failure aborts assembly without producing a partial plan.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::consts::{BASE_IMAGE, DEFAULT_OWNER, DEFAULT_REPO_DIR, ENTRYPOINT_MARKER_VAR, ROOT_USER, SOURCE_PREFIX};
use crate::packages;
use crate::util::shell;

use super::group::group_steps_from;
use super::staged_path;
use super::types::{BuildPlan, Directive, FileManifest, Phase, PlanError, ScriptStep};

static ENV_NAME: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("env name pattern is valid"));

const APT_CLEANUP: [&str; 3] = ["apt-get -qq purge", "apt-get -qq clean", "rm -rf /var/lib/apt/lists/*"];

/// Everything the configuration loader hands to assembly.
#[derive(Debug, Clone)]
pub struct PlanInputs {
  /// Emit `DEBIAN_FRONTEND=noninteractive`.
  pub set_up_apt: bool,
  /// Install and generate the `en_US.UTF-8` locale.
  pub set_up_locales: bool,
  pub base_packages: Vec<String>,
  pub packages: Vec<String>,
  /// Raw `apt.txt` contents, validated during assembly.
  pub apt_txt: Option<String>,
  pub path: Vec<String>,
  pub build_env: Vec<(String, String)>,
  /// Files staged from the host, keyed by destination in the image.
  pub build_files: FileManifest,
  pub build_scripts: Vec<ScriptStep>,
  pub workdir: Option<String>,
  pub env: Vec<(String, String)>,
  /// Repository files copied before pre-assembly, keyed by destination
  /// relative to the repo dir.
  pub preassemble_files: BTreeMap<String, String>,
  pub preassemble_scripts: Vec<ScriptStep>,
  pub assemble_scripts: Vec<ScriptStep>,
  pub labels: BTreeMap<String, String>,
  /// Post-build scripts, relative to the repo dir.
  pub post_build_scripts: Vec<String>,
  /// Start script, relative to the repo dir.
  pub start_script: Option<String>,
  pub entrypoint: Option<Vec<String>>,
  pub cmd: Option<Vec<String>>,
  /// Repository location inside the image.
  pub repo_dir: String,
  /// Owner applied by the ownership fixup after pre-assembly copies.
  pub owner: String,
}

impl Default for PlanInputs {
  fn default() -> Self {
    Self {
      set_up_apt: false,
      set_up_locales: false,
      base_packages: Vec::new(),
      packages: Vec::new(),
      apt_txt: None,
      path: Vec::new(),
      build_env: Vec::new(),
      build_files: FileManifest::new(),
      build_scripts: Vec::new(),
      workdir: None,
      env: Vec::new(),
      preassemble_files: BTreeMap::new(),
      preassemble_scripts: Vec::new(),
      assemble_scripts: Vec::new(),
      labels: BTreeMap::new(),
      post_build_scripts: Vec::new(),
      start_script: None,
      entrypoint: None,
      cmd: None,
      repo_dir: DEFAULT_REPO_DIR.to_string(),
      owner: DEFAULT_OWNER.to_string(),
    }
  }
}

/// Assemble a [`BuildPlan`] from validated inputs.
pub fn assemble(inputs: &PlanInputs) -> Result<BuildPlan, PlanError> {
  let mut assembler = Assembler {
    inputs,
    directives: vec![Directive::From(BASE_IMAGE.to_string())],
    current_user: ROOT_USER.to_string(),
  };

  assembler.environment_setup();
  assembler.package_installs()?;
  assembler.global_env()?;
  assembler.staged_files();
  assembler.phase(Phase::BaseSetup, &inputs.build_scripts)?;
  assembler.workdir()?;
  assembler.env_vars(&inputs.env)?;
  assembler.preassemble()?;
  assembler.phase(Phase::Assemble, &inputs.assemble_scripts)?;
  assembler.labels();
  assembler.post_build();
  assembler.start_script();
  assembler.entrypoint();

  let plan = BuildPlan::new(assembler.directives);
  info!(directives = plan.len(), "assembled build plan");
  Ok(plan)
}

struct Assembler<'a> {
  inputs: &'a PlanInputs,
  directives: Vec<Directive>,
  current_user: String,
}

impl Assembler<'_> {
  fn push(&mut self, directive: Directive) {
    self.directives.push(directive);
  }

  fn environment_setup(&mut self) {
    let inputs = self.inputs;
    if inputs.set_up_apt {
      self.push(env_set("DEBIAN_FRONTEND", "noninteractive"));
    }

    if inputs.set_up_locales {
      self.push(apt_install("apt-get -qq install --yes --no-install-recommends locales > /dev/null"));
      self.push(Directive::RunBatch(vec![
        r#"echo "en_US.UTF-8 UTF-8" > /etc/locale.gen"#.to_string(),
        "locale-gen".to_string(),
      ]));
      for key in ["LC_ALL", "LANG", "LANGUAGE"] {
        self.push(env_set(key, "en_US.UTF-8"));
      }
    }
  }

  /// Three independent install instructions, so a change to one list leaves
  /// the cache boundaries of the others untouched.
  fn package_installs(&mut self) -> Result<(), PlanError> {
    let inputs = self.inputs;
    let base = packages::normalize(&inputs.base_packages)?;
    if !base.is_empty() {
      self.push(apt_install(&format!(
        "apt-get -qq install --yes --no-install-recommends {} > /dev/null",
        package_words(&base)
      )));
    }

    let explicit = packages::normalize(&inputs.packages)?;
    if !explicit.is_empty() {
      self.push(apt_install(&format!(
        "apt-get -qq install --yes {} > /dev/null",
        package_words(&explicit)
      )));
    }

    if let Some(contents) = &inputs.apt_txt {
      let requested = packages::normalize(packages::parse_apt_txt(contents)?)?;
      if requested.is_empty() {
        debug!("apt.txt lists no packages");
      } else {
        // Not quiet: these were explicitly asked for.
        self.push(apt_install(&format!(
          "apt-get install --yes --no-install-recommends {}",
          package_words(&requested)
        )));
      }
    }

    Ok(())
  }

  fn global_env(&mut self) -> Result<(), PlanError> {
    let inputs = self.inputs;
    self.env_vars(&inputs.build_env)?;
    if !inputs.path.is_empty() {
      let value = format!("{}:${{PATH}}", inputs.path.join(":"));
      self.push(env_set("PATH", &value));
    }
    Ok(())
  }

  fn env_vars(&mut self, vars: &[(String, String)]) -> Result<(), PlanError> {
    for (key, value) in vars {
      if !ENV_NAME.is_match(key) {
        return Err(PlanError::InvalidEnvName { key: key.clone() });
      }
      self.push(env_set(key, value));
    }
    Ok(())
  }

  fn staged_files(&mut self) {
    let inputs = self.inputs;
    for dest in inputs.build_files.keys() {
      self.push(Directive::CopyFile {
        src: staged_path(dest),
        dst: dest.clone(),
      });
    }
  }

  fn phase(&mut self, phase: Phase, steps: &[ScriptStep]) -> Result<(), PlanError> {
    if let Some(step) = steps.iter().find(|step| !valid_user(&step.user)) {
      return Err(PlanError::InvalidUser {
        phase,
        user: step.user.clone(),
      });
    }

    let grouped = group_steps_from(&self.current_user, steps);
    debug!(%phase, steps = steps.len(), directives = grouped.directives.len(), "grouped phase");
    self.directives.extend(grouped.directives);
    self.current_user = grouped.final_user;
    Ok(())
  }

  fn workdir(&mut self) -> Result<(), PlanError> {
    let inputs = self.inputs;
    if let Some(path) = &inputs.workdir {
      if path.trim().is_empty() || path.contains(['\n', '\r']) {
        return Err(PlanError::InvalidWorkdir { path: path.clone() });
      }
      self.push(Directive::WorkDir(path.clone()));
    }
    Ok(())
  }

  /// Pre-assembly copies land as root, so ownership is handed back to the
  /// repo owner before any pre-assembly script runs.
  fn preassemble(&mut self) -> Result<(), PlanError> {
    let inputs = self.inputs;
    let repo_dir = &inputs.repo_dir;
    for (dest, src) in &inputs.preassemble_files {
      self.push(Directive::CopyFile {
        src: format!("{}/{}", SOURCE_PREFIX, src.trim_start_matches('/')),
        dst: format!("{}/{}", repo_dir, dest.trim_start_matches('/')),
      });
    }

    if !inputs.preassemble_files.is_empty() {
      if self.current_user != ROOT_USER {
        self.push(Directive::UserSwitch(ROOT_USER.to_string()));
        self.current_user = ROOT_USER.to_string();
      }
      let owner = &inputs.owner;
      self.push(Directive::RunBatch(vec![format!("chown -R {owner}:{owner} {repo_dir}")]));
    }

    self.phase(Phase::PreAssemble, &inputs.preassemble_scripts)
  }

  fn labels(&mut self) {
    let inputs = self.inputs;
    for (key, value) in &inputs.labels {
      self.push(Directive::Label {
        key: key.clone(),
        value: value.clone(),
      });
    }
  }

  fn post_build(&mut self) {
    let inputs = self.inputs;
    for script in &inputs.post_build_scripts {
      let word = shell::quote(script);
      self.push(Directive::RunBatch(vec![format!("chmod +x {}", word)]));
      self.push(Directive::RunBatch(vec![format!("./{}", word)]));
    }
  }

  /// The start script is resolved at container start, when the working
  /// directory may differ from the build, so its path is recorded absolute.
  fn start_script(&mut self) {
    let inputs = self.inputs;
    let Some(start) = &inputs.start_script else {
      return;
    };

    let (absolute, quoted) = if start.starts_with('/') {
      (start.clone(), format!("\"{}\"", shell::escape_double_quoted(start)))
    } else {
      let repo_dir = &inputs.repo_dir;
      (
        format!("{}/{}", repo_dir, start),
        format!("\"{}/{}\"", repo_dir, shell::escape_double_quoted(start)),
      )
    };

    self.push(Directive::RunBatch(vec![format!("chmod +x {}", quoted)]));
    self.push(env_set(ENTRYPOINT_MARKER_VAR, &absolute));
  }

  fn entrypoint(&mut self) {
    let inputs = self.inputs;
    if let Some(entrypoint) = &inputs.entrypoint {
      self.push(Directive::Entrypoint(entrypoint.clone()));
    }
    if let Some(cmd) = &inputs.cmd {
      self.push(Directive::Cmd(cmd.clone()));
    }
  }
}

fn env_set(key: &str, value: &str) -> Directive {
  Directive::EnvSet {
    key: key.to_string(),
    value: value.to_string(),
  }
}

fn apt_install(install: &str) -> Directive {
  let mut commands = vec!["apt-get -qq update".to_string(), install.to_string()];
  commands.extend(APT_CLEANUP.iter().map(|c| c.to_string()));
  Directive::RunBatch(commands)
}

fn package_words(packages: &[String]) -> String {
  packages.iter().map(|p| shell::quote(p)).collect::<Vec<_>>().join(" ")
}

fn valid_user(user: &str) -> bool {
  !user.is_empty()
    && user
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '$' | '{' | '}' | ':'))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::packages::PackageError;

  fn count<F: Fn(&Directive) -> bool>(plan: &BuildPlan, f: F) -> usize {
    plan.directives().iter().filter(|d| f(d)).count()
  }

  fn is_chown(d: &Directive) -> bool {
    matches!(d, Directive::RunBatch(cmds) if cmds.len() == 1 && cmds[0].starts_with("chown -R"))
  }

  #[test]
  fn empty_inputs_produce_only_base_image() {
    let plan = assemble(&PlanInputs::default()).unwrap();
    assert_eq!(plan.directives(), &[Directive::From(BASE_IMAGE.to_string())]);
  }

  #[test]
  fn package_groups_stay_separate_and_sorted() {
    let inputs = PlanInputs {
      base_packages: vec!["wget".into()],
      packages: vec!["git".into(), "curl".into(), "git".into()],
      apt_txt: Some("vim\nbc # calculator\n".into()),
      ..Default::default()
    };
    let plan = assemble(&inputs).unwrap();

    let installs: Vec<_> = plan
      .directives()
      .iter()
      .filter_map(|d| match d {
        Directive::RunBatch(cmds) => cmds.iter().find(|c| c.contains(" install ")).cloned(),
        _ => None,
      })
      .collect();

    assert_eq!(
      installs,
      vec![
        "apt-get -qq install --yes --no-install-recommends wget > /dev/null",
        "apt-get -qq install --yes curl git > /dev/null",
        "apt-get install --yes --no-install-recommends bc vim",
      ]
    );
  }

  #[test]
  fn invalid_package_aborts_assembly() {
    let inputs = PlanInputs {
      packages: vec!["curl".into(), "$(reboot)".into()],
      ..Default::default()
    };
    assert_eq!(
      assemble(&inputs).unwrap_err(),
      PlanError::Package(PackageError::InvalidPackageName {
        name: "$(reboot)".into()
      })
    );
  }

  #[test]
  fn invalid_apt_txt_aborts_assembly() {
    let inputs = PlanInputs {
      apt_txt: Some("curl\n;ls\n".into()),
      ..Default::default()
    };
    assert!(matches!(assemble(&inputs), Err(PlanError::Package(_))));
  }

  #[test]
  fn fixup_only_after_preassemble_copies() {
    let plan = assemble(&PlanInputs::default()).unwrap();
    assert_eq!(count(&plan, is_chown), 0);

    let mut inputs = PlanInputs::default();
    inputs.preassemble_files.insert("environment.yml".into(), "binder/environment.yml".into());
    inputs.preassemble_files.insert("requirements.txt".into(), "requirements.txt".into());
    let plan = assemble(&inputs).unwrap();
    assert_eq!(count(&plan, is_chown), 1);

    let copies: Vec<_> = plan
      .directives()
      .iter()
      .filter_map(|d| match d {
        Directive::CopyFile { src, dst } => Some((src.as_str(), dst.as_str())),
        _ => None,
      })
      .collect();
    assert_eq!(
      copies,
      vec![
        ("src/binder/environment.yml", "${REPO_DIR}/environment.yml"),
        ("src/requirements.txt", "${REPO_DIR}/requirements.txt"),
      ]
    );
  }

  #[test]
  fn fixup_switches_back_to_root_when_needed() {
    let mut inputs = PlanInputs {
      build_scripts: vec![ScriptStep::new("jovyan", "echo setup")],
      preassemble_scripts: vec![ScriptStep::new("root", "echo pre")],
      ..Default::default()
    };
    inputs.preassemble_files.insert("a".into(), "a".into());
    let plan = assemble(&inputs).unwrap();

    let tail: Vec<_> = plan.directives().iter().skip_while(|d| !matches!(d, Directive::CopyFile { .. })).collect();
    assert!(matches!(tail[1], Directive::UserSwitch(u) if u == "root"));
    assert!(is_chown(tail[2]));
    assert_eq!(tail[3], &Directive::RunBatch(vec!["echo pre".into()]));
  }

  #[test]
  fn user_is_threaded_across_phases() {
    let inputs = PlanInputs {
      build_scripts: vec![ScriptStep::new("jovyan", "a")],
      assemble_scripts: vec![ScriptStep::new("root", "b")],
      ..Default::default()
    };
    let plan = assemble(&inputs).unwrap();
    assert_eq!(
      &plan.directives()[1..],
      &[
        Directive::UserSwitch("jovyan".into()),
        Directive::RunBatch(vec!["a".into()]),
        Directive::UserSwitch("root".into()),
        Directive::RunBatch(vec!["b".into()]),
      ]
    );
  }

  #[test]
  fn start_script_gets_grant_and_marker() {
    let inputs = PlanInputs {
      start_script: Some("run.sh".into()),
      ..Default::default()
    };
    let plan = assemble(&inputs).unwrap();
    assert_eq!(
      &plan.directives()[1..],
      &[
        Directive::RunBatch(vec![r#"chmod +x "${REPO_DIR}/run.sh""#.into()]),
        Directive::EnvSet {
          key: "R2D_ENTRYPOINT".into(),
          value: "${REPO_DIR}/run.sh".into()
        },
      ]
    );
  }

  #[test]
  fn post_build_runs_before_start_registration() {
    let inputs = PlanInputs {
      post_build_scripts: vec!["binder/postBuild".into()],
      start_script: Some("binder/start".into()),
      ..Default::default()
    };
    let plan = assemble(&inputs).unwrap();
    let runs: Vec<_> = plan
      .directives()
      .iter()
      .filter_map(|d| match d {
        Directive::RunBatch(cmds) => Some(cmds[0].as_str()),
        _ => None,
      })
      .collect();
    assert_eq!(
      runs,
      vec![
        "chmod +x binder/postBuild",
        "./binder/postBuild",
        r#"chmod +x "${REPO_DIR}/binder/start""#
      ]
    );
  }

  #[test]
  fn labels_sorted_and_path_extended() {
    let mut inputs = PlanInputs {
      path: vec!["/opt/a/bin".into(), "/opt/b/bin".into()],
      ..Default::default()
    };
    inputs.labels.insert("zeta".into(), "1".into());
    inputs.labels.insert("alpha".into(), "2".into());
    let plan = assemble(&inputs).unwrap();

    assert!(plan.directives().contains(&Directive::EnvSet {
      key: "PATH".into(),
      value: "/opt/a/bin:/opt/b/bin:${PATH}".into()
    }));
    let keys: Vec<_> = plan
      .directives()
      .iter()
      .filter_map(|d| match d {
        Directive::Label { key, .. } => Some(key.as_str()),
        _ => None,
      })
      .collect();
    assert_eq!(keys, vec!["alpha", "zeta"]);
  }

  #[test]
  fn staged_files_copied_in_destination_order() {
    let mut inputs = PlanInputs::default();
    inputs.build_files.insert("/usr/local/bin/z".into(), "host/z".into());
    inputs.build_files.insert("/etc/a.conf".into(), "host/a".into());
    let plan = assemble(&inputs).unwrap();
    assert_eq!(
      &plan.directives()[1..],
      &[
        Directive::CopyFile {
          src: staged_path("/etc/a.conf"),
          dst: "/etc/a.conf".into()
        },
        Directive::CopyFile {
          src: staged_path("/usr/local/bin/z"),
          dst: "/usr/local/bin/z".into()
        },
      ]
    );
  }

  #[test]
  fn absolute_and_relative_destinations_copy_from_distinct_sources() {
    let mut inputs = PlanInputs::default();
    inputs.build_files.insert("/etc/a".into(), "host/abs".into());
    inputs.build_files.insert("etc/a".into(), "host/rel".into());
    let plan = assemble(&inputs).unwrap();

    let sources: Vec<_> = plan
      .directives()
      .iter()
      .filter_map(|d| match d {
        Directive::CopyFile { src, .. } => Some(src.as_str()),
        _ => None,
      })
      .collect();
    assert_eq!(sources.len(), 2);
    assert_ne!(sources[0], sources[1]);
  }

  #[test]
  fn rejects_unsafe_env_names_and_users() {
    let inputs = PlanInputs {
      env: vec![("BAD NAME".into(), "x".into())],
      ..Default::default()
    };
    assert!(matches!(assemble(&inputs), Err(PlanError::InvalidEnvName { .. })));

    let inputs = PlanInputs {
      assemble_scripts: vec![ScriptStep::new("root\nRUN rm -rf /", "x")],
      ..Default::default()
    };
    assert!(matches!(
      assemble(&inputs),
      Err(PlanError::InvalidUser {
        phase: Phase::Assemble,
        ..
      })
    ));
  }

  #[test]
  fn locale_and_frontend_are_independent() {
    let apt_only = assemble(&PlanInputs {
      set_up_apt: true,
      ..Default::default()
    })
    .unwrap();
    assert_eq!(apt_only.len(), 2);

    let locales_only = assemble(&PlanInputs {
      set_up_locales: true,
      ..Default::default()
    })
    .unwrap();
    assert!(!locales_only.directives().contains(&env_set("DEBIAN_FRONTEND", "noninteractive")));
    assert!(locales_only.directives().contains(&env_set("LANG", "en_US.UTF-8")));
  }
}
