//! Function builds.
//!
//! The [`Builder`] compiles every allowed Runnable of a [`Context`] either
//! natively on the host or by launching one builder container per language.
//! Remote builds live in [`remote`].

pub mod exec;
pub mod prereq;
pub mod remote;
pub mod template;
pub mod toolchain;

use std::collections::BTreeMap;

use crate::core::context::Context;
use crate::core::runnable::{Language, Runnable};
use crate::error::{Error, Result};
use crate::util::config::Config;
use crate::util::shell::{Shell, Status};

pub use crate::core::runnable::BuildResult;
pub use exec::ExecEnv;
pub use template::TemplateContext;

/// Where local builds run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toolchain {
    /// Guest toolchains installed on the host.
    Native,
    /// Per-language builder images.
    Docker,
}

/// Progress of one Runnable's native build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Pending,
    PrereqsChecked,
    Built,
    Succeeded,
    Failed,
}

/// A build result and what it belongs to: a Runnable name for native
/// builds, a language for container builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub target: String,
    pub result: BuildResult,
}

/// Builds the Runnables of a project.
pub struct Builder<'a> {
    shell: &'a Shell,
    config: &'a Config,
    os: String,
    states: BTreeMap<String, BuildState>,
    reports: Vec<BuildReport>,
}

impl<'a> Builder<'a> {
    pub fn new(shell: &'a Shell, config: &'a Config) -> Self {
        Builder {
            shell,
            config,
            os: std::env::consts::OS.to_string(),
            states: BTreeMap::new(),
            reports: Vec::new(),
        }
    }

    /// Resolve toolchain tables as if running on `os`.
    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = os.into();
        self
    }

    /// Results of the last build, in the order they were produced.
    pub fn reports(&self) -> &[BuildReport] {
        &self.reports
    }

    /// State a Runnable's native build reached, if it was attempted.
    pub fn state(&self, runnable: &str) -> Option<BuildState> {
        self.states.get(runnable).copied()
    }

    /// Build every Runnable the language allow-list admits.
    ///
    /// Results are recorded even for failed builds; the first failure stops
    /// the run and is returned wrapped with its Runnable or language.
    pub fn build(&mut self, ctx: &mut Context, toolchain: Toolchain) -> Result<()> {
        self.states.clear();
        self.reports.clear();

        match toolchain {
            Toolchain::Native => self.build_native(ctx),
            Toolchain::Docker => self.build_docker(ctx),
        }
    }

    fn build_native(&mut self, ctx: &mut Context) -> Result<()> {
        let langs = ctx.langs.clone();

        for runnable in ctx.runnables.iter_mut() {
            if !langs.is_empty() && !langs.contains(&runnable.language) {
                tracing::debug!("skipping {} ({})", runnable.name(), runnable.language);
                continue;
            }

            self.shell.status(
                Status::Building,
                format!("{} ({})", runnable.name(), runnable.language),
            );

            let mut result = BuildResult::default();
            let outcome = self.build_runnable(runnable, &mut result);
            result.succeeded = outcome.is_ok();
            self.transition(
                runnable.name(),
                if result.succeeded {
                    BuildState::Succeeded
                } else {
                    BuildState::Failed
                },
            );

            self.reports.push(BuildReport {
                target: runnable.name().to_string(),
                result: result.clone(),
            });
            runnable.result = Some(result);

            if let Err(e) = outcome {
                self.shell
                    .status(Status::Failed, format!("{} ({})", runnable.name(), runnable.language));
                return Err(e.building(runnable.name()));
            }

            self.shell.status(
                Status::Finished,
                format!("{} -> {}", runnable.name(), runnable.module_path().display()),
            );
        }

        Ok(())
    }

    fn build_runnable(&mut self, runnable: &Runnable, result: &mut BuildResult) -> Result<()> {
        self.transition(runnable.name(), BuildState::Pending);

        let flags = match &runnable.manifest.compiler_flags {
            Some(flags) => flags.clone(),
            None => analyze_compiler_flags(runnable),
        };
        let template =
            TemplateContext::for_runnable(runnable, self.config.js_toolchain(), &flags);

        let prereqs = prereq::prereqs(&self.os, runnable.language)?;
        prereq::check_and_fix(self.shell, runnable, &prereqs, &template, result)?;
        self.transition(runnable.name(), BuildState::PrereqsChecked);

        let commands =
            toolchain::resolve_commands(&self.config.toolchain.commands, &self.os, runnable.language)?;

        for command in &commands {
            let command = template.render(command)?;
            self.shell.verbose(&command);

            let captured = ExecEnv::Host
                .command(&command, &runnable.path)
                .exec_tee(self.shell.echo_output())?;
            result.append(&captured.log);

            if !captured.status.success() {
                return Err(Error::Command {
                    command,
                    code: captured.status.code(),
                    log: captured.log,
                });
            }
        }
        self.transition(runnable.name(), BuildState::Built);

        runnable.require_module()
    }

    fn build_docker(&mut self, ctx: &Context) -> Result<()> {
        crate::util::process::require_executable("docker")?;

        let mut langs: Vec<Language> = Vec::new();
        for runnable in &ctx.runnables {
            if ctx.should_build_lang(runnable.language) && !langs.contains(&runnable.language) {
                langs.push(runnable.language);
            }
        }

        for lang in langs {
            let env = ExecEnv::Container {
                image: toolchain::docker_image(lang, &ctx.builder_tag)?,
                mount: ctx.mount_path.clone(),
            };
            let command = format!(
                "runway build {} --native --no-bundle --langs {lang}",
                ctx.rel_docker_path
            );

            self.shell.status(Status::Building, format!("{lang} runnables in a builder container"));

            let captured = env
                .command(&command, &ctx.cwd)
                .exec_tee(self.shell.echo_output())?;

            let result = BuildResult {
                succeeded: captured.status.success(),
                output_log: captured.log.clone(),
            };
            self.reports.push(BuildReport {
                target: lang.to_string(),
                result,
            });

            if !captured.status.success() {
                self.shell.status(Status::Failed, format!("{lang} builder container"));
                return Err(Error::Command {
                    command: env.command(&command, &ctx.cwd).display_command(),
                    code: captured.status.code(),
                    log: captured.log,
                }
                .building(lang.to_string()));
            }

            self.shell.status(Status::Finished, format!("{lang} runnables"));
        }

        Ok(())
    }

    fn transition(&mut self, runnable: &str, next: BuildState) {
        let prev = self.states.insert(runnable.to_string(), next);
        tracing::debug!("{runnable}: {prev:?} -> {next:?}");
    }
}

/// Extra compiler flags implied by a Runnable's sources.
///
/// AssemblyScript projects that depend on `json-as` need its transform.
pub fn analyze_compiler_flags(runnable: &Runnable) -> String {
    if runnable.language != Language::AssemblyScript {
        return String::new();
    }

    match std::fs::read_to_string(runnable.path.join("package.json")) {
        Ok(package) if package.contains("json-as") => {
            "--transform ./node_modules/json-as/transform".to_string()
        }
        Ok(_) => String::new(),
        Err(e) => {
            tracing::debug!("no package.json for {}: {e}", runnable.name());
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn add_runnable(root: &Path, name: &str, lang: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(".runnable.yaml"), format!("lang: {lang}\n")).unwrap();
    }

    fn config_with(commands: Vec<(&str, Vec<&str>)>) -> Config {
        let mut config = Config::default();
        for (lang, cmds) in commands {
            config.toolchain.commands.insert(
                lang.to_string(),
                cmds.iter().map(|c| c.to_string()).collect(),
            );
        }
        config
    }

    #[test]
    fn test_native_build_records_results() {
        let tmp = TempDir::new().unwrap();
        add_runnable(tmp.path(), "fn-a", "rust");
        add_runnable(tmp.path(), "fn-b", "tinygo");

        let config = config_with(vec![
            ("rust", vec!["echo compiling {{ .UnderscoreName }}", "printf wasm > {{ .Name }}.wasm"]),
            ("tinygo", vec!["printf wasm > {{ .Name }}.wasm"]),
        ]);
        let shell = Shell::capturing();
        let mut ctx = Context::for_directory(tmp.path()).unwrap();

        let mut builder = Builder::new(&shell, &config).with_os("linux");
        builder.build(&mut ctx, Toolchain::Native).unwrap();

        assert!(tmp.path().join("fn-a/fn-a.wasm").is_file());
        assert!(tmp.path().join("fn-b/fn-b.wasm").is_file());
        let fn_a = ctx.runnables[0].result.as_ref().unwrap();
        assert!(fn_a.succeeded);
        assert!(fn_a.output_log.contains("compiling fn_a"));
        assert_eq!(builder.state("fn-a"), Some(BuildState::Succeeded));
        assert_eq!(builder.reports().len(), 2);
        assert!(shell.captured().contains(&"Building fn-a (rust)".to_string()));
    }

    #[test]
    fn test_failure_keeps_log_and_stops() {
        let tmp = TempDir::new().unwrap();
        add_runnable(tmp.path(), "fn-a", "rust");
        add_runnable(tmp.path(), "fn-b", "rust");

        let config = config_with(vec![("rust", vec!["echo cannot find crate; exit 101", "echo unreachable"])]);
        let shell = Shell::capturing();
        let mut ctx = Context::for_directory(tmp.path()).unwrap();

        let mut builder = Builder::new(&shell, &config).with_os("linux");
        let err = builder.build(&mut ctx, Toolchain::Native).unwrap_err();

        assert!(matches!(err, Error::Build { ref target, .. } if target == "fn-a"));
        assert!(err.log().unwrap().contains("cannot find crate"));

        let result = ctx.runnables[0].result.as_ref().unwrap();
        assert!(!result.succeeded);
        assert!(result.output_log.contains("cannot find crate"));
        assert!(!result.output_log.contains("unreachable"));
        assert_eq!(builder.state("fn-a"), Some(BuildState::Failed));
        assert!(ctx.runnables[1].result.is_none());
        assert_eq!(builder.state("fn-b"), None);
    }

    #[test]
    fn test_missing_module_fails_build() {
        let tmp = TempDir::new().unwrap();
        add_runnable(tmp.path(), "fn-a", "tinygo");

        let config = config_with(vec![("tinygo", vec!["true"])]);
        let shell = Shell::capturing();
        let mut ctx = Context::for_directory(tmp.path()).unwrap();

        let err = Builder::new(&shell, &config)
            .with_os("linux")
            .build(&mut ctx, Toolchain::Native)
            .unwrap_err();
        match err {
            Error::Build { source, .. } => assert!(matches!(*source, Error::MissingModule { .. })),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_allow_list_skips_runnables() {
        let tmp = TempDir::new().unwrap();
        add_runnable(tmp.path(), "fn-a", "rust");
        add_runnable(tmp.path(), "fn-b", "swift");

        let config = config_with(vec![("rust", vec!["printf wasm > {{ .Name }}.wasm"]), ("swift", vec!["exit 1"])]);
        let shell = Shell::capturing();
        let mut ctx = Context::for_directory(tmp.path()).unwrap();
        ctx.langs = vec![Language::Rust];

        let mut builder = Builder::new(&shell, &config).with_os("linux");
        builder.build(&mut ctx, Toolchain::Native).unwrap();
        assert!(ctx.runnables[1].result.is_none());
        assert_eq!(builder.state("fn-b"), None);
    }

    #[test]
    fn test_unsupported_os() {
        let tmp = TempDir::new().unwrap();
        add_runnable(tmp.path(), "fn-a", "rust");

        let config = Config::default();
        let shell = Shell::capturing();
        let mut ctx = Context::for_directory(tmp.path()).unwrap();

        let err = Builder::new(&shell, &config)
            .with_os("plan9")
            .build(&mut ctx, Toolchain::Native)
            .unwrap_err();
        match err {
            Error::Build { source, .. } => assert!(matches!(*source, Error::Unsupported { .. })),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_compiler_flags_reach_commands() {
        let tmp = TempDir::new().unwrap();
        add_runnable(tmp.path(), "fn-as", "assemblyscript");
        std::fs::write(
            tmp.path().join("fn-as/package.json"),
            r#"{"dependencies":{"json-as":"^0.5.0"}}"#,
        )
        .unwrap();
        std::fs::create_dir_all(tmp.path().join("fn-as/node_modules")).unwrap();

        let config = config_with(vec![(
            "assemblyscript",
            vec!["echo flags={{ .CompilerFlags }}", "printf wasm > {{ .Name }}.wasm"],
        )]);
        let shell = Shell::capturing();
        let mut ctx = Context::for_directory(tmp.path()).unwrap();

        Builder::new(&shell, &config)
            .with_os("linux")
            .build(&mut ctx, Toolchain::Native)
            .unwrap();
        let log = &ctx.runnables[0].result.as_ref().unwrap().output_log;
        assert!(log.contains("flags=--transform ./node_modules/json-as/transform"));
    }

    #[test]
    fn test_declared_flags_win_over_analysis() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("fn-as");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(".runnable.yaml"),
            "lang: assemblyscript\ncompilerFlags: --optimize\n",
        )
        .unwrap();
        std::fs::write(dir.join("package.json"), r#"{"dependencies":{"json-as":"1"}}"#).unwrap();
        std::fs::create_dir_all(dir.join("node_modules")).unwrap();

        let config = config_with(vec![(
            "assemblyscript",
            vec!["echo flags={{ .CompilerFlags }}", "printf wasm > {{ .Name }}.wasm"],
        )]);
        let shell = Shell::capturing();
        let mut ctx = Context::for_directory(tmp.path()).unwrap();

        Builder::new(&shell, &config)
            .with_os("linux")
            .build(&mut ctx, Toolchain::Native)
            .unwrap();
        let log = &ctx.runnables[0].result.as_ref().unwrap().output_log;
        assert!(log.contains("flags=--optimize"));
        assert!(!log.contains("json-as/transform"));
    }
}
