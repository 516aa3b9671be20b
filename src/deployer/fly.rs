use std::path::Path;

use crate::core::context::Context;
use crate::core::directive::Directive;
use crate::error::Result;
use crate::util::process::{require_executable, ProcessBuilder};
use crate::util::shell::{Shell, Status};

const AUTH_HINT: &str = "run `flyctl auth login` and try again";

/// Launch or update the project as a Fly.io app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlyDeploy {
    pub org: String,
    pub region: String,
    /// Build and push the image from this machine instead of Fly's builders.
    pub local: bool,
}

/// One command of a Fly deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FlyStep {
    argv: Vec<String>,
    /// Failure means the user is not logged in.
    auth: bool,
}

impl FlyStep {
    fn new(argv: &[&str]) -> Self {
        FlyStep {
            argv: argv.iter().map(|s| s.to_string()).collect(),
            auth: false,
        }
    }

    fn auth(argv: &[&str]) -> Self {
        FlyStep {
            auth: true,
            ..FlyStep::new(argv)
        }
    }
}

impl FlyDeploy {
    pub fn new(org: impl Into<String>, region: impl Into<String>, local: bool) -> Self {
        FlyDeploy {
            org: org.into(),
            region: region.into(),
            local,
        }
    }

    /// The commands to run, in order. An existing `fly.toml` turns a launch
    /// into a redeploy of the configured app.
    fn plan(&self, directive: &Directive, has_fly_toml: bool) -> Vec<FlyStep> {
        let name = directive.dashed_identifier();

        if self.local {
            let image = format!("registry.fly.io/{name}:{}", directive.app_version);
            return vec![
                FlyStep::auth(&["flyctl", "auth", "docker"]),
                FlyStep::new(&[
                    "docker", "buildx", "build", ".", "--platform", "linux/amd64", "--push", "-t",
                    image.as_str(),
                ]),
                FlyStep::new(&[
                    "flyctl", "deploy", "-i", image.as_str(), "--name", name.as_str(), "--org",
                    self.org.as_str(), "--region", self.region.as_str(), "--now",
                ]),
            ];
        }

        let deploy = if has_fly_toml {
            FlyStep::new(&["flyctl", "deploy", "--remote-only", "--now"])
        } else {
            FlyStep::new(&[
                "flyctl", "launch", "--name", name.as_str(), "--org", self.org.as_str(), "--region",
                self.region.as_str(), "--now",
            ])
        };
        vec![FlyStep::auth(&["flyctl", "auth", "whoami"]), deploy]
    }

    pub(super) fn deploy(&self, shell: &Shell, ctx: &Context) -> Result<()> {
        let directive = ctx.require_directive("deploying to fly.io")?;
        let steps = self.plan(directive, has_fly_toml(&ctx.cwd));

        shell.status(
            Status::Deploying,
            format!("{} to fly.io ({})", directive.dashed_identifier(), self.region),
        );

        for step in steps {
            let Some((program, args)) = step.argv.split_first() else {
                continue;
            };
            let program = require_executable(program)?;
            let result = ProcessBuilder::new(program)
                .args(args)
                .cwd(&ctx.cwd)
                .exec_and_check(shell.echo_output() && !step.auth);

            if let Err(err) = result {
                if step.auth {
                    shell.error(AUTH_HINT);
                }
                return Err(err);
            }
        }

        shell.status(Status::Finished, "deployed to fly.io");
        Ok(())
    }
}

fn has_fly_toml(root: &Path) -> bool {
    root.join("fly.toml").is_file()
}
