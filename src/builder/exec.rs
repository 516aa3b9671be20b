//! Where build commands run.

use std::path::{Path, PathBuf};

use crate::builder::toolchain::BuilderImage;
use crate::util::process::ProcessBuilder;

/// Directory the project is mounted at inside builder containers.
pub const CONTAINER_MOUNT: &str = "/root/runnable";

/// Execution environment for a build command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecEnv {
    /// Run through `sh -c` on the host.
    Host,
    /// Run inside a throwaway builder container with `mount` bound to
    /// [`CONTAINER_MOUNT`].
    Container { image: BuilderImage, mount: PathBuf },
}

impl ExecEnv {
    /// Prepare `command` to run in this environment.
    ///
    /// On the host `command` is a shell line run in `cwd`. In a container it
    /// is split on whitespace and passed as the image's arguments; `cwd` is
    /// not used since the image decides its working directory.
    pub fn command(&self, command: &str, cwd: &Path) -> ProcessBuilder {
        match self {
            ExecEnv::Host => ProcessBuilder::shell(command).cwd(cwd),
            ExecEnv::Container { image, mount } => {
                let mut pb = ProcessBuilder::new("docker").args(["run", "--rm", "--mount"]).arg(
                    format!(
                        "type=bind,source={},target={CONTAINER_MOUNT}",
                        mount.display()
                    ),
                );
                if let Some(platform) = image.platform {
                    pb = pb.args(["--platform", platform]);
                }
                pb.arg(&image.image).args(command.split_whitespace())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_runs_in_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let log = ExecEnv::Host
            .command("pwd", tmp.path())
            .exec_and_check(false)
            .unwrap();
        let reported = std::fs::canonicalize(log.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(tmp.path()).unwrap());
    }

    #[test]
    fn test_container_command_line() {
        let env = ExecEnv::Container {
            image: BuilderImage {
                image: "runwaydev/builder-gr:v0.1.0".to_string(),
                platform: Some("linux/amd64"),
            },
            mount: PathBuf::from("/home/dev/shop"),
        };

        let pb = env.command("runway build fn-c --native --langs grain", Path::new("."));
        assert_eq!(
            pb.display_command(),
            "docker run --rm --mount type=bind,source=/home/dev/shop,target=/root/runnable \
             --platform linux/amd64 runwaydev/builder-gr:v0.1.0 runway build fn-c --native --langs grain"
        );
    }
}
