use crate::core::context::Context;
use crate::error::{Error, Result};
use crate::util::process::{require_executable, ProcessBuilder};
use crate::util::shell::{Shell, Status};

pub(super) fn package(shell: &Shell, ctx: &mut Context) -> Result<()> {
    let image = image_name(ctx)?;
    let docker = require_executable("docker")?;

    shell.status(Status::Packaging, format!("container image {image}"));
    ProcessBuilder::new(docker)
        .arg("build")
        .arg(".")
        .arg(format!("-t={image}"))
        .env("DOCKER_BUILDKIT", "0")
        .cwd(&ctx.cwd)
        .exec_and_check(shell.echo_output())?;

    shell.status(Status::Finished, format!("built container image {image}"));
    Ok(())
}

/// Check the image preconditions and return the tag to build.
fn image_name(ctx: &Context) -> Result<String> {
    if !ctx.has_dockerfile() {
        return Err(Error::Precondition("missing Dockerfile".to_string()));
    }
    if !ctx.bundle.exists {
        return Err(Error::Precondition("missing project bundle".to_string()));
    }
    ctx.require_directive("building a container image")?
        .docker_image_name()
}
