use crate::core::context::Context;
use crate::error::{Error, Result};
use crate::util::process::{require_executable, ProcessBuilder};
use crate::util::shell::{Shell, Status};

pub(super) fn publish(shell: &Shell, ctx: &Context) -> Result<()> {
    let directive = ctx.require_directive("publishing a container image")?;
    if !ctx.bundle.exists {
        return Err(Error::Precondition("missing project bundle".to_string()));
    }

    let image = directive.docker_image_name()?;
    let docker = require_executable("docker")?;

    let listing = ProcessBuilder::new(&docker)
        .args(["images", "--format", "{{ .Repository }}:{{ .Tag }}"])
        .exec_and_check(false)?;
    if !image_listed(&listing, &image) {
        return Err(Error::Precondition(format!(
            "image {image} not found, run `runway build --docker` first"
        )));
    }

    shell.status(Status::Publishing, &image);
    ProcessBuilder::new(&docker)
        .arg("push")
        .arg(&image)
        .exec_and_check(shell.echo_output())?;

    shell.status(Status::Finished, format!("pushed {image}"));
    Ok(())
}

/// Whether `image` appears in `docker images` output of `repo:tag` lines.
fn image_listed(listing: &str, image: &str) -> bool {
    listing.lines().any(|line| line.trim() == image)
}
