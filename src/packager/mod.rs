//! Packaging built Runnables into deployable artifacts.

mod bundle;
mod docker_image;

pub use bundle::collect_static_files;

use crate::core::context::Context;
use crate::error::Result;
use crate::util::shell::Shell;

/// One way of packaging a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageJob {
    /// Validate the Directive and write `runnables.wasm.zip`.
    Bundle,
    /// Build a container image around the bundle.
    DockerImage,
}

impl PackageJob {
    pub fn job_type(&self) -> &'static str {
        match self {
            PackageJob::Bundle => "bundle",
            PackageJob::DockerImage => "docker",
        }
    }

    pub fn execute(&self, shell: &Shell, ctx: &mut Context) -> Result<()> {
        match self {
            PackageJob::Bundle => bundle::package(shell, ctx),
            PackageJob::DockerImage => docker_image::package(shell, ctx),
        }
    }
}

/// Runs package jobs in order.
pub struct Packager<'a> {
    shell: &'a Shell,
}

impl<'a> Packager<'a> {
    pub fn new(shell: &'a Shell) -> Self {
        Packager { shell }
    }

    /// Run `jobs` in order, stopping at the first failure.
    pub fn package(&self, ctx: &mut Context, jobs: &[PackageJob]) -> Result<()> {
        for job in jobs {
            tracing::debug!("running package job {}", job.job_type());
            job.execute(self.shell, ctx)
                .map_err(|e| e.in_job("package", job.job_type()))?;
        }
        Ok(())
    }
}
