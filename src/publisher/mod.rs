//! Shipping packaged projects to registries.

pub mod bindle;
mod docker;

pub use bindle::BindlePublish;

use crate::core::context::Context;
use crate::error::Result;
use crate::util::shell::Shell;

/// One publish target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishJob {
    /// Push the Directive and modules to a Bindle registry.
    Bindle(BindlePublish),
    /// Push the project's container image.
    Docker,
}

impl PublishJob {
    pub fn job_type(&self) -> &'static str {
        match self {
            PublishJob::Bindle(_) => "bindle",
            PublishJob::Docker => "docker",
        }
    }

    pub fn execute(&self, shell: &Shell, ctx: &Context) -> Result<()> {
        match self {
            PublishJob::Bindle(job) => job.publish(shell, ctx),
            PublishJob::Docker => docker::publish(shell, ctx),
        }
    }
}

/// Runs publish jobs.
pub struct Publisher<'a> {
    shell: &'a Shell,
}

impl<'a> Publisher<'a> {
    pub fn new(shell: &'a Shell) -> Self {
        Publisher { shell }
    }

    pub fn publish(&self, ctx: &Context, job: &PublishJob) -> Result<()> {
        job.execute(self.shell, ctx)
            .map_err(|e| e.in_job("publish", job.job_type()))
    }
}
