//! Shipping packaged projects to hosting targets.

mod cloudflare;
mod fly;
mod k8s;

pub use cloudflare::{CloudflareApi, CloudflareDeploy, DEFAULT_API_BASE};
pub use fly::FlyDeploy;
pub use k8s::KubernetesDeploy;

use crate::core::context::Context;
use crate::error::Result;
use crate::util::shell::Shell;

/// Directory the rendered deployment files are written to.
pub const DEPLOYMENT_DIR: &str = ".deployment";

/// One deploy target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployJob {
    Kubernetes(KubernetesDeploy),
    Fly(FlyDeploy),
    Cloudflare(CloudflareDeploy),
}

impl DeployJob {
    pub fn job_type(&self) -> &'static str {
        match self {
            DeployJob::Kubernetes(_) => "kubernetes",
            DeployJob::Fly(_) => "fly.io",
            DeployJob::Cloudflare(_) => "cloudflare",
        }
    }

    pub fn execute(&self, shell: &Shell, ctx: &Context) -> Result<()> {
        match self {
            DeployJob::Kubernetes(job) => job.deploy(shell, ctx),
            DeployJob::Fly(job) => job.deploy(shell, ctx),
            DeployJob::Cloudflare(job) => job.deploy(shell, ctx),
        }
    }
}

/// Runs deploy jobs.
pub struct Deployer<'a> {
    shell: &'a Shell,
}

impl<'a> Deployer<'a> {
    pub fn new(shell: &'a Shell) -> Self {
        Deployer { shell }
    }

    pub fn deploy(&self, ctx: &Context, job: &DeployJob) -> Result<()> {
        job.execute(self.shell, ctx)
            .map_err(|e| e.in_job("deploy", job.job_type()))
    }
}
