//! `runway deploy` command

use anyhow::Result;

use crate::cli::{DeployArgs, DeployTarget};
use runway::deployer::{CloudflareDeploy, DeployJob, Deployer, FlyDeploy, KubernetesDeploy};
use runway::Shell;

pub fn execute(args: DeployArgs, shell: &Shell) -> Result<()> {
    let (dir, job) = match args.target {
        DeployTarget::K8s {
            dir,
            domain,
            namespace,
        } => {
            let (_, config) = super::load_project(&dir)?;
            let namespace = namespace.unwrap_or_else(|| config.namespace().to_string());
            (dir, DeployJob::Kubernetes(KubernetesDeploy::new(domain, namespace)))
        }
        DeployTarget::Fly {
            dir,
            org,
            region,
            local,
        } => (dir, DeployJob::Fly(FlyDeploy::new(org, region, local))),
        DeployTarget::Cloudflare { dir, domain } => {
            (dir, DeployJob::Cloudflare(CloudflareDeploy::new(domain)))
        }
    };

    let ctx = runway::Context::for_directory(&dir)?;
    Deployer::new(shell).deploy(&ctx, &job)?;

    Ok(())
}
