//! `runway publish` command

use anyhow::Result;

use crate::cli::{PublishArgs, PublishTarget};
use runway::publisher::{BindlePublish, PublishJob, Publisher};
use runway::Shell;

pub fn execute(args: PublishArgs, shell: &Shell) -> Result<()> {
    match args.target {
        PublishTarget::Bindle { dir, registry } => {
            let (ctx, config) = super::load_project(&dir)?;
            // Registry: CLI/env > config > default
            let registry = registry.unwrap_or_else(|| config.registry_url().to_string());
            let job = PublishJob::Bindle(BindlePublish::new(registry));
            Publisher::new(shell).publish(&ctx, &job)?;
        }
        PublishTarget::Docker { dir } => {
            let (ctx, _) = super::load_project(&dir)?;
            Publisher::new(shell).publish(&ctx, &PublishJob::Docker)?;
        }
    }

    Ok(())
}
