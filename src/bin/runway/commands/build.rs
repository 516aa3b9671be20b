//! `runway build` command

use anyhow::{anyhow, bail, Result};

use crate::cli::BuildArgs;
use runway::builder::remote::{build_remote, HttpBuildService};
use runway::builder::{Builder, Toolchain};
use runway::packager::{PackageJob, Packager};
use runway::{Error, Language, Shell};

pub fn execute(args: BuildArgs, shell: &Shell) -> Result<()> {
    let (mut ctx, config) = super::load_project(&args.dir)?;

    if ctx.runnables.is_empty() {
        return Err(Error::Precondition(format!(
            "no runnables found in {} (no .runnable.yaml files found)",
            ctx.cwd.display()
        ))
        .into());
    }

    if ctx.cwd_is_runnable {
        if args.docker {
            bail!("cannot build a container image for a single Runnable (must be a project)");
        }
        shell.note("building single Runnable (run from project root to create bundle)");
    }

    ctx.langs = args
        .langs
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.trim().parse::<Language>().map_err(|e| anyhow!(e)))
        .collect::<Result<_>>()?;

    // Builder tag: CLI > config > this version
    ctx.builder_tag = args.builder_tag.unwrap_or_else(|| config.builder_tag());

    if let (Some(mount), Some(rel)) = (args.mountpath, args.relpath) {
        ctx.mount_path = mount;
        ctx.rel_docker_path = rel;
    }

    if args.remote {
        let service = HttpBuildService::new(config.remote_endpoint())?;
        let results = build_remote(shell, &mut ctx, &service, config.poll_interval())?;
        tracing::debug!("remote build returned {} result(s)", results.len());
        return Ok(());
    }

    let toolchain = if args.native {
        Toolchain::Native
    } else {
        Toolchain::Docker
    };
    Builder::new(shell, &config)
        .build(&mut ctx, toolchain)
        .map_err(|e| e.in_job("build", toolchain_name(toolchain)))?;

    // Only full project builds are bundled.
    let bundle = !args.no_bundle && !ctx.cwd_is_runnable && ctx.langs.is_empty();
    if !bundle && !ctx.cwd_is_runnable {
        shell.note("skipping bundle");
    }

    let mut jobs = Vec::new();
    if bundle {
        jobs.push(PackageJob::Bundle);
    }
    if args.docker {
        jobs.push(PackageJob::DockerImage);
    }
    if !jobs.is_empty() {
        Packager::new(shell).package(&mut ctx, &jobs)?;
    }

    Ok(())
}

fn toolchain_name(toolchain: Toolchain) -> &'static str {
    match toolchain {
        Toolchain::Native => "native",
        Toolchain::Docker => "docker",
    }
}
