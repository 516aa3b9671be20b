//! Command implementations

pub mod build;
pub mod completions;
pub mod deploy;
pub mod publish;

use std::path::Path;

use anyhow::Result;
use runway::util::config::{global_config_path, load_config, project_config_path};
use runway::{Config, Context};

/// Discover the project in `dir` and load its merged configuration.
pub fn load_project(dir: &Path) -> Result<(Context, Config)> {
    let ctx = Context::for_directory(dir)?;
    let config = load_config(global_config_path().as_deref(), &project_config_path(&ctx.cwd));
    Ok((ctx, config))
}
