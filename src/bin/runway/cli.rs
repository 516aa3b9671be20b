//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell as CompletionShell;
use runway::util::shell::ColorChoice;

/// runway - build, bundle and ship WebAssembly function projects
#[derive(Parser)]
#[command(name = "runway")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Print only errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Coloring: auto, always, never
    #[arg(long, global = true, default_value = "auto", value_name = "WHEN")]
    pub color: ColorChoice,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build every function in a project and bundle the result
    Build(BuildArgs),

    /// Push a packaged project to a registry
    Publish(PublishArgs),

    /// Deploy a packaged project
    Deploy(DeployArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct BuildArgs {
    /// Project directory
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Use toolchains installed on this machine instead of builder images
    #[arg(long, conflicts_with = "remote")]
    pub native: bool,

    /// Build on the remote build service
    #[arg(long, conflicts_with_all = ["native", "docker", "no_bundle", "langs"])]
    pub remote: bool,

    /// Only build functions in these languages
    #[arg(long, value_delimiter = ',', value_name = "LANGS")]
    pub langs: Vec<String>,

    /// Skip bundling after the build
    #[arg(long, conflicts_with = "docker")]
    pub no_bundle: bool,

    /// Build a container image around the bundle
    #[arg(long)]
    pub docker: bool,

    /// Tag of the builder images
    #[arg(long, value_name = "TAG")]
    pub builder_tag: Option<String>,

    /// Host directory to mount into builder containers
    #[arg(long, requires = "relpath", value_name = "PATH")]
    pub mountpath: Option<PathBuf>,

    /// Project path relative to the mount, as seen inside builder containers
    #[arg(long, requires = "mountpath", value_name = "PATH")]
    pub relpath: Option<String>,
}

#[derive(Args)]
pub struct PublishArgs {
    #[command(subcommand)]
    pub target: PublishTarget,
}

#[derive(Subcommand)]
pub enum PublishTarget {
    /// Publish the Directive and modules to a Bindle registry
    Bindle {
        /// Project directory
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Registry API root (defaults to config, then http://127.0.0.1:8080/v1)
        #[arg(long, env = "RUNWAY_BINDLE_URL", value_name = "URL")]
        registry: Option<String>,
    },

    /// Push the project's container image
    Docker {
        /// Project directory
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
}

#[derive(Args)]
pub struct DeployArgs {
    #[command(subcommand)]
    pub target: DeployTarget,
}

#[derive(Subcommand)]
pub enum DeployTarget {
    /// Apply the project to the current Kubernetes context
    K8s {
        /// Project directory
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Domain the application is served on
        #[arg(long, default_value = "")]
        domain: String,

        /// Namespace to deploy into (defaults to config, then `runway`)
        #[arg(long)]
        namespace: Option<String>,
    },

    /// Launch or update a Fly.io app
    Fly {
        /// Project directory
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Fly.io organization
        #[arg(long, default_value = "personal")]
        org: String,

        /// Fly.io region
        #[arg(long, default_value = "iad")]
        region: String,

        /// Build and push the image from this machine
        #[arg(long)]
        local: bool,
    },

    /// Deploy request handlers as Cloudflare Workers
    Cloudflare {
        /// Project directory
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Zone the router worker is routed on
        #[arg(long)]
        domain: String,
    },
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: CompletionShell,
}
