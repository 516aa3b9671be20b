//! runway CLI - build, bundle and ship WebAssembly function projects

use anyhow::Result;
use clap::Parser;
use runway::Shell;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    let shell = Shell::from_flags(cli.quiet, cli.verbose, cli.color);

    if let Err(e) = run(cli, &shell) {
        eprintln!("error: {:#}", e);
        if let Some(log) = e.downcast_ref::<runway::Error>().and_then(|e| e.log()) {
            if !log.trim().is_empty() {
                eprintln!("\n{}", log.trim_end());
            }
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli, shell: &Shell) -> Result<()> {
    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("runway=debug")
    } else {
        EnvFilter::new("runway=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    if !matches!(cli.command, Commands::Completions(_)) {
        runway::util::update::check_for_updates(shell);
    }

    match cli.command {
        Commands::Build(args) => commands::build::execute(args, shell),
        Commands::Publish(args) => commands::publish::execute(args, shell),
        Commands::Deploy(args) => commands::deploy::execute(args, shell),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
