//! Shared utilities

pub mod config;
pub mod fs;
pub mod hash;
pub mod process;
pub mod shell;
pub mod update;

pub use config::Config;
pub use process::ProcessBuilder;
pub use shell::{Shell, Status};
