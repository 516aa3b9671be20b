//! runway - build, bundle and ship multi-language WebAssembly functions
//!
//! This crate provides the library behind the `runway` binary: project
//! discovery, native/containerized/remote builds, packaging into a bundle
//! and the publish and deploy targets.

pub mod builder;
pub mod core;
pub mod deployer;
pub mod error;
pub mod packager;
pub mod publisher;
pub mod util;

pub use crate::core::{BuildResult, Context, Directive, Language, Runnable};
pub use error::{Error, Result};
pub use util::{Config, Shell};
