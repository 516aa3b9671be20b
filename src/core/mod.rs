//! Core data structures for runway.
//!
//! This module contains the foundational types used throughout runway:
//! - Runnables and their guest languages
//! - The Directive application manifest
//! - The bundle archive format
//! - Project discovery

pub mod bundle;
pub mod context;
pub mod directive;
pub mod runnable;

pub use bundle::{BundleRef, BUNDLE_FILENAME};
pub use context::Context;
pub use directive::{Directive, DIRECTIVE_FILENAME};
pub use runnable::{BuildResult, FunctionManifest, Language, Runnable};
