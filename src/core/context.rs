//! Project discovery.
//!
//! A [`Context`] is the snapshot of a project directory every later stage
//! works from: the Runnables it contains, its Directive, its bundle and the
//! knobs of the current invocation.

use std::path::{Path, PathBuf};

use crate::core::bundle::{BundleFile, BundleRef};
use crate::core::directive::Directive;
use crate::core::runnable::{find_manifest, Language, Runnable};
use crate::error::{Error, Result};

/// Everything known about the project being worked on.
#[derive(Debug, Clone)]
pub struct Context {
    /// Absolute project root.
    pub cwd: PathBuf,

    /// The root itself is a single Runnable.
    pub cwd_is_runnable: bool,

    /// Discovered Runnables, ordered by directory name.
    pub runnables: Vec<Runnable>,

    pub bundle: BundleRef,

    pub directive: Option<Directive>,

    /// Languages allowed to build; empty means all.
    pub langs: Vec<Language>,

    /// Host directory bind-mounted into builder containers.
    pub mount_path: PathBuf,

    /// Project root relative to `mount_path`, as seen inside the container.
    pub rel_docker_path: String,

    /// Tag of the builder images.
    pub builder_tag: String,
}

impl Context {
    /// Discover the project rooted at `dir`.
    ///
    /// A `.runnable.*` file directly in `dir` makes it a single-Runnable
    /// project. Otherwise each immediate subdirectory holding a manifest
    /// becomes a Runnable.
    pub fn for_directory(dir: &Path) -> Result<Self> {
        let cwd = std::path::absolute(dir).map_err(|e| Error::io("resolve", dir, e))?;
        if !cwd.is_dir() {
            return Err(Error::Precondition(format!(
                "{} is not a directory",
                cwd.display()
            )));
        }

        let (runnables, cwd_is_runnable) = discover_runnables(&cwd)?;
        let bundle = BundleRef::for_root(&cwd);
        let mut directive = Directive::load(&cwd)?;
        if let Some(directive) = directive.as_mut() {
            directive.merge_queries(&cwd)?;
        }

        tracing::debug!(
            "discovered {} runnable(s) in {}",
            runnables.len(),
            cwd.display()
        );

        Ok(Context {
            mount_path: cwd.clone(),
            cwd,
            cwd_is_runnable,
            runnables,
            bundle,
            directive,
            langs: Vec::new(),
            rel_docker_path: ".".to_string(),
            builder_tag: format!("v{}", env!("CARGO_PKG_VERSION")),
        })
    }

    /// Whether `lang` passes the language allow-list.
    pub fn should_build_lang(&self, lang: Language) -> bool {
        self.langs.is_empty() || self.langs.contains(&lang)
    }

    /// Whether a Runnable called `name` was discovered.
    pub fn runnable_exists(&self, name: &str) -> bool {
        self.runnables.iter().any(|r| r.name() == name)
    }

    /// Read every Runnable's compiled module, in discovery order.
    pub fn modules(&self) -> Result<Vec<BundleFile>> {
        self.runnables
            .iter()
            .map(|r| {
                Ok(BundleFile {
                    name: r.name().to_string(),
                    contents: crate::util::fs::read(&r.module_path())?,
                })
            })
            .collect()
    }

    /// Path of the project's Dockerfile.
    pub fn dockerfile(&self) -> PathBuf {
        self.cwd.join("Dockerfile")
    }

    pub fn has_dockerfile(&self) -> bool {
        self.dockerfile().is_file()
    }

    /// The Directive, or an error naming the stage that needs it.
    pub fn require_directive(&self, stage: &str) -> Result<&Directive> {
        self.directive.as_ref().ok_or_else(|| {
            Error::Precondition(format!(
                "{stage} requires a Directive.yaml in {}",
                self.cwd.display()
            ))
        })
    }
}

fn discover_runnables(root: &Path) -> Result<(Vec<Runnable>, bool)> {
    if let Some(manifest) = find_manifest(root)? {
        return Ok((vec![Runnable::load(root, &manifest)?], true));
    }

    let entries = std::fs::read_dir(root).map_err(|e| Error::io("list directory", root, e))?;
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| entry.path())
        .collect();
    dirs.sort();

    let mut runnables = Vec::new();
    for dir in dirs {
        let manifest = match find_manifest(&dir) {
            Ok(Some(manifest)) => manifest,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!("couldn't read files in {}: {e}", dir.display());
                continue;
            }
        };

        runnables.push(Runnable::load(&dir, &manifest)?);
    }

    Ok((runnables, false))
}
