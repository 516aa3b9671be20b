use std::path::Path;

use walkdir::WalkDir;

use crate::core::bundle::{self, BundleFile};
use crate::core::context::Context;
use crate::core::directive::Directive;
use crate::error::{Error, Result};
use crate::util::shell::{Shell, Status};

pub(super) fn package(shell: &Shell, ctx: &mut Context) -> Result<()> {
    for runnable in &ctx.runnables {
        runnable.require_module()?;
    }

    if ctx.directive.is_none() {
        let mut placeholder = Directive::placeholder();
        placeholder.merge_queries(&ctx.cwd)?;
        ctx.directive = Some(placeholder);
    }
    let directive = ctx.directive.get_or_insert_with(Directive::placeholder);
    if directive.headless {
        shell.note("updating Directive");
        directive.bump_major_version()?;
        directive.write(&ctx.cwd)?;
    }

    directive.reconcile_functions(&ctx.runnables)?;
    directive.validate()?;

    let static_files = collect_static_files(&ctx.cwd)?;
    if !static_files.is_empty() {
        shell.note(format!("adding {} static file(s) to bundle", static_files.len()));
    }

    let directive_bytes = directive.to_yaml()?;
    let app_version = directive.app_version.clone();
    let modules = ctx.modules()?;

    shell.status(Status::Packaging, format!("{} module(s)", modules.len()));
    bundle::write(
        directive_bytes.as_bytes(),
        &modules,
        &static_files,
        &ctx.bundle.path,
    )?;
    ctx.bundle.exists = true;

    shell.status(
        Status::Finished,
        format!(
            "bundle was created -> {} @ {app_version}",
            ctx.bundle.path.display()
        ),
    );
    Ok(())
}

/// Collect every file under `<root>/static`, named by its slash-separated
/// path relative to that directory.
///
/// A missing directory means no static files.
pub fn collect_static_files(root: &Path) -> Result<Vec<BundleFile>> {
    let static_dir = root.join("static");

    if !static_dir.exists() {
        return Ok(Vec::new());
    }
    if !static_dir.is_dir() {
        return Err(Error::Precondition(format!(
            "{} is not a directory",
            static_dir.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(&static_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(&static_dir).to_path_buf();
            Error::io("walk", path, e.into())
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let rel = crate::util::fs::relative_path(&static_dir, entry.path());
        files.push(BundleFile {
            name: crate::util::fs::to_slash(&rel),
            contents: crate::util::fs::read(entry.path())?,
        });
    }

    Ok(files)
}
