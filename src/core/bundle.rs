//! The deployable bundle: one zip archive holding the Directive, every
//! compiled module and the static assets.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::core::directive::{Directive, DIRECTIVE_FILENAME};
use crate::error::{Error, Result};

/// Filename of the bundle at the project root.
pub const BUNDLE_FILENAME: &str = "runnables.wasm.zip";

const STATIC_PREFIX: &str = "static/";

/// Where a project's bundle lives and whether it has been written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRef {
    pub path: PathBuf,
    pub exists: bool,
}

impl BundleRef {
    /// Resolve the bundle location inside `root`.
    pub fn for_root(root: &Path) -> Self {
        let path = root.join(BUNDLE_FILENAME);
        let exists = path.is_file();
        BundleRef { path, exists }
    }
}

/// A module or static file destined for the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleFile {
    pub name: String,
    pub contents: Vec<u8>,
}

/// Contents of a bundle read back from disk.
#[derive(Debug)]
pub struct Bundle {
    pub directive: Directive,
    /// Module bytes keyed by function name.
    pub modules: BTreeMap<String, Vec<u8>>,
    /// Static files keyed by their name under `static/`.
    pub static_files: BTreeMap<String, Vec<u8>>,
}

/// Archive entry name for a static file: backslashes become slashes,
/// leading slashes are dropped and the result is placed under `static/`.
pub fn normalize_static_filename(name: &str) -> String {
    let name = name.replace('\\', "/");
    format!("{STATIC_PREFIX}{}", name.trim_start_matches('/'))
}

fn entry_options() -> SimpleFileOptions {
    // A fixed timestamp keeps identical inputs producing identical archives.
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
}

/// Write a bundle to `path`.
///
/// `modules` are named by function (the `.wasm` suffix is added) and
/// `static_files` by their path relative to the static directory. The
/// archive is assembled in memory and swapped in atomically.
pub fn write(
    directive: &[u8],
    modules: &[BundleFile],
    static_files: &[BundleFile],
    path: &Path,
) -> Result<()> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = entry_options();

    zip.start_file(DIRECTIVE_FILENAME, options)?;
    zip.write_all(directive)
        .map_err(|e| Error::io("write bundle entry", path, e))?;

    for module in modules {
        zip.start_file(format!("{}.wasm", module.name), options)?;
        zip.write_all(&module.contents)
            .map_err(|e| Error::io("write bundle entry", path, e))?;
    }

    for file in static_files {
        zip.start_file(normalize_static_filename(&file.name), options)?;
        zip.write_all(&file.contents)
            .map_err(|e| Error::io("write bundle entry", path, e))?;
    }

    let bytes = zip.finish()?.into_inner();
    crate::util::fs::write_atomic(path, bytes)
}

/// Read a bundle back from `path`.
pub fn read(path: &Path) -> Result<Bundle> {
    let file = std::fs::File::open(path).map_err(|e| Error::io("open bundle", path, e))?;
    let mut archive = ZipArchive::new(file)?;

    let mut directive = None;
    let mut modules = BTreeMap::new();
    let mut static_files = BTreeMap::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }

        let name = entry.name().to_string();
        let mut contents = Vec::new();
        entry
            .read_to_end(&mut contents)
            .map_err(|e| Error::io("read bundle entry", path, e))?;

        if name == DIRECTIVE_FILENAME {
            directive = Some(Directive::from_slice(&contents, path)?);
        } else if let Some(rest) = name.strip_prefix(STATIC_PREFIX) {
            static_files.insert(rest.to_string(), contents);
        } else if let Some(func) = name.strip_suffix(".wasm") {
            modules.insert(func.to_string(), contents);
        } else {
            tracing::debug!("ignoring unexpected bundle entry {name}");
        }
    }

    let directive = directive.ok_or_else(|| {
        Error::Precondition(format!("bundle {} has no {DIRECTIVE_FILENAME}", path.display()))
    })?;

    Ok(Bundle {
        directive,
        modules,
        static_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file(name: &str, contents: &[u8]) -> BundleFile {
        BundleFile {
            name: name.to_string(),
            contents: contents.to_vec(),
        }
    }

    #[test]
    fn test_normalize_static_filename() {
        assert_eq!(normalize_static_filename("index.html"), "static/index.html");
        assert_eq!(normalize_static_filename("/css/site.css"), "static/css/site.css");
        assert_eq!(normalize_static_filename("img\\logo.png"), "static/img/logo.png");
    }

    #[test]
    fn test_write_then_read() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(BUNDLE_FILENAME);
        let directive = Directive::placeholder().to_yaml().unwrap();

        write(
            directive.as_bytes(),
            &[file("fn-a", b"\0asm-a"), file("fn-b", b"\0asm-b")],
            &[file("css/site.css", b"body{}")],
            &path,
        )
        .unwrap();

        assert!(BundleRef::for_root(tmp.path()).exists);

        let bundle = read(&path).unwrap();
        assert_eq!(bundle.directive, Directive::placeholder());
        assert_eq!(bundle.modules.keys().collect::<Vec<_>>(), vec!["fn-a", "fn-b"]);
        assert_eq!(bundle.modules["fn-b"], b"\0asm-b");
        assert_eq!(bundle.static_files["css/site.css"], b"body{}");
    }

    #[test]
    fn test_identical_inputs_identical_archives() {
        let tmp = TempDir::new().unwrap();
        let first = tmp.path().join("first.zip");
        let second = tmp.path().join("second.zip");
        let modules = [file("fn-a", b"\0asm")];

        write(b"identifier: x", &modules, &[], &first).unwrap();
        write(b"identifier: x", &modules, &[], &second).unwrap();

        assert_eq!(std::fs::read(first).unwrap(), std::fs::read(second).unwrap());
    }

    #[test]
    fn test_read_requires_directive() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(BUNDLE_FILENAME);

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("fn-a.wasm", entry_options()).unwrap();
        zip.write_all(b"\0asm").unwrap();
        std::fs::write(&path, zip.finish().unwrap().into_inner()).unwrap();

        assert!(read(&path).is_err());
    }
}
