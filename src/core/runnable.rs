//! Runnables: the per-function units a project is made of.
//!
//! Each function lives in its own directory next to a `.runnable.yaml`
//! manifest declaring its name, namespace and guest language.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Prefix shared by every function manifest filename.
pub const MANIFEST_PREFIX: &str = ".runnable.";

/// Namespace used when a manifest does not declare one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Guest language of a Runnable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    Swift,
    AssemblyScript,
    TinyGo,
    Grain,
    TypeScript,
    JavaScript,
    Wat,
}

impl Language {
    /// Every supported language.
    pub const ALL: [Language; 8] = [
        Language::Rust,
        Language::Swift,
        Language::AssemblyScript,
        Language::TinyGo,
        Language::Grain,
        Language::TypeScript,
        Language::JavaScript,
        Language::Wat,
    ];

    /// Get the language name as written in manifests.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Swift => "swift",
            Language::AssemblyScript => "assemblyscript",
            Language::TinyGo => "tinygo",
            Language::Grain => "grain",
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Wat => "wat",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .into_iter()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| format!("{} is not a valid lang", s))
    }
}

/// On-disk form of a function manifest.
///
/// The same shape is listed under `runnables` in `Directive.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionManifest {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub namespace: String,

    #[serde(default)]
    pub lang: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,

    /// Extra flags handed to the guest compiler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler_flags: Option<String>,
}

/// Result of building one Runnable (or one language in container mode).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    pub succeeded: bool,

    /// Combined stdout/stderr of every command run, kept on failure too.
    #[serde(default)]
    pub output_log: String,
}

impl BuildResult {
    /// Append one command's output to the log.
    pub fn append(&mut self, output: &str) {
        self.output_log.push_str(output);
        if !output.ends_with('\n') {
            self.output_log.push('\n');
        }
    }
}

/// A discovered function.
#[derive(Debug, Clone)]
pub struct Runnable {
    /// Manifest with defaults applied.
    pub manifest: FunctionManifest,

    /// Validated guest language.
    pub language: Language,

    /// Absolute path of the function directory.
    pub path: PathBuf,

    /// Attached after a build attempt.
    pub result: Option<BuildResult>,
}

impl Runnable {
    /// Parse the manifest at `manifest_path` for the function in `dir`.
    ///
    /// Missing name and namespace default to the directory basename and
    /// `default`; an unsupported language fails naming the Runnable.
    pub fn load(dir: &Path, manifest_path: &Path) -> Result<Self> {
        let bytes = crate::util::fs::read(manifest_path)?;
        let mut manifest: FunctionManifest =
            serde_yaml::from_slice(&bytes).map_err(|source| Error::Manifest {
                path: manifest_path.to_path_buf(),
                source,
            })?;

        if manifest.name.is_empty() {
            manifest.name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
        }

        if manifest.namespace.is_empty() {
            manifest.namespace = DEFAULT_NAMESPACE.to_string();
        }

        let language = manifest
            .lang
            .parse::<Language>()
            .map_err(|_| Error::UnsupportedLanguage {
                runnable: manifest.name.clone(),
                language: manifest.lang.clone(),
            })?;

        let path = std::path::absolute(dir).map_err(|e| Error::io("resolve", dir, e))?;

        Ok(Runnable {
            manifest,
            language,
            path,
            result: None,
        })
    }

    /// Function name, unique within a project.
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    /// Name with dashes replaced by underscores, as cargo names artifacts.
    pub fn underscore_name(&self) -> String {
        self.manifest.name.replace('-', "_")
    }

    /// Where the build is expected to leave the compiled module.
    pub fn module_path(&self) -> PathBuf {
        self.path.join(format!("{}.wasm", self.manifest.name))
    }

    /// Fail unless the compiled module exists.
    pub fn require_module(&self) -> Result<()> {
        let path = self.module_path();
        if path.is_file() {
            Ok(())
        } else {
            Err(Error::MissingModule { path })
        }
    }
}

/// Find a function manifest among a directory's entries.
pub fn find_manifest(dir: &Path) -> Result<Option<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| Error::io("list directory", dir, e))?;

    let mut found: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_name().to_string_lossy().starts_with(MANIFEST_PREFIX)
                && entry.file_type().map(|t| t.is_file()).unwrap_or(false)
        })
        .map(|entry| entry.path())
        .collect();

    found.sort();
    Ok(found.into_iter().next())
}
