//! Native toolchain commands and builder images per language.
//!
//! The tables are keyed by host OS (`std::env::consts::OS`) and language.
//! Commands are templates rendered with a
//! [`TemplateContext`](super::template::TemplateContext) and run through the
//! shell inside the Runnable's directory.

use std::collections::HashMap;

use crate::core::runnable::Language;
use crate::error::{Error, Result};

/// Native build commands for `language` on `os`.
pub fn native_commands(os: &str, language: Language) -> Result<Vec<String>> {
    let commands: &[&str] = match (os, language) {
        ("linux" | "macos", Language::Rust) => &[
            "cargo build --target wasm32-wasip1 --lib --release",
            "cp target/wasm32-wasip1/release/{{ .UnderscoreName }}.wasm ./{{ .Name }}.wasm",
        ],
        ("macos", Language::Swift) => &[
            "xcrun --toolchain swiftwasm swift build --triple wasm32-unknown-wasi -Xlinker --allow-undefined -Xlinker --export=allocate -Xlinker --export=deallocate -Xlinker --export=run_e -Xlinker --export=init",
            "cp .build/debug/{{ .Name }}.wasm .",
        ],
        ("linux", Language::Swift) => &[
            "swift build --triple wasm32-unknown-wasi -Xlinker --allow-undefined -Xlinker --export=allocate -Xlinker --export=deallocate -Xlinker --export=run_e -Xlinker --export=init",
            "cp .build/debug/{{ .Name }}.wasm .",
        ],
        ("macos", Language::AssemblyScript) => &["{{ .JsToolchain }} run asbuild -- {{ .CompilerFlags }}"],
        ("linux", Language::AssemblyScript) => &[
            "chmod -R +r ./",
            "{{ .JsToolchain }} run asbuild -- {{ .CompilerFlags }}",
        ],
        ("linux" | "macos", Language::TinyGo) => {
            &["tinygo build -o {{ .Name }}.wasm -target wasi ."]
        }
        ("linux" | "macos", Language::Grain) => {
            &["grain compile index.gr -I _lib -o {{ .Name }}.wasm"]
        }
        ("linux" | "macos", Language::TypeScript | Language::JavaScript) => {
            &["{{ .JsToolchain }} run build"]
        }
        ("linux" | "macos", Language::Wat) => &["wat2wasm lib.wat -o {{ .Name }}.wasm"],
        _ => {
            return Err(Error::Unsupported {
                what: "native build commands",
                os: os.to_string(),
                language: language.to_string(),
            })
        }
    };

    Ok(commands.iter().map(|c| c.to_string()).collect())
}

/// Native build commands, preferring a configured override for the language.
pub fn resolve_commands(
    overrides: &HashMap<String, Vec<String>>,
    os: &str,
    language: Language,
) -> Result<Vec<String>> {
    match overrides.get(language.as_str()) {
        Some(commands) => {
            tracing::debug!("using configured commands for {language}");
            Ok(commands.clone())
        }
        None => native_commands(os, language),
    }
}

/// A builder image able to build one language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderImage {
    /// `repository:tag`
    pub image: String,
    /// Forced platform for images published for a single architecture.
    pub platform: Option<&'static str>,
}

/// Builder image for `language` at `tag`.
pub fn docker_image(language: Language, tag: &str) -> Result<BuilderImage> {
    let (repository, platform) = match language {
        Language::Rust => ("runwaydev/builder-rs", None),
        Language::Swift => ("runwaydev/builder-swift", None),
        Language::AssemblyScript => ("runwaydev/builder-as", None),
        Language::TinyGo => ("runwaydev/builder-tinygo", None),
        Language::Grain => ("runwaydev/builder-gr", Some("linux/amd64")),
        Language::TypeScript | Language::JavaScript => ("runwaydev/builder-js", None),
        Language::Wat => {
            return Err(Error::Unsupported {
                what: "builder image",
                os: "docker".to_string(),
                language: language.to_string(),
            })
        }
    };

    Ok(BuilderImage {
        image: format!("{repository}:{tag}"),
        platform,
    })
}
