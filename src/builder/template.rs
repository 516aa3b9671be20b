//! Command templates.
//!
//! Toolchain and prerequisite commands are stored as templates with
//! `{{ .Field }}` placeholders, filled from one [`TemplateContext`] built
//! per Runnable.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::core::runnable::Runnable;
use crate::error::{Error, Result};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*\.([A-Za-z]+)\s*\}\}").expect("placeholder pattern is valid")
});

/// The values a command template can reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateContext {
    pub name: String,
    pub underscore_name: String,
    pub api_version: String,
    pub js_toolchain: String,
    pub compiler_flags: String,
}

impl TemplateContext {
    /// Build the context for one Runnable.
    pub fn for_runnable(runnable: &Runnable, js_toolchain: &str, compiler_flags: &str) -> Self {
        TemplateContext {
            name: runnable.name().to_string(),
            underscore_name: runnable.underscore_name(),
            api_version: runnable.manifest.api_version.clone(),
            js_toolchain: js_toolchain.to_string(),
            compiler_flags: compiler_flags.to_string(),
        }
    }

    fn field(&self, field: &str) -> Option<&str> {
        match field {
            "Name" => Some(&self.name),
            "UnderscoreName" => Some(&self.underscore_name),
            "APIVersion" => Some(&self.api_version),
            "JsToolchain" => Some(&self.js_toolchain),
            "CompilerFlags" => Some(&self.compiler_flags),
            _ => None,
        }
    }

    /// Substitute every placeholder in `template`.
    ///
    /// The rendered command is trimmed, so an empty trailing field leaves no
    /// dangling whitespace.
    pub fn render(&self, template: &str) -> Result<String> {
        let rendered = substitute(template, |f| self.field(f).map(str::to_string))?;
        Ok(rendered.trim().to_string())
    }
}

/// Replace each `{{ .Field }}` in `template` with `field(Field)`.
///
/// Fails on the first field the lookup does not know, before anything is
/// rendered.
pub fn substitute<F>(template: &str, field: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut values = std::collections::HashMap::new();
    for caps in PLACEHOLDER.captures_iter(template) {
        let name = &caps[1];
        if values.contains_key(name) {
            continue;
        }
        let Some(value) = field(name) else {
            return Err(Error::Template {
                field: name.to_string(),
                template: template.to_string(),
            });
        };
        values.insert(name.to_string(), value);
    }

    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        values.get(&caps[1]).cloned().unwrap_or_default()
    });
    Ok(rendered.into_owned())
}
