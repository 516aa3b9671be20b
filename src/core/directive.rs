//! `Directive.yaml`: the application manifest.
//!
//! A Directive names the application, pins its version and maps handlers
//! (request routes or stream topics) onto sequences of function calls.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;

use crate::core::runnable::{FunctionManifest, Runnable};
use crate::error::{Error, Result};

/// Filename of the Directive at the project root.
pub const DIRECTIVE_FILENAME: &str = "Directive.yaml";

/// Identifier given to projects that have no Directive yet.
pub const DEFAULT_IDENTIFIER: &str = "com.suborbital.app";

/// Version given to projects that have no Directive yet.
pub const DEFAULT_APP_VERSION: &str = "v0.0.1";

/// Runtime version written into synthesized Directives.
pub const RUNTIME_VERSION: &str = "v0.4.7";

/// Optional file at the project root whose `queries` replace the Directive's.
pub const QUERIES_FILENAME: &str = "Queries.yaml";

const HTTP_METHODS: [&str; 7] = ["GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"];

/// The application manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directive {
    /// Reverse-domain application identifier, e.g. `com.acme.shop`.
    pub identifier: String,

    pub app_version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub runtime_version: String,

    /// Headless apps get their major version bumped on every bundle.
    #[serde(default, skip_serializing_if = "is_false")]
    pub headless: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub runnables: Vec<FunctionManifest>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub handlers: Vec<Handler>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<Query>,

    /// Keys runway doesn't interpret (schedules, connections, ...), kept so
    /// rewriting the Directive loses nothing.
    #[serde(flatten)]
    pub extra: Mapping,
}

/// A named database query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub name: String,

    #[serde(default)]
    pub query: String,

    #[serde(flatten)]
    pub extra: Mapping,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Maps one input onto a sequence of steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handler {
    #[serde(rename = "type", default)]
    pub kind: HandlerKind,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub method: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource: String,

    #[serde(default)]
    pub steps: Vec<Step>,

    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    #[default]
    Request,
    Stream,
}

/// One step of a handler. Exactly one of `fn`, `group` or `forEach` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    #[serde(rename = "fn", default, skip_serializing_if = "Option::is_none")]
    pub func: Option<String>,

    #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group: Vec<Callable>,

    #[serde(rename = "forEach", default, skip_serializing_if = "Option::is_none")]
    pub for_each: Option<ForEach>,

    #[serde(flatten)]
    pub extra: Mapping,
}

/// A function call inside a `group` step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Callable {
    #[serde(rename = "fn")]
    pub func: String,

    #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    #[serde(flatten)]
    pub extra: Mapping,
}

/// Calls `fn` once for every element of the state key `in`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForEach {
    #[serde(rename = "in")]
    pub input: String,

    #[serde(rename = "fn")]
    pub func: String,

    #[serde(rename = "as")]
    pub alias: String,

    #[serde(flatten)]
    pub extra: Mapping,
}

/// Borrowed view of what a step does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind<'a> {
    Fn(&'a str),
    Group(&'a [Callable]),
    ForEach(&'a ForEach),
}

impl Step {
    /// A plain single-function step.
    pub fn func(name: impl Into<String>) -> Self {
        Step {
            func: Some(name.into()),
            ..Default::default()
        }
    }

    /// Classify the step; `None` unless exactly one kind is set.
    pub fn kind(&self) -> Option<StepKind<'_>> {
        match (&self.func, self.group.is_empty(), &self.for_each) {
            (Some(f), true, None) => Some(StepKind::Fn(f)),
            (None, false, None) => Some(StepKind::Group(&self.group)),
            (None, true, Some(each)) => Some(StepKind::ForEach(each)),
            _ => None,
        }
    }

    /// Every function this step calls.
    pub fn functions(&self) -> Vec<&str> {
        let mut fns = Vec::new();
        if let Some(f) = &self.func {
            fns.push(f.as_str());
        }
        fns.extend(self.group.iter().map(|c| c.func.as_str()));
        if let Some(each) = &self.for_each {
            fns.push(each.func.as_str());
        }
        fns
    }
}

impl Directive {
    /// The placeholder Directive used when a project has none.
    pub fn placeholder() -> Self {
        Directive {
            identifier: DEFAULT_IDENTIFIER.to_string(),
            app_version: DEFAULT_APP_VERSION.to_string(),
            runtime_version: RUNTIME_VERSION.to_string(),
            ..Default::default()
        }
    }

    /// Parse a Directive from YAML bytes without validating it.
    pub fn from_slice(bytes: &[u8], origin: &Path) -> Result<Self> {
        serde_yaml::from_slice(bytes).map_err(|source| Error::Manifest {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Read `Directive.yaml` from `root`, if there is one.
    pub fn load(root: &Path) -> Result<Option<Self>> {
        let path = directive_path(root);
        if !path.is_file() {
            return Ok(None);
        }

        let bytes = crate::util::fs::read(&path)?;
        Self::from_slice(&bytes, &path).map(Some)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Write `Directive.yaml` into `root`.
    pub fn write(&self, root: &Path) -> Result<()> {
        crate::util::fs::write_atomic(&directive_path(root), self.to_yaml()?)
    }

    /// Replace the version with the next major: `vK.x.y` becomes `v(K+1).0.0`.
    ///
    /// Short forms such as `v1` and `v1.2` are accepted.
    pub fn bump_major_version(&mut self) -> Result<()> {
        let current = parse_loose_version(&self.app_version).map_err(|e| {
            Error::InvalidDirective(format!(
                "appVersion {} is not a semantic version: {e}",
                self.app_version
            ))
        })?;

        self.app_version = format!("v{}.0.0", current.major + 1);
        Ok(())
    }

    /// Replace the queries with those from `Queries.yaml` in `root`, if that
    /// file lists any.
    pub fn merge_queries(&mut self, root: &Path) -> Result<()> {
        let queries = load_queries(root)?;
        if !queries.is_empty() {
            self.queries = queries;
        }
        Ok(())
    }

    /// Every function referenced by a handler step, group member or forEach
    /// target, each listed once in first-reference order.
    pub fn handler_functions(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.handlers
            .iter()
            .flat_map(|h| h.steps.iter())
            .flat_map(|s| s.functions())
            .filter(|f| seen.insert(*f))
            .collect()
    }

    /// Check every handler reference against the discovered Runnables, then
    /// list those Runnables as the Directive's functions.
    pub fn reconcile_functions(&mut self, runnables: &[Runnable]) -> Result<()> {
        let known: HashSet<&str> = runnables.iter().map(|r| r.name()).collect();

        if let Some(missing) = self
            .handler_functions()
            .into_iter()
            .find(|f| !known.contains(f))
        {
            return Err(Error::MissingFunction(missing.to_string()));
        }

        self.runnables = runnables
            .iter()
            .map(|r| FunctionManifest {
                compiler_flags: None,
                ..r.manifest.clone()
            })
            .collect();
        Ok(())
    }

    /// Structural validation of the whole Directive.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.identifier.is_empty() {
            problems.push("identifier is missing".to_string());
        } else if self.identifier.contains(char::is_whitespace) {
            problems.push(format!("identifier `{}` contains whitespace", self.identifier));
        }

        if !self.app_version.starts_with('v')
            || semver::Version::parse(&self.app_version[1..]).is_err()
        {
            problems.push(format!(
                "appVersion `{}` must look like vMAJOR.MINOR.PATCH",
                self.app_version
            ));
        }

        let mut names = HashSet::new();
        for runnable in &self.runnables {
            if runnable.name.is_empty() {
                problems.push("a function is missing its name".to_string());
            } else if !names.insert(runnable.name.as_str()) {
                problems.push(format!("function {} is listed more than once", runnable.name));
            }
        }

        let mut routes = HashSet::new();
        for (i, handler) in self.handlers.iter().enumerate() {
            let label = format!("handler {i}");

            match handler.kind {
                HandlerKind::Request => {
                    if !HTTP_METHODS.contains(&handler.method.as_str()) {
                        problems.push(format!(
                            "{label} has invalid method `{}`",
                            handler.method
                        ));
                    }
                    if !handler.resource.starts_with('/') {
                        problems.push(format!(
                            "{label} resource `{}` must begin with /",
                            handler.resource
                        ));
                    }
                    if !routes.insert((handler.method.as_str(), handler.resource.as_str())) {
                        problems.push(format!(
                            "{label} duplicates route {} {}",
                            handler.method, handler.resource
                        ));
                    }
                }
                HandlerKind::Stream => {
                    if handler.resource.is_empty() {
                        problems.push(format!("{label} stream is missing a resource"));
                    }
                }
            }

            if handler.steps.is_empty() {
                problems.push(format!("{label} has no steps"));
            }

            for (j, step) in handler.steps.iter().enumerate() {
                match step.kind() {
                    None => problems.push(format!(
                        "{label} step {j} must have exactly one of fn, group or forEach"
                    )),
                    Some(StepKind::ForEach(each)) if each.input.is_empty() || each.alias.is_empty() => {
                        problems.push(format!("{label} step {j} forEach needs both in and as"))
                    }
                    Some(_) => {}
                }

                for func in step.functions() {
                    if func.is_empty() {
                        problems.push(format!("{label} step {j} calls an unnamed function"));
                    } else if !names.contains(func) {
                        problems.push(format!(
                            "{label} step {j} calls {func}, which is not listed in runnables"
                        ));
                    }
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidDirective(problems.join("; ")))
        }
    }

    /// Container image name: `tld.org.repo` becomes `org/repo:<appVersion>`.
    pub fn docker_image_name(&self) -> Result<String> {
        let parts: Vec<&str> = self.identifier.split('.').collect();
        match parts.as_slice() {
            [_, org, repo] => Ok(format!("{org}/{repo}:{}", self.app_version)),
            _ => Err(Error::InvalidDirective(format!(
                "identifier `{}` must have exactly three dot-separated parts",
                self.identifier
            ))),
        }
    }

    /// Identifier with dots replaced by dashes, as app names on deploy
    /// targets require.
    pub fn dashed_identifier(&self) -> String {
        self.identifier.replace('.', "-")
    }
}

/// Path of the Directive inside `root`.
pub fn directive_path(root: &Path) -> PathBuf {
    root.join(DIRECTIVE_FILENAME)
}

/// The `queries` listed in `Queries.yaml` in `root`; none if the file is absent.
pub fn load_queries(root: &Path) -> Result<Vec<Query>> {
    #[derive(Deserialize)]
    struct QueriesFile {
        #[serde(default)]
        queries: Vec<Query>,
    }

    let path = root.join(QUERIES_FILENAME);
    if !path.is_file() {
        return Ok(Vec::new());
    }

    let bytes = crate::util::fs::read(&path)?;
    let file: QueriesFile =
        serde_yaml::from_slice(&bytes).map_err(|source| Error::Manifest { path, source })?;
    Ok(file.queries)
}

/// Parse `v1`, `v1.2` or `v1.2.3` (the `v` is optional).
fn parse_loose_version(version: &str) -> std::result::Result<semver::Version, semver::Error> {
    let bare = version.trim_start_matches('v');
    let padded = match bare.split('.').count() {
        1 => format!("{bare}.0.0"),
        2 => format!("{bare}.0"),
        _ => bare.to_string(),
    };
    semver::Version::parse(&padded)
}
