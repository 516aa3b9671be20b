//! Error types for runway operations.
//!
//! Every stage wraps the error of the stage below it with the Runnable,
//! language or job it was working on, so the printed chain reads from the
//! outermost operation down to the failing tool.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias used throughout the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main error type for discovery, building, packaging and shipping.
#[derive(Debug, Error)]
pub enum Error {
    /// A `.runnable` or `Directive.yaml` file could not be parsed.
    #[error("failed to parse {}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A Runnable declared a language outside the supported set.
    #[error("({runnable}) {language} is not a valid lang")]
    UnsupportedLanguage { runnable: String, language: String },

    /// No table entry exists for this (OS, language) pair.
    #[error("no {what} available for {language} on {os}")]
    Unsupported {
        what: &'static str,
        os: String,
        language: String,
    },

    /// A command template referenced a field the template context lacks.
    #[error("unknown template field `{field}` in `{template}`")]
    Template { field: String, template: String },

    /// A prerequisite fix command failed.
    #[error("failed to fix missing prerequisite {file}")]
    Prerequisite {
        file: String,
        #[source]
        source: Box<Error>,
    },

    /// An external command exited unsuccessfully.
    #[error("`{command}` failed with exit code {}", code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string()))]
    Command {
        command: String,
        code: Option<i32>,
        log: String,
    },

    /// An external command could not be started at all.
    #[error("failed to spawn `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A required executable is not on PATH.
    #[error("`{0}` was not found on PATH")]
    MissingTool(String),

    /// Building one Runnable (or one language in container mode) failed.
    #[error("failed to build {target}")]
    Build {
        target: String,
        #[source]
        source: Box<Error>,
    },

    /// A build finished without leaving its module behind.
    #[error("missing built module {}", path.display())]
    MissingModule { path: PathBuf },

    /// A Directive handler references a function that was not discovered.
    #[error("project does not contain function {0} listed in Directive")]
    MissingFunction(String),

    /// The Directive failed structural validation.
    #[error("invalid Directive: {0}")]
    InvalidDirective(String),

    /// A stage needs something the project does not have.
    #[error("{0}")]
    Precondition(String),

    /// The remote build service answered with an unexpected status.
    #[error("remote build {stage} request failed: {status}")]
    RemoteStatus { stage: &'static str, status: u16 },

    /// The remote build reached the `failed` state.
    #[error("remote build {0} failed")]
    RemoteBuildFailed(String),

    /// The remote build completed without producing a bundle.
    #[error("build did not include a bundle")]
    MissingBundle,

    /// A package, publish or deploy job failed.
    #[error("{stage} job {job} failed")]
    Job {
        stage: &'static str,
        job: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// A publish or deploy target rejected a request.
    #[error("{target}: {message}")]
    Target { target: &'static str, message: String },

    /// Filesystem failure with the offending path.
    #[error("{operation} failed on {}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Create an I/O error tagged with the operation and path.
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Wrap this error as the failure of a Runnable or language build.
    pub fn building(self, target: impl Into<String>) -> Self {
        Error::Build {
            target: target.into(),
            source: Box::new(self),
        }
    }

    /// Wrap this error as the failure of a pipeline job.
    pub fn in_job(self, stage: &'static str, job: &'static str) -> Self {
        Error::Job {
            stage,
            job,
            source: Box::new(self),
        }
    }

    /// The captured tool output attached anywhere in this error's chain.
    ///
    /// External toolchain output is usually the only actionable diagnostic,
    /// so callers print it alongside the error message.
    pub fn log(&self) -> Option<&str> {
        match self {
            Error::Command { log, .. } => Some(log.as_str()),
            Error::Prerequisite { source, .. }
            | Error::Build { source, .. }
            | Error::Job { source, .. } => source.log(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_found_through_wrappers() {
        let err = Error::Command {
            command: "cargo build".to_string(),
            code: Some(101),
            log: "error[E0425]: cannot find value".to_string(),
        }
        .building("fn-a")
        .in_job("build", "native");

        assert_eq!(err.log(), Some("error[E0425]: cannot find value"));
        assert_eq!(err.to_string(), "build job native failed");
    }

    #[test]
    fn test_command_display() {
        let err = Error::Command {
            command: "tinygo build".to_string(),
            code: None,
            log: String::new(),
        };
        assert_eq!(err.to_string(), "`tinygo build` failed with exit code none");
    }

    #[test]
    fn test_missing_function_names_it() {
        let err = Error::MissingFunction("fn-c".to_string());
        assert!(err.to_string().contains("fn-c"));
        assert!(err.log().is_none());
    }
}
