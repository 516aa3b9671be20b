//! Centralized user-facing output.
//!
//! Every component receives a `&Shell` instead of printing directly, so the
//! binary decides verbosity and colour once and tests can capture exactly
//! what a run reported.
//!
//! Format: `{status:>12} {message}` on stderr, the same layout cargo uses.

use std::fmt::Display;
use std::io::{self, IsTerminal};
use std::sync::Mutex;

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// --quiet: errors only, tool output suppressed
    Quiet,
    /// Default: status messages and tool output
    #[default]
    Normal,
    /// --verbose: also shows the commands being run
    Verbose,
}

/// Color output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorChoice {
    /// Detect TTY and use colors if available.
    #[default]
    Auto,
    /// Always use ANSI colors.
    Always,
    /// Never use ANSI colors.
    Never,
}

impl std::str::FromStr for ColorChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ColorChoice::Auto),
            "always" => Ok(ColorChoice::Always),
            "never" => Ok(ColorChoice::Never),
            _ => Err(format!(
                "invalid color choice '{}'; expected 'auto', 'always', or 'never'",
                s
            )),
        }
    }
}

/// Status types for output messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    // Success statuses (green)
    Finished,
    Created,
    Fixed,

    // In-progress statuses (cyan)
    Building,
    Fixing,
    Packaging,
    Uploading,
    Downloading,
    Publishing,
    Deploying,
    Running,

    // Info statuses (blue)
    Info,

    // Warning statuses (yellow)
    Warning,

    // Failure statuses (red)
    Failed,
    Error,
}

impl Status {
    /// Get the display text for this status.
    fn as_str(&self) -> &'static str {
        match self {
            Status::Finished => "Finished",
            Status::Created => "Created",
            Status::Fixed => "Fixed",
            Status::Building => "Building",
            Status::Fixing => "Fixing",
            Status::Packaging => "Packaging",
            Status::Uploading => "Uploading",
            Status::Downloading => "Downloading",
            Status::Publishing => "Publishing",
            Status::Deploying => "Deploying",
            Status::Running => "Running",
            Status::Info => "Info",
            Status::Warning => "Warning",
            Status::Failed => "Failed",
            Status::Error => "error",
        }
    }

    /// Get the ANSI color code for this status.
    fn color_code(&self) -> &'static str {
        match self {
            Status::Finished | Status::Created | Status::Fixed => "\x1b[1;32m",
            Status::Building
            | Status::Fixing
            | Status::Packaging
            | Status::Uploading
            | Status::Downloading
            | Status::Publishing
            | Status::Deploying
            | Status::Running => "\x1b[1;36m",
            Status::Info => "\x1b[1;34m",
            Status::Warning => "\x1b[1;33m",
            Status::Failed | Status::Error => "\x1b[1;31m",
        }
    }
}

const STATUS_WIDTH: usize = 12;

/// Central shell for all CLI output.
#[derive(Debug)]
pub struct Shell {
    verbosity: Verbosity,
    use_color: bool,
    /// Recorded lines when constructed with [`Shell::capturing`].
    captured: Option<Mutex<Vec<String>>>,
}

impl Shell {
    /// Create a new shell printing to stderr.
    pub fn new(verbosity: Verbosity, color: ColorChoice) -> Self {
        let use_color = match color {
            ColorChoice::Auto => io::stderr().is_terminal(),
            ColorChoice::Always => true,
            ColorChoice::Never => false,
        };

        Shell {
            verbosity,
            use_color,
            captured: None,
        }
    }

    /// Create a shell from CLI flags. Quiet wins over verbose.
    pub fn from_flags(quiet: bool, verbose: bool, color: ColorChoice) -> Self {
        let verbosity = if quiet {
            Verbosity::Quiet
        } else if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        };

        Shell::new(verbosity, color)
    }

    /// Create a shell that records every status line instead of printing it.
    ///
    /// Tool output is not echoed in this mode.
    pub fn capturing() -> Self {
        Shell {
            verbosity: Verbosity::Normal,
            use_color: false,
            captured: Some(Mutex::new(Vec::new())),
        }
    }

    /// Check if shell is in quiet mode.
    pub fn is_quiet(&self) -> bool {
        self.verbosity == Verbosity::Quiet
    }

    /// Check if shell is in verbose mode.
    pub fn is_verbose(&self) -> bool {
        self.verbosity == Verbosity::Verbose
    }

    /// Whether child process output should be streamed to the terminal.
    pub fn echo_output(&self) -> bool {
        self.captured.is_none() && !self.is_quiet()
    }

    /// Print a status message.
    ///
    /// In quiet mode, only failures are printed.
    pub fn status(&self, status: Status, msg: impl Display) {
        if self.is_quiet() && !matches!(status, Status::Error | Status::Failed) {
            return;
        }

        if let Some(captured) = &self.captured {
            if let Ok(mut lines) = captured.lock() {
                lines.push(format!("{} {}", status.as_str(), msg));
            }
            return;
        }

        eprintln!("{} {}", self.format_status(status), msg);
    }

    /// Print an info message.
    pub fn note(&self, msg: impl Display) {
        self.status(Status::Info, msg);
    }

    /// Print a warning message.
    pub fn warn(&self, msg: impl Display) {
        self.status(Status::Warning, msg);
    }

    /// Print an error message.
    pub fn error(&self, msg: impl Display) {
        self.status(Status::Error, msg);
    }

    /// Print a message only in verbose mode.
    pub fn verbose(&self, msg: impl Display) {
        if self.is_verbose() {
            self.status(Status::Running, msg);
        }
    }

    /// Lines recorded so far by a capturing shell.
    pub fn captured(&self) -> Vec<String> {
        self.captured
            .as_ref()
            .and_then(|c| c.lock().ok().map(|lines| lines.clone()))
            .unwrap_or_default()
    }

    /// Format a status prefix with optional color.
    fn format_status(&self, status: Status) -> String {
        let text = status.as_str();

        if self.use_color {
            format!("{}{:>width$}\x1b[0m", status.color_code(), text, width = STATUS_WIDTH)
        } else {
            format!("{:>width$}", text, width = STATUS_WIDTH)
        }
    }
}

impl Default for Shell {
    fn default() -> Self {
        Shell::new(Verbosity::Normal, ColorChoice::Auto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_choice_parse() {
        assert_eq!("auto".parse::<ColorChoice>().unwrap(), ColorChoice::Auto);
        assert_eq!("always".parse::<ColorChoice>().unwrap(), ColorChoice::Always);
        assert_eq!("never".parse::<ColorChoice>().unwrap(), ColorChoice::Never);
        assert!("invalid".parse::<ColorChoice>().is_err());
    }

    #[test]
    fn test_status_formatting() {
        let shell = Shell::new(Verbosity::Normal, ColorChoice::Never);

        let formatted = shell.format_status(Status::Building);
        assert_eq!(formatted.trim(), "Building");
        assert_eq!(formatted.len(), 12);
    }

    #[test]
    fn test_from_flags() {
        let shell = Shell::from_flags(false, false, ColorChoice::Never);
        assert!(!shell.is_quiet());
        assert!(!shell.is_verbose());

        let shell = Shell::from_flags(true, true, ColorChoice::Never);
        assert!(shell.is_quiet());
        assert!(!shell.echo_output());

        let shell = Shell::from_flags(false, true, ColorChoice::Never);
        assert!(shell.is_verbose());
    }

    #[test]
    fn test_capturing_records_lines() {
        let shell = Shell::capturing();
        shell.status(Status::Building, "fn-a (rust)");
        shell.warn("skipping");

        assert_eq!(
            shell.captured(),
            vec!["Building fn-a (rust)".to_string(), "Warning skipping".to_string()]
        );
        assert!(!shell.echo_output());
    }
}
