//! Subprocess execution utilities.
//!
//! Toolchain output is teed: every line goes to the terminal as it arrives
//! and into a capture buffer that ends up in the build log.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Mutex;

use crate::error::{Error, Result};

/// Builder for subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    cwd: Option<PathBuf>,
    /// Original script text for commands run through `sh -c`.
    script: Option<String>,
}

/// Output of a teed command.
#[derive(Debug, Clone)]
pub struct Captured {
    pub status: ExitStatus,
    /// Interleaved stdout and stderr, in arrival order per stream.
    pub log: String,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            script: None,
        }
    }

    /// Run a full command line through the POSIX shell.
    pub fn shell(script: impl Into<String>) -> Self {
        let script = script.into();
        let mut pb = ProcessBuilder::new("sh").arg("-c").arg(&script);
        pb.script = Some(script);
        pb
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd
    }

    /// Execute the command, streaming output to the terminal when `echo`
    /// is set and capturing it either way.
    pub fn exec_tee(&self, echo: bool) -> Result<Captured> {
        tracing::debug!("running `{}`", self.display_command());

        let mut cmd = self.build_command();
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| Error::Spawn {
            command: self.display_command(),
            source,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let log = Mutex::new(String::new());

        std::thread::scope(|s| {
            let log = &log;
            if let Some(out) = stdout {
                s.spawn(move || tee(out, log, echo.then(io::stdout)));
            }
            if let Some(err) = stderr {
                s.spawn(move || tee(err, log, echo.then(io::stderr)));
            }
        });

        let status = child.wait().map_err(|source| Error::Spawn {
            command: self.display_command(),
            source,
        })?;

        Ok(Captured {
            status,
            log: log.into_inner().unwrap_or_default(),
        })
    }

    /// Execute with teed output and require success.
    ///
    /// The captured log is returned on success and carried by the error on
    /// failure.
    pub fn exec_and_check(&self, echo: bool) -> Result<String> {
        let captured = self.exec_tee(echo)?;
        if !captured.status.success() {
            return Err(Error::Command {
                command: self.display_command(),
                code: captured.status.code(),
                log: captured.log,
            });
        }
        Ok(captured.log)
    }

    /// Display the command for error messages.
    pub fn display_command(&self) -> String {
        if let Some(ref script) = self.script {
            return script.clone();
        }
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

fn tee<R: Read, W: Write>(reader: R, log: &Mutex<String>, mut terminal: Option<W>) {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        if let Some(out) = terminal.as_mut() {
            let _ = out.write_all(&line);
            let _ = out.flush();
        }

        if let Ok(mut log) = log.lock() {
            log.push_str(&String::from_utf8_lossy(&line));
        }
    }
}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Require an executable to be on PATH.
pub fn require_executable(name: &str) -> Result<PathBuf> {
    find_executable(name).ok_or_else(|| Error::MissingTool(name.to_string()))
}
