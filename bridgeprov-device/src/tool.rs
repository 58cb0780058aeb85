//! External tool invocation.

use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fmt;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Number of trailing output lines kept in error messages.
const ERROR_TAIL_LINES: usize = 12;

/// Longest a single tool run may take before it is killed.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(300);

/// A configurable command line such as `python -m esptool`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    /// A bare program with no leading arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Splits a whitespace-separated command line.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        })
    }

    /// Sets the run time limit.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs the command with `extra` appended and captures its output.
    ///
    /// The child is killed if it outlives the timeout or if the returned
    /// future is dropped. A timeout is reported as
    /// [`io::ErrorKind::TimedOut`].
    pub async fn run<I, S>(&self, extra: I) -> io::Result<ToolOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .args(extra)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!(command = ?command.as_std(), "running tool");

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(
                    program = %self.program,
                    timeout_s = self.timeout.as_secs(),
                    "tool timed out"
                );
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("{} timed out after {}s", self.program, self.timeout.as_secs()),
                ));
            }
        };
        Ok(ToolOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

impl TryFrom<String> for ToolCommand {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| "tool command must not be empty".to_string())
    }
}

impl From<ToolCommand> for String {
    fn from(value: ToolCommand) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a tool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Last lines of stderr (or stdout if stderr is empty), for error reports.
    #[must_use]
    pub fn tail(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
        lines[start..].join("\n")
    }

    /// Describes a failed run.
    #[must_use]
    pub fn failure(&self, what: &str) -> String {
        match self.code {
            Some(code) => format!("{what} exited with status {code}: {}", self.tail()),
            None => format!("{what} was terminated: {}", self.tail()),
        }
    }
}
