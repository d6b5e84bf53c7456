//! External tool invocation.
//!
//! Every collaborator (git, mkarchroot, arch-nspawn, makechrootpkg, repo-add)
//! is run through a [`ToolRunner`], which captures the exit status and output
//! into a uniform [`ToolOutput`]. Callers decide whether a failure is fatal.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Maximum number of stderr bytes kept in a [`ToolError::Failed`].
const STDERR_TAIL_LIMIT: usize = 4096;

#[derive(Debug, Error)]
pub enum ToolError {
  /// The program could not be started at all.
  #[error("failed to run `{command}`: {source}")]
  Spawn {
    command: String,
    #[source]
    source: std::io::Error,
  },

  /// The program ran and exited unsuccessfully.
  #[error("`{command}` failed with exit code {}{}", display_code(.code), display_stderr(.stderr))]
  Failed {
    command: String,
    code: Option<i32>,
    stderr: String,
  },
}

impl ToolError {
  /// The tool's exit code, when it ran and exited with one.
  pub fn exit_code(&self) -> Option<i32> {
    match self {
      ToolError::Failed { code, .. } => *code,
      ToolError::Spawn { .. } => None,
    }
  }
}

fn display_code(code: &Option<i32>) -> String {
  code.map_or_else(|| "none (terminated by signal)".to_string(), |c| c.to_string())
}

fn display_stderr(stderr: &str) -> String {
  let stderr = stderr.trim();
  if stderr.is_empty() {
    String::new()
  } else {
    format!("\n{}", stderr)
  }
}

/// A single external program call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
  pub program: OsString,
  pub args: Vec<OsString>,
  pub cwd: Option<PathBuf>,
}

impl Invocation {
  pub fn new(program: impl AsRef<OsStr>) -> Self {
    Self {
      program: program.as_ref().to_os_string(),
      args: Vec::new(),
      cwd: None,
    }
  }

  pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
    self.args.push(arg.as_ref().to_os_string());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
  {
    self.args.extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
    self
  }

  pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
    self.cwd = Some(dir.as_ref().to_path_buf());
    self
  }

  /// Program name as a lossy string, for matching and display.
  pub fn program_name(&self) -> String {
    self.program.to_string_lossy().into_owned()
  }

  /// Arguments as lossy strings.
  pub fn arg_strings(&self) -> Vec<String> {
    self.args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
  }
}

impl fmt::Display for Invocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.program.to_string_lossy())?;
    for arg in &self.args {
      write!(f, " {}", arg.to_string_lossy())?;
    }
    Ok(())
  }
}

/// Captured result of a finished invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
  /// Exit code; `None` when the process was killed by a signal.
  pub status: Option<i32>,
  pub stdout: String,
  pub stderr: String,
}

impl ToolOutput {
  pub fn success() -> Self {
    Self {
      status: Some(0),
      ..Self::default()
    }
  }

  pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
    Self {
      status: Some(code),
      stdout: String::new(),
      stderr: stderr.into(),
    }
  }

  pub fn is_success(&self) -> bool {
    self.status == Some(0)
  }

  /// Convert an unsuccessful exit into a [`ToolError::Failed`].
  pub fn check(self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
    if self.is_success() {
      return Ok(self);
    }

    Err(ToolError::Failed {
      command: invocation.to_string(),
      code: self.status,
      stderr: stderr_tail(&self.stderr),
    })
  }
}

fn stderr_tail(stderr: &str) -> String {
  if stderr.len() <= STDERR_TAIL_LIMIT {
    return stderr.to_string();
  }
  let mut start = stderr.len() - STDERR_TAIL_LIMIT;
  while !stderr.is_char_boundary(start) {
    start += 1;
  }
  format!("...{}", &stderr[start..])
}

/// Runs external programs.
///
/// Implementations block the pipeline until the program exits; no timeout is
/// applied.
pub trait ToolRunner: Send + Sync {
  fn run(&self, invocation: &Invocation) -> impl Future<Output = Result<ToolOutput, ToolError>> + Send;

  /// Run and fail on a non-zero exit.
  fn run_checked(&self, invocation: &Invocation) -> impl Future<Output = Result<ToolOutput, ToolError>> + Send {
    async move { self.run(invocation).await?.check(invocation) }
  }
}

/// Runs programs on the host with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
  async fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
    info!(cmd = %invocation, "running external tool");

    let mut command = Command::new(&invocation.program);
    command
      .args(&invocation.args)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped());
    if let Some(cwd) = &invocation.cwd {
      command.current_dir(cwd);
    }

    debug!(working_dir = ?invocation.cwd, "spawning process");

    let output = command.output().await.map_err(|source| ToolError::Spawn {
      command: invocation.to_string(),
      source,
    })?;

    let result = ToolOutput {
      status: output.status.code(),
      stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
      stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    if !result.stdout.trim().is_empty() {
      debug!(stdout = %result.stdout.trim(), "tool stdout");
    }
    if !result.stderr.trim().is_empty() {
      debug!(stderr = %result.stderr.trim(), "tool stderr");
    }

    Ok(result)
  }
}
