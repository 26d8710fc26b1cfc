//! Subprocess helpers.
//!
//! `Cmd` wraps `std::process::Command` with the error reporting used across
//! the crate, and `Privilege` decides how commands that need root are run.

use anyhow::{bail, Context, Result};
use std::env;
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

/// Captured result of a finished command.
#[derive(Debug)]
pub struct CommandResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit code, or -1 when the process was killed by a signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }
}

/// Command builder with uniform failure messages.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    error_msg: Option<String>,
    allow_fail: bool,
}

impl Cmd {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            error_msg: None,
            allow_fail: false,
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
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.as_os_str())
    }

    /// Message used as the error headline when the command fails.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    /// Return the result instead of an error on non-zero exit.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Human readable command line, for logs and error messages.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Build the underlying `Command` for callers that need custom stdio.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    /// Run the command, capturing stdout and stderr.
    pub fn run(&self) -> Result<CommandResult> {
        tracing::debug!("% {}", self.display());
        let output = self
            .command()
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to execute: {}", self.display()))?;

        let result = CommandResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() && !self.allow_fail {
            bail!(
                "{}\n  Command: {}\n  Exit code: {}\n  stderr: {}",
                self.error_msg.as_deref().unwrap_or("Command failed"),
                self.display(),
                result.code(),
                result.stderr.trim()
            );
        }

        Ok(result)
    }

    /// Run the command with inherited stdio so the user sees its output.
    pub fn run_interactive(&self) -> Result<ExitStatus> {
        tracing::debug!("% {}", self.display());
        let status = self
            .command()
            .status()
            .with_context(|| format!("Failed to execute: {}", self.display()))?;

        if !status.success() && !self.allow_fail {
            bail!(
                "{}\n  Command: {}\n  Exit code: {}",
                self.error_msg.as_deref().unwrap_or("Command failed"),
                self.display(),
                status.code().unwrap_or(-1)
            );
        }

        Ok(status)
    }
}

/// Sudo implementations we know how to drive, in order of preference.
const SUPPORTED_SUDOS: &[&str] = &["doas", "sudo"];

/// How commands that need root privileges are executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Privilege {
    /// Already running as root (or in tests against writable temp dirs).
    Direct,
    /// Prefix root commands with the given sudo-like program.
    Sudo(String),
}

impl Privilege {
    /// Pick the privilege mode for the current process.
    ///
    /// `PMB_SUDO` overrides the sudo program and must name an existing
    /// command.
    pub fn detect() -> Result<Self> {
        // SAFETY: geteuid has no preconditions and cannot fail.
        if unsafe { libc::geteuid() } == 0 {
            return Ok(Self::Direct);
        }
        which_sudo().map(Self::Sudo)
    }

    /// Start a command that runs as root.
    pub fn cmd(&self, program: impl AsRef<OsStr>) -> Cmd {
        match self {
            Self::Direct => Cmd::new(program),
            Self::Sudo(sudo) => Cmd::new(sudo).arg(program),
        }
    }
}

/// Find `sudo` or `doas`, honoring the `PMB_SUDO` override.
pub fn which_sudo() -> Result<String> {
    if let Ok(user_set) = env::var("PMB_SUDO") {
        if which::which(&user_set).is_err() {
            bail!(
                "PMB_SUDO environment variable is set to {} but this command \
                 cannot be found on your system.",
                user_set
            );
        }
        return Ok(user_set);
    }

    SUPPORTED_SUDOS
        .iter()
        .find(|sudo| which::which(sudo).is_ok())
        .map(|sudo| sudo.to_string())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Can't find sudo or doas required to manage chroots. \
                 Install sudo, doas, or specify your own with the PMB_SUDO \
                 environment variable."
            )
        })
}
