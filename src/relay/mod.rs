//! Running the script inside its environment
//!
//! When both stdin and stdout are terminals (Unix only) the child runs on a
//! pseudo-terminal so that it sees a real TTY. Otherwise it inherits our
//! stdio directly. Either way the child's exit code is returned unchanged.

#[cfg(unix)]
mod pty;

use crate::error::{IdaeError, IdaeResult};
use std::fmt;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::debug;

/// Program plus arguments to relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl RelayCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for RelayCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// How the child's stdio is connected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    Pty,
    Inherit,
}

impl RelayMode {
    pub fn detect() -> Self {
        let tty = std::io::stdin().is_terminal() && std::io::stdout().is_terminal();
        if cfg!(unix) && tty {
            Self::Pty
        } else {
            Self::Inherit
        }
    }
}

/// Run `cmd` to completion and return its exit code
pub async fn run(cmd: &RelayCommand) -> IdaeResult<i32> {
    run_with(cmd, RelayMode::detect()).await
}

pub async fn run_with(cmd: &RelayCommand, mode: RelayMode) -> IdaeResult<i32> {
    debug!("Relaying {:?}: {}", mode, cmd);
    match mode {
        #[cfg(unix)]
        RelayMode::Pty => pty::run(cmd).await,
        #[cfg(not(unix))]
        RelayMode::Pty => run_inherited(cmd).await,
        RelayMode::Inherit => run_inherited(cmd).await,
    }
}

async fn run_inherited(cmd: &RelayCommand) -> IdaeResult<i32> {
    let mut child = Command::new(&cmd.program)
        .args(&cmd.args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| IdaeError::child(cmd.to_string(), e))?;

    // Ctrl-C reaches the child through the terminal; we only wait for it
    let swallow = tokio::spawn(async {
        while tokio::signal::ctrl_c().await.is_ok() {}
    });
    let status = child.wait().await;
    swallow.abort();

    let status = status.map_err(|e| IdaeError::child(cmd.to_string(), e))?;
    Ok(exit_code(status))
}

/// Exit code of a finished child; `128 + signal` when it was killed
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
