//! Virtual environment creation and package installation
//!
//! [`EnvironmentBuilder`] is the seam between the cache and the Python
//! tooling that actually populates an environment. [`VenvBuilder`] shells
//! out to `python -m venv` and `python -m pip install`.

use crate::error::{IdaeError, IdaeResult};
use crate::python::Interpreter;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Outcome of a builder step: exit code plus combined stdout/stderr
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    /// `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub output: String,
}

impl CapturedOutput {
    pub fn success() -> Self {
        Self {
            code: Some(0),
            output: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Populates isolated environments
#[async_trait]
pub trait EnvironmentBuilder: Send + Sync {
    /// Create a fresh environment at `target` using `python`
    async fn create(
        &self,
        python: &Interpreter,
        target: &Path,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> IdaeResult<CapturedOutput>;

    /// Install `requirements` into the environment at `env`
    async fn install(
        &self,
        env: &Path,
        requirements: &[String],
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> IdaeResult<CapturedOutput>;
}

/// Interpreter inside an environment directory
pub fn env_python(env: &Path) -> PathBuf {
    if cfg!(windows) {
        env.join("Scripts").join("python.exe")
    } else {
        env.join("bin").join("python")
    }
}

/// Builder backed by the standard library `venv` module and pip
#[derive(Debug, Clone, Default)]
pub struct VenvBuilder;

impl VenvBuilder {
    pub fn new() -> Self {
        Self
    }

    async fn run(
        &self,
        mut cmd: Command,
        label: &str,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> IdaeResult<CapturedOutput> {
        debug!("Executing: {:?}", cmd.as_std());

        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| IdaeError::command_failed(label, e))?;

        let lines = stream_child_output(&mut child, on_output).await;
        let status = child
            .wait()
            .await
            .map_err(|e| IdaeError::command_failed(label, e))?;

        Ok(CapturedOutput {
            code: status.code(),
            output: lines.join("\n"),
        })
    }
}

#[async_trait]
impl EnvironmentBuilder for VenvBuilder {
    async fn create(
        &self,
        python: &Interpreter,
        target: &Path,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> IdaeResult<CapturedOutput> {
        let mut cmd = Command::new(&python.executable);
        cmd.args(["-m", "venv"]).arg(target);
        self.run(cmd, "python -m venv", on_output).await
    }

    async fn install(
        &self,
        env: &Path,
        requirements: &[String],
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> IdaeResult<CapturedOutput> {
        let mut cmd = Command::new(env_python(env));
        cmd.args(["-m", "pip", "install", "--disable-pip-version-check"])
            .args(requirements);
        self.run(cmd, "pip install", on_output).await
    }
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Returns all collected output lines for error reporting.
async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &(dyn Fn(String) + Send + Sync),
) -> Vec<String> {
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Vec::new();
    };

    let mut stdout_reader = BufReader::new(stdout).lines();
    let mut stderr_reader = BufReader::new(stderr).lines();

    let mut all_output = Vec::new();
    let mut stdout_done = false;
    let mut stderr_done = false;

    while !stdout_done || !stderr_done {
        tokio::select! {
            line = stdout_reader.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stdout_done = true,
                }
            }
            line = stderr_reader.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stderr_done = true,
                }
            }
        }
    }

    all_output
}
