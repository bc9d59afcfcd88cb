//! Interpreter discovery
//!
//! Finds Python executables on `PATH` and asks each one for its version.

use super::version::Version;
use crate::error::{IdaeError, IdaeResult};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Printed by every candidate: one JSON object on stdout
const PROBE_SCRIPT: &str = "import json, platform, sys; \
print(json.dumps({'version': platform.python_version(), 'executable': sys.executable}))";

/// A usable Python interpreter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    pub version: Version,
    pub executable: PathBuf,
}

impl Interpreter {
    pub fn new(version: Version, executable: impl Into<PathBuf>) -> Self {
        Self {
            version,
            executable: executable.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    version: String,
    executable: PathBuf,
}

/// Source of candidate interpreters
#[async_trait]
pub trait InterpreterDiscovery: Send + Sync {
    /// Every interpreter that can be used, in no particular order
    async fn find_all(&self) -> IdaeResult<Vec<Interpreter>>;
}

/// Discovers `python`, `python3` and `python3.N` on `PATH`
#[derive(Debug, Clone)]
pub struct PathDiscovery {
    pattern: Regex,
}

impl PathDiscovery {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(r"^python(3(\.[0-9]+)?)?(\.exe)?$").expect("pattern is valid"),
        }
    }

    /// Executables on `PATH` whose file name looks like a Python interpreter
    fn candidates(&self) -> Vec<PathBuf> {
        match which::which_re(&self.pattern) {
            Ok(paths) => paths.collect(),
            Err(e) => {
                debug!("PATH scan failed: {}", e);
                Vec::new()
            }
        }
    }
}

impl Default for PathDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InterpreterDiscovery for PathDiscovery {
    async fn find_all(&self) -> IdaeResult<Vec<Interpreter>> {
        let mut found = Vec::new();

        // Symlinks into a venv report the venv, so every candidate is probed
        for candidate in self.candidates() {
            match probe(&candidate).await {
                Ok(interpreter) => {
                    debug!(
                        "Found Python {} at {} (via {})",
                        interpreter.version,
                        interpreter.executable.display(),
                        candidate.display()
                    );
                    found.push(interpreter);
                }
                Err(e) => debug!("Skipping {}: {}", candidate.display(), e),
            }
        }

        Ok(unique_executables(found))
    }
}

/// Drop interpreters that report an executable already seen, keeping the first
fn unique_executables(found: Vec<Interpreter>) -> Vec<Interpreter> {
    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter(|interpreter| seen.insert(interpreter.executable.clone()))
        .collect()
}

/// Ask an executable for its version and real location
pub async fn probe(executable: &Path) -> IdaeResult<Interpreter> {
    let output = Command::new(executable)
        .args(["-c", PROBE_SCRIPT])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| IdaeError::InterpreterProbe {
            executable: executable.to_path_buf(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(IdaeError::InterpreterProbe {
            executable: executable.to_path_buf(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    parse_probe(executable, &output.stdout)
}

fn parse_probe(executable: &Path, stdout: &[u8]) -> IdaeResult<Interpreter> {
    let probe_error = |reason: String| IdaeError::InterpreterProbe {
        executable: executable.to_path_buf(),
        reason,
    };

    let probed: ProbeOutput =
        serde_json::from_slice(stdout).map_err(|e| probe_error(e.to_string()))?;
    let version = probed
        .version
        .parse()
        .map_err(|e: super::version::InvalidVersion| probe_error(e.to_string()))?;

    // sys.executable can be empty for embedded interpreters
    let executable = if probed.executable.as_os_str().is_empty() {
        executable.to_path_buf()
    } else {
        probed.executable
    };

    Ok(Interpreter::new(version, executable))
}
