//! Error types for idae
//!
//! All modules use `IdaeResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for idae operations
pub type IdaeResult<T> = Result<T, IdaeError>;

/// Build step that produced an [`IdaeError::EnvironmentCreation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    /// `python -m venv`
    Create,
    /// `python -m pip install`
    Install,
}

impl std::fmt::Display for BuildStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "creating virtual environment"),
            Self::Install => write!(f, "installing dependencies"),
        }
    }
}

/// All errors that can occur in idae
#[derive(Error, Debug)]
pub enum IdaeError {
    // Metadata errors
    #[error("Multiple {kind} blocks found")]
    MultipleBlocks { kind: String },

    #[error("Invalid script metadata: {0}")]
    MetadataDecode(#[from] toml::de::Error),

    #[error("Invalid requirement '{requirement}': {reason}")]
    InvalidRequirement { requirement: String, reason: String },

    // Interpreter errors
    #[error("Python version {constraint} could not be parsed: {reason}")]
    InvalidConstraint { constraint: String, reason: String },

    #[error("Python version {constraint} not found")]
    InterpreterNotFound { constraint: String },

    #[error("Python interpreter {executable} is unusable: {reason}")]
    InterpreterProbe { executable: PathBuf, reason: String },

    // Environment errors
    #[error("Failed {stage}:\n{output}")]
    EnvironmentCreation { stage: BuildStage, output: String },

    // Process errors
    #[error("Failed to run script: {context}")]
    ChildProcess {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Script not found: {0}")]
    ScriptNotFound(PathBuf),

    #[error("Invalid --python-flags value '{flags}': {reason}")]
    InvalidPythonFlags { flags: String, reason: String },
}

impl IdaeError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a child process error
    pub fn child(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::ChildProcess {
            context: context.into(),
            source,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::MultipleBlocks { .. } => Some("Keep a single `# /// script` block in the file"),
            Self::InterpreterNotFound { .. } => {
                Some("Install a matching Python, or pass --ignore-version / --force-version")
            }
            Self::InvalidConstraint { .. } => Some(
                "Use a PEP 440 specifier such as \">=3.11\" or a bare version such as \"3.11\"",
            ),
            Self::InvalidPythonFlags { .. } => Some("Quote flags the way a POSIX shell would"),
            Self::EnvironmentCreation { .. } => Some(
                "Check the dependency list; run `idae clean` to discard cached environments",
            ),
            _ => None,
        }
    }
}
