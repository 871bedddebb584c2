//! Error types for sqlpilot.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Failures raised while resolving or rendering a prompt template.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// The key is not present in the template index.
    #[error("Prompt key '{0}' not found in template index")]
    KeyNotFound(String),

    /// The entry points at a template file that does not exist.
    #[error("Prompt file for '{key}' not found at: {}", .path.display())]
    FileNotFound { key: String, path: PathBuf },

    /// The entry declares neither an inline body nor a file.
    #[error("No prompt source ('inline' or 'file') for key: {0}")]
    NoSource(String),

    /// One or more inputs the template needs were not supplied.
    #[error("Missing prompt inputs {names:?} for prompt '{key}'")]
    MissingInputs { key: String, names: Vec<String> },

    /// The index document itself could not be read or parsed.
    #[error("Invalid template index: {0}")]
    Index(String),
}

/// The main error type for sqlpilot operations.
#[derive(Debug, Error)]
pub enum PilotError {
    /// Unreadable source document or invalid schema JSON.
    #[error("Input error for {}: {message}", .path.display())]
    Input { path: PathBuf, message: String },

    /// Prompt rendering failed before any completion call.
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// The completion service failed (network, timeout, status, body).
    #[error("Completion error: {0}")]
    Completion(String),

    /// Backup or write failure. Raised loudly since it may lose data.
    #[error("Filesystem error on {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification used in batch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    Template,
    Completion,
    Filesystem,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Input => "InputError",
            ErrorKind::Template => "TemplateError",
            ErrorKind::Completion => "CompletionError",
            ErrorKind::Filesystem => "FilesystemError",
            ErrorKind::Config => "ConfigError",
        };
        f.write_str(name)
    }
}

impl PilotError {
    /// Create an input error for the given path.
    pub fn input(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Input {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a filesystem error for the given path.
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PilotError::Input { .. } => ErrorKind::Input,
            PilotError::Template(_) => ErrorKind::Template,
            PilotError::Completion(_) => ErrorKind::Completion,
            PilotError::Filesystem { .. } => ErrorKind::Filesystem,
            PilotError::Config(_) => ErrorKind::Config,
        }
    }
}

/// Result type alias for sqlpilot operations.
pub type PilotResult<T> = Result<T, PilotError>;
