//! Error types for Depot
//!
//! All modules use `DepotResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Depot operations
pub type DepotResult<T> = Result<T, DepotError>;

/// All errors that can occur in Depot
#[derive(Error, Debug)]
pub enum DepotError {
    // Transfer errors
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Operation cancelled")]
    Cancelled,

    // Extraction errors
    #[error("Extraction failed: {reason}")]
    Extraction {
        reason: String,
        diagnostics: Vec<String>,
    },

    #[error("Extraction backend not found: {name}. {hint}")]
    BackendNotFound { name: String, hint: String },

    // Launch errors
    #[error("Port conflict on {port}: held by pid(s) {pids:?}")]
    PortConflict {
        port: u16,
        pids: Vec<u32>,
        /// Whether the conflicting process appears to be a depot-launched instance
        owned: bool,
    },

    #[error("No free port in range {start}-{end}")]
    PortRangeExhausted { start: u16, end: u16 },

    #[error("Timed out after {elapsed_ms} ms waiting for {what}")]
    Timeout { what: String, elapsed_ms: u64 },

    #[error("Process failed to spawn: {0}")]
    Spawn(String),

    #[error("Unsupported platform: {0}. Depot supports macOS, Linux, and Windows.")]
    UnsupportedPlatform(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl DepotError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a validation error
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    /// Create a network error
    pub fn network(reason: impl Into<String>) -> Self {
        Self::Network(reason.into())
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Create an extraction error with captured diagnostics
    pub fn extraction(reason: impl Into<String>, diagnostics: Vec<String>) -> Self {
        Self::Extraction {
            reason: reason.into(),
            diagnostics,
        }
    }

    /// Check if error is retryable
    ///
    /// Network and timeout failures leave resumable state behind; a later
    /// call picks up where this one stopped. Validation failures purge
    /// state and are never retried internally.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout { .. })
    }

    /// Whether this error represents a user-initiated cancel rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Network(_) => Some("Re-run the same command to resume the transfer"),
            Self::PortConflict { owned: true, .. } => {
                Some("Another depot instance owns this port. Run: depot status")
            }
            Self::PortConflict { owned: false, .. } => {
                Some("Pick another port range or stop the conflicting process")
            }
            Self::BackendNotFound { .. } => Some("Install 7-Zip (p7zip) and ensure it is on PATH"),
            _ => None,
        }
    }
}
