//! Error types for drydock

use std::time::Duration;

use thiserror::Error;

/// Main error type for drydock operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A catalog entry failed schema validation or an illegal resource
    /// name/namespace was produced
    #[error("validation error: {0}")]
    Validation(String),

    /// Manifest generation failed for a predictable reason (missing image,
    /// exposure requested without ports, ...)
    #[error("generation error: {0}")]
    Generation(String),

    /// A requested service does not exist in the catalog
    #[error("service not found in catalog: {0}")]
    ServiceNotFound(String),

    /// A circular reference exists among the requested services
    #[error("dependency cycle detected: {}", path.join(" -> "))]
    CycleDetected {
        /// The offending chain, ending at the node that closed the cycle
        path: Vec<String>,
    },

    /// An external tool (kubectl, k3d) exited non-zero
    #[error("command failed: {command}: {message}")]
    CommandFailed {
        /// The command that was run
        command: String,
        /// Captured stderr (or a description of the failure)
        message: String,
    },

    /// A bounded wait elapsed before the condition was met. The underlying
    /// resource may still converge later; this is not a hard failure.
    #[error("timed out after {0:?}: {1}")]
    Timeout(Duration, String),

    /// A health wait observed too many consecutive non-healthy results
    #[error("service unhealthy: {0}")]
    Unhealthy(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// YAML parse error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parse error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a generation error with the given message
    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    /// Create a command failure with the command name and captured output
    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}
