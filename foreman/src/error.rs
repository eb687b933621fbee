//! Error types for the foreman engine.
//!
//! Two error spaces exist: [`EngineError`] for failures of the graph, the
//! supervisor, the model boundary and the checkpoint store, and [`ToolError`]
//! for failures of individual tool invocations. Tool failures never abort a
//! run; they are rendered into error tool-results and fed back to the model.

use thiserror::Error;

/// A type alias for `Result<T, EngineError>`.
pub type Result<T> = std::result::Result<T, EngineError>;

/// The main error type for graph and orchestrator operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The language model call failed.
    #[error("model error: {message}")]
    Model {
        /// Sanitized description of the failure.
        message: String,
    },

    /// The supervisor's structured output could not be parsed or validated.
    #[error("structured output error: {message}")]
    StructuredOutput {
        /// Description of the parse/validation failure.
        message: String,
    },

    /// The checkpoint store failed. Integrity failures propagate; runs must
    /// not silently lose state.
    #[error("checkpoint error: {message}")]
    Checkpoint {
        /// Description of the storage failure.
        message: String,
    },

    /// Serialization of a checkpoint payload or channel write failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid engine configuration.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration issue.
        message: String,
    },

    /// A graph invariant was violated (unknown node, recursion ceiling).
    #[error("graph error: {message}")]
    Graph {
        /// Description of the violation.
        message: String,
    },

    /// Generic internal error.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl EngineError {
    /// Create a new model error.
    #[must_use]
    pub fn model(message: impl Into<String>) -> Self {
        Self::Model {
            message: message.into(),
        }
    }

    /// Create a new structured-output error.
    #[must_use]
    pub fn structured_output(message: impl Into<String>) -> Self {
        Self::StructuredOutput {
            message: message.into(),
        }
    }

    /// Create a new checkpoint error.
    #[must_use]
    pub fn checkpoint(message: impl Into<String>) -> Self {
        Self::Checkpoint {
            message: message.into(),
        }
    }

    /// Create a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new graph error.
    #[must_use]
    pub fn graph(message: impl Into<String>) -> Self {
        Self::Graph {
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Checkpoint {
            message: err.to_string(),
        }
    }
}

/// Errors produced by tool invocations.
///
/// These surface to the model as `"Error: …"` tool-results rather than
/// aborting the run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ToolError {
    /// No tool with the given name is registered.
    #[error("tool '{0}' not found")]
    NotFound(String),

    /// The arguments did not match the tool's schema.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The tool ran but failed.
    #[error("{0}")]
    Execution(String),

    /// The invocation matched a blocked command pattern and was rejected
    /// before execution.
    #[error("blocked: {0}")]
    Blocked(String),

    /// The tool exceeded its time budget.
    #[error("timed out after {0} seconds")]
    Timeout(u64),

    /// Filesystem or process I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidArguments(err.to_string())
    }
}
