//! Error types for the environment lifecycle.

/// Result type alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing environments.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Request Errors
    // =========================================================================
    /// Malformed or missing request input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Missing, invalid, or expired credential.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    // =========================================================================
    // Registry Errors
    // =========================================================================
    /// No environment with this name for the calling owner.
    #[error("environment not found: {0}")]
    EnvironmentNotFound(String),

    /// Status change outside the lifecycle state machine.
    #[error("environment '{name}' cannot move from '{from}' to '{to}'")]
    InvalidTransition {
        name: String,
        from: String,
        to: String,
    },

    // =========================================================================
    // Create Errors
    // =========================================================================
    /// Writing the build descriptor failed.
    #[error("failed to compile build context for '{name}': {reason}")]
    CompileFailed { name: String, reason: String },

    /// The engine rejected the image build.
    #[error("Build failed: {reason}")]
    BuildFailed { tag: String, reason: String },

    /// The engine failed to run the built image.
    #[error("Run failed: {reason}")]
    RunFailed { name: String, reason: String },

    // =========================================================================
    // Engine Errors
    // =========================================================================
    /// The engine has no instance with this id or name.
    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    /// Any other engine-level failure.
    #[error("engine {operation} failed: {reason}")]
    Engine { operation: String, reason: String },

    // =========================================================================
    // Execution Errors
    // =========================================================================
    /// A build/run job could not be scheduled or panicked.
    #[error("worker pool error: {0}")]
    WorkerPool(String),

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for [`Error::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Shorthand for [`Error::Engine`].
    pub fn engine(operation: impl Into<String>, reason: impl ToString) -> Self {
        Self::Engine {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if the engine reported the instance as missing.
    pub fn is_instance_not_found(&self) -> bool {
        matches!(self, Self::InstanceNotFound(_))
    }
}
