/// Engine error types
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using `EngineError`
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by the engine transport and facade
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine socket never became reachable within the retry budget
    #[error("could not connect to engine socket {path} after {attempts} attempts")]
    Connect { path: PathBuf, attempts: u32 },

    /// A command did not receive a response within the fixed timeout
    #[error("engine command timed out")]
    Timeout,

    /// The engine returned a semantic error for a command
    #[error("engine rejected command: {0}")]
    Rejected(String),

    /// No live connection to the engine
    #[error("engine is not connected")]
    NotConnected,

    /// The engine subprocess died or closed the socket unexpectedly
    #[error("engine process exited unexpectedly")]
    ProcessExited,

    /// The engine build lacks a given property/option (soft failure used by
    /// option fallback chains)
    #[error("engine option unsupported: {0}")]
    OptionUnsupported(String),

    /// Spawning the engine subprocess failed
    #[error("failed to spawn engine process: {0}")]
    Spawn(#[source] std::io::Error),

    /// I/O error on the engine socket
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether this error should be treated as a soft "this engine build
    /// does not expose that option" failure
    pub fn is_option_unsupported(&self) -> bool {
        matches!(self, EngineError::OptionUnsupported(_))
    }
}
