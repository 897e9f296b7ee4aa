/// Playback error types
use coda_core::TrackId;
use thiserror::Error;

/// Result type alias using `PlayerError`
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Errors from the playback controller
#[derive(Error, Debug)]
pub enum PlayerError {
    /// Malformed or unsafe path input
    #[error("Invalid path: {0}")]
    Validation(String),

    /// Track id is not in the playlist (or its file no longer exists)
    #[error("Track not found: {0}")]
    TrackNotFound(TrackId),

    /// Engine-side failure
    #[error(transparent)]
    Engine(#[from] coda_engine::EngineError),

    /// Session persistence failure
    #[error("Session error: {0}")]
    Session(String),

    /// The controller task is gone
    #[error("Player is shut down")]
    ShutDown,
}
