//! Coda Playback
//!
//! The playlist state machine and the playback controller.
//!
//! The controller ([`player::Player`]) is a single-owner event loop: all
//! mutable playback state lives inside the actor task, commands arrive over a
//! channel through [`player::PlayerHandle`], and UI-facing updates flow out
//! as [`events::PlayerEvent`] broadcasts. Playback and status snapshots are
//! coalesced by a debouncer; playlist, lyrics, and settings changes are
//! broadcast immediately.

#![forbid(unsafe_code)]

pub mod broadcast;
pub mod engine_seam;
pub mod error;
pub mod events;
pub mod lyrics;
pub mod playlist;
pub mod player;
pub mod session;
pub mod shuffle;
pub mod types;

pub use engine_seam::EngineControl;
pub use error::{PlayerError, Result};
pub use events::PlayerEvent;
pub use lyrics::{LyricsLine, LyricsSnapshot};
pub use player::{Player, PlayerHandle};
pub use playlist::{Playlist, RemoveOutcome};
pub use session::JsonSessionStore;
pub use types::{
    PlaybackSnapshot, PlaybackState, PlayerConfig, PlayerSettings, PlaylistItem, PlaylistSnapshot,
    SortColumn, SortDirection, StatusSnapshot,
};
