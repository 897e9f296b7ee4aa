/// UI-facing push events
use crate::lyrics::LyricsSnapshot;
use crate::types::{PlaybackSnapshot, PlayerSettings, PlaylistSnapshot, StatusSnapshot};
use coda_core::fs::BrowserEntry;
use coda_core::{TrackId, TrackMetadata};
use serde::Serialize;
use std::path::PathBuf;

/// Events broadcast by the controller to the presentation layer
///
/// Playback and status snapshots are debounced; playlist, lyrics, and
/// settings updates are comparatively rare and broadcast immediately.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PlayerEvent {
    /// Coalesced playback snapshot
    PlaybackSnapshot(PlaybackSnapshot),

    /// Full playlist snapshot
    PlaylistSnapshot(PlaylistSnapshot),

    /// One playlist row's metadata finished loading
    TrackMetadataUpdated {
        /// The row's track
        track_id: TrackId,
        /// Extracted metadata
        metadata: TrackMetadata,
    },

    /// Result of a directory browse
    BrowserEntries {
        /// Browsed directory
        path: PathBuf,
        /// Entries (directories first)
        entries: Vec<BrowserEntry>,
    },

    /// Settings changed
    SettingsUpdated(PlayerSettings),

    /// Lyrics lines or active line changed
    LyricsSnapshot(LyricsSnapshot),

    /// Coalesced status snapshot
    StatusSnapshot(StatusSnapshot),

    /// Transient, auto-expiring status line
    StatusMessage {
        /// Message text
        text: String,
    },

    /// Persistent backend failure
    BackendError {
        /// Error text
        message: String,
    },
}
