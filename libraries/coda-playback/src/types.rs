/// Core types for playlist and playback state
use coda_core::{RepeatMode, TrackId, TrackMetadata};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// No track loaded or playback explicitly stopped
    Stopped,

    /// Currently playing
    Playing,

    /// Paused mid-track
    Paused,
}

impl Default for PlaybackState {
    fn default() -> Self {
        PlaybackState::Stopped
    }
}

/// Sortable playlist columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortColumn {
    /// Track title
    Title,
    /// Artist name
    Artist,
    /// Album name
    Album,
    /// Track duration
    Duration,
    /// File path
    Path,
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Low to high
    Ascending,
    /// High to low
    Descending,
}

impl SortDirection {
    /// The opposite direction
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

impl Default for SortDirection {
    fn default() -> Self {
        SortDirection::Ascending
    }
}

/// One playlist entry
///
/// Identity is the id, not the path: duplicate paths are allowed. The
/// metadata starts as a placeholder and is mutated in place once the load
/// queue completes an extraction for this id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistItem {
    /// Unique per-session id
    pub id: TrackId,

    /// File path
    pub path: PathBuf,

    /// Current metadata (placeholder until extracted)
    pub metadata: TrackMetadata,
}

impl PlaylistItem {
    /// Create an item with placeholder metadata for `path`
    pub fn placeholder(path: PathBuf) -> Self {
        let metadata = TrackMetadata::placeholder(&path);
        Self {
            id: TrackId::generate(),
            path,
            metadata,
        }
    }
}

/// Immutable-at-emit-time view of the playlist
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlaylistSnapshot {
    /// Ordered items
    pub items: Vec<PlaylistItem>,

    /// Primary selected track
    pub selected_track_id: Option<TrackId>,

    /// Ordered multi-selection; contains the primary when both are non-empty
    pub selected_track_ids: Vec<TrackId>,

    /// Track loaded (or last loaded) in the engine
    pub current_track_id: Option<TrackId>,

    /// Active sort column; `None` after any order-breaking mutation
    pub sort_column: Option<SortColumn>,

    /// Active sort direction
    pub sort_direction: SortDirection,
}

/// Immutable-at-emit-time view of playback state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    /// Playback state
    pub state: PlaybackState,

    /// Position in seconds
    pub current_time_sec: f64,

    /// Duration in seconds, when known
    pub duration_sec: Option<f64>,

    /// Volume percent, 0-130
    pub volume_percent: f64,

    /// Repeat mode
    pub repeat_mode: RepeatMode,

    /// Shuffle flag
    pub shuffle_enabled: bool,

    /// Live bitrate in kbps, when the engine reports one
    pub bitrate_kbps: Option<f64>,

    /// Codec of the playing stream
    pub codec: Option<String>,

    /// Container format of the playing file
    pub container_format: Option<String>,

    /// Decoded stream parameters
    pub audio_params_in: Option<String>,

    /// Output stream parameters
    pub audio_params_out: Option<String>,

    /// Output driver in use
    pub output_driver: Option<String>,

    /// Output device in use
    pub output_device: Option<String>,

    /// Track loaded in the engine; cleared by an explicit stop
    pub current_track_id: Option<TrackId>,
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self {
            state: PlaybackState::Stopped,
            current_time_sec: 0.0,
            duration_sec: None,
            volume_percent: 100.0,
            repeat_mode: RepeatMode::Off,
            shuffle_enabled: false,
            bitrate_kbps: None,
            codec: None,
            container_format: None,
            audio_params_in: None,
            audio_params_out: None,
            output_driver: None,
            output_device: None,
            current_track_id: None,
        }
    }
}

impl PlaybackSnapshot {
    /// Reset the live audio-runtime readout so stale values from the
    /// previous track never leak into a newly loaded one
    pub fn clear_runtime_readout(&mut self) {
        self.bitrate_kbps = None;
        self.codec = None;
        self.container_format = None;
        self.audio_params_in = None;
        self.audio_params_out = None;
        self.output_driver = None;
        self.output_device = None;
    }
}

/// User-visible status: sticky backend error, transient message, cover art
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusSnapshot {
    /// Persistent backend failure; cleared only by the next successful
    /// status-setting operation
    pub backend_error: Option<String>,

    /// Auto-expiring status line
    pub transient_message: Option<String>,

    /// Whether the engine backend is available
    pub engine_available: bool,

    /// Cover art for the current track, when discovered
    pub cover_art_path: Option<PathBuf>,
}

/// Player settings pushed from the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSettings {
    /// Replaygain preamp for tagged files, in dB
    pub replaygain_preamp_db: f64,

    /// Replaygain preamp for untagged files, in dB
    pub replaygain_fallback_db: f64,

    /// Root directory of the music library browser
    pub music_root: Option<PathBuf>,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            replaygain_preamp_db: 0.0,
            replaygain_fallback_db: 0.0,
            music_root: None,
        }
    }
}

/// Configuration for the playback controller
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Interval of the periodic session autosave
    pub autosave_interval: Duration,

    /// Coalescing delay for playback/status broadcasts
    pub broadcast_debounce: Duration,

    /// Maximum coalescing window before a broadcast is forced out
    pub broadcast_max_window: Duration,

    /// How long a transient status line stays visible
    pub transient_status_duration: Duration,

    /// How many newly added items get high-priority metadata loads
    /// (bounds visible-first latency for typical viewport sizes)
    pub visible_high_count: usize,

    /// Bounded wait for the engine's file-loaded confirmation
    pub file_loaded_timeout: Duration,

    /// Engine error substrings treated as transient/benign rather than as a
    /// persistent backend failure
    pub benign_error_markers: Vec<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            autosave_interval: Duration::from_secs(30),
            broadcast_debounce: Duration::from_millis(250),
            broadcast_max_window: Duration::from_secs(1),
            transient_status_duration: Duration::from_secs(4),
            visible_high_count: 25,
            file_loaded_timeout: Duration::from_secs(2),
            benign_error_markers: vec!["command failed".to_string()],
        }
    }
}

impl PlayerConfig {
    /// Whether an engine error message is the known transient/benign kind
    pub fn is_benign_engine_error(&self, message: &str) -> bool {
        let lower = message.to_lowercase();
        self.benign_error_markers
            .iter()
            .any(|marker| lower.contains(&marker.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_direction_toggles() {
        assert_eq!(SortDirection::Ascending.toggled(), SortDirection::Descending);
        assert_eq!(SortDirection::Descending.toggled(), SortDirection::Ascending);
    }

    #[test]
    fn placeholder_item_takes_title_from_stem() {
        let item = PlaylistItem::placeholder(PathBuf::from("/music/song.flac"));
        assert_eq!(item.metadata.title.as_deref(), Some("song"));
        assert!(item.metadata.artist.is_none());
    }

    #[test]
    fn runtime_readout_clears_without_touching_position() {
        let mut snapshot = PlaybackSnapshot {
            current_time_sec: 12.0,
            codec: Some("FLAC".to_string()),
            bitrate_kbps: Some(900.0),
            ..PlaybackSnapshot::default()
        };
        snapshot.clear_runtime_readout();
        assert!(snapshot.codec.is_none());
        assert!(snapshot.bitrate_kbps.is_none());
        assert_eq!(snapshot.current_time_sec, 12.0);
    }

    #[test]
    fn benign_error_matching() {
        let config = PlayerConfig::default();
        assert!(config.is_benign_engine_error("engine rejected command: Command Failed"));
        assert!(!config.is_benign_engine_error("engine process exited unexpectedly"));
    }
}
