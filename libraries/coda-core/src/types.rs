/// Core domain types for Coda
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Reference loudness used when deriving loudness metrics from replaygain
/// tags (ReplayGain 2.0 reference level).
pub const REFERENCE_LOUDNESS_LUFS: f64 = -18.0;

/// Current version of the persisted metadata-cache document
pub const CACHE_DOCUMENT_VERSION: u32 = 1;

/// Track identifier
///
/// Assigned when a track enters the playlist, never reused and never derived
/// from the file path. Two playlist entries may point at the same path while
/// keeping distinct identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(Uuid);

impl TrackId {
    /// Generate a new random track ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner uuid
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Track metadata extracted from file tags and stream properties
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    /// Track title
    pub title: Option<String>,

    /// Artist name
    pub artist: Option<String>,

    /// Album name
    pub album: Option<String>,

    /// Album artist
    pub album_artist: Option<String>,

    /// Track number
    pub track_number: Option<u32>,

    /// Disc number
    pub disc_number: Option<u32>,

    /// Release year
    pub year: Option<u32>,

    /// Genre
    pub genre: Option<String>,

    /// Duration in milliseconds
    pub duration_ms: Option<u64>,

    /// Codec / container short name (e.g. "FLAC", "MPEG")
    pub codec: Option<String>,

    /// Sample rate in Hz
    pub sample_rate_hz: Option<u32>,

    /// Bits per sample (lossless formats)
    pub bits_per_sample: Option<u8>,

    /// Channel count
    pub channels: Option<u8>,

    /// Average audio bitrate in kbps
    pub bitrate_kbps: Option<u32>,

    /// Replaygain track gain in dB
    pub rg_track_gain_db: Option<f64>,

    /// Replaygain track peak (linear amplitude, 1.0 = full scale)
    pub rg_track_peak: Option<f64>,
}

impl TrackMetadata {
    /// Create empty metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Placeholder metadata for a freshly added path: title falls back to the
    /// file stem, everything else stays unknown until extraction completes.
    pub fn placeholder(path: &Path) -> Self {
        Self {
            title: Some(
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("Unknown")
                    .to_string(),
            ),
            ..Self::default()
        }
    }

    /// Check if metadata has any useful tag information
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.artist.is_none()
            && self.album.is_none()
            && self.duration_ms.is_none()
    }

    /// Peak-to-loudness ratio in dB, derived from replaygain tags.
    ///
    /// The track loudness is recovered from the replaygain gain relative to
    /// `reference_lufs`; the peak is converted from linear amplitude to dB.
    /// Returns `None` when either tag is missing or the peak is non-positive.
    pub fn plr_db(&self, reference_lufs: f64) -> Option<f64> {
        let gain = self.rg_track_gain_db?;
        let peak = self.rg_track_peak?;
        if peak <= 0.0 {
            return None;
        }
        let peak_db = 20.0 * peak.log10();
        let loudness = reference_lufs - gain;
        Some(peak_db - loudness)
    }
}

/// Cheap proxy for "file unchanged since last metadata extraction"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFingerprint {
    /// File size in bytes
    pub size_bytes: u64,

    /// Modification time in milliseconds since the Unix epoch
    pub mtime_ms: i64,
}

/// Repeat mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    /// Stop when the playlist ends
    Off,

    /// Loop the entire playlist
    All,

    /// Loop the current track only
    One,
}

impl RepeatMode {
    /// The next mode in the cycle order off -> all -> one -> off
    pub fn cycled(self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::All,
            RepeatMode::All => RepeatMode::One,
            RepeatMode::One => RepeatMode::Off,
        }
    }
}

impl Default for RepeatMode {
    fn default() -> Self {
        RepeatMode::Off
    }
}

/// Persisted session state
///
/// Paths, not ids, are the durable join key: track ids are ephemeral
/// per-session and are re-assigned on restore.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedSession {
    /// Ordered playlist file paths
    pub playlist_paths: Vec<PathBuf>,

    /// Path of the selected track, if any
    pub selected_track_path: Option<PathBuf>,

    /// Path of the track that was loaded in the engine, if any
    pub current_track_path: Option<PathBuf>,

    /// Playback position of the current track in seconds
    pub current_track_position_sec: Option<f64>,

    /// Repeat mode
    #[serde(default)]
    pub repeat_mode: RepeatMode,

    /// Shuffle flag
    #[serde(default)]
    pub shuffle_enabled: bool,

    /// Volume percentage (0-130)
    pub volume_percent: f64,

    /// Root directory of the music library browser
    pub music_root: Option<PathBuf>,
}

/// One entry of the persisted metadata cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Extracted metadata
    pub metadata: TrackMetadata,

    /// Fingerprint at extraction time; `None` marks a legacy entry that is
    /// treated as always valid until explicitly invalidated
    pub fingerprint: Option<FileFingerprint>,
}

/// Versioned on-disk form of the metadata cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheDocument {
    /// Document format version
    pub version: u32,

    /// When the document was written
    pub saved_at: DateTime<Utc>,

    /// Absolute file path -> cache entry
    pub entries: HashMap<PathBuf, CacheEntry>,
}

impl CacheDocument {
    /// Create an empty document at the current version
    pub fn empty() -> Self {
        Self {
            version: CACHE_DOCUMENT_VERSION,
            saved_at: Utc::now(),
            entries: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_ids_are_unique() {
        let a = TrackId::generate();
        let b = TrackId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn placeholder_uses_file_stem() {
        let meta = TrackMetadata::placeholder(Path::new("/music/03 - Interlude.flac"));
        assert_eq!(meta.title.as_deref(), Some("03 - Interlude"));
        assert!(meta.artist.is_none());
        assert!(meta.duration_ms.is_none());
    }

    #[test]
    fn repeat_mode_cycles() {
        assert_eq!(RepeatMode::Off.cycled(), RepeatMode::All);
        assert_eq!(RepeatMode::All.cycled(), RepeatMode::One);
        assert_eq!(RepeatMode::One.cycled(), RepeatMode::Off);
    }

    #[test]
    fn plr_from_replaygain_tags() {
        let meta = TrackMetadata {
            rg_track_gain_db: Some(-5.0),
            rg_track_peak: Some(1.0),
            ..TrackMetadata::default()
        };
        // loudness = -18 - (-5) = -13 LUFS, peak = 0 dB -> PLR = 13 dB
        let plr = meta.plr_db(REFERENCE_LOUDNESS_LUFS).unwrap();
        assert!((plr - 13.0).abs() < 1e-9);
    }

    #[test]
    fn plr_requires_both_tags() {
        let mut meta = TrackMetadata::default();
        assert!(meta.plr_db(REFERENCE_LOUDNESS_LUFS).is_none());
        meta.rg_track_gain_db = Some(-3.0);
        assert!(meta.plr_db(REFERENCE_LOUDNESS_LUFS).is_none());
        meta.rg_track_peak = Some(0.0);
        assert!(meta.plr_db(REFERENCE_LOUDNESS_LUFS).is_none());
    }

    #[test]
    fn session_round_trips_through_json() {
        let session = SavedSession {
            playlist_paths: vec![PathBuf::from("/music/a.flac"), PathBuf::from("/music/b.mp3")],
            selected_track_path: Some(PathBuf::from("/music/b.mp3")),
            current_track_path: Some(PathBuf::from("/music/a.flac")),
            current_track_position_sec: Some(42.5),
            repeat_mode: RepeatMode::All,
            shuffle_enabled: true,
            volume_percent: 85.0,
            music_root: Some(PathBuf::from("/music")),
        };
        let json = serde_json::to_string(&session).unwrap();
        let back: SavedSession = serde_json::from_str(&json).unwrap();
        assert_eq!(session, back);
    }
}
