/// Lyrics display state
///
/// Lines arrive pre-parsed from the presentation layer's lyrics
/// collaborator; this module only tracks which line is active for the
/// current playback position.
use serde::{Deserialize, Serialize};

/// One timed lyrics line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricsLine {
    /// Timestamp of the line in seconds
    pub time_sec: f64,

    /// Line text
    pub text: String,
}

/// Lyrics lines plus the index of the line active at the current position
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LyricsSnapshot {
    /// Timed lines, ordered by timestamp
    pub lines: Vec<LyricsLine>,

    /// Index into `lines` of the active line, when any line has started
    pub active_line: Option<usize>,
}

impl LyricsSnapshot {
    /// Replace the lines (sorted by timestamp) and reset the active index
    pub fn set_lines(&mut self, mut lines: Vec<LyricsLine>) {
        lines.sort_by(|a, b| a.time_sec.total_cmp(&b.time_sec));
        self.lines = lines;
        self.active_line = None;
    }

    /// Drop all lines
    pub fn clear(&mut self) {
        self.lines.clear();
        self.active_line = None;
    }

    /// Recompute the active line for a playback position. Returns `true`
    /// when the active index changed.
    pub fn update_position(&mut self, position_sec: f64) -> bool {
        let active = self
            .lines
            .iter()
            .rposition(|line| line.time_sec <= position_sec);
        if active == self.active_line {
            false
        } else {
            self.active_line = active;
            true
        }
    }
}
