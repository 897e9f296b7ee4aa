/// Filesystem helpers: audio file classification, listing, fingerprinting
use crate::error::Result;
use crate::types::FileFingerprint;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// File extensions recognized as supported audio files
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "opus", "wav", "m4a", "aac", "aiff", "wv", "ape",
];

/// Check if a path looks like a supported audio file (by extension)
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_lowercase();
            AUDIO_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

/// Compute the `(size, mtime)` fingerprint of a file
pub fn file_fingerprint(path: &Path) -> Result<FileFingerprint> {
    let meta = std::fs::metadata(path)?;
    let mtime_ms = match meta.modified()?.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    };
    Ok(FileFingerprint {
        size_bytes: meta.len(),
        mtime_ms,
    })
}

/// Recursively collect all supported audio files under `root`, sorted by path
pub fn collect_audio_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if root.is_file() {
        if is_audio_file(root) {
            files.push(root.to_path_buf());
        }
        return Ok(files);
    }

    for entry in walkdir::WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.is_file() && is_audio_file(path) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

/// One entry of a browsed directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserEntry {
    /// Display name (final path component)
    pub name: String,

    /// Full path
    pub path: PathBuf,

    /// Whether the entry is a directory
    pub is_dir: bool,
}

/// List one directory level: subdirectories first, then supported audio
/// files, each group sorted case-insensitively by name. Hidden entries are
/// skipped.
pub fn list_entries(dir: &Path) -> Result<Vec<BrowserEntry>> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };
        if name.starts_with('.') {
            continue;
        }
        let is_dir = entry.file_type()?.is_dir();
        if is_dir {
            dirs.push(BrowserEntry { name, path, is_dir });
        } else if is_audio_file(&path) {
            files.push(BrowserEntry { name, path, is_dir });
        }
    }

    dirs.sort_by_key(|e| e.name.to_lowercase());
    files.sort_by_key(|e| e.name.to_lowercase());
    dirs.extend(files);
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn classifies_by_extension_case_insensitively() {
        assert!(is_audio_file(Path::new("/music/track.FLAC")));
        assert!(is_audio_file(Path::new("/music/track.mp3")));
        assert!(!is_audio_file(Path::new("/music/cover.jpg")));
        assert!(!is_audio_file(Path::new("/music/noext")));
    }

    #[test]
    fn fingerprint_reflects_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mp3");
        File::create(&path).unwrap().write_all(b"abcd").unwrap();

        let fp = file_fingerprint(&path).unwrap();
        assert_eq!(fp.size_bytes, 4);
        assert!(fp.mtime_ms > 0);
    }

    #[test]
    fn collects_audio_files_recursively_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        File::create(dir.path().join("b.mp3")).unwrap();
        File::create(dir.path().join("sub/a.flac")).unwrap();
        File::create(dir.path().join("notes.txt")).unwrap();

        let files = collect_audio_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("b.mp3") || files[0].ends_with("sub/a.flac"));
        let mut sorted = files.clone();
        sorted.sort();
        assert_eq!(files, sorted);
    }

    #[test]
    fn lists_dirs_before_files_and_skips_hidden() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("zalbum")).unwrap();
        File::create(dir.path().join("a.mp3")).unwrap();
        File::create(dir.path().join(".hidden.mp3")).unwrap();
        File::create(dir.path().join("readme.txt")).unwrap();

        let entries = list_entries(dir.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_dir);
        assert_eq!(entries[0].name, "zalbum");
        assert_eq!(entries[1].name, "a.mp3");
    }
}
