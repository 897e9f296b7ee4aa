/// Fingerprint-validated metadata cache
///
/// Keyed by absolute file path. An entry is valid while the file's
/// `(size, mtime)` fingerprint matches; entries with no fingerprint are
/// legacy entries treated as always valid until explicitly invalidated.
/// Never proactively evicted: acceptable for the scale of a personal
/// library.
use crate::error::Result;
use coda_core::fs::file_fingerprint;
use coda_core::{CacheDocument, CacheEntry, MetadataCacheStore, TrackMetadata, CACHE_DOCUMENT_VERSION};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Shared in-memory metadata cache
///
/// The load queue's per-track deduplication is the sole mechanism preventing
/// duplicate concurrent writes to the same key.
pub struct MetadataCache {
    entries: Mutex<HashMap<PathBuf, CacheEntry>>,
}

impl MetadataCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Build a cache from a previously persisted document. Documents with an
    /// unknown version are ignored wholesale.
    pub fn from_document(document: CacheDocument) -> Self {
        if document.version != CACHE_DOCUMENT_VERSION {
            warn!(
                version = document.version,
                "ignoring metadata cache with unknown version"
            );
            return Self::new();
        }
        Self {
            entries: Mutex::new(document.entries),
        }
    }

    /// Look up a still-valid entry for `path`.
    ///
    /// Validates the stored fingerprint against the file on disk; a missing
    /// stored fingerprint always hits, a failed stat or mismatch misses.
    pub fn lookup(&self, path: &Path) -> Option<TrackMetadata> {
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(path)?;
        match entry.fingerprint {
            None => Some(entry.metadata.clone()),
            Some(stored) => match file_fingerprint(path) {
                Ok(current) if current == stored => Some(entry.metadata.clone()),
                Ok(_) => {
                    debug!(path = %path.display(), "cache entry stale, fingerprint changed");
                    None
                }
                Err(_) => None,
            },
        }
    }

    /// Record freshly extracted metadata, stamping the file's current
    /// fingerprint. When the file cannot be stat'ed the entry is stored
    /// without a fingerprint.
    pub fn insert(&self, path: &Path, metadata: TrackMetadata) {
        let fingerprint = file_fingerprint(path).ok();
        self.entries.lock().unwrap().insert(
            path.to_path_buf(),
            CacheEntry {
                metadata,
                fingerprint,
            },
        );
    }

    /// Merge a persisted document into this cache. Existing entries win over
    /// document entries; documents with an unknown version are ignored.
    pub fn absorb(&self, document: CacheDocument) {
        if document.version != CACHE_DOCUMENT_VERSION {
            warn!(
                version = document.version,
                "ignoring metadata cache with unknown version"
            );
            return;
        }
        let mut entries = self.entries.lock().unwrap();
        for (path, entry) in document.entries {
            entries.entry(path).or_insert(entry);
        }
    }

    /// Drop the entry for `path`, if any
    pub fn invalidate(&self, path: &Path) {
        self.entries.lock().unwrap().remove(path);
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Snapshot the cache as a persistable document
    pub fn to_document(&self) -> CacheDocument {
        CacheDocument {
            version: CACHE_DOCUMENT_VERSION,
            saved_at: chrono::Utc::now(),
            entries: self.entries.lock().unwrap().clone(),
        }
    }

    /// Load a cache from the given store; an absent or unreadable document
    /// yields an empty cache.
    pub async fn load_from(store: &dyn MetadataCacheStore) -> Self {
        match store.load().await {
            Ok(Some(document)) => Self::from_document(document),
            Ok(None) => Self::new(),
            Err(err) => {
                warn!(%err, "could not load metadata cache, starting empty");
                Self::new()
            }
        }
    }

    /// Persist the cache through the given store
    pub async fn persist_to(&self, store: &dyn MetadataCacheStore) -> Result<()> {
        store.save(&self.to_document()).await?;
        Ok(())
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn meta(title: &str) -> TrackMetadata {
        TrackMetadata {
            title: Some(title.to_string()),
            ..TrackMetadata::default()
        }
    }

    #[test]
    fn insert_then_lookup_hits_while_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.flac");
        File::create(&path).unwrap().write_all(b"data").unwrap();

        let cache = MetadataCache::new();
        cache.insert(&path, meta("A"));
        assert_eq!(cache.lookup(&path).unwrap().title.as_deref(), Some("A"));
    }

    #[test]
    fn changed_file_misses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.flac");
        File::create(&path).unwrap().write_all(b"data").unwrap();

        let cache = MetadataCache::new();
        cache.insert(&path, meta("A"));

        // grow the file so the size component of the fingerprint changes
        File::options()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"more")
            .unwrap();
        assert!(cache.lookup(&path).is_none());
    }

    #[test]
    fn legacy_entry_without_fingerprint_always_hits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.flac");
        File::create(&path).unwrap().write_all(b"data").unwrap();

        let mut entries = HashMap::new();
        entries.insert(
            path.clone(),
            CacheEntry {
                metadata: meta("Legacy"),
                fingerprint: None,
            },
        );
        let cache = MetadataCache::from_document(CacheDocument {
            version: CACHE_DOCUMENT_VERSION,
            saved_at: chrono::Utc::now(),
            entries,
        });
        assert_eq!(
            cache.lookup(&path).unwrap().title.as_deref(),
            Some("Legacy")
        );

        cache.invalidate(&path);
        assert!(cache.lookup(&path).is_none());
    }

    #[test]
    fn unknown_document_version_is_ignored() {
        let document = CacheDocument {
            version: 999,
            saved_at: chrono::Utc::now(),
            entries: HashMap::new(),
        };
        let cache = MetadataCache::from_document(document);
        assert!(cache.is_empty());
    }

    #[test]
    fn missing_file_misses_for_fingerprinted_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.flac");
        File::create(&path).unwrap().write_all(b"data").unwrap();

        let cache = MetadataCache::new();
        cache.insert(&path, meta("A"));
        std::fs::remove_file(&path).unwrap();
        assert!(cache.lookup(&path).is_none());
    }
}
