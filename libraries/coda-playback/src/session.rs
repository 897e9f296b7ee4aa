/// Session persistence helpers
use async_trait::async_trait;
use coda_core::fs::is_audio_file;
use coda_core::{CoreError, SavedSession, SessionStore};
use std::path::{Path, PathBuf};

/// Keep only paths that still exist and are still a recognized audio type;
/// everything else is silently dropped during restore.
pub fn filter_restorable_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    paths
        .iter()
        .filter(|path| path.exists() && is_audio_file(path))
        .cloned()
        .collect()
}

/// Persists the session as one JSON file
pub struct JsonSessionStore {
    path: PathBuf,
}

impl JsonSessionStore {
    /// Create a store writing to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file this store writes to
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SessionStore for JsonSessionStore {
    async fn load(&self) -> coda_core::Result<Option<SavedSession>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let session = serde_json::from_slice(&bytes)?;
                Ok(Some(session))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(CoreError::Io(err)),
        }
    }

    async fn save(&self, session: &SavedSession) -> coda_core::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(session)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}
