/// JSON file store for the metadata cache document
use async_trait::async_trait;
use coda_core::{CacheDocument, CoreError, MetadataCacheStore};
use std::path::PathBuf;

/// Persists the cache document as one JSON file
pub struct JsonCacheStore {
    path: PathBuf,
}

impl JsonCacheStore {
    /// Create a store writing to `path`
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl MetadataCacheStore for JsonCacheStore {
    async fn load(&self) -> coda_core::Result<Option<CacheDocument>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let document = serde_json::from_slice(&bytes)?;
                Ok(Some(document))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(CoreError::Io(err)),
        }
    }

    async fn save(&self, document: &CacheDocument) -> coda_core::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(document)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}
