/// Collaborator contracts consumed by the playback core
use crate::error::Result;
use crate::types::{CacheDocument, SavedSession};
use async_trait::async_trait;

/// Durable store for session state
///
/// Implementers own the on-disk format; the core only relies on the
/// round-trip contract. Errors from `save` during shutdown are swallowed by
/// the caller, so implementations should not rely on save failures being
/// surfaced.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the previously saved session, if one exists
    async fn load(&self) -> Result<Option<SavedSession>>;

    /// Persist the session
    async fn save(&self, session: &SavedSession) -> Result<()>;
}

/// Durable store for the metadata cache document
#[async_trait]
pub trait MetadataCacheStore: Send + Sync {
    /// Load the previously saved cache document, if one exists
    async fn load(&self) -> Result<Option<CacheDocument>>;

    /// Persist the cache document
    async fn save(&self, document: &CacheDocument) -> Result<()>;
}
