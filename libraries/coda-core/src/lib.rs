//! Coda Core
//!
//! Shared domain types, collaborator contracts, and error handling for the
//! Coda playback core.
//!
//! This crate defines:
//! - **Domain Types**: `TrackId`, `TrackMetadata`, `FileFingerprint`,
//!   `RepeatMode`, `SavedSession`, and the persisted metadata-cache document
//! - **Collaborator Traits**: `SessionStore`, `MetadataCacheStore`
//! - **Filesystem Helpers**: audio file classification, recursive listing,
//!   fingerprinting
//! - **Error Handling**: unified `CoreError` and `Result` types

#![forbid(unsafe_code)]

pub mod error;
pub mod fs;
pub mod traits;
pub mod types;

pub use error::{CoreError, Result};
pub use traits::{MetadataCacheStore, SessionStore};
pub use types::{
    CacheDocument, CacheEntry, FileFingerprint, RepeatMode, SavedSession, TrackId, TrackMetadata,
    CACHE_DOCUMENT_VERSION,
};
