//! Coda Metadata
//!
//! The asynchronous metadata pipeline: lofty-based tag extraction, a
//! fingerprint-validated cache with versioned JSON persistence, and the
//! two-priority deduplicated load queue that bounds extraction concurrency.

#![forbid(unsafe_code)]

pub mod cache;
pub mod error;
pub mod queue;
pub mod reader;
pub mod store;

pub use cache::MetadataCache;
pub use error::{MetadataError, Result};
pub use queue::{LoadQueue, LoadTicket, Priority};
pub use reader::{read_metadata, read_metadata_blocking};
pub use store::JsonCacheStore;
