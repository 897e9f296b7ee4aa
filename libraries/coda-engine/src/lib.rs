//! Coda Engine
//!
//! Controls one external media engine subprocess (an mpv-compatible
//! decode/render process) over its line-delimited JSON IPC socket.
//!
//! Layering:
//! - [`protocol`] - wire message types and per-line classification
//! - [`transport`] - subprocess lifecycle, socket connection, request-id
//!   correlation, out-of-band event demultiplexing
//! - [`facade`] - typed command surface with option-name fallback policy
//!
//! The transport never restarts the engine on its own; crash handling and
//! restart policy belong to the caller.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod facade;
pub mod protocol;
pub mod transport;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use facade::{CommandSink, EngineClient, EnginePatch, LoadMode};
pub use protocol::{EndReason, EngineEvent};
pub use transport::EngineTransport;
