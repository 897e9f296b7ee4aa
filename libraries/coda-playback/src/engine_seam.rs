/// Controller-side seam over the engine facade
///
/// The controller drives playback through this trait so scenario tests can
/// script the engine; production wires in `EngineClient<EngineTransport>`.
use async_trait::async_trait;
use coda_engine::{EngineClient, EngineEvent, EngineTransport, LoadMode};
use std::path::Path;
use tokio::sync::broadcast;

/// Typed engine operations the controller needs
#[async_trait]
pub trait EngineControl: Send + Sync {
    /// Load a file, replacing the current media
    async fn load(&self, path: &Path) -> coda_engine::Result<()>;

    /// Resume playback
    async fn play(&self) -> coda_engine::Result<()>;

    /// Pause playback
    async fn pause(&self) -> coda_engine::Result<()>;

    /// Seek relative to the current position
    async fn seek_relative(&self, seconds: f64) -> coda_engine::Result<()>;

    /// Seek to an absolute position
    async fn seek_absolute(&self, seconds: f64) -> coda_engine::Result<()>;

    /// Set the output volume percent
    async fn set_volume(&self, percent: f64) -> coda_engine::Result<()>;

    /// Apply replaygain preamps (strict primary, lenient fallback)
    async fn set_replaygain(&self, tagged_db: f64, untagged_db: f64) -> coda_engine::Result<()>;

    /// Subscribe to engine events
    fn subscribe(&self) -> broadcast::Receiver<EngineEvent>;

    /// Stop the engine process
    async fn shutdown(&self);
}

#[async_trait]
impl EngineControl for EngineClient<EngineTransport> {
    async fn load(&self, path: &Path) -> coda_engine::Result<()> {
        EngineClient::load(self, path, LoadMode::Replace).await
    }

    async fn play(&self) -> coda_engine::Result<()> {
        EngineClient::play(self).await
    }

    async fn pause(&self) -> coda_engine::Result<()> {
        EngineClient::pause(self).await
    }

    async fn seek_relative(&self, seconds: f64) -> coda_engine::Result<()> {
        EngineClient::seek_relative(self, seconds).await
    }

    async fn seek_absolute(&self, seconds: f64) -> coda_engine::Result<()> {
        EngineClient::seek_absolute(self, seconds).await
    }

    async fn set_volume(&self, percent: f64) -> coda_engine::Result<()> {
        EngineClient::set_volume(self, percent).await
    }

    async fn set_replaygain(&self, tagged_db: f64, untagged_db: f64) -> coda_engine::Result<()> {
        EngineClient::set_replaygain(self, tagged_db, untagged_db).await
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        EngineClient::subscribe(self)
    }

    async fn shutdown(&self) {
        EngineClient::shutdown(self).await;
    }
}
