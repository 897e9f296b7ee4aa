/// Typed command surface over the engine transport
///
/// The facade owns the option fallback policy: engine builds differ in which
/// option surface they expose, so settings like the replaygain preamps are
/// applied through a chain of candidate property names.
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::protocol::EngineEvent;
use crate::transport::EngineTransport;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Seam between the typed facade and the raw command channel
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Issue one command and await its correlated result
    async fn command(&self, args: &[Value]) -> Result<Value>;
}

#[async_trait]
impl CommandSink for EngineTransport {
    async fn command(&self, args: &[Value]) -> Result<Value> {
        self.send_command(args).await
    }
}

/// How `load` treats the engine's current media
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Replace whatever is loaded
    Replace,
    /// Append and start playing when idle
    Append,
}

impl LoadMode {
    fn as_wire_str(self) -> &'static str {
        match self {
            LoadMode::Replace => "replace",
            LoadMode::Append => "append-play",
        }
    }
}

/// Typed client over a [`CommandSink`]
pub struct EngineClient<S> {
    sink: Arc<S>,
    config: EngineConfig,
}

impl<S: CommandSink> EngineClient<S> {
    /// Wrap an existing sink
    pub fn new(sink: Arc<S>, config: EngineConfig) -> Self {
        Self { sink, config }
    }

    /// Load a file into the engine
    pub async fn load(&self, path: &Path, mode: LoadMode) -> Result<()> {
        self.sink
            .command(&[
                json!("loadfile"),
                json!(path.to_string_lossy()),
                json!(mode.as_wire_str()),
            ])
            .await?;
        Ok(())
    }

    /// Resume playback
    pub async fn play(&self) -> Result<()> {
        self.set_property("pause", json!(false)).await
    }

    /// Pause playback
    pub async fn pause(&self) -> Result<()> {
        self.set_property("pause", json!(true)).await
    }

    /// Flip the pause state
    pub async fn toggle_pause(&self) -> Result<()> {
        self.sink.command(&[json!("cycle"), json!("pause")]).await?;
        Ok(())
    }

    /// Seek relative to the current position, in seconds
    pub async fn seek_relative(&self, seconds: f64) -> Result<()> {
        self.sink
            .command(&[json!("seek"), json!(seconds), json!("relative")])
            .await?;
        Ok(())
    }

    /// Seek to an absolute position, in seconds
    pub async fn seek_absolute(&self, seconds: f64) -> Result<()> {
        self.sink
            .command(&[json!("seek"), json!(seconds), json!("absolute")])
            .await?;
        Ok(())
    }

    /// Set the output volume, clamped to 0-130 percent
    pub async fn set_volume(&self, percent: f64) -> Result<()> {
        let percent = percent.clamp(0.0, 130.0);
        self.set_property("volume", json!(percent)).await
    }

    /// Apply the replaygain preamp settings.
    ///
    /// The primary (tagged) preamp is strict: if every candidate option name
    /// is unsupported by this engine build, the error propagates. The
    /// fallback (untagged) preamp is applied non-strictly: total failure is
    /// tolerated silently.
    pub async fn set_replaygain(
        &self,
        tagged_preamp_db: f64,
        untagged_preamp_db: f64,
    ) -> Result<()> {
        let preamp = self.config.preamp_properties.clone();
        self.set_first_supported(&preamp, json!(tagged_preamp_db), true)
            .await?;

        let fallback = self.config.fallback_preamp_properties.clone();
        self.set_first_supported(&fallback, json!(untagged_preamp_db), false)
            .await?;
        Ok(())
    }

    /// Ask the engine to exit
    pub async fn quit(&self) -> Result<()> {
        self.sink.command(&[json!("quit")]).await?;
        Ok(())
    }

    async fn set_property(&self, name: &str, value: Value) -> Result<()> {
        self.sink
            .command(&[json!("set_property"), json!(name), value])
            .await?;
        Ok(())
    }

    /// Try each candidate property name in order. "Unsupported option"-class
    /// rejections fall through to the next candidate; any other error
    /// propagates immediately.
    async fn set_first_supported(
        &self,
        candidates: &[String],
        value: Value,
        strict: bool,
    ) -> Result<()> {
        for name in candidates {
            match self.set_property(name, value.clone()).await {
                Ok(()) => return Ok(()),
                Err(EngineError::Rejected(message))
                    if self.config.is_unsupported_option(&message) =>
                {
                    debug!(property = %name, "option missing on this engine build, trying next");
                }
                Err(other) => return Err(other),
            }
        }
        if strict {
            Err(EngineError::OptionUnsupported(candidates.join(", ")))
        } else {
            debug!("no fallback preamp option available on this engine build");
            Ok(())
        }
    }
}

impl EngineClient<EngineTransport> {
    /// Spawn and connect an engine, returning a typed client over it
    pub async fn start(config: EngineConfig) -> Result<Self> {
        let transport = Arc::new(EngineTransport::new(config.clone()));
        transport.start().await?;
        Ok(Self {
            sink: transport,
            config,
        })
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sink.subscribe()
    }

    /// Whether the engine connection is live
    pub fn is_connected(&self) -> bool {
        self.sink.is_connected()
    }

    /// Stop the engine process and tear down the connection
    pub async fn shutdown(&self) {
        self.sink.stop().await;
    }
}

/// Partial update of the typed playback readout, derived from one
/// `property-change` event.
///
/// Outer `Option` = "field present in this patch"; inner `Option` on
/// clearable fields = "value or cleared by the engine".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnginePatch {
    /// Pause flag
    pub pause: Option<bool>,
    /// Position in seconds
    pub time_pos: Option<f64>,
    /// Duration in seconds, `None` when the engine cleared it
    pub duration: Option<Option<f64>>,
    /// Volume percent
    pub volume: Option<f64>,
    /// Live bitrate in kbps
    pub bitrate_kbps: Option<Option<f64>>,
    /// Codec short name
    pub codec: Option<Option<String>>,
    /// Container/file format
    pub container_format: Option<Option<String>>,
    /// Decoded stream parameters
    pub audio_params_in: Option<Option<String>>,
    /// Output stream parameters
    pub audio_params_out: Option<Option<String>>,
    /// Output driver in use
    pub output_driver: Option<Option<String>>,
    /// Output device in use
    pub output_device: Option<Option<String>>,
}

impl EnginePatch {
    /// Whether the patch carries no field at all
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Translate one observed property change into a typed patch. Properties
/// this client does not track yield an empty patch.
pub fn patch_from_property(name: &str, value: &Value) -> EnginePatch {
    let mut patch = EnginePatch::default();
    match name {
        "pause" => patch.pause = value.as_bool(),
        "time-pos" => patch.time_pos = value.as_f64(),
        "duration" => patch.duration = Some(value.as_f64()),
        "volume" => patch.volume = value.as_f64(),
        // the engine reports bits per second
        "audio-bitrate" => patch.bitrate_kbps = Some(value.as_f64().map(|b| b / 1000.0)),
        "audio-codec-name" => patch.codec = Some(as_string(value)),
        "file-format" => patch.container_format = Some(as_string(value)),
        "audio-params" => patch.audio_params_in = Some(format_audio_params(value)),
        "audio-out-params" => patch.audio_params_out = Some(format_audio_params(value)),
        "current-ao" => patch.output_driver = Some(as_string(value)),
        "audio-device" => patch.output_device = Some(as_string(value)),
        _ => {}
    }
    patch
}

fn as_string(value: &Value) -> Option<String> {
    value.as_str().map(|s| s.to_string())
}

/// Render the engine's audio-params object ("samplerate", "channels",
/// "format" fields) as a short human-readable summary.
fn format_audio_params(value: &Value) -> Option<String> {
    let object = value.as_object()?;
    let mut parts = Vec::new();
    if let Some(rate) = object.get("samplerate").and_then(Value::as_f64) {
        parts.push(format!("{} Hz", rate as u64));
    }
    if let Some(channels) = object.get("channels").and_then(Value::as_str) {
        parts.push(channels.to_string());
    } else if let Some(count) = object.get("channel-count").and_then(Value::as_u64) {
        parts.push(format!("{count}ch"));
    }
    if let Some(format) = object.get("format").and_then(Value::as_str) {
        parts.push(format.to_string());
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}
