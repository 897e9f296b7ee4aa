/// Engine configuration
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the engine subprocess and its IPC channel
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Engine binary to spawn
    pub binary: PathBuf,

    /// Extra command-line arguments appended after the built-in ones
    pub extra_args: Vec<String>,

    /// Directory for the per-instance IPC socket (system temp dir when `None`)
    pub socket_dir: Option<PathBuf>,

    /// Connection attempts before giving up (the socket file appears
    /// asynchronously after process spawn)
    pub connect_attempts: u32,

    /// Fixed backoff between connection attempts
    pub connect_backoff: Duration,

    /// Per-command response timeout
    pub command_timeout: Duration,

    /// How long to wait for a graceful `quit` before killing the process
    pub quit_grace: Duration,

    /// Properties registered for change observation right after connecting
    pub observed_properties: Vec<String>,

    /// Candidate property names for the primary (tagged) replaygain preamp,
    /// tried in order
    pub preamp_properties: Vec<String>,

    /// Candidate property names for the fallback (untagged) replaygain
    /// preamp, tried in order
    pub fallback_preamp_properties: Vec<String>,

    /// Substrings of engine error messages that mark an "option unsupported
    /// on this engine build" class of failure. Matched case-insensitively.
    pub unsupported_option_markers: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("mpv"),
            extra_args: Vec::new(),
            socket_dir: None,
            connect_attempts: 40,
            connect_backoff: Duration::from_millis(100),
            command_timeout: Duration::from_secs(5),
            quit_grace: Duration::from_millis(500),
            observed_properties: [
                "pause",
                "time-pos",
                "duration",
                "volume",
                "audio-bitrate",
                "audio-codec-name",
                "file-format",
                "audio-params",
                "audio-out-params",
                "current-ao",
                "audio-device",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
            preamp_properties: vec![
                "replaygain-preamp".to_string(),
                "options/replaygain-preamp".to_string(),
            ],
            fallback_preamp_properties: vec![
                "replaygain-fallback".to_string(),
                "options/replaygain-fallback".to_string(),
            ],
            unsupported_option_markers: vec![
                "property not found".to_string(),
                "unknown property".to_string(),
                "option not found".to_string(),
                "unsupported option".to_string(),
            ],
        }
    }
}

impl EngineConfig {
    /// Built-in command line for a headless, idle-capable engine bound to
    /// the given IPC socket
    pub fn engine_args(&self, socket_path: &std::path::Path) -> Vec<String> {
        let mut args = vec![
            "--no-video".to_string(),
            "--no-terminal".to_string(),
            "--idle=yes".to_string(),
            "--volume-max=130".to_string(),
            format!("--input-ipc-server={}", socket_path.display()),
        ];
        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// Whether an engine error message marks an unsupported option
    pub fn is_unsupported_option(&self, message: &str) -> bool {
        let lower = message.to_lowercase();
        self.unsupported_option_markers
            .iter()
            .any(|marker| lower.contains(&marker.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_observes_eleven_properties() {
        let config = EngineConfig::default();
        assert_eq!(config.observed_properties.len(), 11);
        assert!(config.observed_properties.iter().any(|p| p == "pause"));
        assert!(config.observed_properties.iter().any(|p| p == "time-pos"));
    }

    #[test]
    fn unsupported_option_matching_is_case_insensitive() {
        let config = EngineConfig::default();
        assert!(config.is_unsupported_option("Property Not Found"));
        assert!(config.is_unsupported_option("error: unknown property 'x'"));
        assert!(!config.is_unsupported_option("file does not exist"));
    }

    #[test]
    fn engine_args_bind_the_socket() {
        let config = EngineConfig::default();
        let args = config.engine_args(std::path::Path::new("/tmp/e.sock"));
        assert!(args.contains(&"--input-ipc-server=/tmp/e.sock".to_string()));
        assert!(args.contains(&"--idle=yes".to_string()));
    }
}
