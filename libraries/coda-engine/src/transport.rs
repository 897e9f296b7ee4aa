/// Engine subprocess lifecycle and IPC transport
///
/// Owns one engine process and one client connection to its socket. Outbound
/// commands are correlated to responses by request id only; completion order
/// is not send order. Unsolicited messages are demultiplexed into
/// [`EngineEvent`]s and re-broadcast to subscribers.
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::protocol::{self, EngineEvent, Incoming};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixStream;
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, oneshot};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Per-process counter so concurrent instances never share a socket
static INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// State shared with the reader task
struct Shared {
    config: EngineConfig,
    next_request_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>,
    properties: Mutex<HashMap<String, Value>>,
    events: broadcast::Sender<EngineEvent>,
    phase: Mutex<Phase>,
}

/// Transport to one external engine instance
pub struct EngineTransport {
    shared: Arc<Shared>,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    child: tokio::sync::Mutex<Option<Child>>,
    socket_path: Mutex<Option<PathBuf>>,
}

impl EngineTransport {
    /// Create a transport that has not been started yet
    pub fn new(config: EngineConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                config,
                next_request_id: AtomicU64::new(1),
                pending: Mutex::new(HashMap::new()),
                properties: Mutex::new(HashMap::new()),
                events,
                phase: Mutex::new(Phase::Idle),
            }),
            writer: tokio::sync::Mutex::new(None),
            child: tokio::sync::Mutex::new(None),
            socket_path: Mutex::new(None),
        }
    }

    /// Spawn the engine process, connect to its socket with bounded retries,
    /// and register property observers.
    ///
    /// The socket file appears asynchronously after spawn, hence the retry
    /// loop. Calling `start` while already running is a no-op.
    pub async fn start(&self) -> Result<()> {
        {
            let phase = self.shared.phase.lock().unwrap();
            if *phase == Phase::Running || *phase == Phase::Stopping {
                return Ok(());
            }
        }

        let socket_path = self.unique_socket_path();
        let args = self.shared.config.engine_args(&socket_path);
        info!(binary = %self.shared.config.binary.display(), socket = %socket_path.display(), "spawning engine");

        let child = Command::new(&self.shared.config.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(EngineError::Spawn)?;

        *self.child.lock().await = Some(child);
        *self.socket_path.lock().unwrap() = Some(socket_path.clone());

        let stream = match self.connect_with_retries(&socket_path).await {
            Ok(stream) => stream,
            Err(err) => {
                self.stop().await;
                return Err(err);
            }
        };

        self.attach(stream).await;
        *self.shared.phase.lock().unwrap() = Phase::Running;

        self.register_observers().await;
        Ok(())
    }

    /// Send one command and await its correlated response.
    ///
    /// Fails immediately with [`EngineError::NotConnected`] when there is no
    /// live connection. Each command has its own fixed timeout; on timeout
    /// the pending entry is discarded (a late response is then dropped by the
    /// reader).
    pub async fn send_command(&self, command: &[Value]) -> Result<Value> {
        let request_id = self.shared.next_request_id.fetch_add(1, Ordering::Relaxed);
        let line = protocol::encode_request(command, request_id)
            .map_err(|e| EngineError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

        let (tx, rx) = oneshot::channel();
        {
            let mut writer = self.writer.lock().await;
            let Some(stream) = writer.as_mut() else {
                return Err(EngineError::NotConnected);
            };
            self.shared.pending.lock().unwrap().insert(request_id, tx);
            if let Err(err) = stream.write_all(line.as_bytes()).await {
                self.shared.pending.lock().unwrap().remove(&request_id);
                *writer = None;
                return Err(EngineError::Io(err));
            }
        }

        match timeout(self.shared.config.command_timeout, rx).await {
            Ok(Ok(result)) => result,
            // Sender dropped without a response: connection teardown
            Ok(Err(_)) => Err(EngineError::ProcessExited),
            Err(_) => {
                self.shared.pending.lock().unwrap().remove(&request_id);
                Err(EngineError::Timeout)
            }
        }
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.shared.events.subscribe()
    }

    /// Last observed value of a property, from the running property state
    pub fn property(&self, name: &str) -> Option<Value> {
        self.shared.properties.lock().unwrap().get(name).cloned()
    }

    /// Whether a connection is currently live
    pub fn is_connected(&self) -> bool {
        *self.shared.phase.lock().unwrap() == Phase::Running
    }

    /// Best-effort graceful shutdown: race a `quit` command against a short
    /// timer, then force-terminate the process, reject all pending commands,
    /// and remove the socket artifact.
    ///
    /// Idempotent and safe to call when never started.
    pub async fn stop(&self) {
        {
            let mut phase = self.shared.phase.lock().unwrap();
            if *phase == Phase::Stopping || *phase == Phase::Stopped {
                return;
            }
            *phase = Phase::Stopping;
        }

        let quit_args = [Value::String("quit".to_string())];
        let quit = self.send_command(&quit_args);
        if timeout(self.shared.config.quit_grace, quit).await.is_err() {
            debug!("engine did not acknowledge quit in time");
        }

        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }

        *self.writer.lock().await = None;
        reject_all_pending(&self.shared);

        if let Some(path) = self.socket_path.lock().unwrap().take() {
            let _ = std::fs::remove_file(path);
        }

        *self.shared.phase.lock().unwrap() = Phase::Stopped;
        info!("engine stopped");
    }

    /// Wire an established stream into the transport: store the write half,
    /// spawn the reader task over the read half.
    pub(crate) async fn attach(&self, stream: UnixStream) {
        let (read_half, write_half) = stream.into_split();
        *self.writer.lock().await = Some(write_half);

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => handle_line(&shared, &line),
                    Ok(None) => break,
                    Err(err) => {
                        debug!(%err, "engine socket read failed");
                        break;
                    }
                }
            }

            let stopping = {
                let phase = shared.phase.lock().unwrap();
                *phase == Phase::Stopping || *phase == Phase::Stopped
            };
            reject_all_pending(&shared);
            if !stopping {
                warn!("engine connection closed unexpectedly");
                let _ = shared.events.send(EngineEvent::Closed {
                    reason: "engine process exited or closed the socket".to_string(),
                });
            }
        });
    }

    async fn connect_with_retries(&self, path: &std::path::Path) -> Result<UnixStream> {
        let attempts = self.shared.config.connect_attempts.max(1);
        for attempt in 0..attempts {
            match UnixStream::connect(path).await {
                Ok(stream) => {
                    debug!(attempt, "connected to engine socket");
                    return Ok(stream);
                }
                Err(_) => sleep(self.shared.config.connect_backoff).await,
            }
        }
        Err(EngineError::Connect {
            path: path.to_path_buf(),
            attempts,
        })
    }

    /// Register change observation for the configured properties so the
    /// engine starts pushing `property-change` events. A property a given
    /// engine build does not know is skipped, not fatal.
    async fn register_observers(&self) {
        let properties = self.shared.config.observed_properties.clone();
        for (index, name) in properties.iter().enumerate() {
            let command = [
                Value::String("observe_property".to_string()),
                Value::from(index as u64 + 1),
                Value::String(name.clone()),
            ];
            if let Err(err) = self.send_command(&command).await {
                warn!(property = %name, %err, "could not observe engine property");
            }
        }
    }

    fn unique_socket_path(&self) -> PathBuf {
        let dir = self
            .shared
            .config
            .socket_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let counter = INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed);
        dir.join(format!(
            "coda-engine-{}-{}.sock",
            std::process::id(),
            counter
        ))
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.shared.pending.lock().unwrap().len()
    }
}

/// Dispatch one complete inbound line
fn handle_line(shared: &Shared, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    match protocol::classify_line(line) {
        Ok(Incoming::Response { request_id, result }) => {
            let sender = shared.pending.lock().unwrap().remove(&request_id);
            match sender {
                Some(tx) => {
                    let _ = tx.send(result.map_err(EngineError::Rejected));
                }
                None => debug!(request_id, "response for unknown or timed-out request"),
            }
        }
        Ok(Incoming::Event(event)) => {
            if let EngineEvent::PropertyChange { name, value } = &event {
                shared
                    .properties
                    .lock()
                    .unwrap()
                    .insert(name.clone(), value.clone());
            }
            let _ = shared.events.send(event);
        }
        Err(err) => debug!(%err, "dropping unparseable engine line"),
    }
}

/// Fail every in-flight command; used on teardown and connection loss
fn reject_all_pending(shared: &Shared) {
    let pending: Vec<_> = {
        let mut map = shared.pending.lock().unwrap();
        map.drain().collect()
    };
    for (_, tx) in pending {
        let _ = tx.send(Err(EngineError::ProcessExited));
    }
}
