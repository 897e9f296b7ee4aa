/// Playback controller
///
/// `Player` is a single-owner event loop: all mutable state (playlist,
/// snapshots, status) lives inside the actor task. Commands arrive over a
/// channel through the cloneable [`PlayerHandle`]; engine events arrive over
/// the transport's broadcast; updates flow out as [`PlayerEvent`]s.
///
/// Between awaits the actor runs uninterrupted, so invariants checked before
/// a suspension point are re-validated after it where playlist state could
/// have changed concurrently (metadata task results in particular).
use crate::broadcast::Debouncer;
use crate::engine_seam::EngineControl;
use crate::events::PlayerEvent;
use crate::lyrics::{LyricsLine, LyricsSnapshot};
use crate::playlist::Playlist;
use crate::session::filter_restorable_paths;
use crate::types::{
    PlaybackSnapshot, PlaybackState, PlayerConfig, PlayerSettings, PlaylistSnapshot, SortColumn,
    StatusSnapshot,
};
use coda_core::fs::{is_audio_file, list_entries};
use coda_core::{
    MetadataCacheStore, RepeatMode, SavedSession, SessionStore, TrackId, TrackMetadata,
};
use coda_engine::{EndReason, EngineError, EngineEvent};
use coda_metadata::queue::TaskFn;
use coda_metadata::{LoadQueue, MetadataCache, Priority};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Capacity of the command channel
const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the outbound event broadcast
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Commands accepted by the controller
pub enum PlayerCommand {
    /// Toggle play/pause; with no current track, lazily starts the
    /// selection (or the first item)
    PlayPause,
    /// Start or resume playback (lazy start when idle)
    Play,
    /// Pause playback
    Pause,
    /// Load and play a specific track
    PlayTrack(TrackId),
    /// Stop: pause the engine, rewind to zero, clear the playback-level
    /// current track (the playlist current pointer is kept)
    Stop,
    /// Advance to the next track in the active order
    Next,
    /// Go back to the previous track in the active order
    Previous,
    /// Seek relative to the current position
    SeekRelative(f64),
    /// Seek to an absolute position
    SeekAbsolute(f64),
    /// Set the volume percent (0-130)
    SetVolume(f64),
    /// Set the repeat mode
    SetRepeatMode(RepeatMode),
    /// Cycle repeat off -> all -> one
    CycleRepeat,
    /// Set the shuffle flag
    SetShuffle(bool),
    /// Toggle the shuffle flag
    ToggleShuffle,

    /// Append (or insert) paths into the playlist
    AddPaths {
        /// Files to add
        paths: Vec<PathBuf>,
        /// Clamped insertion index; end when `None`
        index: Option<usize>,
    },
    /// Replace the playlist with the given paths
    ReplaceWithPaths {
        /// New playlist contents
        paths: Vec<PathBuf>,
        /// Start playing the first new track
        play: bool,
    },
    /// Remove tracks by id
    RemoveTracks(Vec<TrackId>),
    /// Relocate tracks to a target index
    MoveTracks {
        /// Tracks to move
        ids: Vec<TrackId>,
        /// Raw target index against the pre-move list
        target_index: usize,
    },
    /// Clear the playlist, stopping playback and resetting lyrics and cover
    /// art in the same observable transition
    Clear,
    /// Sort by a column (toggles direction on re-sort)
    Sort(SortColumn),
    /// Replace the selection
    Select {
        /// Primary selected track
        primary: Option<TrackId>,
        /// Ordered multi-selection
        ids: Vec<TrackId>,
    },

    /// Push pre-parsed lyrics lines for the current track
    SetLyrics(Vec<LyricsLine>),
    /// Push discovered cover art
    SetCoverArt(Option<PathBuf>),
    /// List a directory for the browser pane
    Browse(PathBuf),
    /// Update player settings (replaygain preamps, music root)
    UpdateSettings(PlayerSettings),
    /// Persist the session now
    SaveSession,

    /// Metadata task result; re-validated against the playlist before
    /// application
    ApplyMetadata {
        /// Track the extraction was started for
        track_id: TrackId,
        /// Path the extraction ran against
        path: PathBuf,
        /// Extracted metadata
        metadata: TrackMetadata,
    },
    /// Metadata task pre-validation: current path for a track id
    PathForTrack {
        /// Track to resolve
        track_id: TrackId,
        /// Reply channel
        reply: oneshot::Sender<Option<PathBuf>>,
    },

    /// Read the playback snapshot
    GetPlaybackSnapshot(oneshot::Sender<PlaybackSnapshot>),
    /// Read the playlist snapshot
    GetPlaylistSnapshot(oneshot::Sender<PlaylistSnapshot>),
    /// Read the status snapshot
    GetStatusSnapshot(oneshot::Sender<StatusSnapshot>),
    /// Read the lyrics snapshot
    GetLyricsSnapshot(oneshot::Sender<LyricsSnapshot>),

    /// Tear down: final session save, cache persist, engine stop
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable command surface over the controller
#[derive(Clone)]
pub struct PlayerHandle {
    commands: mpsc::Sender<PlayerCommand>,
    events: broadcast::Sender<PlayerEvent>,
    shutdown_requested: Arc<AtomicBool>,
    shutdown_done: watch::Receiver<bool>,
}

impl PlayerHandle {
    /// Subscribe to controller events
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    async fn send(&self, command: PlayerCommand) -> crate::Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| crate::PlayerError::ShutDown)
    }

    /// Toggle play/pause (lazy start when idle)
    pub async fn play_pause(&self) -> crate::Result<()> {
        self.send(PlayerCommand::PlayPause).await
    }

    /// Start or resume playback
    pub async fn play(&self) -> crate::Result<()> {
        self.send(PlayerCommand::Play).await
    }

    /// Pause playback
    pub async fn pause(&self) -> crate::Result<()> {
        self.send(PlayerCommand::Pause).await
    }

    /// Load and play a specific track
    pub async fn play_track(&self, id: TrackId) -> crate::Result<()> {
        self.send(PlayerCommand::PlayTrack(id)).await
    }

    /// Stop playback
    pub async fn stop(&self) -> crate::Result<()> {
        self.send(PlayerCommand::Stop).await
    }

    /// Advance to the next track
    pub async fn next(&self) -> crate::Result<()> {
        self.send(PlayerCommand::Next).await
    }

    /// Go back to the previous track
    pub async fn previous(&self) -> crate::Result<()> {
        self.send(PlayerCommand::Previous).await
    }

    /// Seek relative to the current position
    pub async fn seek_relative(&self, seconds: f64) -> crate::Result<()> {
        self.send(PlayerCommand::SeekRelative(seconds)).await
    }

    /// Seek to an absolute position
    pub async fn seek_absolute(&self, seconds: f64) -> crate::Result<()> {
        self.send(PlayerCommand::SeekAbsolute(seconds)).await
    }

    /// Set the volume percent
    pub async fn set_volume(&self, percent: f64) -> crate::Result<()> {
        self.send(PlayerCommand::SetVolume(percent)).await
    }

    /// Set the repeat mode
    pub async fn set_repeat_mode(&self, mode: RepeatMode) -> crate::Result<()> {
        self.send(PlayerCommand::SetRepeatMode(mode)).await
    }

    /// Cycle the repeat mode
    pub async fn cycle_repeat(&self) -> crate::Result<()> {
        self.send(PlayerCommand::CycleRepeat).await
    }

    /// Set the shuffle flag
    pub async fn set_shuffle(&self, enabled: bool) -> crate::Result<()> {
        self.send(PlayerCommand::SetShuffle(enabled)).await
    }

    /// Toggle the shuffle flag
    pub async fn toggle_shuffle(&self) -> crate::Result<()> {
        self.send(PlayerCommand::ToggleShuffle).await
    }

    /// Add paths to the playlist
    pub async fn add_paths(&self, paths: Vec<PathBuf>, index: Option<usize>) -> crate::Result<()> {
        self.send(PlayerCommand::AddPaths { paths, index }).await
    }

    /// Replace the playlist with the given paths
    pub async fn replace_with_paths(&self, paths: Vec<PathBuf>, play: bool) -> crate::Result<()> {
        self.send(PlayerCommand::ReplaceWithPaths { paths, play })
            .await
    }

    /// Remove tracks by id
    pub async fn remove_tracks(&self, ids: Vec<TrackId>) -> crate::Result<()> {
        self.send(PlayerCommand::RemoveTracks(ids)).await
    }

    /// Relocate tracks to a target index
    pub async fn move_tracks(&self, ids: Vec<TrackId>, target_index: usize) -> crate::Result<()> {
        self.send(PlayerCommand::MoveTracks { ids, target_index })
            .await
    }

    /// Clear the playlist
    pub async fn clear(&self) -> crate::Result<()> {
        self.send(PlayerCommand::Clear).await
    }

    /// Sort by a column
    pub async fn sort(&self, column: SortColumn) -> crate::Result<()> {
        self.send(PlayerCommand::Sort(column)).await
    }

    /// Replace the selection
    pub async fn select(&self, primary: Option<TrackId>, ids: Vec<TrackId>) -> crate::Result<()> {
        self.send(PlayerCommand::Select { primary, ids }).await
    }

    /// Push pre-parsed lyrics lines
    pub async fn set_lyrics(&self, lines: Vec<LyricsLine>) -> crate::Result<()> {
        self.send(PlayerCommand::SetLyrics(lines)).await
    }

    /// Push discovered cover art
    pub async fn set_cover_art(&self, path: Option<PathBuf>) -> crate::Result<()> {
        self.send(PlayerCommand::SetCoverArt(path)).await
    }

    /// List a directory for the browser pane
    pub async fn browse(&self, path: PathBuf) -> crate::Result<()> {
        self.send(PlayerCommand::Browse(path)).await
    }

    /// Update player settings
    pub async fn update_settings(&self, settings: PlayerSettings) -> crate::Result<()> {
        self.send(PlayerCommand::UpdateSettings(settings)).await
    }

    /// Persist the session now
    pub async fn save_session(&self) -> crate::Result<()> {
        self.send(PlayerCommand::SaveSession).await
    }

    /// Read the playback snapshot
    pub async fn playback_snapshot(&self) -> crate::Result<PlaybackSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(PlayerCommand::GetPlaybackSnapshot(tx)).await?;
        rx.await.map_err(|_| crate::PlayerError::ShutDown)
    }

    /// Read the playlist snapshot
    pub async fn playlist_snapshot(&self) -> crate::Result<PlaylistSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(PlayerCommand::GetPlaylistSnapshot(tx)).await?;
        rx.await.map_err(|_| crate::PlayerError::ShutDown)
    }

    /// Read the status snapshot
    pub async fn status_snapshot(&self) -> crate::Result<StatusSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(PlayerCommand::GetStatusSnapshot(tx)).await?;
        rx.await.map_err(|_| crate::PlayerError::ShutDown)
    }

    /// Read the lyrics snapshot
    pub async fn lyrics_snapshot(&self) -> crate::Result<LyricsSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(PlayerCommand::GetLyricsSnapshot(tx)).await?;
        rx.await.map_err(|_| crate::PlayerError::ShutDown)
    }

    /// Shut the player down: final best-effort session save, metadata cache
    /// persist, then engine stop. Idempotent under concurrent callers - the
    /// first caller drives the teardown, everyone else awaits the shared
    /// completion signal.
    pub async fn shutdown(&self) {
        if !self.shutdown_requested.swap(true, Ordering::SeqCst) {
            let (tx, rx) = oneshot::channel();
            if self.send(PlayerCommand::Shutdown(tx)).await.is_ok() {
                let _ = rx.await;
            }
        } else {
            let mut done = self.shutdown_done.clone();
            let _ = done.wait_for(|finished| *finished).await;
        }
    }
}

/// The controller actor
pub struct Player {
    config: PlayerConfig,
    engine: Option<Arc<dyn EngineControl>>,
    playlist: Playlist,
    playback: PlaybackSnapshot,
    status: StatusSnapshot,
    lyrics: LyricsSnapshot,
    settings: PlayerSettings,
    queue: Arc<LoadQueue>,
    cache: Arc<MetadataCache>,
    session_store: Arc<dyn SessionStore>,
    cache_store: Arc<dyn MetadataCacheStore>,
    events: broadcast::Sender<PlayerEvent>,
    playback_debounce: Debouncer,
    status_debounce: Debouncer,
    transient_expiry: Option<Instant>,
    shutdown_done: watch::Sender<bool>,
    shutting_down: bool,
}

impl Player {
    /// Spawn the controller task and return its handle.
    ///
    /// `engine` is `None` when the engine backend failed to start: the
    /// player stays usable in a degraded, playback-disabled mode.
    pub fn spawn(
        config: PlayerConfig,
        engine: Option<Arc<dyn EngineControl>>,
        session_store: Arc<dyn SessionStore>,
        cache_store: Arc<dyn MetadataCacheStore>,
    ) -> PlayerHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (done_tx, done_rx) = watch::channel(false);

        let cache = Arc::new(MetadataCache::new());
        let queue = Arc::new(LoadQueue::new(metadata_task_fn(
            command_tx.clone(),
            Arc::clone(&cache),
        )));

        let engine_events = engine.as_ref().map(|engine| engine.subscribe());
        let engine_available = engine.is_some();

        let player = Player {
            playback_debounce: Debouncer::new(
                config.broadcast_debounce,
                config.broadcast_max_window,
            ),
            status_debounce: Debouncer::new(config.broadcast_debounce, config.broadcast_max_window),
            config,
            engine,
            playlist: Playlist::new(),
            playback: PlaybackSnapshot::default(),
            status: StatusSnapshot {
                engine_available,
                ..StatusSnapshot::default()
            },
            lyrics: LyricsSnapshot::default(),
            settings: PlayerSettings::default(),
            queue,
            cache,
            session_store,
            cache_store,
            events: event_tx.clone(),
            transient_expiry: None,
            shutdown_done: done_tx,
            shutting_down: false,
        };
        tokio::spawn(player.run(command_rx, engine_events));

        PlayerHandle {
            commands: command_tx,
            events: event_tx,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
            shutdown_done: done_rx,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<PlayerCommand>,
        mut engine_events: Option<broadcast::Receiver<EngineEvent>>,
    ) {
        if let Ok(Some(document)) = self.cache_store.load().await {
            self.cache.absorb(document);
        }
        self.restore_session().await;

        let mut autosave = tokio::time::interval(self.config.autosave_interval);
        autosave.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        autosave.reset();

        loop {
            let wake_at = self.next_deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(PlayerCommand::Shutdown(reply)) => {
                        self.do_shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        // every handle dropped
                        self.do_shutdown().await;
                        break;
                    }
                },
                event = recv_engine_event(&mut engine_events) => match event {
                    Some(event) => self.handle_engine_event(event).await,
                    None => engine_events = None,
                },
                _ = autosave.tick() => self.save_session().await,
                _ = sleep_until_opt(wake_at) => self.flush_due(),
            }
        }
    }

    // === Command dispatch ===

    async fn handle_command(&mut self, command: PlayerCommand) {
        match command {
            PlayerCommand::PlayPause => self.play_pause().await,
            PlayerCommand::Play => {
                match self.playback.current_track_id {
                    Some(_) => self.engine_op(EngineOp::Play).await,
                    None => self.lazy_start().await,
                }
            }
            PlayerCommand::Pause => self.engine_op(EngineOp::Pause).await,
            PlayerCommand::PlayTrack(id) => self.play_track(id, true, None).await,
            PlayerCommand::Stop => self.stop_playback().await,
            PlayerCommand::Next => self.advance(true, false).await,
            PlayerCommand::Previous => self.advance(false, false).await,
            PlayerCommand::SeekRelative(seconds) => {
                self.engine_op(EngineOp::SeekRelative(seconds)).await;
            }
            PlayerCommand::SeekAbsolute(seconds) => {
                self.engine_op(EngineOp::SeekAbsolute(seconds)).await;
            }
            PlayerCommand::SetVolume(percent) => {
                let percent = percent.clamp(0.0, 130.0);
                self.playback.volume_percent = percent;
                self.engine_op(EngineOp::SetVolume(percent)).await;
                self.schedule_playback();
            }
            PlayerCommand::SetRepeatMode(mode) => self.set_repeat_mode(mode),
            PlayerCommand::CycleRepeat => self.set_repeat_mode(self.playback.repeat_mode.cycled()),
            PlayerCommand::SetShuffle(enabled) => self.set_shuffle(enabled),
            PlayerCommand::ToggleShuffle => self.set_shuffle(!self.playback.shuffle_enabled),

            PlayerCommand::AddPaths { paths, index } => self.add_paths(paths, index),
            PlayerCommand::ReplaceWithPaths { paths, play } => {
                self.replace_with_paths(paths, play).await;
            }
            PlayerCommand::RemoveTracks(ids) => self.remove_tracks(ids).await,
            PlayerCommand::MoveTracks { ids, target_index } => {
                if self.playlist.move_tracks(&ids, target_index) {
                    self.emit_playlist();
                }
            }
            PlayerCommand::Clear => self.clear().await,
            PlayerCommand::Sort(column) => {
                self.playlist.sort_by(column);
                self.emit_playlist();
            }
            PlayerCommand::Select { primary, ids } => {
                self.playlist.set_selection(primary, ids);
                self.emit_playlist();
            }

            PlayerCommand::SetLyrics(lines) => {
                self.lyrics.set_lines(lines);
                self.lyrics.update_position(self.playback.current_time_sec);
                self.emit(PlayerEvent::LyricsSnapshot(self.lyrics.clone()));
            }
            PlayerCommand::SetCoverArt(path) => {
                self.status.cover_art_path = path;
                self.emit(PlayerEvent::StatusSnapshot(self.status.clone()));
            }
            PlayerCommand::Browse(path) => self.browse(path),
            PlayerCommand::UpdateSettings(settings) => self.update_settings(settings).await,
            PlayerCommand::SaveSession => self.save_session().await,

            PlayerCommand::ApplyMetadata {
                track_id,
                path,
                metadata,
            } => self.apply_metadata(track_id, path, metadata),
            PlayerCommand::PathForTrack { track_id, reply } => {
                let _ = reply.send(self.playlist.path_of(track_id));
            }

            PlayerCommand::GetPlaybackSnapshot(reply) => {
                let _ = reply.send(self.playback.clone());
            }
            PlayerCommand::GetPlaylistSnapshot(reply) => {
                let _ = reply.send(self.playlist.snapshot());
            }
            PlayerCommand::GetStatusSnapshot(reply) => {
                let _ = reply.send(self.status.clone());
            }
            PlayerCommand::GetLyricsSnapshot(reply) => {
                let _ = reply.send(self.lyrics.clone());
            }

            // handled in the run loop
            PlayerCommand::Shutdown(_) => {}
        }
    }

    // === Playback ===

    async fn play_pause(&mut self) {
        match self.playback.current_track_id {
            None => self.lazy_start().await,
            Some(_) => match self.playback.state {
                PlaybackState::Playing => self.engine_op(EngineOp::Pause).await,
                PlaybackState::Paused | PlaybackState::Stopped => {
                    self.engine_op(EngineOp::Play).await;
                }
            },
        }
    }

    /// An idle player always has an implicit first target: the playlist
    /// selection, or the first item.
    async fn lazy_start(&mut self) {
        let target = self
            .playlist
            .selected_track_id()
            .or_else(|| self.playlist.first_track_id());
        match target {
            Some(id) => self.play_track(id, true, None).await,
            None => debug!("play requested on an empty playlist"),
        }
    }

    async fn play_track(&mut self, id: TrackId, autoplay: bool, resume_at: Option<f64>) {
        let Some(path) = self.playlist.path_of(id) else {
            self.set_transient("Track is no longer in the playlist".to_string());
            return;
        };

        self.playlist.set_current(Some(id));
        self.playlist.set_selection(Some(id), vec![id]);
        // never let the previous track's readout leak into this one
        self.playback.clear_runtime_readout();
        self.playback.current_track_id = Some(id);
        self.playback.duration_sec = None;
        self.playback.current_time_sec = resume_at.unwrap_or(0.0);
        self.lyrics.clear();
        self.emit_playlist();
        self.emit(PlayerEvent::LyricsSnapshot(self.lyrics.clone()));

        let Some(engine) = self.engine.clone() else {
            self.report_backend_error("Playback engine is not available".to_string());
            return;
        };

        // gain settings are track-independent but must be reapplied on
        // every load
        match engine
            .set_replaygain(
                self.settings.replaygain_preamp_db,
                self.settings.replaygain_fallback_db,
            )
            .await
        {
            Ok(()) | Err(EngineError::OptionUnsupported(_)) => {}
            Err(err) => {
                self.classify_engine_error(&err);
                return;
            }
        }

        // subscribe before loading so the confirmation cannot be missed
        let mut confirmations = engine.subscribe();
        if let Err(err) = engine.load(&path).await {
            self.classify_engine_error(&err);
            return;
        }

        // a load is fire-and-best-effort-confirm: proceed without the event
        // rather than failing the whole operation
        let confirmed = tokio::time::timeout(self.config.file_loaded_timeout, async {
            loop {
                match confirmations.recv().await {
                    Ok(EngineEvent::FileLoaded) => break true,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break false,
                }
            }
        })
        .await;
        if confirmed.is_err() {
            debug!(path = %path.display(), "no file-loaded confirmation, proceeding");
        }

        if let Some(position) = resume_at {
            // tolerated: the engine may reject seeks while nothing is loaded
            let _ = engine.seek_absolute(position).await;
        }

        let result = if autoplay {
            engine.play().await
        } else {
            engine.pause().await
        };
        match result {
            Ok(()) => {
                self.playback.state = if autoplay {
                    PlaybackState::Playing
                } else {
                    PlaybackState::Paused
                };
                self.note_success();
            }
            Err(err) => self.classify_engine_error(&err),
        }

        // jump the now-current track to the head of the metadata queue even
        // if it was already queued at normal priority
        let _ = self.queue.enqueue(id, path, Priority::High);
        self.schedule_playback();
    }

    /// Resolve and play the neighbor track. `from_eof` distinguishes the
    /// natural end-of-file advance from a manual skip for the user-visible
    /// message when nothing further exists.
    async fn advance(&mut self, forward: bool, from_eof: bool) {
        let target = if forward {
            self.playlist.next_track_id()
        } else {
            self.playlist.previous_track_id()
        };
        match target {
            Some(id) => self.play_track(id, true, None).await,
            None => {
                if let Some(engine) = self.engine.clone() {
                    let _ = engine.pause().await;
                }
                self.playback.state = PlaybackState::Paused;
                let text = if from_eof {
                    "End of playlist"
                } else if forward {
                    "No next track"
                } else {
                    "No previous track"
                };
                self.set_transient(text.to_string());
                self.schedule_playback();
            }
        }
    }

    /// Deliberate stop: pause, best-effort rewind, clear the playback-level
    /// current-track linkage. The playlist current pointer survives - stop
    /// differs from idle-after-remove.
    async fn stop_playback(&mut self) {
        if let Some(engine) = self.engine.clone() {
            if let Err(err) = engine.pause().await {
                self.classify_engine_error(&err);
            }
            // the engine may reject the seek when it considers nothing
            // loaded; that is not a failure
            if let Err(err) = engine.seek_absolute(0.0).await {
                if !matches!(err, EngineError::Rejected(_)) {
                    self.classify_engine_error(&err);
                }
            }
        }
        self.playback.state = PlaybackState::Stopped;
        self.playback.current_time_sec = 0.0;
        self.playback.current_track_id = None;
        self.schedule_playback();
    }

    fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.playlist.set_repeat_mode(mode);
        self.playback.repeat_mode = mode;
        self.schedule_playback();
    }

    fn set_shuffle(&mut self, enabled: bool) {
        self.playlist.set_shuffle(enabled);
        self.playback.shuffle_enabled = enabled;
        self.schedule_playback();
    }

    // === Playlist commands ===

    fn add_paths(&mut self, paths: Vec<PathBuf>, index: Option<usize>) {
        let requested = paths.len();
        let accepted: Vec<PathBuf> = paths.into_iter().filter(|p| is_audio_file(p)).collect();
        if accepted.is_empty() {
            if requested > 0 {
                self.set_transient("No supported audio files".to_string());
            }
            return;
        }
        let ids = self.playlist.add_paths(&accepted, index);
        self.enqueue_metadata_for(&ids);
        self.emit_playlist();
    }

    async fn replace_with_paths(&mut self, paths: Vec<PathBuf>, play: bool) {
        let accepted: Vec<PathBuf> = paths.into_iter().filter(|p| is_audio_file(p)).collect();
        let ids = self.playlist.replace_with_paths(&accepted);
        self.stop_playback().await;
        self.enqueue_metadata_for(&ids);
        self.emit_playlist();
        if play {
            if let Some(first) = ids.first() {
                self.play_track(*first, true, None).await;
            }
        }
    }

    async fn remove_tracks(&mut self, ids: Vec<TrackId>) {
        let outcome = self.playlist.remove_tracks(&ids);
        self.emit_playlist();
        if !outcome.removed_current {
            return;
        }
        match outcome.next_current {
            // the current track went away mid-session: move playback along
            Some(next) => self.play_track(next, true, None).await,
            None => {
                self.playback.state = PlaybackState::Stopped;
                self.playback.current_time_sec = 0.0;
                self.playback.current_track_id = None;
                self.schedule_playback();
            }
        }
    }

    /// Clear is one atomic observable transition: playlist-empty is never
    /// emitted alongside a stale playback/lyrics snapshot.
    async fn clear(&mut self) {
        self.playlist.clear();
        self.stop_playback().await;
        self.lyrics.clear();
        self.status.cover_art_path = None;
        self.playback.duration_sec = None;
        self.playback.clear_runtime_readout();
        self.emit_playlist();
        self.emit(PlayerEvent::LyricsSnapshot(self.lyrics.clone()));
        self.emit(PlayerEvent::StatusSnapshot(self.status.clone()));
        self.emit(PlayerEvent::PlaybackSnapshot(self.playback.clone()));
    }

    fn browse(&mut self, path: PathBuf) {
        match list_entries(&path) {
            Ok(entries) => self.emit(PlayerEvent::BrowserEntries { path, entries }),
            Err(err) => {
                self.set_transient(format!("Could not open {}: {err}", path.display()));
            }
        }
    }

    async fn update_settings(&mut self, settings: PlayerSettings) {
        self.settings = settings.clone();
        if let Some(engine) = self.engine.clone() {
            match engine
                .set_replaygain(
                    settings.replaygain_preamp_db,
                    settings.replaygain_fallback_db,
                )
                .await
            {
                Ok(()) => self.note_success(),
                Err(EngineError::OptionUnsupported(options)) => {
                    warn!(%options, "engine build does not support replaygain preamp");
                }
                Err(err) => self.classify_engine_error(&err),
            }
        }
        self.emit(PlayerEvent::SettingsUpdated(settings));
    }

    // === Metadata ===

    fn enqueue_metadata_for(&self, ids: &[TrackId]) {
        for (index, id) in ids.iter().enumerate() {
            let Some(path) = self.playlist.path_of(*id) else {
                continue;
            };
            let priority = if index < self.config.visible_high_count {
                Priority::High
            } else {
                Priority::Normal
            };
            let _ = self.queue.enqueue(*id, path, priority);
        }
    }

    /// Apply a metadata task result. The task pre-validated the id->path
    /// mapping before extracting, but the playlist may have mutated across
    /// that suspension point: re-validate here and discard stale results
    /// silently.
    fn apply_metadata(&mut self, track_id: TrackId, path: PathBuf, metadata: TrackMetadata) {
        if self.playlist.path_of(track_id).as_deref() != Some(path.as_path()) {
            debug!(%track_id, "discarding stale metadata result");
            return;
        }
        if self.playlist.update_metadata(track_id, metadata.clone()) {
            self.emit(PlayerEvent::TrackMetadataUpdated { track_id, metadata });
        }
    }

    // === Engine events ===

    async fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::PropertyChange { name, value } => {
                let patch = coda_engine::facade::patch_from_property(&name, &value);
                self.apply_patch(patch);
            }
            // consumed by the bounded wait inside play_track
            EngineEvent::FileLoaded => {}
            EngineEvent::EndFile { reason } => {
                // only a natural end advances; other reasons are
                // informational
                if reason == EndReason::Eof {
                    self.advance(true, true).await;
                }
            }
            EngineEvent::Closed { reason } => {
                if !self.shutting_down {
                    self.status.engine_available = false;
                    self.playback.state = PlaybackState::Stopped;
                    self.report_backend_error(format!("Engine connection lost: {reason}"));
                    self.schedule_playback();
                }
            }
        }
    }

    fn apply_patch(&mut self, patch: coda_engine::EnginePatch) {
        if patch.is_empty() {
            return;
        }
        if let Some(paused) = patch.pause {
            self.playback.state = match (self.playback.state, paused) {
                // an explicit stop is not overridden by the pause echo
                (PlaybackState::Stopped, true) => PlaybackState::Stopped,
                (_, true) => PlaybackState::Paused,
                (_, false) => PlaybackState::Playing,
            };
        }
        if let Some(position) = patch.time_pos {
            self.playback.current_time_sec = position;
            if self.lyrics.update_position(position) {
                self.emit(PlayerEvent::LyricsSnapshot(self.lyrics.clone()));
            }
        }
        if let Some(duration) = patch.duration {
            self.playback.duration_sec = duration;
        }
        if let Some(volume) = patch.volume {
            self.playback.volume_percent = volume;
        }
        if let Some(bitrate) = patch.bitrate_kbps {
            self.playback.bitrate_kbps = bitrate;
        }
        if let Some(codec) = patch.codec {
            self.playback.codec = codec;
        }
        if let Some(format) = patch.container_format {
            self.playback.container_format = format;
        }
        if let Some(params) = patch.audio_params_in {
            self.playback.audio_params_in = params;
        }
        if let Some(params) = patch.audio_params_out {
            self.playback.audio_params_out = params;
        }
        if let Some(driver) = patch.output_driver {
            self.playback.output_driver = driver;
        }
        if let Some(device) = patch.output_device {
            self.playback.output_device = device;
        }
        self.schedule_playback();
    }

    // === Engine op plumbing ===

    async fn engine_op(&mut self, op: EngineOp) {
        let Some(engine) = self.engine.clone() else {
            self.report_backend_error("Playback engine is not available".to_string());
            return;
        };
        let result = match op {
            EngineOp::Play => engine.play().await,
            EngineOp::Pause => engine.pause().await,
            EngineOp::SeekRelative(seconds) => engine.seek_relative(seconds).await,
            EngineOp::SeekAbsolute(seconds) => engine.seek_absolute(seconds).await,
            EngineOp::SetVolume(percent) => engine.set_volume(percent).await,
        };
        match result {
            Ok(()) => {
                match op {
                    EngineOp::Play => self.playback.state = PlaybackState::Playing,
                    EngineOp::Pause => {
                        if self.playback.state == PlaybackState::Playing {
                            self.playback.state = PlaybackState::Paused;
                        }
                    }
                    EngineOp::SeekAbsolute(seconds) => {
                        self.playback.current_time_sec = seconds.max(0.0);
                    }
                    EngineOp::SeekRelative(seconds) => {
                        self.playback.current_time_sec =
                            (self.playback.current_time_sec + seconds).max(0.0);
                    }
                    EngineOp::SetVolume(_) => {}
                }
                self.note_success();
                self.schedule_playback();
            }
            Err(err) => self.classify_engine_error(&err),
        }
    }

    // === Status / error surfacing ===

    /// One specific engine error class is a soft, user-visible transient
    /// status; every other error promotes to a persistent backend-error
    /// status until the next successful operation overwrites it.
    fn classify_engine_error(&mut self, err: &EngineError) {
        match err {
            EngineError::Rejected(reason) if self.config.is_benign_engine_error(reason) => {
                self.set_transient(reason.clone());
            }
            _ => self.report_backend_error(err.to_string()),
        }
    }

    fn report_backend_error(&mut self, message: String) {
        warn!(%message, "backend error");
        self.status.backend_error = Some(message.clone());
        self.emit(PlayerEvent::BackendError { message });
        self.schedule_status();
    }

    /// A successful operation implicitly clears a sticky backend error by
    /// state overwrite; there is no explicit "clear error" action.
    fn note_success(&mut self) {
        if self.status.backend_error.take().is_some() {
            self.schedule_status();
        }
    }

    fn set_transient(&mut self, text: String) {
        self.status.transient_message = Some(text.clone());
        self.transient_expiry = Some(Instant::now() + self.config.transient_status_duration);
        self.emit(PlayerEvent::StatusMessage { text });
        self.schedule_status();
    }

    // === Broadcast scheduling ===

    fn emit(&self, event: PlayerEvent) {
        let _ = self.events.send(event);
    }

    fn emit_playlist(&self) {
        self.emit(PlayerEvent::PlaylistSnapshot(self.playlist.snapshot()));
    }

    fn schedule_playback(&mut self) {
        self.playback_debounce.trigger(Instant::now());
    }

    fn schedule_status(&mut self) {
        self.status_debounce.trigger(Instant::now());
    }

    fn next_deadline(&self) -> Option<Instant> {
        [
            self.playback_debounce.deadline(),
            self.status_debounce.deadline(),
            self.transient_expiry,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    fn flush_due(&mut self) {
        let now = Instant::now();
        if let Some(expiry) = self.transient_expiry {
            if expiry <= now {
                self.transient_expiry = None;
                self.status.transient_message = None;
                self.status_debounce.trigger(now);
            }
        }
        if self.playback_debounce.take_if_due(now) {
            self.emit(PlayerEvent::PlaybackSnapshot(self.playback.clone()));
        }
        if self.status_debounce.take_if_due(now) {
            self.emit(PlayerEvent::StatusSnapshot(self.status.clone()));
        }
    }

    // === Session lifecycle ===

    async fn restore_session(&mut self) {
        let session = match self.session_store.load().await {
            Ok(Some(session)) => session,
            Ok(None) => return,
            Err(err) => {
                warn!(%err, "could not load saved session");
                return;
            }
        };
        info!(
            tracks = session.playlist_paths.len(),
            "restoring previous session"
        );

        self.settings.music_root = session.music_root.clone();
        self.playlist.set_repeat_mode(session.repeat_mode);
        self.playlist.set_shuffle(session.shuffle_enabled);
        self.playback.repeat_mode = session.repeat_mode;
        self.playback.shuffle_enabled = session.shuffle_enabled;
        self.playback.volume_percent = session.volume_percent.clamp(0.0, 130.0);
        if let Some(engine) = self.engine.clone() {
            let _ = engine.set_volume(self.playback.volume_percent).await;
        }

        let paths = filter_restorable_paths(&session.playlist_paths);
        if !paths.is_empty() {
            let ids = self.playlist.add_paths(&paths, None);
            if let Some(selected) = session
                .selected_track_path
                .as_deref()
                .and_then(|p| self.playlist.id_by_path(p))
            {
                self.playlist.set_selection(Some(selected), vec![selected]);
            }
            if let Some(current) = session
                .current_track_path
                .as_deref()
                .and_then(|p| self.playlist.id_by_path(p))
            {
                if self.engine.is_some() {
                    // paused at the saved position; never auto-play on
                    // restore
                    self.play_track(current, false, session.current_track_position_sec)
                        .await;
                } else {
                    self.playlist.set_current(Some(current));
                    self.playback.current_track_id = Some(current);
                }
            }
            self.enqueue_metadata_for(&ids);
        }

        self.emit_playlist();
        self.emit(PlayerEvent::SettingsUpdated(self.settings.clone()));
        self.schedule_playback();
    }

    fn session_state(&self) -> SavedSession {
        SavedSession {
            playlist_paths: self
                .playlist
                .items()
                .iter()
                .map(|item| item.path.clone())
                .collect(),
            selected_track_path: self
                .playlist
                .selected_track_id()
                .and_then(|id| self.playlist.path_of(id)),
            current_track_path: self
                .playlist
                .current_track_id()
                .and_then(|id| self.playlist.path_of(id)),
            current_track_position_sec: self
                .playlist
                .current_track_id()
                .map(|_| self.playback.current_time_sec),
            repeat_mode: self.playback.repeat_mode,
            shuffle_enabled: self.playback.shuffle_enabled,
            volume_percent: self.playback.volume_percent,
            music_root: self.settings.music_root.clone(),
        }
    }

    async fn save_session(&self) {
        if let Err(err) = self.session_store.save(&self.session_state()).await {
            warn!(%err, "session save failed");
        }
    }

    /// Final teardown: session save and cache persist are best-effort (a
    /// failed save must never block exit), then the engine is stopped.
    async fn do_shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        self.save_session().await;
        if let Err(err) = self.cache.persist_to(self.cache_store.as_ref()).await {
            warn!(%err, "metadata cache save failed");
        }
        self.queue.shutdown();
        if let Some(engine) = self.engine.clone() {
            engine.shutdown().await;
        }
        let _ = self.shutdown_done.send(true);
        info!("player shut down");
    }
}

/// Engine operations funneled through one result-classification point
#[derive(Debug, Clone, Copy)]
enum EngineOp {
    Play,
    Pause,
    SeekRelative(f64),
    SeekAbsolute(f64),
    SetVolume(f64),
}

/// The extraction task run by the load queue workers.
///
/// Validates the id->path mapping with the actor before extracting (the
/// playlist may have mutated while the task waited in a lane), consults the
/// shared cache, and hands the result back to the actor, which re-validates
/// once more before applying. Extraction failures are swallowed: a bad file
/// keeps its placeholder metadata and never blocks the rest of the playlist.
fn metadata_task_fn(commands: mpsc::Sender<PlayerCommand>, cache: Arc<MetadataCache>) -> TaskFn {
    Arc::new(move |track_id, path| {
        let commands = commands.clone();
        let cache = Arc::clone(&cache);
        Box::pin(async move {
            let (tx, rx) = oneshot::channel();
            if commands
                .send(PlayerCommand::PathForTrack {
                    track_id,
                    reply: tx,
                })
                .await
                .is_err()
            {
                return;
            }
            match rx.await {
                Ok(Some(current)) if current == path => {}
                _ => return,
            }

            let metadata = match cache.lookup(&path) {
                Some(hit) => hit,
                None => match coda_metadata::read_metadata(&path).await {
                    Ok(extracted) => {
                        cache.insert(&path, extracted.clone());
                        extracted
                    }
                    Err(err) => {
                        debug!(path = %path.display(), %err, "metadata extraction failed");
                        return;
                    }
                },
            };

            let _ = commands
                .send(PlayerCommand::ApplyMetadata {
                    track_id,
                    path,
                    metadata,
                })
                .await;
        })
    })
}

async fn recv_engine_event(
    events: &mut Option<broadcast::Receiver<EngineEvent>>,
) -> Option<EngineEvent> {
    match events {
        Some(receiver) => loop {
            match receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "dropped engine events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        },
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(instant) => tokio::time::sleep_until(instant).await,
        None => std::future::pending().await,
    }
}
