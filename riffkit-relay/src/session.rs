//! The streaming session manager.
//!
//! Owns the current-session slot and guarantees that at most one session
//! feeds the capture sink at any time.
//!
//! ```text
//!   chat ──!play/!stop──▶ SessionManagerHandle ──mpsc──▶ command loop
//!                                                           │ slot mutation (sync)
//!                                                           ▼
//!                                               ┌──────────────────────┐
//!                                               │ slot: Option<Session>│◀── is_current(id)?
//!                                               └──────────────────────┘        ▲
//!                                                           │ tokio::spawn      │
//!                                                           ▼                   │
//!                          resolve ─▶ launch ─▶ loop { next_frame ─▶ deliver } ──┘
//! ```
//!
//! The session id stored in the slot is the only authority on whether a
//! session may still deliver frames or emit a terminal notice. Each session
//! re-checks it after every read, before and after every delivery, and before
//! its terminal transition. Delivery additionally holds the sink lock while
//! checking, so a superseded session can never slip a frame in after its
//! successor has started delivering.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};
use uuid::Uuid;

use crate::audio::AudioFormat;
use crate::command::ChatCommand;
use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::notify::{Notice, Notifier, RoomId};
use crate::packetizer::{FramePacketizer, Packet};
use crate::pipeline::{DECODE_STAGE, PipelineLauncher, PipelineTerminator, ProcessLauncher};
use crate::resolver::{MediaResolver, YtDlpResolver};
use crate::sink::CaptureSink;

const COMMAND_BUFFER: usize = 32;

/// Unique id of one relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the resolver.
    Resolving,
    /// Frames are flowing.
    Streaming,
    /// `!stop` is tearing it down.
    Stopping,
    /// Output reached end-of-stream; exit statuses are being checked.
    Ending,
    /// Replaced by a newer session.
    Superseded,
    /// Finished normally.
    Ended,
    /// Finished with an error.
    Failed,
}

/// Point-in-time view of the slot occupant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Session id.
    pub id: SessionId,
    /// Room the `!play` came from.
    pub room: String,
    /// Reference as typed by the user.
    pub reference: String,
    /// Resolved locator, once known.
    pub locator: Option<String>,
    /// Current state.
    pub state: SessionState,
}

struct ActiveSession {
    id: SessionId,
    room: RoomId,
    reference: String,
    locator: Option<String>,
    state: SessionState,
    terminator: Option<PipelineTerminator>,
    cancel: CancellationToken,
}

impl ActiveSession {
    /// Stop everything this session owns.
    fn shut_down(&mut self, state: SessionState) {
        self.state = state;
        self.cancel.cancel();
        if let Some(terminator) = self.terminator.take() {
            terminator.terminate();
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            room: self.room.to_string(),
            reference: self.reference.clone(),
            locator: self.locator.clone(),
            state: self.state,
        }
    }
}

struct Shared {
    slot: Mutex<Option<ActiveSession>>,
    resolver: Arc<dyn MediaResolver>,
    launcher: Arc<dyn PipelineLauncher>,
    sink: tokio::sync::Mutex<Arc<dyn CaptureSink>>,
    notifier: Arc<dyn Notifier>,
    format: AudioFormat,
    exit_grace: Duration,
}

impl Shared {
    fn is_current(&self, id: SessionId) -> bool {
        self.slot.lock().as_ref().is_some_and(|s| s.id == id)
    }

    /// Run `f` on the session if it still occupies the slot.
    fn with_current<T>(&self, id: SessionId, f: impl FnOnce(&mut ActiveSession) -> T) -> Option<T> {
        let mut slot = self.slot.lock();
        slot.as_mut().filter(|s| s.id == id).map(f)
    }

    /// Remove the session from the slot if it is still current.
    fn take_if_current(&self, id: SessionId) -> Option<ActiveSession> {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|s| s.id == id) { slot.take() } else { None }
    }

    async fn notify(&self, room: &RoomId, notice: Notice) {
        let text = notice.to_string();
        if let Err(e) = self.notifier.send_notification(room, &text).await {
            warn!(room.id = %room, error = %e, text = %text, "failed to send notification");
        }
    }
}

enum Command {
    Play { room: RoomId, reference: String, ack: oneshot::Sender<SessionId> },
    Stop { room: RoomId, ack: oneshot::Sender<bool> },
    Shutdown { ack: oneshot::Sender<()> },
}

/// Builder for [`SessionManager`].
#[derive(Default)]
pub struct SessionManagerBuilder {
    config: RelayConfig,
    resolver: Option<Arc<dyn MediaResolver>>,
    launcher: Option<Arc<dyn PipelineLauncher>>,
    sink: Option<Arc<dyn CaptureSink>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl SessionManagerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the relay configuration (format, programs, timeouts).
    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom resolver instead of yt-dlp.
    pub fn resolver(mut self, resolver: impl MediaResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Use a custom pipeline launcher instead of ffmpeg.
    pub fn launcher(mut self, launcher: impl PipelineLauncher + 'static) -> Self {
        self.launcher = Some(Arc::new(launcher));
        self
    }

    /// Set the capture sink.
    pub fn sink(mut self, sink: Arc<dyn CaptureSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Set the chat notifier.
    pub fn notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Some(Arc::new(notifier));
        self
    }

    /// Build the manager (does not start it yet).
    pub fn build(self) -> Result<SessionManager> {
        self.config.validate()?;
        let sink = self.sink.ok_or_else(|| RelayError::config("a capture sink is required"))?;
        let notifier = self.notifier.ok_or_else(|| RelayError::config("a notifier is required"))?;
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(YtDlpResolver::new(&self.config)));
        let launcher = self
            .launcher
            .unwrap_or_else(|| Arc::new(ProcessLauncher::new(&self.config)));

        Ok(SessionManager {
            shared: Arc::new(Shared {
                slot: Mutex::new(None),
                resolver,
                launcher,
                sink: tokio::sync::Mutex::new(sink),
                notifier,
                format: self.config.format,
                exit_grace: self.config.exit_grace(),
            }),
        })
    }
}

/// Orchestrates resolve → pipeline → packetize → deliver for one room.
///
/// # Example
///
/// ```rust,ignore
/// use riffkit_relay::{ChannelNotifier, DiscardSink, RelayConfig, RoomId, SessionManager};
///
/// let (notifier, mut notices) = ChannelNotifier::new();
/// let handle = SessionManager::builder()
///     .config(RelayConfig::default())
///     .sink(Arc::new(DiscardSink::new()))
///     .notifier(notifier)
///     .build()?
///     .spawn();
///
/// handle.play(RoomId::from("!music:example.org"), "https://youtu.be/dQw4w9WgXcQ").await?;
/// while let Some(n) = notices.recv().await {
///     println!("{}: {}", n.room, n.text);
/// }
/// ```
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    /// Create a new builder.
    pub fn builder() -> SessionManagerBuilder {
        SessionManagerBuilder::new()
    }

    /// Start the command loop on the current runtime.
    pub fn spawn(self) -> SessionManagerHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let shared = self.shared.clone();
        tokio::spawn(self.run(rx));
        SessionManagerHandle { tx, shared }
    }

    async fn run(self, mut rx: mpsc::Receiver<Command>) {
        info!("session manager started");
        while let Some(command) = rx.recv().await {
            match command {
                Command::Play { room, reference, ack } => {
                    let id = self.start(room, reference).await;
                    let _ = ack.send(id);
                }
                Command::Stop { room, ack } => {
                    let stopped = self.stop(&room).await;
                    let _ = ack.send(stopped);
                }
                Command::Shutdown { ack } => {
                    self.clear_silently();
                    let _ = ack.send(());
                    info!("session manager shut down");
                    return;
                }
            }
        }
        self.clear_silently();
        info!("session manager stopped: all handles dropped");
    }

    async fn start(&self, room: RoomId, reference: String) -> SessionId {
        let id = SessionId::new();
        let cancel = CancellationToken::new();
        let previous = self.shared.slot.lock().replace(ActiveSession {
            id,
            room: room.clone(),
            reference: reference.clone(),
            locator: None,
            state: SessionState::Resolving,
            terminator: None,
            cancel: cancel.clone(),
        });

        if let Some(mut previous) = previous {
            previous.shut_down(SessionState::Superseded);
            info!(session.id = %previous.id, by = %id, "session superseded");
        }

        info!(session.id = %id, room.id = %room, reference = %reference, "session starting");
        self.shared.notify(&room, Notice::Loading { reference: reference.clone() }).await;

        let span = riffkit_telemetry::session_span(&id.to_string(), room.as_str());
        let shared = self.shared.clone();
        tokio::spawn(run_session(shared, id, room, reference, cancel).instrument(span));
        id
    }

    async fn stop(&self, room: &RoomId) -> bool {
        let current = self.shared.slot.lock().take();
        match current {
            Some(mut session) => {
                session.shut_down(SessionState::Stopping);
                info!(session.id = %session.id, state = ?session.state, "session stopped");
                self.shared.notify(room, Notice::Stopped).await;
                true
            }
            None => {
                self.shared.notify(room, Notice::NothingPlaying).await;
                false
            }
        }
    }

    fn clear_silently(&self) {
        if let Some(mut session) = self.shared.slot.lock().take() {
            session.shut_down(SessionState::Stopping);
            debug!(session.id = %session.id, "session cleared on shutdown");
        }
    }
}

/// How a session's streaming loop ended.
enum Outcome {
    /// The stream ran out.
    Completed,
    /// Someone else owns the slot now; leave without a word.
    Displaced,
}

async fn run_session(
    shared: Arc<Shared>,
    id: SessionId,
    room: RoomId,
    reference: String,
    cancel: CancellationToken,
) {
    let result = stream_session(&shared, id, &reference, &cancel).await;

    let (state, notice) = match result {
        Ok(Outcome::Displaced) => {
            debug!("session displaced; exiting quietly");
            return;
        }
        Ok(Outcome::Completed) => (SessionState::Ended, Notice::Ended),
        Err(e) => {
            warn!(error = %e, "session failed");
            (SessionState::Failed, Notice::Error { detail: e.user_detail() })
        }
    };

    // Re-validate right before the terminal transition.
    match shared.take_if_current(id) {
        Some(mut session) => {
            session.shut_down(state);
            info!(state = ?session.state, "session finished");
            shared.notify(&room, notice).await;
        }
        None => debug!(?state, "session already left the slot; suppressing terminal notice"),
    }
}

async fn stream_session(
    shared: &Shared,
    id: SessionId,
    reference: &str,
    cancel: &CancellationToken,
) -> Result<Outcome> {
    let source = tokio::select! {
        _ = cancel.cancelled() => return Ok(Outcome::Displaced),
        source = shared.resolver.resolve(reference) => source?,
    };
    let locator = source.locator();
    debug!(locator = %locator, "reference resolved");

    let mut pipeline = shared.launcher.launch(&source)?;

    let installed = shared.with_current(id, |session| {
        session.state = SessionState::Streaming;
        session.locator = Some(locator);
        session.terminator = Some(pipeline.terminator());
    });
    if installed.is_none() {
        // Replaced while resolving: the new pipeline must not outlive us.
        pipeline.terminate();
        return Ok(Outcome::Displaced);
    }

    let output = pipeline
        .take_output()
        .ok_or_else(|| RelayError::spawn(DECODE_STAGE, "pipeline", "output stream already taken"))?;
    let mut packetizer = FramePacketizer::new(output, shared.format);

    loop {
        let packet = packetizer.next_frame().await;
        if !shared.is_current(id) {
            return Ok(Outcome::Displaced);
        }

        match packet? {
            Packet::Frame(frame) => {
                let sink = shared.sink.lock().await;
                if !shared.is_current(id) {
                    return Ok(Outcome::Displaced);
                }
                sink.deliver(&frame).await.map_err(|e| match e {
                    RelayError::Backpressure(_) => e,
                    other => RelayError::backpressure(other.to_string()),
                })?;
                drop(sink);

                if !shared.is_current(id) {
                    return Ok(Outcome::Displaced);
                }
            }
            Packet::EndOfStream => {
                shared.with_current(id, |session| session.state = SessionState::Ending);
                debug!(frames = packetizer.frames_read(), "decoder output exhausted");
                pipeline.finish(shared.exit_grace).await?;
                return Ok(Outcome::Completed);
            }
        }
    }
}

/// Cloneable handle for sending commands to a running [`SessionManager`].
#[derive(Clone)]
pub struct SessionManagerHandle {
    tx: mpsc::Sender<Command>,
    shared: Arc<Shared>,
}

impl SessionManagerHandle {
    /// Start relaying `reference`, superseding any current session.
    ///
    /// Returns once the new session owns the slot and any previous session's
    /// pipeline has been killed.
    pub async fn play(&self, room: impl Into<RoomId>, reference: impl Into<String>) -> Result<SessionId> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Play { room: room.into(), reference: reference.into(), ack }).await?;
        done.await.map_err(|_| RelayError::ManagerClosed)
    }

    /// Stop the current session. Returns `false` if nothing was playing.
    pub async fn stop(&self, room: impl Into<RoomId>) -> Result<bool> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Stop { room: room.into(), ack }).await?;
        done.await.map_err(|_| RelayError::ManagerClosed)
    }

    /// Parse a chat message and act on it.
    ///
    /// Returns `false` when the text is not a command.
    pub async fn dispatch(&self, room: impl Into<RoomId>, text: &str) -> Result<bool> {
        let room = room.into();
        match ChatCommand::parse(text) {
            Some(ChatCommand::Play(reference)) => {
                self.play(room, reference).await?;
            }
            Some(ChatCommand::Stop) => {
                self.stop(room).await?;
            }
            Some(ChatCommand::PlayUsage) => {
                self.shared.notify(&room, Notice::PlayUsage).await;
            }
            None => return Ok(false),
        }
        Ok(true)
    }

    /// The current slot occupant, if any.
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.shared.slot.lock().as_ref().map(ActiveSession::snapshot)
    }

    /// Stop any session without notifying and end the command loop.
    pub async fn shutdown(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Shutdown { ack }).await?;
        done.await.map_err(|_| RelayError::ManagerClosed)
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).await.map_err(|_| RelayError::ManagerClosed)
    }
}
