//! End-to-end tests for the session manager.
//!
//! Pipelines are real `sh` subprocesses; the resolver, sink and notifier are
//! in-process fakes so the tests can observe every frame and notice.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use riffkit_relay::{
    AudioFrame, CaptureSink, ChannelNotifier, MediaResolver, Notification, PipelineHandle,
    PipelineLauncher, PipelineStage, PlaybackSource, RelayError, Result, SessionManager,
    SessionManagerHandle, SessionState, StageCommand,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;

const ROOM: &str = "!music:example.org";
const WAIT: Duration = Duration::from_secs(10);

/// Exactly three 10 ms frames of silence.
const THREE_FRAMES: &str = "exec head -c 2880 /dev/zero";
/// An endless stream of 0x0101 samples.
const ENDLESS: &str = "exec tr '\\000' '\\001' < /dev/zero";

fn endless(byte: u8) -> String {
    format!("exec tr '\\000' '\\{byte:03o}' < /dev/zero")
}

/// References are shell scripts; a few prefixes select special behavior.
struct ScriptResolver;

#[async_trait]
impl MediaResolver for ScriptResolver {
    async fn resolve(&self, reference: &str) -> Result<PlaybackSource> {
        if let Some(message) = reference.strip_prefix("fail:") {
            return Err(RelayError::resolution(reference, message));
        }
        if reference == "hang" {
            std::future::pending::<()>().await;
        }
        if let Some(script) = reference.strip_prefix("piped:") {
            return Ok(PlaybackSource::piped(StageCommand::new("sh").arg("-c").arg(script)));
        }
        if let Some(program) = reference.strip_prefix("missing:") {
            return Ok(PlaybackSource::piped(StageCommand::new(program)));
        }
        Ok(PlaybackSource::direct(reference))
    }
}

/// Runs direct "urls" as the decoder script; piped sources go through `cat`.
struct ShellLauncher;

impl PipelineLauncher for ShellLauncher {
    fn launch(&self, source: &PlaybackSource) -> Result<PipelineHandle> {
        let sh = |script: &str| StageCommand::new("sh").arg("-c").arg(script);
        let stages = match source {
            PlaybackSource::Direct { url } => vec![PipelineStage::new("decode", sh(url.as_str()))],
            PlaybackSource::Piped { fetch } => vec![
                PipelineStage::new("fetch", fetch.clone()),
                PipelineStage::new("decode", sh("exec cat")),
            ],
        };
        PipelineHandle::spawn(stages)
    }
}

/// Records the first sample of every delivered frame.
#[derive(Default)]
struct RecordingSink {
    markers: Mutex<Vec<i16>>,
    pace: Option<Duration>,
    fail_at: Option<usize>,
}

impl RecordingSink {
    fn paced() -> Self {
        Self { pace: Some(Duration::from_millis(1)), ..Default::default() }
    }

    fn len(&self) -> usize {
        self.markers.lock().len()
    }

    fn markers(&self) -> Vec<i16> {
        self.markers.lock().clone()
    }
}

#[async_trait]
impl CaptureSink for RecordingSink {
    async fn deliver(&self, frame: &AudioFrame) -> Result<()> {
        if let Some(pace) = self.pace {
            tokio::time::sleep(pace).await;
        }
        let mut markers = self.markers.lock();
        if self.fail_at == Some(markers.len()) {
            return Err(RelayError::backpressure("room queue closed"));
        }
        markers.push(frame.samples().first().copied().unwrap_or_default());
        Ok(())
    }
}

fn start(sink: Arc<RecordingSink>) -> (SessionManagerHandle, UnboundedReceiver<Notification>) {
    let (notifier, rx) = ChannelNotifier::new();
    let handle = SessionManager::builder()
        .resolver(ScriptResolver)
        .launcher(ShellLauncher)
        .sink(sink)
        .notifier(notifier)
        .build()
        .unwrap()
        .spawn();
    (handle, rx)
}

async fn next_text(rx: &mut UnboundedReceiver<Notification>) -> String {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a notification")
        .expect("notifier channel closed")
        .text
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let polled = tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "timed out waiting until {what}");
}

/// Nothing else arrives for a while.
async fn assert_quiet(rx: &mut UnboundedReceiver<Notification>) {
    tokio::time::sleep(Duration::from_millis(200)).await;
    match rx.try_recv() {
        Err(TryRecvError::Empty) => {}
        other => panic!("unexpected notification: {other:?}"),
    }
}

#[tokio::test]
async fn test_short_stream_plays_to_end() {
    let sink = Arc::new(RecordingSink::default());
    let (relay, mut rx) = start(sink.clone());

    relay.play(ROOM, THREE_FRAMES).await.unwrap();

    assert_eq!(next_text(&mut rx).await, format!("Loading: {THREE_FRAMES}"));
    assert_eq!(next_text(&mut rx).await, "Stream ended.");
    assert_eq!(sink.markers(), vec![0, 0, 0]);
    assert!(relay.snapshot().is_none());
    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn test_piped_source_runs_through_both_stages() {
    let sink = Arc::new(RecordingSink::default());
    let (relay, mut rx) = start(sink.clone());

    relay.play(ROOM, "piped:exec head -c 1920 /dev/zero").await.unwrap();

    assert!(next_text(&mut rx).await.starts_with("Loading: "));
    assert_eq!(next_text(&mut rx).await, "Stream ended.");
    assert_eq!(sink.len(), 2);
}

#[tokio::test]
async fn test_partial_tail_is_delivered() {
    let sink = Arc::new(RecordingSink::default());
    let (relay, mut rx) = start(sink.clone());

    // two full frames plus a 100-byte tail
    relay.play(ROOM, "exec head -c 2020 /dev/zero").await.unwrap();

    next_text(&mut rx).await;
    assert_eq!(next_text(&mut rx).await, "Stream ended.");
    assert_eq!(sink.len(), 3);
}

#[tokio::test]
async fn test_stop_when_idle_reports_nothing_playing() {
    let sink = Arc::new(RecordingSink::default());
    let (relay, mut rx) = start(sink);

    assert!(!relay.stop(ROOM).await.unwrap());
    assert!(!relay.stop(ROOM).await.unwrap());
    assert_eq!(next_text(&mut rx).await, "Nothing is playing.");
    assert_eq!(next_text(&mut rx).await, "Nothing is playing.");
}

#[tokio::test]
async fn test_stop_ends_stream_and_frames_cease() {
    let sink = Arc::new(RecordingSink::paced());
    let (relay, mut rx) = start(sink.clone());

    relay.play(ROOM, ENDLESS).await.unwrap();
    assert_eq!(next_text(&mut rx).await, format!("Loading: {ENDLESS}"));
    wait_until("frames flow", || sink.len() >= 3).await;

    assert!(relay.stop(ROOM).await.unwrap());
    assert_eq!(next_text(&mut rx).await, "Stopped.");
    assert!(relay.snapshot().is_none());

    // at most one in-flight frame may still land
    tokio::time::sleep(Duration::from_millis(50)).await;
    let settled = sink.len();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(sink.len(), settled);

    assert!(!relay.stop(ROOM).await.unwrap());
    assert_eq!(next_text(&mut rx).await, "Nothing is playing.");
    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn test_new_play_supersedes_without_interleaving() {
    let sink = Arc::new(RecordingSink::paced());
    let (relay, mut rx) = start(sink.clone());

    let first = relay.play(ROOM, ENDLESS).await.unwrap();
    wait_until("first stream delivers", || sink.len() >= 5).await;

    let second = relay.play(ROOM, THREE_FRAMES).await.unwrap();
    assert_ne!(first, second);

    assert_eq!(next_text(&mut rx).await, format!("Loading: {ENDLESS}"));
    assert_eq!(next_text(&mut rx).await, format!("Loading: {THREE_FRAMES}"));
    assert_eq!(next_text(&mut rx).await, "Stream ended.");
    assert_quiet(&mut rx).await;

    let markers = sink.markers();
    let switch = markers.iter().position(|&m| m == 0).expect("second stream delivered");
    assert!(markers[..switch].iter().all(|&m| m == 0x0101));
    assert_eq!(&markers[switch..], &[0, 0, 0]);
}

#[tokio::test]
async fn test_rapid_plays_deliver_in_session_order() {
    let sink = Arc::new(RecordingSink::paced());
    let (relay, mut rx) = start(sink.clone());

    let mut last = None;
    for byte in 1..=5u8 {
        last = Some(relay.play(ROOM, endless(byte)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let newest = i16::from_le_bytes([5, 5]);
    wait_until("newest session delivers", || sink.markers().contains(&newest)).await;
    assert_eq!(relay.snapshot().map(|s| s.id), last);

    assert!(relay.stop(ROOM).await.unwrap());
    for byte in 1..=5u8 {
        assert_eq!(next_text(&mut rx).await, format!("Loading: {}", endless(byte)));
    }
    assert_eq!(next_text(&mut rx).await, "Stopped.");
    assert_quiet(&mut rx).await;

    // once a session's frames appear, no earlier session's frames follow
    let markers = sink.markers();
    assert!(markers.windows(2).all(|w| w[0] <= w[1]), "interleaved frames: {markers:?}");
}

#[tokio::test]
async fn test_resolution_failure_then_recovery() {
    let sink = Arc::new(RecordingSink::default());
    let (relay, mut rx) = start(sink.clone());

    relay.play(ROOM, "fail:video unavailable").await.unwrap();
    assert_eq!(next_text(&mut rx).await, "Loading: fail:video unavailable");
    let error = next_text(&mut rx).await;
    assert!(error.starts_with("Error: "), "{error}");
    assert!(error.contains("video unavailable"), "{error}");
    assert!(relay.snapshot().is_none());
    assert_eq!(sink.len(), 0);

    relay.play(ROOM, THREE_FRAMES).await.unwrap();
    next_text(&mut rx).await;
    assert_eq!(next_text(&mut rx).await, "Stream ended.");
    assert_eq!(sink.len(), 3);
}

#[tokio::test]
async fn test_stop_while_resolving() {
    let sink = Arc::new(RecordingSink::default());
    let (relay, mut rx) = start(sink.clone());

    relay.play(ROOM, "hang").await.unwrap();
    let snapshot = relay.snapshot().expect("session installed");
    assert_eq!(snapshot.state, SessionState::Resolving);
    assert_eq!(snapshot.locator, None);

    assert!(relay.stop(ROOM).await.unwrap());
    assert_eq!(next_text(&mut rx).await, "Loading: hang");
    assert_eq!(next_text(&mut rx).await, "Stopped.");
    assert_quiet(&mut rx).await;
    assert_eq!(sink.len(), 0);
}

#[tokio::test]
async fn test_decoder_failure_with_diagnostics_is_reported() {
    let sink = Arc::new(RecordingSink::default());
    let (relay, mut rx) = start(sink);

    relay.play(ROOM, "echo 'Invalid data found when processing input' >&2; exit 1").await.unwrap();
    next_text(&mut rx).await;
    let error = next_text(&mut rx).await;
    assert!(error.starts_with("Error: decode exited with"), "{error}");
    assert!(error.contains("Invalid data found"), "{error}");
    assert!(relay.snapshot().is_none());
}

#[tokio::test]
async fn test_silent_decoder_failure_ends_normally() {
    let sink = Arc::new(RecordingSink::default());
    let (relay, mut rx) = start(sink);

    relay.play(ROOM, "exit 3").await.unwrap();
    next_text(&mut rx).await;
    assert_eq!(next_text(&mut rx).await, "Stream ended.");
}

#[tokio::test]
async fn test_missing_program_is_reported() {
    let sink = Arc::new(RecordingSink::default());
    let (relay, mut rx) = start(sink);

    relay.play(ROOM, "missing:definitely-not-installed-riffkit").await.unwrap();
    next_text(&mut rx).await;
    let error = next_text(&mut rx).await;
    assert!(error.starts_with("Error: Failed to start fetch"), "{error}");
    assert!(relay.snapshot().is_none());
}

#[tokio::test]
async fn test_sink_failure_ends_session() {
    let sink = Arc::new(RecordingSink { fail_at: Some(2), ..RecordingSink::paced() });
    let (relay, mut rx) = start(sink.clone());

    relay.play(ROOM, ENDLESS).await.unwrap();
    next_text(&mut rx).await;
    assert_eq!(next_text(&mut rx).await, "Error: streaming to the room failed");
    assert!(relay.snapshot().is_none());
    assert_eq!(sink.len(), 2);
    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn test_snapshot_while_streaming() {
    let sink = Arc::new(RecordingSink::paced());
    let (relay, _rx) = start(sink.clone());

    let id = relay.play(ROOM, ENDLESS).await.unwrap();
    wait_until("session streams", || {
        relay.snapshot().is_some_and(|s| s.state == SessionState::Streaming)
    })
    .await;

    let snapshot = relay.snapshot().unwrap();
    assert_eq!(snapshot.id, id);
    assert_eq!(snapshot.room, ROOM);
    assert_eq!(snapshot.reference, ENDLESS);
    assert_eq!(snapshot.locator.as_deref(), Some(ENDLESS));

    relay.shutdown().await.unwrap();
    assert!(relay.snapshot().is_none());
}

#[tokio::test]
async fn test_shutdown_is_silent() {
    let sink = Arc::new(RecordingSink::paced());
    let (relay, mut rx) = start(sink.clone());

    relay.play(ROOM, ENDLESS).await.unwrap();
    assert!(next_text(&mut rx).await.starts_with("Loading: "));
    wait_until("frames flow", || sink.len() >= 1).await;

    relay.shutdown().await.unwrap();
    assert!(relay.snapshot().is_none());
    assert_quiet(&mut rx).await;
    assert!(matches!(relay.play(ROOM, THREE_FRAMES).await, Err(RelayError::ManagerClosed)));
}

#[tokio::test]
async fn test_dispatch_parses_chat_messages() {
    let sink = Arc::new(RecordingSink::default());
    let (relay, mut rx) = start(sink.clone());

    assert!(!relay.dispatch(ROOM, "good morning").await.unwrap());
    assert!(relay.dispatch(ROOM, &format!("!play {THREE_FRAMES}")).await.unwrap());
    assert_eq!(next_text(&mut rx).await, format!("Loading: {THREE_FRAMES}"));
    assert_eq!(next_text(&mut rx).await, "Stream ended.");

    assert!(relay.dispatch(ROOM, "!play").await.unwrap());
    assert_eq!(next_text(&mut rx).await, "Usage: !play <url>");
}
