//! External process pipeline: optional fetch stage chained into a decoder.
//!
//! ```text
//!  ┌──────────────┐ stdout→stdin ┌──────────────┐ stdout  ┌──────────────┐
//!  │ fetch stage  │ ───────────▶ │ decode stage │ ──────▶ │  packetizer  │
//!  │  (optional)  │              │  s16le/48k/1 │         │              │
//!  └──────┬───────┘              └──────┬───────┘         └──────────────┘
//!         └────── stderr ───────────────┴──▶ diagnostics (per stage)
//! ```
//!
//! The chain is owned by a [`PipelineHandle`]. A [`PipelineTerminator`] can be
//! cloned out of it and kills every stage; that closes the decoder's stdout so
//! a pending read returns promptly.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStderr};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audio::AudioFormat;
use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::resolver::{PlaybackSource, StageCommand};

/// Name of the optional fetch stage.
pub const FETCH_STAGE: &str = "fetch";
/// Name of the decoder stage.
pub const DECODE_STAGE: &str = "decode";

/// Keep only the tail of a stage's stderr.
const MAX_DIAGNOSTIC_BYTES: usize = 4096;

/// Output stream of a pipeline.
pub type PcmReader = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// One named stage in a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStage {
    /// Stage name used in logs and errors.
    pub name: String,
    /// Program and arguments.
    pub command: StageCommand,
}

impl PipelineStage {
    /// Create a named stage.
    pub fn new(name: impl Into<String>, command: StageCommand) -> Self {
        Self { name: name.into(), command }
    }
}

struct RunningStage {
    name: String,
    exit: Option<JoinHandle<Option<ExitStatus>>>,
    diagnostics: Arc<Mutex<String>>,
    stderr_task: Option<JoinHandle<()>>,
}

struct StageSet {
    stages: Mutex<Vec<RunningStage>>,
    kill: CancellationToken,
}

/// Kills every process of a pipeline.
///
/// Cheap to clone; all clones refer to the same process chain.
#[derive(Clone)]
pub struct PipelineTerminator {
    inner: Arc<StageSet>,
}

impl PipelineTerminator {
    /// Kill every stage.
    ///
    /// Idempotent and safe to call while another task is blocked reading the
    /// pipeline output; that read returns once the decoder's stdout closes.
    pub fn terminate(&self) {
        self.inner.kill.cancel();
    }

    /// Whether [`terminate`](Self::terminate) has been called.
    pub fn is_terminated(&self) -> bool {
        self.inner.kill.is_cancelled()
    }
}

/// Owns a chain of processes and the output stream of the last one.
pub struct PipelineHandle {
    output: Option<PcmReader>,
    terminator: PipelineTerminator,
}

impl PipelineHandle {
    /// Spawn `stages` in order, wiring each stage's stdout into the next
    /// stage's stdin. The last stage's stdout becomes the pipeline output.
    ///
    /// If any stage fails to start, the stages already running are killed.
    pub fn spawn(stages: Vec<PipelineStage>) -> Result<Self> {
        if stages.is_empty() {
            return Err(RelayError::config("a pipeline needs at least one stage"));
        }

        let set = Arc::new(StageSet::default());
        let terminator = PipelineTerminator { inner: set.clone() };
        let mut upstream: Option<Stdio> = None;
        let mut output = None;
        let last = stages.len() - 1;

        for (index, stage) in stages.into_iter().enumerate() {
            let _span = riffkit_telemetry::pipeline_stage_span(&stage.name, &stage.command.program).entered();

            let mut command = stage.command.to_command();
            command
                .stdin(upstream.take().unwrap_or_else(Stdio::null))
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            let mut child = match command.spawn() {
                Ok(child) => child,
                Err(e) => {
                    terminator.terminate();
                    return Err(RelayError::spawn(&stage.name, &stage.command.program, e.to_string()));
                }
            };
            info!(pid = child.id(), "spawned pipeline stage");

            let stdout = child.stdout.take().ok_or_else(|| {
                RelayError::spawn(&stage.name, &stage.command.program, "stdout was not captured")
            });
            let stdout = match stdout {
                Ok(stdout) => stdout,
                Err(e) => {
                    set.stages.lock().push(RunningStage::new(stage, child, set.kill.clone()));
                    terminator.terminate();
                    return Err(e);
                }
            };

            if index == last {
                output = Some(Box::new(stdout) as PcmReader);
            } else {
                match stdout.try_into() {
                    Ok(stdio) => upstream = Some(stdio),
                    Err(e) => {
                        let program = stage.command.program.clone();
                        let name = stage.name.clone();
                        set.stages.lock().push(RunningStage::new(stage, child, set.kill.clone()));
                        terminator.terminate();
                        return Err(RelayError::spawn(name, program, format!("failed to wire stdout: {e}")));
                    }
                }
            }

            set.stages.lock().push(RunningStage::new(stage, child, set.kill.clone()));
        }

        Ok(Self { output, terminator })
    }

    /// Wrap an in-memory PCM stream; there are no processes to kill.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Sync + Unpin + 'static,
    {
        Self {
            output: Some(Box::new(reader)),
            terminator: PipelineTerminator { inner: Arc::new(StageSet::default()) },
        }
    }

    /// Take the PCM output stream. Returns `None` on the second call.
    pub fn take_output(&mut self) -> Option<PcmReader> {
        self.output.take()
    }

    /// A handle that can kill this pipeline from another task.
    pub fn terminator(&self) -> PipelineTerminator {
        self.terminator.clone()
    }

    /// Kill every stage.
    pub fn terminate(&self) {
        self.terminator.terminate();
    }

    /// Check how the stages ended after the output reached end-of-stream.
    ///
    /// Waits up to `grace` for the stages to exit and their stderr to drain.
    /// A stage that exited unsuccessfully *and* wrote diagnostics is reported
    /// as [`RelayError::Pipeline`]; the first such stage in chain order wins.
    /// A killed pipeline always finishes cleanly.
    pub async fn finish(&self, grace: Duration) -> Result<()> {
        if self.terminator.is_terminated() {
            return Ok(());
        }

        let pending: Vec<_> = {
            let mut stages = self.terminator.inner.stages.lock();
            stages
                .iter_mut()
                .map(|s| (s.name.clone(), s.exit.take(), s.stderr_task.take(), s.diagnostics.clone()))
                .collect()
        };

        let deadline = Instant::now() + grace;
        let mut exits = Vec::with_capacity(pending.len());
        for (name, exit, stderr_task, diagnostics) in pending {
            let status = match exit {
                Some(exit) => match timeout_at(deadline, exit).await {
                    Ok(Ok(status)) => status,
                    Ok(Err(e)) => {
                        warn!(stage = %name, error = %e, "stage wait task failed");
                        None
                    }
                    Err(_) => {
                        warn!(stage = %name, "stage still running after output closed");
                        None
                    }
                },
                None => None,
            };
            if let Some(reader) = stderr_task {
                if timeout_at(deadline, reader).await.is_err() {
                    debug!(stage = %name, "stderr reader did not finish within grace period");
                }
            }
            exits.push((name, status, diagnostics));
        }

        for (name, status, diagnostics) in exits {
            let Some(status) = status else { continue };
            if status.success() {
                continue;
            }
            let diagnostics = diagnostics.lock().trim().to_string();
            if diagnostics.is_empty() {
                warn!(stage = %name, %status, "stage exited unsuccessfully without diagnostics");
                continue;
            }
            return Err(RelayError::pipeline(name, status.to_string(), diagnostics));
        }
        Ok(())
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.terminator.terminate();
    }
}

impl Default for StageSet {
    fn default() -> Self {
        Self { stages: Mutex::new(Vec::new()), kill: CancellationToken::new() }
    }
}

impl RunningStage {
    fn new(stage: PipelineStage, mut child: Child, kill: CancellationToken) -> Self {
        let diagnostics = Arc::new(Mutex::new(String::new()));
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(collect_diagnostics(stderr, diagnostics.clone())));
        let exit = tokio::spawn(wait_for_exit(stage.name.clone(), stage.command.program, child, kill));
        Self { name: stage.name, exit: Some(exit), diagnostics, stderr_task }
    }
}

/// Reap `child`, killing it first if the pipeline is terminated.
async fn wait_for_exit(
    name: String,
    program: String,
    mut child: Child,
    kill: CancellationToken,
) -> Option<ExitStatus> {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill.cancelled() => {
            match child.start_kill() {
                Ok(()) => debug!(stage = %name, %program, "killed pipeline stage"),
                Err(e) => warn!(stage = %name, error = %e, "failed to kill pipeline stage"),
            }
            child.wait().await
        }
    };
    match status {
        Ok(status) => {
            debug!(stage = %name, %status, "pipeline stage exited");
            Some(status)
        }
        Err(e) => {
            warn!(stage = %name, error = %e, "failed to wait for pipeline stage");
            None
        }
    }
}

async fn collect_diagnostics(mut stderr: ChildStderr, sink: Arc<Mutex<String>>) {
    let mut buf = [0u8; 1024];
    loop {
        match stderr.read(&mut buf).await {
            Ok(0) => return,
            Ok(n) => {
                let text = String::from_utf8_lossy(&buf[..n]);
                let mut diagnostics = sink.lock();
                diagnostics.push_str(&text);
                if diagnostics.len() > MAX_DIAGNOSTIC_BYTES {
                    let mut cut = diagnostics.len() - MAX_DIAGNOSTIC_BYTES;
                    while !diagnostics.is_char_boundary(cut) {
                        cut += 1;
                    }
                    diagnostics.drain(..cut);
                }
            }
            Err(e) => {
                debug!(error = %e, "stderr read failed");
                return;
            }
        }
    }
}

/// Turns a [`PlaybackSource`] into a running [`PipelineHandle`].
pub trait PipelineLauncher: Send + Sync {
    /// Start the processes for `source`.
    fn launch(&self, source: &PlaybackSource) -> Result<PipelineHandle>;
}

/// Launches an ffmpeg-compatible decoder, optionally fed by a fetch stage.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    decoder_program: String,
    log_level: String,
    format: AudioFormat,
}

impl ProcessLauncher {
    /// Build a launcher from the relay config.
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            decoder_program: config.decoder_program.clone(),
            log_level: config.decoder_log_level.clone(),
            format: config.format,
        }
    }

    /// Decoder invocation reading from `input` (a URL or `pipe:0`) and writing
    /// headerless s16le PCM to stdout.
    pub fn decoder_stage(&self, input: &str) -> StageCommand {
        StageCommand::new(&self.decoder_program)
            .args(["-nostdin", "-hide_banner", "-loglevel", self.log_level.as_str()])
            .args(["-i", input])
            .args(["-vn", "-f", "s16le", "-acodec", "pcm_s16le"])
            .arg("-ar")
            .arg(self.format.sample_rate.to_string())
            .arg("-ac")
            .arg(self.format.channels.to_string())
            .arg("-")
    }

    /// The stages needed for `source`, in chain order.
    pub fn stages(&self, source: &PlaybackSource) -> Vec<PipelineStage> {
        match source {
            PlaybackSource::Direct { url } => {
                vec![PipelineStage::new(DECODE_STAGE, self.decoder_stage(url))]
            }
            PlaybackSource::Piped { fetch } => vec![
                PipelineStage::new(FETCH_STAGE, fetch.clone()),
                PipelineStage::new(DECODE_STAGE, self.decoder_stage("pipe:0")),
            ],
        }
    }
}

impl PipelineLauncher for ProcessLauncher {
    fn launch(&self, source: &PlaybackSource) -> Result<PipelineHandle> {
        PipelineHandle::spawn(self.stages(source))
    }
}
