//! Media resolution: turning user input into something the decoder can play.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{Instrument, debug};

use crate::config::{RelayConfig, ResolveMode};
use crate::error::{RelayError, Result};

/// An external program invocation with a fixed argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
    /// Executable name or path.
    pub program: String,
    /// Arguments, passed verbatim (no shell).
    pub args: Vec<String>,
}

impl StageCommand {
    /// Create a command with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub(crate) fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl std::fmt::Display for StageCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Where the decoder gets its compressed input from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackSource {
    /// A URL the decoder can open itself.
    Direct {
        /// Directly streamable media URL.
        url: String,
    },
    /// A fetch stage whose stdout is piped into the decoder's stdin.
    Piped {
        /// The fetch-and-emit program.
        fetch: StageCommand,
    },
}

impl PlaybackSource {
    /// Create a direct source.
    pub fn direct(url: impl Into<String>) -> Self {
        Self::Direct { url: url.into() }
    }

    /// Create a piped source.
    pub fn piped(fetch: StageCommand) -> Self {
        Self::Piped { fetch }
    }

    /// Human readable locator for logs and status snapshots.
    pub fn locator(&self) -> String {
        match self {
            Self::Direct { url } => url.clone(),
            Self::Piped { fetch } => format!("pipe: {fetch}"),
        }
    }
}

/// Resolves a user-supplied reference into a [`PlaybackSource`].
///
/// Failures are returned as [`RelayError::Resolution`] and never retried; the
/// user issuing another `!play` is the retry path.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Resolve `reference` into something playable.
    async fn resolve(&self, reference: &str) -> Result<PlaybackSource>;
}

/// Resolver backed by `yt-dlp`.
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    program: String,
    format: String,
    mode: ResolveMode,
    timeout: Duration,
}

impl YtDlpResolver {
    /// Build a resolver from the relay config.
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            program: config.resolver_program.clone(),
            format: config.resolver_format.clone(),
            mode: config.resolve_mode,
            timeout: config.resolve_timeout(),
        }
    }

    fn base_args(&self) -> Vec<String> {
        ["-f", self.format.as_str(), "--no-playlist", "--quiet", "--no-warnings"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// Arguments for asking the resolver for a direct URL.
    pub fn url_args(&self, reference: &str) -> Vec<String> {
        let mut args = self.base_args();
        args.push("--get-url".to_string());
        args.push("--".to_string());
        args.push(reference.to_string());
        args
    }

    /// The fetch stage used in [`ResolveMode::Pipe`].
    pub fn fetch_stage(&self, reference: &str) -> StageCommand {
        StageCommand::new(&self.program).args(self.base_args()).args(["-o", "-", "--", reference])
    }

    async fn resolve_url(&self, reference: &str) -> Result<PlaybackSource> {
        let mut command = Command::new(&self.program);
        command
            .args(self.url_args(reference))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RelayError::resolution(
                    reference,
                    format!("resolver '{}' is not installed", self.program),
                ));
            }
            Ok(Err(e)) => return Err(RelayError::resolution(reference, e.to_string())),
            Err(_) => {
                return Err(RelayError::resolution(
                    reference,
                    format!("resolver timed out after {}s", self.timeout.as_secs()),
                ));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = last_line(&stderr)
                .map(str::to_string)
                .unwrap_or_else(|| format!("resolver exited with {}", output.status));
            return Err(RelayError::resolution(reference, message));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match stdout.lines().map(str::trim).find(|line| !line.is_empty()) {
            Some(url) => {
                debug!(url.len = url.len(), "resolved direct media url");
                Ok(PlaybackSource::direct(url))
            }
            None => Err(RelayError::resolution(reference, "no playable audio stream found")),
        }
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve(&self, reference: &str) -> Result<PlaybackSource> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(RelayError::resolution(reference, "empty reference"));
        }

        match self.mode {
            ResolveMode::Direct => {
                self.resolve_url(reference)
                    .instrument(riffkit_telemetry::resolve_span(reference))
                    .await
            }
            ResolveMode::Pipe => Ok(PlaybackSource::piped(self.fetch_stage(reference))),
        }
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).filter(|line| !line.is_empty()).last()
}
