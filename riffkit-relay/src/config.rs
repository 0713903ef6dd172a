//! Configuration for the relay pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::AudioFormat;
use crate::error::{RelayError, Result};

/// Highest sample rate the decoder is asked to produce.
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// How the resolver hands a reference to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResolveMode {
    /// Ask the resolver for a direct media URL and let the decoder fetch it.
    #[default]
    Direct,
    /// Run the resolver as a fetch stage piping bytes into the decoder.
    ///
    /// Avoids handing the decoder signed URLs that may expire mid-stream.
    Pipe,
}

impl std::str::FromStr for ResolveMode {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" | "url" => Ok(Self::Direct),
            "pipe" | "piped" => Ok(Self::Pipe),
            other => Err(RelayError::config(format!(
                "unknown resolve mode '{other}' (expected 'direct' or 'pipe')"
            ))),
        }
    }
}

impl std::fmt::Display for ResolveMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Pipe => write!(f, "pipe"),
        }
    }
}

/// Configuration for resolving, decoding and framing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Decoder executable (ffmpeg compatible).
    pub decoder_program: String,
    /// Value passed to the decoder's `-loglevel`.
    pub decoder_log_level: String,
    /// PCM format the decoder is asked to produce.
    pub format: AudioFormat,
    /// Resolver / fetcher executable (yt-dlp compatible).
    pub resolver_program: String,
    /// Format selector passed to the resolver with `-f`.
    pub resolver_format: String,
    /// Direct URL or piped fetch stage.
    pub resolve_mode: ResolveMode,
    /// Upper bound on one resolve call, in seconds.
    pub resolve_timeout_secs: u64,
    /// How long to wait for stage exit statuses after the decoder closes its output.
    pub exit_grace_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            decoder_program: "ffmpeg".to_string(),
            decoder_log_level: "quiet".to_string(),
            format: AudioFormat::pcm16_48khz_mono(),
            resolver_program: "yt-dlp".to_string(),
            resolver_format: "bestaudio".to_string(),
            resolve_mode: ResolveMode::Direct,
            resolve_timeout_secs: 30,
            exit_grace_ms: 2_000,
        }
    }
}

impl RelayConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the decoder executable.
    pub fn with_decoder_program(mut self, program: impl Into<String>) -> Self {
        self.decoder_program = program.into();
        self
    }

    /// Set the decoder log level.
    pub fn with_decoder_log_level(mut self, level: impl Into<String>) -> Self {
        self.decoder_log_level = level.into();
        self
    }

    /// Set the resolver executable.
    pub fn with_resolver_program(mut self, program: impl Into<String>) -> Self {
        self.resolver_program = program.into();
        self
    }

    /// Set the resolve mode.
    pub fn with_resolve_mode(mut self, mode: ResolveMode) -> Self {
        self.resolve_mode = mode;
        self
    }

    /// Set the resolve timeout.
    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Resolve timeout as a [`Duration`].
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    /// Exit grace period as a [`Duration`].
    pub fn exit_grace(&self) -> Duration {
        Duration::from_millis(self.exit_grace_ms)
    }

    /// Validate the config.
    pub fn validate(&self) -> Result<()> {
        if self.decoder_program.trim().is_empty() {
            return Err(RelayError::config("decoder_program cannot be empty"));
        }
        if self.resolver_program.trim().is_empty() {
            return Err(RelayError::config("resolver_program cannot be empty"));
        }
        if self.resolver_format.trim().is_empty() {
            return Err(RelayError::config("resolver_format cannot be empty"));
        }
        if !(1..=MAX_SAMPLE_RATE).contains(&self.format.sample_rate) {
            return Err(RelayError::config(format!(
                "sample_rate must be between 1 and {MAX_SAMPLE_RATE}, got {}",
                self.format.sample_rate
            )));
        }
        if !(1..=8).contains(&self.format.channels) {
            return Err(RelayError::config(format!(
                "channels must be between 1 and 8, got {}",
                self.format.channels
            )));
        }
        if !(1..=1000).contains(&self.format.frame_ms) {
            return Err(RelayError::config(format!(
                "frame_ms must be between 1 and 1000, got {}",
                self.format.frame_ms
            )));
        }
        if self.format.frame_bytes() == 0 {
            return Err(RelayError::config("frame duration is shorter than one sample"));
        }
        if self.resolve_timeout_secs == 0 {
            return Err(RelayError::config("resolve_timeout_secs must be greater than 0"));
        }
        Ok(())
    }
}
