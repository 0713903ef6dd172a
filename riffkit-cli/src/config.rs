use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use riffkit_relay::{RelayConfig, ResolveMode};

use crate::cli::RelayArgs;

pub const DEFAULT_ROOM: &str = "music-room";
pub const DEFAULT_IDENTITY: &str = "riffkit-bot";
pub const DEFAULT_DISPLAY_NAME: &str = "RiffKit";
pub const DEFAULT_CHAT_ROOM: &str = "console";

/// Server address and API key pair.
#[derive(Debug, Clone)]
pub struct LiveKitCredentials {
    pub url: String,
    pub api_key: String,
    pub api_secret: String,
}

impl LiveKitCredentials {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("{key} environment variable not set"))
        };
        Ok(Self {
            url: required("LIVEKIT_URL")?,
            api_key: required("LIVEKIT_API_KEY")?,
            api_secret: required("LIVEKIT_API_SECRET")?,
        })
    }
}

/// Bot settings from the environment, before any room is joined.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub room: String,
    pub identity: String,
    pub display_name: String,
    pub chat_room: String,
    pub relay: RelayConfig,
}

impl BotConfig {
    /// Read `RIFFKIT_*` variables. Call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut relay = RelayConfig::default();
        if let Some(program) = get("RIFFKIT_FFMPEG") {
            relay = relay.with_decoder_program(program);
        }
        if let Some(program) = get("RIFFKIT_YTDLP") {
            relay = relay.with_resolver_program(program);
        }
        if let Some(mode) = get("RIFFKIT_RESOLVE_MODE") {
            let mode: ResolveMode = mode.parse().context("RIFFKIT_RESOLVE_MODE")?;
            relay = relay.with_resolve_mode(mode);
        }
        if let Some(secs) = get("RIFFKIT_RESOLVE_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .with_context(|| format!("RIFFKIT_RESOLVE_TIMEOUT_SECS must be a number of seconds, got '{secs}'"))?;
            relay = relay.with_resolve_timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            room: get("RIFFKIT_ROOM").unwrap_or_else(|| DEFAULT_ROOM.to_string()),
            identity: get("RIFFKIT_IDENTITY").unwrap_or_else(|| DEFAULT_IDENTITY.to_string()),
            display_name: get("RIFFKIT_DISPLAY_NAME").unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string()),
            chat_room: get("RIFFKIT_CHAT_ROOM").unwrap_or_else(|| DEFAULT_CHAT_ROOM.to_string()),
            relay,
        })
    }

    /// Apply command-line flags on top of the environment.
    pub fn with_overrides(mut self, args: &RelayArgs) -> Result<Self> {
        if let Some(room) = &args.room {
            self.room = room.clone();
        }
        if let Some(program) = &args.ffmpeg {
            self.relay = self.relay.with_decoder_program(program);
        }
        if let Some(program) = &args.yt_dlp {
            self.relay = self.relay.with_resolver_program(program);
        }
        if let Some(mode) = args.resolve_mode {
            self.relay = self.relay.with_resolve_mode(mode);
        }
        if let Some(secs) = args.resolve_timeout {
            self.relay = self.relay.with_resolve_timeout(Duration::from_secs(secs));
        }
        self.relay.validate()?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BotConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.room, "music-room");
        assert_eq!(config.identity, "riffkit-bot");
        assert_eq!(config.display_name, "RiffKit");
        assert_eq!(config.chat_room, "console");
        assert_eq!(config.relay, RelayConfig::default());
    }

    #[test]
    fn test_env_values() {
        let config = BotConfig::from_lookup(lookup(&[
            ("RIFFKIT_ROOM", "lounge"),
            ("RIFFKIT_FFMPEG", "/opt/ffmpeg/bin/ffmpeg"),
            ("RIFFKIT_RESOLVE_MODE", "pipe"),
            ("RIFFKIT_RESOLVE_TIMEOUT_SECS", "12"),
        ]))
        .unwrap();
        assert_eq!(config.room, "lounge");
        assert_eq!(config.relay.decoder_program, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(config.relay.resolve_mode, ResolveMode::Pipe);
        assert_eq!(config.relay.resolve_timeout(), Duration::from_secs(12));
    }

    #[test]
    fn test_bad_env_values_are_errors() {
        assert!(BotConfig::from_lookup(lookup(&[("RIFFKIT_RESOLVE_MODE", "carrier-pigeon")])).is_err());
        assert!(BotConfig::from_lookup(lookup(&[("RIFFKIT_RESOLVE_TIMEOUT_SECS", "soon")])).is_err());
    }

    #[test]
    fn test_flags_override_env() {
        let args = RelayArgs {
            room: Some("jazz".into()),
            yt_dlp: Some("yt-dlp-nightly".into()),
            resolve_mode: Some(ResolveMode::Direct),
            ..Default::default()
        };
        let config = BotConfig::from_lookup(lookup(&[("RIFFKIT_ROOM", "lounge"), ("RIFFKIT_RESOLVE_MODE", "pipe")]))
            .unwrap()
            .with_overrides(&args)
            .unwrap();
        assert_eq!(config.room, "jazz");
        assert_eq!(config.relay.resolver_program, "yt-dlp-nightly");
        assert_eq!(config.relay.resolve_mode, ResolveMode::Direct);
    }

    #[test]
    fn test_credentials_required() {
        let err = LiveKitCredentials::from_lookup(lookup(&[("LIVEKIT_URL", "ws://localhost:7880")])).unwrap_err();
        assert!(err.to_string().contains("LIVEKIT_API_KEY"));

        let creds = LiveKitCredentials::from_lookup(lookup(&[
            ("LIVEKIT_URL", "ws://localhost:7880"),
            ("LIVEKIT_API_KEY", "devkey"),
            ("LIVEKIT_API_SECRET", "secret"),
        ]))
        .unwrap();
        assert_eq!(creds.url, "ws://localhost:7880");
    }
}
