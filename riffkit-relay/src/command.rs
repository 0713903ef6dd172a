//! Chat command parsing.

/// Usage hint for a bare `!play`.
pub const PLAY_USAGE: &str = "Usage: !play <url>";

/// A chat message the relay reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// `!play <reference>`
    Play(String),
    /// `!play` without a reference.
    PlayUsage,
    /// `!stop`
    Stop,
}

impl ChatCommand {
    /// Parse a chat message; anything that is not a command yields `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed == "!stop" {
            return Some(Self::Stop);
        }
        if trimmed == "!play" {
            return Some(Self::PlayUsage);
        }
        let rest = trimmed.strip_prefix("!play")?;
        if !rest.starts_with(char::is_whitespace) {
            // `!playlist`, `!player` ...
            return None;
        }
        Some(Self::Play(rest.trim().to_string()))
    }
}
