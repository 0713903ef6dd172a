//! Outbound chat notifications.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::command::PLAY_USAGE;
use crate::error::{RelayError, Result};

/// Identifies the chat room a command came from and notices go back to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomId(String);

impl RoomId {
    /// Create a room id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Status messages sent to chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A `!play` was accepted.
    Loading {
        /// Reference as typed by the user.
        reference: String,
    },
    /// The stream ran to completion.
    Ended,
    /// `!stop` ended a session.
    Stopped,
    /// `!stop` with nothing playing.
    NothingPlaying,
    /// `!play` without a reference.
    PlayUsage,
    /// A session failed.
    Error {
        /// User-facing error detail.
        detail: String,
    },
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loading { reference } => write!(f, "Loading: {reference}"),
            Self::Ended => write!(f, "Stream ended."),
            Self::Stopped => write!(f, "Stopped."),
            Self::NothingPlaying => write!(f, "Nothing is playing."),
            Self::PlayUsage => f.write_str(PLAY_USAGE),
            Self::Error { detail } => write!(f, "Error: {detail}"),
        }
    }
}

/// The chat side of the relay: the only thing the core ever asks of it is to
/// post text to a room.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Post `text` to `room`.
    async fn send_notification(&self, room: &RoomId, text: &str) -> Result<()>;
}

/// A notification as carried by [`ChannelNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Destination room.
    pub room: RoomId,
    /// Message text.
    pub text: String,
}

/// Forwards notifications into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send_notification(&self, room: &RoomId, text: &str) -> Result<()> {
        self.tx
            .send(Notification { room: room.clone(), text: text.to_string() })
            .map_err(|_| RelayError::notify("notification receiver dropped"))
    }
}
