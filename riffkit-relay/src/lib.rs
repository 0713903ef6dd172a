//! # riffkit-relay
//!
//! Relays audio from a user-supplied media reference into a real-time media
//! room, controlled by chat commands.
//!
//! ## Architecture
//!
//! ```text
//!   "!play <ref>"                                          ┌──────────────┐
//!   ─────────────▶ SessionManager ─▶ MediaResolver ───────▶│PlaybackSource│
//!                        │                                 └──────┬───────┘
//!                        │                                        ▼
//!                        │           PipelineLauncher ─▶ [fetch] ─▶ decode
//!                        │                                        │ s16le PCM
//!                        ▼                                        ▼
//!                    Notifier ◀── notices         FramePacketizer (10 ms frames)
//!                                                                 │
//!                                                                 ▼
//!                                                            CaptureSink
//! ```
//!
//! Exactly one session may feed the sink at a time. A new `!play` supersedes
//! the running session, `!stop` ends it, and every session ends with at most
//! one terminal notice.
//!
//! ## Features
//!
//! - **livekit**: [`livekit::LiveKitSink`] delivering into a LiveKit room,
//!   access-token minting and track publication.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use riffkit_relay::{ChannelNotifier, DiscardSink, RelayConfig, SessionManager};
//!
//! let (notifier, mut notices) = ChannelNotifier::new();
//! let relay = SessionManager::builder()
//!     .config(RelayConfig::default())
//!     .sink(Arc::new(DiscardSink::new()))
//!     .notifier(notifier)
//!     .build()?
//!     .spawn();
//!
//! relay.dispatch("console", "!play https://youtu.be/dQw4w9WgXcQ").await?;
//! ```

pub mod audio;
pub mod command;
pub mod config;
pub mod error;
pub mod notify;
pub mod packetizer;
pub mod pipeline;
pub mod resolver;
pub mod session;
pub mod sink;

#[cfg(feature = "livekit")]
pub mod livekit;

// Re-exports
pub use audio::{AudioFormat, AudioFrame};
pub use command::{ChatCommand, PLAY_USAGE};
pub use config::{RelayConfig, ResolveMode};
pub use error::{RelayError, Result};
pub use notify::{ChannelNotifier, Notice, Notification, Notifier, RoomId};
pub use packetizer::{FramePacketizer, Packet};
pub use pipeline::{PipelineHandle, PipelineLauncher, PipelineStage, PipelineTerminator, ProcessLauncher};
pub use resolver::{MediaResolver, PlaybackSource, StageCommand, YtDlpResolver};
pub use session::{SessionId, SessionManager, SessionManagerBuilder, SessionManagerHandle, SessionSnapshot, SessionState};
pub use sink::{CaptureSink, DiscardSink};
