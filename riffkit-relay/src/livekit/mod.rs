//! LiveKit room plumbing for `riffkit-relay`.
//!
//! Provides the production [`CaptureSink`](crate::CaptureSink) backed by a
//! LiveKit [`NativeAudioSource`], access-token minting, and the one-time
//! track publication. The subset of [`livekit`] and [`livekit_api`] types a
//! bot needs is re-exported so downstream crates only depend on
//! `riffkit-relay`.
//!
//! # Feature flag
//!
//! ```toml
//! [dependencies]
//! riffkit-relay = { version = "0.1", features = ["livekit"] }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use riffkit_relay::livekit::{LiveKitSink, Room, RoomOptions, TokenRequest, publish_audio_track};
//!
//! let token = TokenRequest::new("riffkit-bot", "music-room").with_name("RiffKit").mint(&key, &secret)?;
//! let (room, _events) = Room::connect(&url, &token, RoomOptions::default()).await?;
//!
//! let sink = LiveKitSink::new(AudioFormat::default());
//! publish_audio_track(&room, &sink, "music").await?;
//! ```

mod sink;
mod token;

pub use sink::{LiveKitSink, publish_audio_track};
pub use token::{TokenRequest, listener_url};

// ── Room and connection ─────────────────────────────────────────────────

pub use livekit::prelude::{ConnectionState, Room, RoomError, RoomEvent, RoomOptions};

// ── Tracks ──────────────────────────────────────────────────────────────

pub use livekit::options::TrackPublishOptions;
pub use livekit::prelude::{LocalAudioTrack, LocalTrack};

// ── Audio I/O ───────────────────────────────────────────────────────────

pub use livekit::webrtc::audio_source::{
    AudioSourceOptions, RtcAudioSource, native::NativeAudioSource,
};

// ── Authentication ──────────────────────────────────────────────────────

pub use livekit_api::access_token::{AccessToken, VideoGrants};
