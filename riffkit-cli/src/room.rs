//! LiveKit room connection.

use anyhow::{Context, Result};
use riffkit_relay::livekit::{
    LiveKitSink, Room, RoomEvent, RoomOptions, TokenRequest, listener_url, publish_audio_track,
};
use tracing::{info, warn};

use crate::config::{BotConfig, LiveKitCredentials};

/// Name of the published music track.
const TRACK_NAME: &str = "music";

/// Join the configured room as the bot and publish its audio track.
pub async fn join(creds: &LiveKitCredentials, config: &BotConfig) -> Result<(Room, LiveKitSink)> {
    let token = TokenRequest::new(&config.identity, &config.room)
        .with_name(&config.display_name)
        .mint(&creds.api_key, &creds.api_secret)?;

    let (room, mut events) = Room::connect(&creds.url, &token, RoomOptions::default())
        .await
        .with_context(|| format!("failed to connect to LiveKit at {}", creds.url))?;
    info!(room = %room.name(), identity = %config.identity, "joined LiveKit room");

    let sink = LiveKitSink::new(config.relay.format);
    publish_audio_track(&room, &sink, TRACK_NAME).await?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                RoomEvent::ParticipantConnected(participant) => {
                    info!(identity = ?participant.identity(), "listener joined");
                }
                RoomEvent::ParticipantDisconnected(participant) => {
                    info!(identity = ?participant.identity(), "listener left");
                }
                RoomEvent::Disconnected { reason } => {
                    warn!(?reason, "disconnected from LiveKit room");
                    break;
                }
                _ => {}
            }
        }
    });

    Ok((room, sink))
}

/// Mint a listener token and build the browser join link.
pub fn listener_link(creds: &LiveKitCredentials, room: &str, identity: &str, name: &str) -> Result<String> {
    let token = TokenRequest::new(identity, room).with_name(name).mint(&creds.api_key, &creds.api_secret)?;
    Ok(listener_url(&creds.url, &token))
}
