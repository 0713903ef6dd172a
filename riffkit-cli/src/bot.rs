use std::sync::Arc;

use anyhow::Result;
use riffkit_relay::livekit::Room;
use riffkit_relay::{
    CaptureSink, ChannelNotifier, DiscardSink, Notification, SessionManager, SessionManagerHandle,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use crate::config::{BotConfig, LiveKitCredentials};
use crate::room;

/// A running relay, optionally attached to a LiveKit room.
pub struct Bot {
    pub relay: SessionManagerHandle,
    pub notices: UnboundedReceiver<Notification>,
    room: Option<Room>,
}

impl Bot {
    /// Join the room (unless `dry_run`) and start the session manager.
    pub async fn start(config: &BotConfig, dry_run: bool) -> Result<Self> {
        let (sink, room): (Arc<dyn CaptureSink>, Option<Room>) = if dry_run {
            info!("dry run: frames are paced and discarded");
            (Arc::new(DiscardSink::new()), None)
        } else {
            let creds = LiveKitCredentials::from_env()?;
            let (room, sink) = room::join(&creds, config).await?;
            (Arc::new(sink), Some(room))
        };

        let (notifier, notices) = ChannelNotifier::new();
        let relay = SessionManager::builder()
            .config(config.relay.clone())
            .sink(sink)
            .notifier(notifier)
            .build()?
            .spawn();

        Ok(Self { relay, notices, room })
    }

    /// Stop playback and leave the room.
    pub async fn close(self) {
        if let Err(e) = self.relay.shutdown().await {
            warn!(error = %e, "session manager already stopped");
        }
        if let Some(room) = self.room {
            if let Err(e) = room.close().await {
                warn!(error = %e, "failed to leave room cleanly");
            }
        }
        info!("bot stopped");
    }
}
