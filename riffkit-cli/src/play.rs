use anyhow::{Result, bail};
use riffkit_relay::{Notice, Notification, RoomId, SessionManagerHandle};
use tokio::sync::mpsc;
use tracing::info;

/// Play one reference and wait for its session to end.
///
/// Ctrl-C stops the session. A session that ends with an error notice is
/// returned as an error.
pub async fn play_once(
    relay: &SessionManagerHandle,
    notices: &mut mpsc::UnboundedReceiver<Notification>,
    room: RoomId,
    reference: &str,
) -> Result<()> {
    let id = relay.play(room.clone(), reference).await?;
    info!(session.id = %id, "playing");

    loop {
        tokio::select! {
            notice = notices.recv() => {
                let Some(notice) = notice else { bail!("session manager stopped unexpectedly") };
                println!("{}", notice.text);
                if let Some(detail) = notice.text.strip_prefix(ERROR_PREFIX) {
                    bail!("{detail}");
                }
                if ends_session(&notice.text) {
                    return Ok(());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                relay.stop(room.clone()).await?;
            }
        }
    }
}

const ERROR_PREFIX: &str = "Error: ";

fn ends_session(text: &str) -> bool {
    [Notice::Ended, Notice::Stopped, Notice::NothingPlaying]
        .iter()
        .any(|notice| notice.to_string() == text)
}
