use anyhow::Result;
use riffkit_relay::{Notification, RoomId, SessionManagerHandle};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const PROMPT: &str = "you> ";

/// Treat stdin as a chat room: each line is a message, notices are printed back.
///
/// Returns when stdin closes or the user presses Ctrl-C.
pub async fn run_console(
    relay: &SessionManagerHandle,
    notices: &mut mpsc::UnboundedReceiver<Notification>,
    chat_room: RoomId,
) -> Result<()> {
    let (line_tx, mut lines) = mpsc::unbounded_channel::<String>();
    let reader = tokio::task::spawn_blocking(move || read_lines(line_tx));

    println!("RiffKit console");
    println!("Type !play <url> to start music, !stop to end it. Ctrl+C to exit.\n");

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else { break };
                if !relay.dispatch(chat_room.clone(), &line).await? {
                    debug!(text = %line, "ignoring chat message");
                }
            }
            Some(notice) = notices.recv() => {
                println!("riffkit> {}", notice.text);
            }
        }
    }

    reader.await??;
    Ok(())
}

fn read_lines(tx: mpsc::UnboundedSender<String>) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    loop {
        match rl.readline(PROMPT) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                rl.add_history_entry(&line)?;
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("Interrupted");
                break;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                warn!(error = %err, "console input failed");
                break;
            }
        }
    }
    Ok(())
}
