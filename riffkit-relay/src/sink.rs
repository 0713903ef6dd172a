//! Capture sink: where frames go once they leave the packetizer.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::audio::AudioFrame;
use crate::error::Result;

/// Accepts audio frames for a real-time room.
///
/// `deliver` may suspend until the room is ready for the next frame; pacing
/// is the sink's job. The session manager never calls `deliver` concurrently.
/// A refused frame is reported as [`RelayError::Backpressure`](crate::RelayError::Backpressure).
#[async_trait]
pub trait CaptureSink: Send + Sync {
    /// Hand one frame to the room.
    async fn deliver(&self, frame: &AudioFrame) -> Result<()>;
}

/// Drops frames, but at the pace a real room would accept them.
///
/// Handy for exercising resolvers and decoders without a media room.
#[derive(Debug, Default)]
pub struct DiscardSink {
    next_due: Mutex<Option<Instant>>,
}

impl DiscardSink {
    /// Create a new discarding sink.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CaptureSink for DiscardSink {
    async fn deliver(&self, frame: &AudioFrame) -> Result<()> {
        let mut next_due = self.next_due.lock().await;
        let now = Instant::now();
        // Restart the clock after a gap between streams.
        let due = match *next_due {
            Some(due) if due > now => due,
            _ => now,
        };
        tokio::time::sleep_until(due).await;
        *next_due = Some(due + Duration::from_micros((frame.duration_ms() * 1000.0).round() as u64));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioFormat, BYTES_PER_FRAME};

    #[tokio::test(start_paused = true)]
    async fn test_discard_sink_paces_at_frame_rate() {
        let sink = DiscardSink::new();
        let frame = AudioFrame::from_le_bytes(&[0u8; BYTES_PER_FRAME], &AudioFormat::default()).unwrap();
        let start = Instant::now();
        for _ in 0..10 {
            sink.deliver(&frame).await.unwrap();
        }
        // first frame goes out immediately, nine more at 10 ms each
        assert_eq!(start.elapsed(), Duration::from_millis(90));
    }
}
