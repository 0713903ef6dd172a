//! Slices the decoder's PCM byte stream into fixed-duration frames.

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::audio::{AudioFormat, AudioFrame};
use crate::error::Result;

/// Result of one [`FramePacketizer::next_frame`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// A full frame, or the short final frame of the stream.
    Frame(AudioFrame),
    /// The stream is exhausted.
    EndOfStream,
}

/// Reads one frame-sized block per call from a PCM stream.
///
/// A block is filled across as many reads as needed; only end-of-file ends
/// it early. The short tail before end-of-file becomes one last, shorter
/// frame, and every call after that reports [`Packet::EndOfStream`].
pub struct FramePacketizer<R> {
    reader: R,
    format: AudioFormat,
    buf: Vec<u8>,
    exhausted: bool,
    frames: u64,
}

impl<R: AsyncRead + Unpin> FramePacketizer<R> {
    /// Create a packetizer producing frames of `format`.
    pub fn new(reader: R, format: AudioFormat) -> Self {
        let buf = vec![0u8; format.frame_bytes()];
        Self { reader, format, buf, exhausted: false, frames: 0 }
    }

    /// Read the next frame.
    ///
    /// Waits for data without blocking the runtime. I/O failures surface as
    /// [`RelayError::Read`](crate::RelayError::Read).
    pub async fn next_frame(&mut self) -> Result<Packet> {
        if self.exhausted {
            return Ok(Packet::EndOfStream);
        }

        let mut filled = 0;
        while filled < self.buf.len() {
            let n = self.reader.read(&mut self.buf[filled..]).await?;
            if n == 0 {
                self.exhausted = true;
                break;
            }
            filled += n;
        }

        match AudioFrame::from_le_bytes(&self.buf[..filled], &self.format) {
            Some(frame) => {
                if filled % self.format.bytes_per_sample_group() != 0 {
                    debug!(bytes = filled, "dropping partial sample at end of stream");
                }
                self.frames += 1;
                Ok(Packet::Frame(frame))
            }
            None => {
                self.exhausted = true;
                Ok(Packet::EndOfStream)
            }
        }
    }

    /// Number of frames produced so far.
    pub fn frames_read(&self) -> u64 {
        self.frames
    }
}
