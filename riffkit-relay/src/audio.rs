//! PCM format contract and the audio frame value type.

use serde::{Deserialize, Serialize};

/// Sample rate the room track is published at.
pub const SAMPLE_RATE: u32 = 48_000;
/// Mono.
pub const NUM_CHANNELS: u16 = 1;
/// Samples per channel in one 10 ms frame.
pub const SAMPLES_PER_FRAME: usize = 480;
/// Bytes in one nominal frame (PCM16).
pub const BYTES_PER_FRAME: usize = SAMPLES_PER_FRAME * 2;

/// Raw PCM format produced by the decoder stage.
///
/// Only signed 16-bit little-endian samples are produced, so the format only
/// varies in rate, channel count and frame duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Duration of one nominal frame in milliseconds.
    pub frame_ms: u32,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::pcm16_48khz_mono()
    }
}

impl AudioFormat {
    /// Bytes per sample for PCM16.
    pub const SAMPLE_WIDTH: usize = 2;

    /// Create a new format.
    pub fn new(sample_rate: u32, channels: u16, frame_ms: u32) -> Self {
        Self { sample_rate, channels, frame_ms }
    }

    /// The room contract: 48 kHz, mono, 10 ms frames.
    pub fn pcm16_48khz_mono() -> Self {
        Self { sample_rate: SAMPLE_RATE, channels: NUM_CHANNELS, frame_ms: 10 }
    }

    /// Bytes in one interleaved sample group (all channels).
    pub fn bytes_per_sample_group(&self) -> usize {
        Self::SAMPLE_WIDTH * self.channels as usize
    }

    /// Samples per channel in one nominal frame.
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate as usize * self.frame_ms as usize) / 1000
    }

    /// Bytes in one nominal frame.
    pub fn frame_bytes(&self) -> usize {
        self.samples_per_frame() * self.bytes_per_sample_group()
    }
}

/// One block of PCM samples ready for the capture sink.
///
/// Built only from whole sample groups, so `samples.len()` is always a
/// multiple of the channel count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Vec<i16>,
    sample_rate: u32,
    num_channels: u16,
}

impl AudioFrame {
    /// Decode little-endian PCM16 bytes into a frame.
    ///
    /// Trailing bytes that do not form a whole sample group are dropped.
    /// Returns `None` when not even one sample group is present.
    pub fn from_le_bytes(data: &[u8], format: &AudioFormat) -> Option<Self> {
        let group = format.bytes_per_sample_group();
        let usable = data.len() - data.len() % group;
        if usable == 0 {
            return None;
        }
        let samples = data[..usable]
            .chunks_exact(AudioFormat::SAMPLE_WIDTH)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Some(Self { samples, sample_rate: format.sample_rate, num_channels: format.channels })
    }

    /// Interleaved samples.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count.
    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    /// Sample count per channel.
    pub fn samples_per_channel(&self) -> usize {
        self.samples.len() / self.num_channels as usize
    }

    /// Payload length in bytes.
    pub fn payload_len(&self) -> usize {
        self.samples.len() * AudioFormat::SAMPLE_WIDTH
    }

    /// Duration of this frame in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        self.samples_per_channel() as f64 * 1000.0 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_contract_constants() {
        let format = AudioFormat::pcm16_48khz_mono();
        assert_eq!(format.samples_per_frame(), SAMPLES_PER_FRAME);
        assert_eq!(format.frame_bytes(), BYTES_PER_FRAME);
        assert_eq!(format.frame_bytes(), 960);
    }

    #[test]
    fn test_stereo_frame_size() {
        let format = AudioFormat::new(48_000, 2, 20);
        assert_eq!(format.samples_per_frame(), 960);
        assert_eq!(format.frame_bytes(), 3840);
    }

    #[test]
    fn test_frame_from_full_block() {
        let format = AudioFormat::default();
        let frame = AudioFrame::from_le_bytes(&[0u8; BYTES_PER_FRAME], &format).unwrap();
        assert_eq!(frame.samples_per_channel(), 480);
        assert_eq!(frame.payload_len(), 960);
        assert_eq!(frame.sample_rate(), 48_000);
        assert_eq!(frame.num_channels(), 1);
        assert!((frame.duration_ms() - 10.0).abs() < 0.001);
    }

    #[test]
    fn test_frame_decodes_little_endian() {
        let format = AudioFormat::default();
        let frame = AudioFrame::from_le_bytes(&[0x01, 0x00, 0xff, 0x7f, 0x00, 0x80], &format)
            .unwrap();
        assert_eq!(frame.samples(), &[1, i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_frame_drops_odd_trailing_byte() {
        let format = AudioFormat::default();
        let frame = AudioFrame::from_le_bytes(&[0, 0, 0], &format).unwrap();
        assert_eq!(frame.samples_per_channel(), 1);
        assert_eq!(frame.payload_len(), 2);
        assert!(AudioFrame::from_le_bytes(&[7], &format).is_none());
        assert!(AudioFrame::from_le_bytes(&[], &format).is_none());
    }

    #[test]
    fn test_stereo_frame_keeps_whole_groups() {
        let format = AudioFormat::new(48_000, 2, 10);
        let frame = AudioFrame::from_le_bytes(&[0u8; 10], &format).unwrap();
        assert_eq!(frame.samples().len(), 4);
        assert_eq!(frame.samples_per_channel(), 2);
    }
}
