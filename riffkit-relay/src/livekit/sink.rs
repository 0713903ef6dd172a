//! Capture sink that pushes frames into a LiveKit audio source.

use std::borrow::Cow;

use async_trait::async_trait;
use livekit::options::TrackPublishOptions;
use livekit::prelude::{LocalAudioTrack, LocalTrack, Room};
use livekit::webrtc::audio_frame::AudioFrame as RtcAudioFrame;
use livekit::webrtc::audio_source::native::NativeAudioSource;
use livekit::webrtc::audio_source::{AudioSourceOptions, RtcAudioSource};
use tracing::info;

use crate::audio::{AudioFormat, AudioFrame};
use crate::error::{RelayError, Result};
use crate::sink::CaptureSink;

/// How much audio the native source buffers ahead of real time.
const QUEUE_SIZE_MS: u32 = 100;

/// Delivers relay frames to a [`NativeAudioSource`].
///
/// `capture_frame` waits while the source's queue is full, so delivery runs
/// at playback speed. A capture failure is reported as
/// [`RelayError::Backpressure`].
#[derive(Clone)]
pub struct LiveKitSink {
    source: NativeAudioSource,
}

impl LiveKitSink {
    /// Create a sink with a fresh native source for `format`.
    pub fn new(format: AudioFormat) -> Self {
        let source = NativeAudioSource::new(
            AudioSourceOptions::default(),
            format.sample_rate,
            u32::from(format.channels),
            QUEUE_SIZE_MS,
        );
        Self { source }
    }

    /// The underlying native source.
    pub fn source(&self) -> &NativeAudioSource {
        &self.source
    }
}

#[async_trait]
impl CaptureSink for LiveKitSink {
    async fn deliver(&self, frame: &AudioFrame) -> Result<()> {
        let rtc_frame = RtcAudioFrame {
            data: Cow::Borrowed(frame.samples()),
            sample_rate: frame.sample_rate(),
            num_channels: u32::from(frame.num_channels()),
            samples_per_channel: frame.samples_per_channel() as u32,
        };
        self.source
            .capture_frame(&rtc_frame)
            .await
            .map_err(|e| RelayError::backpressure(e.to_string()))
    }
}

/// Publish `sink`'s source as a local audio track. Call once per room.
pub async fn publish_audio_track(room: &Room, sink: &LiveKitSink, track_name: &str) -> Result<()> {
    let rtc_source = RtcAudioSource::Native(sink.source().clone());
    let track = LocalAudioTrack::create_audio_track(track_name, rtc_source);
    room.local_participant()
        .publish_track(LocalTrack::Audio(track), TrackPublishOptions::default())
        .await
        .map_err(|e| RelayError::room(format!("failed to publish track '{track_name}': {e}")))?;
    info!(track = %track_name, room = %room.name(), "audio track published");
    Ok(())
}
