//! Remux/transcode session: one copied video stream plus one transcoded audio stream written
//! into a single output container.
//!
//! The session is a one-way state machine:
//! `Uninitialized → Initialized → Writing → Finished`.
//!
//! Callers feed packets exactly once each, in source read order; interleaving in the output
//! follows from that order.

use std::io::Write;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::backend::{MediaBackend, Muxer};
use crate::media::{AudioEncoderParams, MediaKind, OutputStream, Packet, StreamDescriptor};
use crate::request::Profile;
use crate::stream_copy::StreamCopy;
use crate::timebase::TimeBase;
use crate::transcode::TranscodePath;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Writing,
    Finished,
}

impl SessionState {
    fn name(self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initialized => "initialized",
            SessionState::Writing => "writing",
            SessionState::Finished => "finished",
        }
    }
}

/// Everything that only exists once the output is open.
struct Output {
    muxer: Box<dyn Muxer>,
    video: StreamCopy,
    audio: TranscodePath,
    audio_time_base: TimeBase,
}

/// Copies the video stream and transcodes the audio stream into one container.
pub struct RemuxSession {
    backend: Arc<dyn MediaBackend>,
    video_source: StreamDescriptor,
    audio_source: StreamDescriptor,
    profile: Profile,
    video_time_base: TimeBase,
    sink: Option<Box<dyn Write + Send>>,
    output: Option<Output>,
    state: SessionState,
}

impl RemuxSession {
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        video_source: StreamDescriptor,
        audio_source: StreamDescriptor,
        profile: Profile,
        sink: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            backend,
            video_source,
            audio_source,
            profile,
            video_time_base: TimeBase::per_second(16_000),
            sink: Some(sink),
            output: None,
            state: SessionState::Uninitialized,
        }
    }

    /// Request a different time base for the copied video stream.
    pub fn with_video_time_base(mut self, time_base: TimeBase) -> Self {
        self.video_time_base = time_base;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Negotiate output streams, open the output and write the container header.
    pub fn init(&mut self) -> Result<()> {
        self.expect_state("init", &[SessionState::Uninitialized])?;
        let sink = self
            .sink
            .take()
            .ok_or_else(|| Error::msg("output sink already consumed"))?;

        let container = self.profile.container();
        let backend = self.backend.clone();

        let source_audio = self
            .audio_source
            .codec_params
            .audio
            .clone()
            .ok_or(Error::StreamNotFound(MediaKind::Audio))?;
        let codec = backend.audio_codec_for(container)?;
        let format = codec.negotiate(&source_audio);
        let encoder_params = AudioEncoderParams {
            codec: codec.name.clone(),
            time_base: TimeBase::per_second(format.sample_rate as i32),
            format,
        };
        let encoder = backend.open_audio_encoder(&encoder_params)?;

        let mut muxer = backend.open_muxer(container, sink).map_err(as_muxer_open)?;

        // Video first, audio second.
        let video_index = muxer
            .add_stream(&OutputStream {
                kind: MediaKind::Video,
                time_base: self.video_time_base,
                codec_params: self.video_source.codec_params.clone(),
            })
            .map_err(as_muxer_open)?;
        let audio_index = muxer
            .add_stream(&OutputStream {
                kind: MediaKind::Audio,
                time_base: encoder.time_base(),
                codec_params: encoder.codec_params(),
            })
            .map_err(as_muxer_open)?;

        let audio = TranscodePath::open(
            backend.as_ref(),
            &self.audio_source,
            encoder,
            &encoder_params.format,
            audio_index,
        )?;

        muxer.open_io().map_err(as_muxer_open)?;
        muxer
            .write_header(&self.profile.mux_options())
            .map_err(as_muxer_open)?;

        let video_time_base = muxer
            .stream_time_base(video_index)
            .unwrap_or(self.video_time_base);
        let audio_time_base = muxer
            .stream_time_base(audio_index)
            .unwrap_or_else(|| audio.time_base());

        debug!(
            container,
            audio_codec = %encoder_params.codec,
            %video_time_base,
            %audio_time_base,
            "output header written"
        );

        self.output = Some(Output {
            muxer,
            video: StreamCopy::new(&self.video_source, video_index, video_time_base),
            audio,
            audio_time_base,
        });
        self.state = SessionState::Initialized;
        Ok(())
    }

    /// Route one source packet: copy video, transcode audio, drop everything else.
    pub fn write(&mut self, packet: Packet) -> Result<()> {
        self.expect_state("write", &[SessionState::Initialized, SessionState::Writing])?;
        self.state = SessionState::Writing;

        let output = self.output_mut()?;
        if packet.stream_index == output.video.source_index() {
            output.video.copy(packet, output.muxer.as_mut())?;
        } else if packet.stream_index == output.audio.source_index() {
            let encoded = output.audio.feed(&packet)?;
            output.write_audio(encoded)?;
        } else {
            trace!(stream = packet.stream_index, "dropping packet of unmapped stream");
        }
        Ok(())
    }

    /// Drain the audio path and write the container trailer.
    ///
    /// The session is finished afterwards even when this fails; a failed trailer leaves a
    /// corrupt output behind.
    pub fn finish(&mut self) -> Result<()> {
        self.expect_state("finish", &[SessionState::Initialized, SessionState::Writing])?;
        self.state = SessionState::Finished;

        let output = self.output_mut()?;
        let tail = output.audio.drain()?;
        output.write_audio(tail)?;
        output
            .muxer
            .write_trailer()
            .map_err(|err| Error::MuxerFinalize(err.to_string()))?;

        debug!("output trailer written");
        Ok(())
    }

    fn output_mut(&mut self) -> Result<&mut Output> {
        self.output
            .as_mut()
            .ok_or_else(|| Error::msg("session output is not open"))
    }

    fn expect_state(&self, operation: &'static str, allowed: &[SessionState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                state: self.state.name(),
            })
        }
    }
}

impl Output {
    fn write_audio(&mut self, packets: Vec<Packet>) -> Result<()> {
        let from = self.audio.time_base();
        for packet in packets {
            let out = packet.retarget(self.audio.dest_index(), from, self.audio_time_base);
            trace!(stream = out.stream_index, pts = ?out.pts, "write audio packet");
            self.muxer.write_packet(out)?;
        }
        Ok(())
    }
}

fn as_muxer_open(err: Error) -> Error {
    match err {
        Error::MuxerOpen(_) => err,
        other => Error::MuxerOpen(other.to_string()),
    }
}
