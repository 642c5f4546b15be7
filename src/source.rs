//! The media source facade.
//!
//! `MediaSource` is the main entry point: it owns one lazily opened container session and
//! serves the three operations on top of it.
//!
//! ```no_run
//! # #[cfg(feature = "ffmpeg")]
//! # fn demo() -> clipcast::Result<()> {
//! use std::sync::Arc;
//!
//! use clipcast::backends::ffmpeg::FfmpegBackend;
//! use clipcast::{MediaSource, SourceOpts};
//!
//! let source = MediaSource::new(Arc::new(FfmpegBackend::new()?), "movie.mp4", SourceOpts::default());
//! let still = source.still_frame(12.0)?;
//! std::fs::write("frame.jpg", still.bytes)?;
//! # Ok(())
//! # }
//! ```

use std::io::Write;
use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::MediaBackend;
use crate::container::{ContainerSession, LazySession};
use crate::media::{Frame, ImageEncoderParams, MediaKind, Packet, SeekTarget, StreamDescriptor};
use crate::opts::SourceOpts;
use crate::playlist::{Playlist, PlaylistBuilder};
use crate::remux::RemuxSession;
use crate::request::{ClipStart, TranscodeRequest};
use crate::timebase::{TimeBase, rebase};
use crate::{Error, Result};

/// An encoded still image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StillImage {
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

/// One stored media container and the operations served from it.
///
/// The container is opened on first use. Operations are serialized on the shared session, so
/// a `MediaSource` can be shared freely between threads.
pub struct MediaSource {
    backend: Arc<dyn MediaBackend>,
    session: LazySession,
    opts: SourceOpts,
}

impl MediaSource {
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        source_ref: impl Into<String>,
        opts: SourceOpts,
    ) -> Self {
        let session = LazySession::new(backend.clone(), source_ref);
        Self {
            backend,
            session,
            opts,
        }
    }

    pub fn source_ref(&self) -> &str {
        self.session.source_ref()
    }

    pub fn opts(&self) -> &SourceOpts {
        &self.opts
    }

    /// The source's stream table.
    pub fn streams(&self) -> Result<Vec<StreamDescriptor>> {
        self.session.with_session(|s| Ok(s.streams().to_vec()))
    }

    /// Encode the video frame at `at_seconds` as a still image.
    ///
    /// Fails with `FrameNotFound` when the time is unusable or no video packet follows it.
    pub fn still_frame(&self, at_seconds: f64) -> Result<StillImage> {
        if !at_seconds.is_finite() || at_seconds < 0.0 {
            return Err(Error::FrameNotFound { at_seconds });
        }

        self.session.with_session(|session| {
            let video = session.video_stream()?.clone();
            if let Err(err) = session.seek(SeekTarget::Time(at_seconds)) {
                debug!(error = %err, at_seconds, "still frame seek failed");
                return Err(Error::FrameNotFound { at_seconds });
            }

            let packet = next_packet_of(session, video.index)?
                .ok_or(Error::FrameNotFound { at_seconds })?;
            let frame = self
                .decode_one(&video, &packet)?
                .ok_or(Error::FrameNotFound { at_seconds })?;
            let bytes = self.encode_still(&video, frame)?;

            debug!(at_seconds, pts = ?packet.pts, bytes = bytes.len(), "encoded still frame");
            Ok(StillImage {
                mime_type: mime_for_codec(&self.opts.still_image_codec),
                bytes,
            })
        })
    }

    /// Write the requested sub-clip into `sink` as a complete container.
    ///
    /// Video is copied, audio is transcoded. Timestamps start at zero from the clip origin.
    ///
    /// Muxed bytes go to `sink` as soon as the muxer produces them; backpressure is the sink's
    /// business. A failing write (e.g. a consumer that hung up) stops the clip with `Io` and no
    /// trailer is written.
    pub fn sub_clip(&self, request: &TranscodeRequest, sink: Box<dyn Write + Send>) -> Result<()> {
        self.session.with_session(|session| {
            let video = session.video_stream()?.clone();
            let audio = session.audio_stream()?.clone();

            match request.clip_start() {
                ClipStart::Timestamp(ts) => session.seek(SeekTarget::Timestamp {
                    stream_index: video.index,
                    ts,
                })?,
                ClipStart::Position(pos) => session.seek(SeekTarget::Position(pos))?,
                ClipStart::Beginning => session.seek(SeekTarget::Time(0.0))?,
            }

            let mut remux = RemuxSession::new(
                self.backend.clone(),
                video.clone(),
                audio.clone(),
                request.profile,
                sink,
            )
            .with_video_time_base(self.opts.video_output_time_base);
            remux.init()?;

            let mut origin = request
                .start_timestamp
                .map(|ts| ClipOrigin::new(ts, video.time_base));
            let mut written = 0usize;

            while let Some(packet) = session.read_next()? {
                let Some(stream) = session
                    .streams()
                    .iter()
                    .find(|s| s.index == packet.stream_index)
                else {
                    continue;
                };
                if stream.index != video.index && stream.index != audio.index {
                    continue;
                }
                let time_base = stream.time_base;

                let video_pts = packet.pts.map(|pts| rebase(pts, time_base, video.time_base));
                if request.is_past_end(packet.position, video_pts) {
                    debug!(pts = ?packet.pts, position = ?packet.position, "reached clip end");
                    break;
                }

                if origin.is_none()
                    && let Some(pts) = packet.pts
                {
                    origin = Some(ClipOrigin::new(pts, time_base));
                }
                let packet = match &origin {
                    Some(origin) => packet.shift(origin.offset_in(time_base)),
                    None => packet,
                };

                // Video at or before the origin would give the first fragment a non-positive
                // duration.
                if stream.kind == MediaKind::Video && packet.pts.is_some_and(|pts| pts <= 0) {
                    continue;
                }

                remux.write(packet)?;
                written += 1;
            }

            remux.finish()?;
            info!(
                source = session.source_ref(),
                profile = request.profile.as_str(),
                packets = written,
                "sub-clip complete"
            );
            Ok(())
        })
    }

    /// Build the VOD playlist, pointing each segment at `base_uri`.
    pub fn playlist(&self, base_uri: &str) -> Result<Playlist> {
        let builder = PlaylistBuilder::new(self.opts.target_chunk_seconds)?;
        self.session
            .with_session(|session| builder.build(session, base_uri))
    }

    fn decode_one(&self, video: &StreamDescriptor, packet: &Packet) -> Result<Option<Frame>> {
        let mut decoder = self.backend.open_decoder(video)?;
        let mut frames = decoder.decode(packet)?;
        if frames.is_empty() {
            frames = decoder.flush()?;
        }
        Ok(frames.into_iter().next())
    }

    fn encode_still(&self, video: &StreamDescriptor, frame: Frame) -> Result<Vec<u8>> {
        let format = video
            .codec_params
            .video
            .as_ref()
            .ok_or_else(|| Error::codec("video stream has no picture format"))?;

        let params = ImageEncoderParams {
            codec: self.opts.still_image_codec.clone(),
            width: format.width,
            height: format.height,
            pixel_format: still_pixel_format(&format.pixel_format).to_owned(),
            time_base: TimeBase::new(1, 1),
        };
        let mut encoder = self.backend.open_image_encoder(&params)?;

        let mut packets = encoder.encode(frame)?;
        packets.extend(encoder.flush()?);
        packets
            .into_iter()
            .next()
            .map(|p| p.data)
            .ok_or_else(|| Error::codec("image encoder produced no output"))
    }
}

/// Where a sub-clip's timeline starts, in some stream's time base.
struct ClipOrigin {
    ts: i64,
    time_base: TimeBase,
}

impl ClipOrigin {
    fn new(ts: i64, time_base: TimeBase) -> Self {
        Self { ts, time_base }
    }

    fn offset_in(&self, time_base: TimeBase) -> i64 {
        rebase(self.ts, self.time_base, time_base)
    }
}

fn next_packet_of(session: &mut ContainerSession, stream_index: usize) -> Result<Option<Packet>> {
    while let Some(packet) = session.read_next()? {
        if packet.stream_index == stream_index {
            return Ok(Some(packet));
        }
    }
    Ok(None)
}

/// Full-range JPEG pixel format matching the source's chroma subsampling.
pub fn still_pixel_format(source_pixel_format: &str) -> &'static str {
    if source_pixel_format.contains("422") {
        "yuvj422p"
    } else {
        "yuvj420p"
    }
}

fn mime_for_codec(codec: &str) -> &'static str {
    match codec {
        "mjpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" | "libwebp" => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn still_pixel_format_follows_chroma_subsampling() {
        assert_eq!(still_pixel_format("yuv422p10le"), "yuvj422p");
        assert_eq!(still_pixel_format("yuv420p"), "yuvj420p");
        assert_eq!(still_pixel_format("nv12"), "yuvj420p");
    }

    #[test]
    fn clip_origin_rebases_into_each_stream() {
        let origin = ClipOrigin::new(5_000, TimeBase::per_second(1000));
        assert_eq!(origin.offset_in(TimeBase::per_second(1000)), 5_000);
        assert_eq!(origin.offset_in(TimeBase::per_second(48_000)), 240_000);
    }

    #[test]
    fn mime_type_follows_codec() {
        assert_eq!(mime_for_codec("mjpeg"), "image/jpeg");
        assert_eq!(mime_for_codec("png"), "image/png");
    }
}
