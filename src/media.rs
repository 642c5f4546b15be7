//! Data model shared by the pipeline and the codec capability.
//!
//! These types are deliberately backend-neutral: a backend attaches its own native handles
//! (codec parameters, decoded frame buffers) through the opaque `native` / `payload` slots and
//! downcasts them again on the way back in.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::timebase::{TimeBase, rebase_opt};

/// What a stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Other,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Sample layout of an audio stream, named the way FFmpeg names them (`fltp`, `stereo`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub sample_format: String,
    pub channel_layout: String,
    pub channels: u16,
}

/// Picture geometry of a video stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub pixel_format: String,
}

/// Codec parameters of a stream.
///
/// `native` carries whatever the backend needs to rebuild a decoder or an output stream; the
/// pipeline never looks inside it.
#[derive(Clone, Default)]
pub struct CodecParams {
    pub codec: String,
    pub audio: Option<AudioFormat>,
    pub video: Option<VideoFormat>,
    pub native: Option<Arc<dyn Any + Send + Sync>>,
}

impl fmt::Debug for CodecParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecParams")
            .field("codec", &self.codec)
            .field("audio", &self.audio)
            .field("video", &self.video)
            .field("native", &self.native.is_some())
            .finish()
    }
}

/// Immutable description of one stream in a source container.
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    pub index: usize,
    pub kind: MediaKind,
    pub time_base: TimeBase,
    pub codec_params: CodecParams,
}

/// One compressed unit of a stream.
///
/// A packet read from a source is owned by whichever path consumes it. Paths hand the muxer a
/// retargeted packet (see [`Packet::retarget`]) rather than aliasing the source packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub stream_index: usize,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: i64,
    pub position: Option<i64>,
    pub is_keyframe: bool,
    pub data: Vec<u8>,
}

impl Packet {
    /// Move this packet onto `dest_index`, converting its timing from `from` into `to`.
    pub fn retarget(mut self, dest_index: usize, from: TimeBase, to: TimeBase) -> Packet {
        self.pts = rebase_opt(self.pts, from, to);
        self.dts = rebase_opt(self.dts, from, to);
        if self.duration > 0 {
            self.duration = crate::timebase::rebase(self.duration, from, to);
        }
        self.stream_index = dest_index;
        self
    }

    /// Shift pts and dts back by `offset` ticks.
    pub fn shift(mut self, offset: i64) -> Packet {
        self.pts = self.pts.map(|ts| ts.saturating_sub(offset));
        self.dts = self.dts.map(|ts| ts.saturating_sub(offset));
        self
    }
}

/// A decoded (or filtered) frame.
///
/// `payload` is the backend's own frame buffer; `samples` is the audio sample count per channel
/// (zero for video).
pub struct Frame {
    pub pts: Option<i64>,
    pub samples: usize,
    pub payload: Box<dyn Any + Send>,
}

impl Frame {
    pub fn new(pts: Option<i64>, samples: usize, payload: impl Any + Send) -> Self {
        Self {
            pts,
            samples,
            payload: Box::new(payload),
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("pts", &self.pts)
            .field("samples", &self.samples)
            .finish_non_exhaustive()
    }
}

/// Where to move a demuxer's read cursor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekTarget {
    /// Wall-clock seconds from the start of the container.
    Time(f64),
    /// Byte offset into the container.
    Position(i64),
    /// A timestamp in the time base of `stream_index`.
    Timestamp { stream_index: usize, ts: i64 },
}

impl fmt::Display for SeekTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeekTarget::Time(seconds) => write!(f, "time {seconds:.3}s"),
            SeekTarget::Position(pos) => write!(f, "byte position {pos}"),
            SeekTarget::Timestamp { stream_index, ts } => {
                write!(f, "timestamp {ts} on stream {stream_index}")
            }
        }
    }
}

/// What an audio codec accepts, as reported by the backend for a container's default codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioCodecInfo {
    pub name: String,
    /// Supported sample formats, most preferred first.
    pub sample_formats: Vec<String>,
    /// Supported sample rates; empty means any.
    pub sample_rates: Vec<u32>,
}

impl AudioCodecInfo {
    /// Pick the output format for a given source: the codec's preferred sample format, the
    /// source's rate when supported (else the codec's first rate), and the source layout.
    pub fn negotiate(&self, source: &AudioFormat) -> AudioFormat {
        let sample_format = self
            .sample_formats
            .first()
            .cloned()
            .unwrap_or_else(|| source.sample_format.clone());

        let sample_rate = if self.sample_rates.is_empty()
            || self.sample_rates.contains(&source.sample_rate)
        {
            source.sample_rate
        } else {
            self.sample_rates[0]
        };

        AudioFormat {
            sample_rate,
            sample_format,
            channel_layout: source.channel_layout.clone(),
            channels: source.channels,
        }
    }
}

/// Parameters for opening an audio encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioEncoderParams {
    pub codec: String,
    pub format: AudioFormat,
    pub time_base: TimeBase,
}

/// Parameters for opening a single-image encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEncoderParams {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub pixel_format: String,
    pub time_base: TimeBase,
}

/// An output stream to create on a muxer.
#[derive(Debug, Clone)]
pub struct OutputStream {
    pub kind: MediaKind,
    pub time_base: TimeBase,
    pub codec_params: CodecParams,
}

/// Container-level options applied when writing the header (FFmpeg `AVDictionary` style).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MuxOptions {
    pub entries: Vec<(String, String)>,
}

impl MuxOptions {
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.push((key.into(), value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(pts: i64) -> Packet {
        Packet {
            stream_index: 3,
            pts: Some(pts),
            dts: Some(pts - 10),
            duration: 40,
            position: Some(1234),
            is_keyframe: true,
            data: vec![1, 2, 3],
        }
    }

    #[test]
    fn retarget_rebases_timing_and_moves_stream() {
        let out = packet(1000).retarget(0, TimeBase::per_second(1000), TimeBase::per_second(16_000));
        assert_eq!(out.stream_index, 0);
        assert_eq!(out.pts, Some(16_000));
        assert_eq!(out.dts, Some(15_840));
        assert_eq!(out.duration, 640);
        assert!(out.is_keyframe);
        assert_eq!(out.data, vec![1, 2, 3]);
    }

    #[test]
    fn shift_moves_both_timestamps() {
        let out = packet(5_000).shift(5_000);
        assert_eq!(out.pts, Some(0));
        assert_eq!(out.dts, Some(-10));
    }

    #[test]
    fn negotiate_prefers_codec_format_and_source_rate() {
        let codec = AudioCodecInfo {
            name: "aac".into(),
            sample_formats: vec!["fltp".into()],
            sample_rates: vec![48_000, 44_100],
        };
        let source = AudioFormat {
            sample_rate: 44_100,
            sample_format: "s16".into(),
            channel_layout: "stereo".into(),
            channels: 2,
        };

        let out = codec.negotiate(&source);
        assert_eq!(out.sample_format, "fltp");
        assert_eq!(out.sample_rate, 44_100);
        assert_eq!(out.channel_layout, "stereo");

        let odd = AudioFormat {
            sample_rate: 22_050,
            ..source
        };
        assert_eq!(codec.negotiate(&odd).sample_rate, 48_000);
    }

    #[test]
    fn mux_options_lookup() {
        let opts = MuxOptions::default().with("movflags", "empty_moov");
        assert_eq!(opts.get("movflags"), Some("empty_moov"));
        assert_eq!(opts.get("fflags"), None);
    }
}
