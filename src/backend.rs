use std::io::Write;

use crate::Result;
use crate::media::{
    AudioCodecInfo, AudioEncoderParams, CodecParams, Frame, ImageEncoderParams, MuxOptions,
    OutputStream, Packet, SeekTarget, StreamDescriptor,
};
use crate::timebase::TimeBase;
use crate::transcode::FilterSpec;

/// Pluggable codec/container capability used by the pipeline.
///
/// A backend owns nothing per request; it is a factory for the stateful handles below. All
/// handles are driven sequentially by exactly one session, so none of them needs to be `Sync`.
///
/// Error conventions:
/// - `open_demuxer` reports [`crate::Error::Open`]
/// - `open_filter` reports [`crate::Error::FilterConfiguration`]
/// - `open_muxer` reports [`crate::Error::MuxerOpen`]
/// - everything else reports [`crate::Error::Codec`] unless a more specific variant applies
pub trait MediaBackend: Send + Sync {
    /// Open a source container for demuxing.
    fn open_demuxer(&self, source_ref: &str) -> Result<Box<dyn Demuxer>>;

    /// Open a decoder bound to one source stream.
    fn open_decoder(&self, stream: &StreamDescriptor) -> Result<Box<dyn Decoder>>;

    /// Build an audio filter graph.
    fn open_filter(&self, spec: &FilterSpec) -> Result<Box<dyn Filter>>;

    /// Open an audio encoder.
    fn open_audio_encoder(&self, params: &AudioEncoderParams) -> Result<Box<dyn Encoder>>;

    /// Open an encoder that turns one picture into one still image.
    fn open_image_encoder(&self, params: &ImageEncoderParams) -> Result<Box<dyn Encoder>>;

    /// The default audio codec for a container format, with its accepted formats.
    fn audio_codec_for(&self, container: &str) -> Result<AudioCodecInfo>;

    /// Create a muxer for `container` that streams its bytes into `sink`.
    fn open_muxer(&self, container: &str, sink: Box<dyn Write + Send>) -> Result<Box<dyn Muxer>>;
}

/// A demultiplexer over one opened source.
pub trait Demuxer: Send {
    fn streams(&self) -> &[StreamDescriptor];

    fn seek(&mut self, target: SeekTarget) -> Result<()>;

    /// Read the next packet in container order; `Ok(None)` at end of stream.
    fn read_packet(&mut self) -> Result<Option<Packet>>;
}

/// A decoder bound to one stream.
///
/// A single `decode` call may yield zero frames while the codec buffers.
pub trait Decoder: Send {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<Frame>>;

    /// Signal end of input and return every buffered frame.
    fn flush(&mut self) -> Result<Vec<Frame>>;
}

/// A single-input, single-output filter graph.
pub trait Filter: Send {
    fn push(&mut self, frame: Frame) -> Result<Vec<Frame>>;

    /// Signal end of input and return every buffered frame.
    fn flush(&mut self) -> Result<Vec<Frame>>;
}

/// An encoder producing packets in [`Encoder::time_base`] units.
pub trait Encoder: Send {
    fn encode(&mut self, frame: Frame) -> Result<Vec<Packet>>;

    /// Signal end of input and return every buffered packet.
    fn flush(&mut self) -> Result<Vec<Packet>>;

    fn time_base(&self) -> TimeBase;

    /// Samples per frame the encoder insists on, if it only accepts uniform frames.
    fn frame_size(&self) -> Option<usize> {
        None
    }

    /// Parameters describing the encoded stream, used to create the matching output stream.
    fn codec_params(&self) -> CodecParams;
}

/// A multiplexer writing one output container.
///
/// Lifecycle: `add_stream`* → `open_io` → `write_header` → `write_packet`* → `write_trailer`.
pub trait Muxer: Send {
    /// Create an output stream and return its index. Indices follow declaration order.
    fn add_stream(&mut self, stream: &OutputStream) -> Result<usize>;

    fn open_io(&mut self) -> Result<()>;

    fn write_header(&mut self, options: &MuxOptions) -> Result<()>;

    /// The time base of an output stream. Only final after `write_header`, since containers
    /// may replace the requested time base.
    fn stream_time_base(&self, index: usize) -> Option<TimeBase>;

    fn write_packet(&mut self, packet: Packet) -> Result<()>;

    fn write_trailer(&mut self) -> Result<()>;
}
