// src/backends/ffmpeg.rs

//! [`MediaBackend`] over FFmpeg (`ffmpeg-next`).
//!
//! Notes:
//! - Native codec parameters travel through [`CodecParams::native`] as [`NativeParams`].
//! - Decoded frames travel through [`Frame::payload`] as `ffmpeg::frame::Audio` /
//!   `ffmpeg::frame::Video`.
//! - `ffmpeg-next` has no custom AVIO, so the muxer writes into a temp file with a
//!   non-seekable IO context and forwards every new byte to the caller's sink after each write.
//!   With fragmented MP4 flags nothing already forwarded is rewritten.

use std::ffi::CString;
use std::fs::File;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, Once};

use ffmpeg_next as ffmpeg;
use ffmpeg::codec;
use ffmpeg::encoder;
use ffmpeg::ffi;
use ffmpeg::filter;
use ffmpeg::format::{self, Pixel, Sample};
use ffmpeg::format::sample::Type as SampleType;
use ffmpeg::media::Type as MediaType;
use ffmpeg::software::scaling::{Context as ScaleCtx, Flags as ScaleFlags};
use ffmpeg::{Dictionary, Rational};
use tempfile::NamedTempFile;
use tracing::{debug, trace};

use crate::backend::{Decoder, Demuxer, Encoder, Filter, MediaBackend, Muxer};
use crate::media::{
    AudioCodecInfo, AudioEncoderParams, AudioFormat, CodecParams, Frame, ImageEncoderParams,
    MediaKind, MuxOptions, OutputStream, Packet, SeekTarget, StreamDescriptor, VideoFormat,
};
use crate::timebase::{TimeBase, rebase_opt};
use crate::transcode::FilterSpec;
use crate::{Error, Result};

static FFMPEG_INIT: Once = Once::new();

/// Native codec parameters attached to [`CodecParams::native`].
pub struct NativeParams(Mutex<codec::Parameters>);

impl NativeParams {
    fn wrap(params: codec::Parameters) -> Arc<dyn std::any::Any + Send + Sync> {
        Arc::new(Self(Mutex::new(params)))
    }

    fn from_codec_params(params: &CodecParams) -> Result<codec::Parameters> {
        let native = params
            .native
            .as_ref()
            .and_then(|n| n.downcast_ref::<NativeParams>())
            .ok_or_else(|| Error::codec(format!("'{}' has no native parameters", params.codec)))?;
        let guard = native
            .0
            .lock()
            .map_err(|_| Error::msg("native parameters mutex poisoned"))?;
        Ok(guard.clone())
    }
}

/// FFmpeg-backed codec capability.
#[derive(Debug, Clone, Copy)]
pub struct FfmpegBackend {
    _private: (),
}

impl FfmpegBackend {
    /// Initialize FFmpeg (once per process) and create the backend.
    pub fn new() -> Result<Self> {
        let mut init = Ok(());
        FFMPEG_INIT.call_once(|| {
            init = ffmpeg::init().map_err(av);
            ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);
        });
        init?;
        Ok(Self { _private: () })
    }
}

fn av(err: ffmpeg::Error) -> Error {
    Error::codec(err.to_string())
}

fn is_again(err: &ffmpeg::Error) -> bool {
    matches!(err, ffmpeg::Error::Other { errno } if *errno == ffmpeg::error::EAGAIN)
}

fn to_rational(tb: TimeBase) -> Rational {
    Rational::new(tb.num, tb.den)
}

fn to_time_base(r: Rational) -> TimeBase {
    TimeBase::new(r.numerator(), r.denominator())
}

fn layout_name(channels: u16) -> String {
    match channels {
        1 => "mono".to_owned(),
        2 => "stereo".to_owned(),
        6 => "5.1".to_owned(),
        8 => "7.1".to_owned(),
        n => format!("{n}c"),
    }
}

fn sample_by_name(name: &str) -> Result<Sample> {
    let sample = match name {
        "u8" => Sample::U8(SampleType::Packed),
        "u8p" => Sample::U8(SampleType::Planar),
        "s16" => Sample::I16(SampleType::Packed),
        "s16p" => Sample::I16(SampleType::Planar),
        "s32" => Sample::I32(SampleType::Packed),
        "s32p" => Sample::I32(SampleType::Planar),
        "s64" => Sample::I64(SampleType::Packed),
        "s64p" => Sample::I64(SampleType::Planar),
        "flt" => Sample::F32(SampleType::Packed),
        "fltp" => Sample::F32(SampleType::Planar),
        "dbl" => Sample::F64(SampleType::Packed),
        "dblp" => Sample::F64(SampleType::Planar),
        other => return Err(Error::codec(format!("unknown sample format '{other}'"))),
    };
    Ok(sample)
}

fn pixel_by_name(name: &str) -> Result<Pixel> {
    let pixel = match name {
        "yuvj420p" => Pixel::YUVJ420P,
        "yuvj422p" => Pixel::YUVJ422P,
        "yuvj444p" => Pixel::YUVJ444P,
        "yuv420p" => Pixel::YUV420P,
        "rgb24" => Pixel::RGB24,
        other => return Err(Error::codec(format!("unsupported pixel format '{other}'"))),
    };
    Ok(pixel)
}

fn pixel_name(pixel: Pixel) -> String {
    pixel
        .descriptor()
        .map(|d| d.name().to_owned())
        .unwrap_or_default()
}

/// Describe one input stream, reading formats through a throwaway decoder context.
fn describe_stream(stream: &format::stream::Stream<'_>) -> StreamDescriptor {
    let params = stream.parameters();
    let kind = match params.medium() {
        MediaType::Video => MediaKind::Video,
        MediaType::Audio => MediaKind::Audio,
        _ => MediaKind::Other,
    };
    let codec_name = params.id().name().to_owned();

    let mut audio = None;
    let mut video = None;
    if let Ok(ctx) = codec::context::Context::from_parameters(params.clone()) {
        match kind {
            MediaKind::Audio => {
                if let Ok(dec) = ctx.decoder().audio() {
                    let channels = dec.channels() as u16;
                    audio = Some(AudioFormat {
                        sample_rate: dec.rate(),
                        sample_format: dec.format().name().to_owned(),
                        channel_layout: layout_name(channels),
                        channels,
                    });
                }
            }
            MediaKind::Video => {
                if let Ok(dec) = ctx.decoder().video() {
                    video = Some(VideoFormat {
                        width: dec.width(),
                        height: dec.height(),
                        pixel_format: pixel_name(dec.format()),
                    });
                }
            }
            MediaKind::Other => {}
        }
    }

    StreamDescriptor {
        index: stream.index(),
        kind,
        time_base: to_time_base(stream.time_base()),
        codec_params: CodecParams {
            codec: codec_name,
            audio,
            video,
            native: Some(NativeParams::wrap(params)),
        },
    }
}

impl MediaBackend for FfmpegBackend {
    fn open_demuxer(&self, source_ref: &str) -> Result<Box<dyn Demuxer>> {
        let input = format::input(source_ref).map_err(|err| Error::Open {
            source_ref: source_ref.to_owned(),
            reason: err.to_string(),
        })?;
        let streams = input.streams().map(|s| describe_stream(&s)).collect();
        debug!(source = source_ref, format = input.format().name(), "opened input");
        Ok(Box::new(FfmpegDemuxer { input, streams }))
    }

    fn open_decoder(&self, stream: &StreamDescriptor) -> Result<Box<dyn Decoder>> {
        let params = NativeParams::from_codec_params(&stream.codec_params)?;
        let ctx = codec::context::Context::from_parameters(params).map_err(av)?;
        let mut decoder = ctx.decoder();
        decoder.set_packet_time_base(to_rational(stream.time_base));

        let decoder = match stream.kind {
            MediaKind::Audio => FfmpegDecoder::Audio(decoder.audio().map_err(av)?),
            MediaKind::Video => FfmpegDecoder::Video(decoder.video().map_err(av)?),
            MediaKind::Other => {
                return Err(Error::codec(format!(
                    "cannot decode stream {} of kind {}",
                    stream.index, stream.kind
                )));
            }
        };
        Ok(Box::new(decoder))
    }

    fn open_filter(&self, spec: &FilterSpec) -> Result<Box<dyn Filter>> {
        let fail = |reason: String| Error::FilterConfiguration {
            graph: spec.graph.clone(),
            reason,
        };

        let mut graph = filter::Graph::new();
        let args = format!(
            "time_base={}:sample_rate={}:sample_fmt={}:channel_layout={}",
            spec.input_time_base,
            spec.input.sample_rate,
            spec.input.sample_format,
            spec.input.channel_layout
        );
        let abuffer = filter::find("abuffer").ok_or_else(|| fail("no abuffer filter".into()))?;
        let abuffersink =
            filter::find("abuffersink").ok_or_else(|| fail("no abuffersink filter".into()))?;
        graph
            .add(&abuffer, "in", &args)
            .map_err(|e| fail(e.to_string()))?;
        graph
            .add(&abuffersink, "out", "")
            .map_err(|e| fail(e.to_string()))?;
        graph
            .output("in", 0)
            .and_then(|p| p.input("out", 0))
            .and_then(|p| p.parse(&spec.graph))
            .map_err(|e| fail(e.to_string()))?;
        graph.validate().map_err(|e| fail(e.to_string()))?;

        let sink_time_base = {
            let mut sink = graph
                .get("out")
                .ok_or_else(|| fail("sink missing after validate".into()))?;
            // SAFETY: the context belongs to the validated graph, which outlives this call.
            let tb = unsafe { ffi::av_buffersink_get_time_base(sink.as_mut_ptr()) };
            TimeBase::new(tb.num, tb.den)
        };

        debug!(graph = %spec.graph, %sink_time_base, "filter graph ready");
        Ok(Box::new(FfmpegFilter {
            graph,
            sink_time_base,
            output_time_base: TimeBase::per_second(spec.output.sample_rate as i32),
        }))
    }

    fn open_audio_encoder(&self, params: &AudioEncoderParams) -> Result<Box<dyn Encoder>> {
        let codec = encoder::find_by_name(&params.codec)
            .ok_or_else(|| Error::codec(format!("no encoder named '{}'", params.codec)))?;
        let ctx = codec::context::Context::new_with_codec(codec);
        let mut enc = ctx.encoder().audio().map_err(av)?;

        enc.set_rate(params.format.sample_rate as i32);
        enc.set_format(sample_by_name(&params.format.sample_format)?);
        enc.set_time_base(to_rational(params.time_base));
        enc.set_flags(codec::Flags::GLOBAL_HEADER);
        // SAFETY: the context is exclusively owned and not yet opened.
        unsafe {
            ffi::av_channel_layout_default(
                &mut (*enc.as_mut_ptr()).ch_layout,
                i32::from(params.format.channels),
            );
        }

        let opened = enc.open_as(codec).map_err(av)?;
        let frame_size = match opened.frame_size() {
            0 => None,
            n => Some(n as usize),
        };
        let native = codec::Parameters::from(&opened);

        debug!(codec = %params.codec, ?frame_size, "opened audio encoder");
        Ok(Box::new(FfmpegEncoder {
            inner: EncoderKind::Audio(opened),
            time_base: params.time_base,
            frame_size,
            codec_params: CodecParams {
                codec: params.codec.clone(),
                audio: Some(params.format.clone()),
                video: None,
                native: Some(NativeParams::wrap(native)),
            },
        }))
    }

    fn open_image_encoder(&self, params: &ImageEncoderParams) -> Result<Box<dyn Encoder>> {
        let codec = encoder::find_by_name(&params.codec)
            .ok_or_else(|| Error::codec(format!("no encoder named '{}'", params.codec)))?;
        let ctx = codec::context::Context::new_with_codec(codec);
        let mut enc = ctx.encoder().video().map_err(av)?;

        let pixel = pixel_by_name(&params.pixel_format)?;
        enc.set_width(params.width);
        enc.set_height(params.height);
        enc.set_format(pixel);
        enc.set_time_base(to_rational(params.time_base));
        let opened = enc.open_as(codec).map_err(av)?;

        Ok(Box::new(FfmpegEncoder {
            inner: EncoderKind::Image {
                encoder: opened,
                pixel,
                width: params.width,
                height: params.height,
            },
            time_base: params.time_base,
            frame_size: None,
            codec_params: CodecParams {
                codec: params.codec.clone(),
                ..CodecParams::default()
            },
        }))
    }

    fn audio_codec_for(&self, container: &str) -> Result<AudioCodecInfo> {
        let name = CString::new(container).map_err(|e| Error::codec(e.to_string()))?;
        // SAFETY: av_guess_format returns a pointer to a static muxer description or null.
        let id = unsafe {
            let fmt = ffi::av_guess_format(name.as_ptr(), std::ptr::null(), std::ptr::null());
            if fmt.is_null() {
                return Err(Error::codec(format!("unknown container '{container}'")));
            }
            codec::Id::from((*fmt).audio_codec)
        };

        let codec = encoder::find(id)
            .ok_or_else(|| Error::codec(format!("no encoder for {id:?} ({container})")))?;
        let audio = codec.audio().map_err(av)?;
        let sample_formats = audio
            .formats()
            .map(|formats| formats.map(|f| f.name().to_owned()).collect())
            .unwrap_or_default();
        let sample_rates = audio
            .rates()
            .map(|rates| rates.filter(|r| *r > 0).map(|r| r as u32).collect())
            .unwrap_or_default();

        Ok(AudioCodecInfo {
            name: codec.name().to_owned(),
            sample_formats,
            sample_rates,
        })
    }

    fn open_muxer(&self, container: &str, sink: Box<dyn Write + Send>) -> Result<Box<dyn Muxer>> {
        let scratch = NamedTempFile::new()?;
        let output = format::output_as(scratch.path(), container)
            .map_err(|e| Error::MuxerOpen(e.to_string()))?;
        let tail = File::open(scratch.path())?;
        Ok(Box::new(FfmpegMuxer {
            output,
            _scratch: scratch,
            tail,
            sink,
        }))
    }
}

struct FfmpegDemuxer {
    input: format::context::Input,
    streams: Vec<StreamDescriptor>,
}

impl Demuxer for FfmpegDemuxer {
    fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    fn seek(&mut self, target: SeekTarget) -> Result<()> {
        let (stream, ts, flags) = match target {
            SeekTarget::Time(seconds) => (
                -1,
                (seconds * f64::from(ffi::AV_TIME_BASE)) as i64,
                ffi::AVSEEK_FLAG_BACKWARD as i32,
            ),
            SeekTarget::Position(pos) => (-1, pos, ffi::AVSEEK_FLAG_BYTE as i32),
            SeekTarget::Timestamp { stream_index, ts } => (
                stream_index as i32,
                ts,
                ffi::AVSEEK_FLAG_BACKWARD as i32,
            ),
        };

        // SAFETY: the format context is owned by `self.input` and not borrowed elsewhere.
        let ret = unsafe { ffi::av_seek_frame(self.input.as_mut_ptr(), stream, ts, flags) };
        if ret < 0 {
            return Err(Error::Seek {
                target: target.to_string(),
                reason: ffmpeg::Error::from(ret).to_string(),
            });
        }
        Ok(())
    }

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        let mut packet = ffmpeg::Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => return Ok(None),
            Err(err) => return Err(av(err)),
        }

        let position = packet.position();
        Ok(Some(Packet {
            stream_index: packet.stream(),
            pts: packet.pts(),
            dts: packet.dts(),
            duration: packet.duration(),
            position: (position >= 0).then_some(position as i64),
            is_keyframe: packet.is_key(),
            data: packet.data().map(<[u8]>::to_vec).unwrap_or_default(),
        }))
    }
}

fn to_av_packet(packet: &Packet) -> ffmpeg::Packet {
    let mut out = ffmpeg::Packet::copy(&packet.data);
    out.set_stream(packet.stream_index);
    out.set_pts(packet.pts);
    out.set_dts(packet.dts);
    out.set_duration(packet.duration);
    out.set_position(-1);
    if packet.is_keyframe {
        out.set_flags(ffmpeg::packet::Flags::KEY);
    }
    out
}

fn from_av_packet(packet: &ffmpeg::Packet) -> Packet {
    Packet {
        stream_index: 0,
        pts: packet.pts(),
        dts: packet.dts(),
        duration: packet.duration(),
        position: None,
        is_keyframe: packet.is_key(),
        data: packet.data().map(<[u8]>::to_vec).unwrap_or_default(),
    }
}

enum FfmpegDecoder {
    Audio(ffmpeg::decoder::Audio),
    Video(ffmpeg::decoder::Video),
}

impl FfmpegDecoder {
    fn receive(&mut self) -> Result<Vec<Frame>> {
        let mut out = Vec::new();
        loop {
            let (result, frame) = match self {
                FfmpegDecoder::Audio(dec) => {
                    let mut frame = ffmpeg::frame::Audio::empty();
                    let result = dec.receive_frame(&mut frame);
                    let pts = frame.timestamp().or(frame.pts());
                    let samples = frame.samples();
                    (result, Frame::new(pts, samples, frame))
                }
                FfmpegDecoder::Video(dec) => {
                    let mut frame = ffmpeg::frame::Video::empty();
                    let result = dec.receive_frame(&mut frame);
                    let pts = frame.timestamp().or(frame.pts());
                    (result, Frame::new(pts, 0, frame))
                }
            };
            match result {
                Ok(()) => out.push(frame),
                Err(ffmpeg::Error::Eof) => break,
                Err(err) if is_again(&err) => break,
                Err(err) => return Err(av(err)),
            }
        }
        Ok(out)
    }

    fn opened(&mut self) -> &mut ffmpeg::decoder::Opened {
        match self {
            FfmpegDecoder::Audio(dec) => &mut **dec,
            FfmpegDecoder::Video(dec) => &mut **dec,
        }
    }
}

impl Decoder for FfmpegDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<Frame>> {
        let av_packet = to_av_packet(packet);
        match self.opened().send_packet(&av_packet) {
            Ok(()) => {}
            Err(err) if is_again(&err) => {}
            Err(err) => return Err(av(err)),
        }
        self.receive()
    }

    fn flush(&mut self) -> Result<Vec<Frame>> {
        match self.opened().send_eof() {
            Ok(()) | Err(ffmpeg::Error::Eof) => {}
            Err(err) => return Err(av(err)),
        }
        self.receive()
    }
}

struct FfmpegFilter {
    graph: filter::Graph,
    sink_time_base: TimeBase,
    output_time_base: TimeBase,
}

impl FfmpegFilter {
    fn pull(&mut self) -> Result<Vec<Frame>> {
        let mut out = Vec::new();
        let mut sink = self
            .graph
            .get("out")
            .ok_or_else(|| Error::codec("filter sink missing"))?;
        loop {
            let mut frame = ffmpeg::frame::Audio::empty();
            match sink.sink().frame(&mut frame) {
                Ok(()) => {
                    let pts = rebase_opt(frame.pts(), self.sink_time_base, self.output_time_base);
                    frame.set_pts(pts);
                    let samples = frame.samples();
                    out.push(Frame::new(pts, samples, frame));
                }
                Err(ffmpeg::Error::Eof) => break,
                Err(err) if is_again(&err) => break,
                Err(err) => return Err(av(err)),
            }
        }
        Ok(out)
    }
}

impl Filter for FfmpegFilter {
    fn push(&mut self, frame: Frame) -> Result<Vec<Frame>> {
        let audio = frame
            .payload
            .downcast::<ffmpeg::frame::Audio>()
            .map_err(|_| Error::codec("filter expects decoded audio frames"))?;
        self.graph
            .get("in")
            .ok_or_else(|| Error::codec("filter source missing"))?
            .source()
            .add(&audio)
            .map_err(av)?;
        self.pull()
    }

    fn flush(&mut self) -> Result<Vec<Frame>> {
        self.graph
            .get("in")
            .ok_or_else(|| Error::codec("filter source missing"))?
            .source()
            .flush()
            .map_err(av)?;
        self.pull()
    }
}

enum EncoderKind {
    Audio(ffmpeg::encoder::Audio),
    Image {
        encoder: ffmpeg::encoder::Video,
        pixel: Pixel,
        width: u32,
        height: u32,
    },
}

struct FfmpegEncoder {
    inner: EncoderKind,
    time_base: TimeBase,
    frame_size: Option<usize>,
    codec_params: CodecParams,
}

impl FfmpegEncoder {
    fn opened(&mut self) -> &mut ffmpeg::encoder::Encoder {
        match &mut self.inner {
            EncoderKind::Audio(enc) => &mut **enc,
            EncoderKind::Image { encoder, .. } => &mut **encoder,
        }
    }

    fn receive(&mut self) -> Result<Vec<Packet>> {
        let mut out = Vec::new();
        loop {
            let mut packet = ffmpeg::Packet::empty();
            match self.opened().receive_packet(&mut packet) {
                Ok(()) => out.push(from_av_packet(&packet)),
                Err(ffmpeg::Error::Eof) => break,
                Err(err) if is_again(&err) => break,
                Err(err) => return Err(av(err)),
            }
        }
        Ok(out)
    }
}

impl Encoder for FfmpegEncoder {
    fn encode(&mut self, frame: Frame) -> Result<Vec<Packet>> {
        match &mut self.inner {
            EncoderKind::Audio(enc) => {
                let audio = frame
                    .payload
                    .downcast::<ffmpeg::frame::Audio>()
                    .map_err(|_| Error::codec("audio encoder expects audio frames"))?;
                enc.send_frame(&audio).map_err(av)?;
            }
            EncoderKind::Image {
                encoder,
                pixel,
                width,
                height,
            } => {
                let picture = frame
                    .payload
                    .downcast::<ffmpeg::frame::Video>()
                    .map_err(|_| Error::codec("image encoder expects video frames"))?;
                let mut scaler = ScaleCtx::get(
                    picture.format(),
                    picture.width(),
                    picture.height(),
                    *pixel,
                    *width,
                    *height,
                    ScaleFlags::BILINEAR,
                )
                .map_err(av)?;
                let mut converted = ffmpeg::frame::Video::empty();
                scaler.run(&picture, &mut converted).map_err(av)?;
                converted.set_pts(Some(0));
                encoder.send_frame(&converted).map_err(av)?;
            }
        }
        self.receive()
    }

    fn flush(&mut self) -> Result<Vec<Packet>> {
        match self.opened().send_eof() {
            Ok(()) | Err(ffmpeg::Error::Eof) => {}
            Err(err) => return Err(av(err)),
        }
        self.receive()
    }

    fn time_base(&self) -> TimeBase {
        self.time_base
    }

    fn frame_size(&self) -> Option<usize> {
        self.frame_size
    }

    fn codec_params(&self) -> CodecParams {
        self.codec_params.clone()
    }
}

struct FfmpegMuxer {
    output: format::context::Output,
    _scratch: NamedTempFile,
    tail: File,
    sink: Box<dyn Write + Send>,
}

impl FfmpegMuxer {
    /// Forward whatever FFmpeg appended to the scratch file since the last call.
    fn forward(&mut self) -> Result<()> {
        let mut chunk = Vec::new();
        self.tail.read_to_end(&mut chunk)?;
        if !chunk.is_empty() {
            trace!(bytes = chunk.len(), "forward muxed bytes");
            self.sink.write_all(&chunk)?;
        }
        Ok(())
    }
}

impl Muxer for FfmpegMuxer {
    fn add_stream(&mut self, stream: &OutputStream) -> Result<usize> {
        let params = NativeParams::from_codec_params(&stream.codec_params)?;
        let mut out = self
            .output
            .add_stream(encoder::find(codec::Id::None))
            .map_err(|e| Error::MuxerOpen(e.to_string()))?;
        out.set_parameters(params);
        out.set_time_base(to_rational(stream.time_base));
        // SAFETY: codecpar is allocated by avformat_new_stream and owned by the stream.
        unsafe {
            (*(*out.as_mut_ptr()).codecpar).codec_tag = 0;
        }
        Ok(out.index())
    }

    fn open_io(&mut self) -> Result<()> {
        // SAFETY: output_as opened `pb`; we only clear its seekable flag.
        unsafe {
            let pb = (*self.output.as_mut_ptr()).pb;
            if pb.is_null() {
                return Err(Error::MuxerOpen("output has no IO context".into()));
            }
            (*pb).seekable = 0;
        }
        Ok(())
    }

    fn write_header(&mut self, options: &MuxOptions) -> Result<()> {
        let mut dict = Dictionary::new();
        for (key, value) in &options.entries {
            dict.set(key, value);
        }
        self.output
            .write_header_with(dict)
            .map_err(|e| Error::MuxerOpen(e.to_string()))?;
        self.forward()
    }

    fn stream_time_base(&self, index: usize) -> Option<TimeBase> {
        self.output.stream(index).map(|s| to_time_base(s.time_base()))
    }

    fn write_packet(&mut self, packet: Packet) -> Result<()> {
        to_av_packet(&packet)
            .write_interleaved(&mut self.output)
            .map_err(av)?;
        self.forward()
    }

    fn write_trailer(&mut self) -> Result<()> {
        self.output
            .write_trailer()
            .map_err(|e| Error::MuxerFinalize(e.to_string()))?;
        self.forward()?;
        self.sink.flush()?;
        Ok(())
    }
}
