// src/backends/scripted.rs

//! In-memory media backend driven by a synthetic packet script.
//!
//! Nothing here touches a real codec. Packets carry filler bytes, decoders and encoders pass
//! timing through (optionally holding frames back to imitate codec delay), and the muxer writes
//! packet payloads straight into its sink. Every capability call is appended to a shared
//! [`Journal`] so tests can assert on call order and on exactly what reached the muxer.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::backend::{Decoder, Demuxer, Encoder, Filter, MediaBackend, Muxer};
use crate::media::{
    AudioCodecInfo, AudioEncoderParams, AudioFormat, CodecParams, Frame, ImageEncoderParams,
    MediaKind, MuxOptions, OutputStream, Packet, SeekTarget, StreamDescriptor, VideoFormat,
};
use crate::timebase::{TimeBase, rebase};
use crate::transcode::FilterSpec;
use crate::{Error, Result};

/// One recorded capability call.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    OpenDemuxer(String),
    Seek(SeekTarget),
    OpenDecoder { stream: usize },
    Decode { stream: usize },
    DecoderFlush { stream: usize },
    OpenFilter { graph: String },
    FilterPush,
    FilterFlush,
    OpenEncoder { codec: String },
    Encode,
    EncoderFlush,
    OpenMuxer { container: String },
    AddStream { kind: MediaKind, time_base: TimeBase },
    OpenIo,
    WriteHeader(MuxOptions),
    WritePacket {
        stream: usize,
        pts: Option<i64>,
        dts: Option<i64>,
        key: bool,
    },
    WriteTrailer,
}

/// Shared, append-only call log.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Event>>>);

impl Journal {
    fn record(&self, event: Event) {
        if let Ok(mut events) = self.0.lock() {
            events.push(event);
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }

    /// `(pts, dts, key)` of every packet written to output stream `stream`, in write order.
    pub fn written(&self, stream: usize) -> Vec<(Option<i64>, Option<i64>, bool)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::WritePacket {
                    stream: s,
                    pts,
                    dts,
                    key,
                } if s == stream => Some((pts, dts, key)),
                _ => None,
            })
            .collect()
    }
}

/// Stream table plus packets in container order.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    pub streams: Vec<StreamDescriptor>,
    pub packets: Vec<Packet>,
}

/// Picture payload produced by the scripted video decoder.
#[derive(Debug, Clone, Copy)]
pub struct ScriptedPicture {
    pub pts: Option<i64>,
}

/// Sample payload produced by the scripted audio decoder and filter.
#[derive(Debug, Clone, Copy)]
pub struct ScriptedSamples {
    pub pts: Option<i64>,
    pub samples: usize,
}

const VIDEO_FRAME_MS: i64 = 40;
const AUDIO_RATE: i32 = 48_000;
const AUDIO_FRAME: i64 = 1024;
const PACKET_BYTES: usize = 64;

impl ScriptedSource {
    /// A 25 fps video stream (time base 1/1000) with a keyframe every `keyframe_every_ms`,
    /// interleaved with a 48 kHz stereo audio stream (time base 1/48000).
    pub fn av(duration_ms: i64, keyframe_every_ms: i64) -> Self {
        Self::build(duration_ms, keyframe_every_ms, true, true)
    }

    /// Video only.
    pub fn video_only(duration_ms: i64, keyframe_every_ms: i64) -> Self {
        Self::build(duration_ms, keyframe_every_ms, true, false)
    }

    /// Audio only.
    pub fn audio_only(duration_ms: i64) -> Self {
        Self::build(duration_ms, 1, false, true)
    }

    fn build(duration_ms: i64, keyframe_every_ms: i64, video: bool, audio: bool) -> Self {
        let mut streams = Vec::new();
        if video {
            streams.push(video_stream(streams.len()));
        }
        if audio {
            streams.push(audio_stream(streams.len()));
        }

        // (seconds, packet) pairs, merged by presentation time.
        let mut timed: Vec<(f64, Packet)> = Vec::new();
        if video {
            let index = 0;
            let mut pts = 0;
            while pts < duration_ms {
                timed.push((
                    pts as f64 / 1000.0,
                    Packet {
                        stream_index: index,
                        pts: Some(pts),
                        dts: Some(pts),
                        duration: VIDEO_FRAME_MS,
                        position: None,
                        is_keyframe: keyframe_every_ms > 0 && pts % keyframe_every_ms == 0,
                        data: vec![0x65; PACKET_BYTES],
                    },
                ));
                pts += VIDEO_FRAME_MS;
            }
        }
        if audio {
            let index = streams.len() - 1;
            let end = duration_ms * i64::from(AUDIO_RATE) / 1000;
            let mut pts = 0;
            while pts < end {
                timed.push((
                    pts as f64 / f64::from(AUDIO_RATE),
                    Packet {
                        stream_index: index,
                        pts: Some(pts),
                        dts: Some(pts),
                        duration: AUDIO_FRAME,
                        position: None,
                        is_keyframe: true,
                        data: vec![0x21; PACKET_BYTES / 2],
                    },
                ));
                pts += AUDIO_FRAME;
            }
        }
        timed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.stream_index.cmp(&b.1.stream_index)));

        let mut position = 0i64;
        let packets = timed
            .into_iter()
            .map(|(_, mut p)| {
                p.position = Some(position);
                position += p.data.len() as i64;
                p
            })
            .collect();

        Self { streams, packets }
    }

    /// Drop the keyframe flag from every packet.
    pub fn without_keyframes(mut self) -> Self {
        for p in &mut self.packets {
            p.is_keyframe = false;
        }
        self
    }

    fn video_index(&self) -> Option<usize> {
        self.streams
            .iter()
            .find(|s| s.kind == MediaKind::Video)
            .map(|s| s.index)
    }

    fn time_base_of(&self, stream_index: usize) -> Option<TimeBase> {
        self.streams
            .iter()
            .find(|s| s.index == stream_index)
            .map(|s| s.time_base)
    }

    /// End of the last packet, in seconds.
    fn duration_seconds(&self) -> f64 {
        self.packets
            .iter()
            .filter_map(|p| {
                let tb = self.time_base_of(p.stream_index)?;
                Some(tb.to_seconds(p.pts? + p.duration))
            })
            .fold(0.0, f64::max)
    }
}

fn video_stream(index: usize) -> StreamDescriptor {
    StreamDescriptor {
        index,
        kind: MediaKind::Video,
        time_base: TimeBase::per_second(1000),
        codec_params: CodecParams {
            codec: "h264".into(),
            video: Some(VideoFormat {
                width: 1280,
                height: 720,
                pixel_format: "yuv420p".into(),
            }),
            ..CodecParams::default()
        },
    }
}

fn audio_stream(index: usize) -> StreamDescriptor {
    StreamDescriptor {
        index,
        kind: MediaKind::Audio,
        time_base: TimeBase::per_second(AUDIO_RATE),
        codec_params: CodecParams {
            codec: "mp3".into(),
            audio: Some(AudioFormat {
                sample_rate: AUDIO_RATE as u32,
                sample_format: "s16p".into(),
                channel_layout: "stereo".into(),
                channels: 2,
            }),
            ..CodecParams::default()
        },
    }
}

/// Knobs for imitating codec and container behavior.
#[derive(Debug, Clone, Default)]
pub struct ScriptOptions {
    /// Frames every decoder holds back until flushed.
    pub decoder_delay: usize,
    /// Packets every encoder holds back until flushed.
    pub encoder_delay: usize,
    /// Make `open_demuxer` fail with this reason.
    pub fail_open: Option<String>,
    /// Make `open_filter` reject every graph.
    pub fail_filter: bool,
    /// Make `write_trailer` fail.
    pub fail_trailer: bool,
    /// Time base the muxer reports for its video stream after the header, if it overrides the
    /// requested one.
    pub muxer_video_time_base: Option<TimeBase>,
}

/// A [`MediaBackend`] serving one [`ScriptedSource`] for any source reference.
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    source: Arc<ScriptedSource>,
    options: ScriptOptions,
    journal: Journal,
}

impl ScriptedBackend {
    pub fn new(source: ScriptedSource) -> Self {
        Self {
            source: Arc::new(source),
            options: ScriptOptions::default(),
            journal: Journal::default(),
        }
    }

    pub fn with_options(mut self, options: ScriptOptions) -> Self {
        self.options = options;
        self
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }
}

impl MediaBackend for ScriptedBackend {
    fn open_demuxer(&self, source_ref: &str) -> Result<Box<dyn Demuxer>> {
        self.journal.record(Event::OpenDemuxer(source_ref.to_owned()));
        if let Some(reason) = &self.options.fail_open {
            return Err(Error::Open {
                source_ref: source_ref.to_owned(),
                reason: reason.clone(),
            });
        }
        Ok(Box::new(ScriptedDemuxer {
            source: self.source.clone(),
            cursor: 0,
            journal: self.journal.clone(),
        }))
    }

    fn open_decoder(&self, stream: &StreamDescriptor) -> Result<Box<dyn Decoder>> {
        self.journal.record(Event::OpenDecoder {
            stream: stream.index,
        });
        Ok(Box::new(ScriptedDecoder {
            stream: stream.index,
            kind: stream.kind,
            delay: self.options.decoder_delay,
            held: VecDeque::new(),
            journal: self.journal.clone(),
        }))
    }

    fn open_filter(&self, spec: &FilterSpec) -> Result<Box<dyn Filter>> {
        self.journal.record(Event::OpenFilter {
            graph: spec.graph.clone(),
        });
        if self.options.fail_filter {
            return Err(Error::FilterConfiguration {
                graph: spec.graph.clone(),
                reason: "scripted filter rejection".into(),
            });
        }
        Ok(Box::new(ScriptedFilter {
            input_time_base: spec.input_time_base,
            output_time_base: TimeBase::per_second(spec.output.sample_rate as i32),
            input_rate: spec.input.sample_rate,
            output_rate: spec.output.sample_rate,
            frame_size: spec.frame_size,
            pending: 0,
            next_pts: None,
            journal: self.journal.clone(),
        }))
    }

    fn open_audio_encoder(&self, params: &AudioEncoderParams) -> Result<Box<dyn Encoder>> {
        self.journal.record(Event::OpenEncoder {
            codec: params.codec.clone(),
        });
        Ok(Box::new(ScriptedEncoder {
            time_base: params.time_base,
            frame_size: (params.codec == "aac").then_some(AUDIO_FRAME as usize),
            codec_params: CodecParams {
                codec: params.codec.clone(),
                audio: Some(params.format.clone()),
                ..CodecParams::default()
            },
            delay: self.options.encoder_delay,
            held: VecDeque::new(),
            image: false,
            journal: self.journal.clone(),
        }))
    }

    fn open_image_encoder(&self, params: &ImageEncoderParams) -> Result<Box<dyn Encoder>> {
        self.journal.record(Event::OpenEncoder {
            codec: params.codec.clone(),
        });
        Ok(Box::new(ScriptedEncoder {
            time_base: params.time_base,
            frame_size: None,
            codec_params: CodecParams {
                codec: params.codec.clone(),
                video: Some(VideoFormat {
                    width: params.width,
                    height: params.height,
                    pixel_format: params.pixel_format.clone(),
                }),
                ..CodecParams::default()
            },
            delay: self.options.encoder_delay,
            held: VecDeque::new(),
            image: true,
            journal: self.journal.clone(),
        }))
    }

    fn audio_codec_for(&self, container: &str) -> Result<AudioCodecInfo> {
        match container {
            "mp4" | "mov" => Ok(AudioCodecInfo {
                name: "aac".into(),
                sample_formats: vec!["fltp".into()],
                sample_rates: vec![96_000, 88_200, 64_000, 48_000, 44_100, 32_000, 24_000],
            }),
            other => Err(Error::codec(format!("no default audio codec for '{other}'"))),
        }
    }

    fn open_muxer(&self, container: &str, sink: Box<dyn Write + Send>) -> Result<Box<dyn Muxer>> {
        self.journal.record(Event::OpenMuxer {
            container: container.to_owned(),
        });
        Ok(Box::new(ScriptedMuxer {
            sink,
            streams: Vec::new(),
            header_written: false,
            video_time_base: self.options.muxer_video_time_base,
            fail_trailer: self.options.fail_trailer,
            journal: self.journal.clone(),
        }))
    }
}

struct ScriptedDemuxer {
    source: Arc<ScriptedSource>,
    cursor: usize,
    journal: Journal,
}

impl ScriptedDemuxer {
    /// Packet index of the last video keyframe at or before `seconds`, else the first one.
    fn keyframe_before(&self, seconds: f64) -> Result<usize> {
        let video = self
            .source
            .video_index()
            .ok_or_else(|| Error::msg("no video stream to seek on"))?;
        let tb = self
            .source
            .time_base_of(video)
            .ok_or_else(|| Error::msg("video stream has no time base"))?;

        let keyframes = self.source.packets.iter().enumerate().filter(|(_, p)| {
            p.stream_index == video && p.is_keyframe && p.pts.is_some()
        });

        let mut first = None;
        let mut best = None;
        for (i, p) in keyframes {
            first.get_or_insert(i);
            if p.pts.is_some_and(|pts| tb.to_seconds(pts) <= seconds) {
                best = Some(i);
            }
        }
        best.or(first)
            .ok_or_else(|| Error::msg("no keyframe to seek to"))
    }
}

impl Demuxer for ScriptedDemuxer {
    fn streams(&self) -> &[StreamDescriptor] {
        &self.source.streams
    }

    fn seek(&mut self, target: SeekTarget) -> Result<()> {
        self.journal.record(Event::Seek(target));
        let out_of_range = |why: &str| Error::Seek {
            target: target.to_string(),
            reason: why.to_owned(),
        };

        self.cursor = match target {
            SeekTarget::Time(seconds) => {
                if !(0.0..=self.source.duration_seconds()).contains(&seconds) {
                    return Err(out_of_range("time out of range"));
                }
                self.keyframe_before(seconds)?
            }
            SeekTarget::Position(pos) => {
                if pos < 0 {
                    return Err(out_of_range("negative byte position"));
                }
                self.source
                    .packets
                    .iter()
                    .position(|p| p.position.is_some_and(|at| at >= pos))
                    .unwrap_or(self.source.packets.len())
            }
            SeekTarget::Timestamp { stream_index, ts } => {
                let tb = self
                    .source
                    .time_base_of(stream_index)
                    .ok_or_else(|| out_of_range("no such stream"))?;
                let seconds = tb.to_seconds(ts);
                if seconds < 0.0 || seconds > self.source.duration_seconds() {
                    return Err(out_of_range("timestamp out of range"));
                }
                self.keyframe_before(seconds)?
            }
        };
        Ok(())
    }

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        let packet = self.source.packets.get(self.cursor).cloned();
        if packet.is_some() {
            self.cursor += 1;
        }
        Ok(packet)
    }
}

struct ScriptedDecoder {
    stream: usize,
    kind: MediaKind,
    delay: usize,
    held: VecDeque<Frame>,
    journal: Journal,
}

impl Decoder for ScriptedDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<Frame>> {
        self.journal.record(Event::Decode {
            stream: self.stream,
        });
        let frame = match self.kind {
            MediaKind::Audio => {
                let samples = packet.duration.max(0) as usize;
                Frame::new(
                    packet.pts,
                    samples,
                    ScriptedSamples {
                        pts: packet.pts,
                        samples,
                    },
                )
            }
            _ => Frame::new(packet.pts, 0, ScriptedPicture { pts: packet.pts }),
        };
        self.held.push_back(frame);

        let mut out = Vec::new();
        while self.held.len() > self.delay {
            out.extend(self.held.pop_front());
        }
        Ok(out)
    }

    fn flush(&mut self) -> Result<Vec<Frame>> {
        self.journal.record(Event::DecoderFlush {
            stream: self.stream,
        });
        Ok(self.held.drain(..).collect())
    }
}

/// Resamples by count and regroups into fixed-size frames.
struct ScriptedFilter {
    input_time_base: TimeBase,
    output_time_base: TimeBase,
    input_rate: u32,
    output_rate: u32,
    frame_size: Option<usize>,
    pending: usize,
    next_pts: Option<i64>,
    journal: Journal,
}

impl ScriptedFilter {
    fn emit(&mut self, samples: usize) -> Frame {
        let pts = self.next_pts;
        self.next_pts = pts.map(|p| p + samples as i64);
        self.pending -= samples;
        Frame::new(pts, samples, ScriptedSamples { pts, samples })
    }
}

impl Filter for ScriptedFilter {
    fn push(&mut self, frame: Frame) -> Result<Vec<Frame>> {
        self.journal.record(Event::FilterPush);
        if frame.payload.downcast_ref::<ScriptedSamples>().is_none() {
            return Err(Error::codec("filter received a non-audio frame"));
        }

        if self.next_pts.is_none() {
            self.next_pts = frame
                .pts
                .map(|pts| rebase(pts, self.input_time_base, self.output_time_base));
        }
        self.pending += frame.samples * self.output_rate as usize / self.input_rate.max(1) as usize;

        let mut out = Vec::new();
        match self.frame_size {
            Some(n) => {
                while self.pending >= n {
                    out.push(self.emit(n));
                }
            }
            None if self.pending > 0 => {
                let all = self.pending;
                out.push(self.emit(all));
            }
            None => {}
        }
        Ok(out)
    }

    fn flush(&mut self) -> Result<Vec<Frame>> {
        self.journal.record(Event::FilterFlush);
        if self.pending == 0 {
            return Ok(Vec::new());
        }
        let rest = self.pending;
        Ok(vec![self.emit(rest)])
    }
}

struct ScriptedEncoder {
    time_base: TimeBase,
    frame_size: Option<usize>,
    codec_params: CodecParams,
    delay: usize,
    held: VecDeque<Packet>,
    image: bool,
    journal: Journal,
}

impl ScriptedEncoder {
    fn packet_for(&self, frame: &Frame) -> Result<Packet> {
        if self.image {
            let picture = frame
                .payload
                .downcast_ref::<ScriptedPicture>()
                .ok_or_else(|| Error::codec("image encoder received a non-picture frame"))?;
            let mut data = vec![0xFF, 0xD8];
            data.extend(format!("scripted still pts={:?}", picture.pts).into_bytes());
            data.extend([0xFF, 0xD9]);
            return Ok(Packet {
                stream_index: 0,
                pts: Some(0),
                dts: Some(0),
                duration: 1,
                position: None,
                is_keyframe: true,
                data,
            });
        }

        let samples = frame
            .payload
            .downcast_ref::<ScriptedSamples>()
            .ok_or_else(|| Error::codec("audio encoder received a non-audio frame"))?;
        Ok(Packet {
            stream_index: 0,
            pts: samples.pts,
            dts: samples.pts,
            duration: samples.samples as i64,
            position: None,
            is_keyframe: true,
            data: vec![0xAA; 16],
        })
    }
}

impl Encoder for ScriptedEncoder {
    fn encode(&mut self, frame: Frame) -> Result<Vec<Packet>> {
        self.journal.record(Event::Encode);
        let packet = self.packet_for(&frame)?;
        self.held.push_back(packet);

        let mut out = Vec::new();
        while self.held.len() > self.delay {
            out.extend(self.held.pop_front());
        }
        Ok(out)
    }

    fn flush(&mut self) -> Result<Vec<Packet>> {
        self.journal.record(Event::EncoderFlush);
        Ok(self.held.drain(..).collect())
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

struct ScriptedMuxer {
    sink: Box<dyn Write + Send>,
    streams: Vec<OutputStream>,
    header_written: bool,
    video_time_base: Option<TimeBase>,
    fail_trailer: bool,
    journal: Journal,
}

impl Muxer for ScriptedMuxer {
    fn add_stream(&mut self, stream: &OutputStream) -> Result<usize> {
        if self.header_written {
            return Err(Error::MuxerOpen("stream added after header".into()));
        }
        self.journal.record(Event::AddStream {
            kind: stream.kind,
            time_base: stream.time_base,
        });
        self.streams.push(stream.clone());
        Ok(self.streams.len() - 1)
    }

    fn open_io(&mut self) -> Result<()> {
        self.journal.record(Event::OpenIo);
        Ok(())
    }

    fn write_header(&mut self, options: &MuxOptions) -> Result<()> {
        self.journal.record(Event::WriteHeader(options.clone()));
        if self.streams.is_empty() {
            return Err(Error::MuxerOpen("no output streams".into()));
        }
        if let Some(tb) = self.video_time_base {
            for s in self.streams.iter_mut().filter(|s| s.kind == MediaKind::Video) {
                s.time_base = tb;
            }
        }
        self.sink.write_all(b"ftyp")?;
        self.header_written = true;
        Ok(())
    }

    fn stream_time_base(&self, index: usize) -> Option<TimeBase> {
        self.streams.get(index).map(|s| s.time_base)
    }

    fn write_packet(&mut self, packet: Packet) -> Result<()> {
        if !self.header_written {
            return Err(Error::codec("packet written before header"));
        }
        if packet.stream_index >= self.streams.len() {
            return Err(Error::codec(format!(
                "packet for unknown output stream {}",
                packet.stream_index
            )));
        }
        self.journal.record(Event::WritePacket {
            stream: packet.stream_index,
            pts: packet.pts,
            dts: packet.dts,
            key: packet.is_keyframe,
        });
        self.sink.write_all(&packet.data)?;
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<()> {
        self.journal.record(Event::WriteTrailer);
        if self.fail_trailer {
            return Err(Error::MuxerFinalize("scripted trailer failure".into()));
        }
        self.sink.write_all(b"mfra")?;
        self.sink.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn av_source_interleaves_by_time() {
        let source = ScriptedSource::av(2_000, 1_000);
        assert_eq!(source.streams.len(), 2);
        assert_eq!(source.streams[0].kind, MediaKind::Video);
        assert_eq!(source.streams[1].kind, MediaKind::Audio);

        let mut last = 0.0;
        for p in &source.packets {
            let tb = source.time_base_of(p.stream_index).expect("stream");
            let at = tb.to_seconds(p.pts.expect("pts"));
            assert!(at >= last, "packets out of order at {at}");
            last = at;
        }

        let keyframes: Vec<i64> = source
            .packets
            .iter()
            .filter(|p| p.stream_index == 0 && p.is_keyframe)
            .filter_map(|p| p.pts)
            .collect();
        assert_eq!(keyframes, vec![0, 1_000]);
    }

    #[test]
    fn time_seek_lands_on_preceding_keyframe() -> anyhow::Result<()> {
        let backend = ScriptedBackend::new(ScriptedSource::av(10_000, 2_000));
        let mut demuxer = backend.open_demuxer("x")?;

        demuxer.seek(SeekTarget::Time(5.0))?;
        let first = demuxer.read_packet()?.expect("packet");
        assert_eq!(first.stream_index, 0);
        assert_eq!(first.pts, Some(4_000));
        assert!(first.is_keyframe);

        assert!(demuxer.seek(SeekTarget::Time(60.0)).is_err());
        Ok(())
    }

    #[test]
    fn decoder_delay_holds_frames_until_flush() -> anyhow::Result<()> {
        let source = ScriptedSource::video_only(1_000, 1_000);
        let backend = ScriptedBackend::new(source.clone()).with_options(ScriptOptions {
            decoder_delay: 2,
            ..ScriptOptions::default()
        });
        let mut decoder = backend.open_decoder(&source.streams[0])?;

        assert!(decoder.decode(&source.packets[0])?.is_empty());
        assert!(decoder.decode(&source.packets[1])?.is_empty());
        assert_eq!(decoder.decode(&source.packets[2])?.len(), 1);
        assert_eq!(decoder.flush()?.len(), 2);
        Ok(())
    }

    #[test]
    fn filter_regroups_into_frame_size() -> anyhow::Result<()> {
        let source = ScriptedSource::audio_only(1_000);
        let format = source.streams[0].codec_params.audio.clone().expect("audio");
        let spec = FilterSpec::audio_reformat(&source.streams[0], &format, Some(1000))?;
        let backend = ScriptedBackend::new(source);
        let mut filter = backend.open_filter(&spec)?;

        let out = filter.push(Frame::new(Some(0), 1024, ScriptedSamples { pts: Some(0), samples: 1024 }))?;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].samples, 1000);

        let rest = filter.flush()?;
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].samples, 24);
        assert_eq!(rest[0].pts, Some(1000));
        Ok(())
    }
}
