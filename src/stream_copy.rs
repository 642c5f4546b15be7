use tracing::trace;

use crate::Result;
use crate::backend::Muxer;
use crate::media::{Packet, StreamDescriptor};
use crate::timebase::TimeBase;

/// Forwards compressed packets from one source stream to one output stream without decoding.
///
/// Only timing and the stream index change; the payload (and with it the keyframe structure)
/// is passed through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamCopy {
    source_index: usize,
    source_time_base: TimeBase,
    dest_index: usize,
    dest_time_base: TimeBase,
}

impl StreamCopy {
    pub fn new(source: &StreamDescriptor, dest_index: usize, dest_time_base: TimeBase) -> Self {
        Self {
            source_index: source.index,
            source_time_base: source.time_base,
            dest_index,
            dest_time_base,
        }
    }

    pub fn source_index(&self) -> usize {
        self.source_index
    }

    /// Rebase and retarget `packet`, or `None` when it belongs to another stream.
    pub fn retarget(&self, packet: Packet) -> Option<Packet> {
        if packet.stream_index != self.source_index {
            return None;
        }
        Some(packet.retarget(self.dest_index, self.source_time_base, self.dest_time_base))
    }

    /// Write `packet` to the muxer if it belongs to the source stream.
    ///
    /// Returns whether the packet was written.
    pub fn copy(&self, packet: Packet, muxer: &mut dyn Muxer) -> Result<bool> {
        let Some(out) = self.retarget(packet) else {
            return Ok(false);
        };

        trace!(
            stream = out.stream_index,
            pts = ?out.pts,
            dts = ?out.dts,
            key = out.is_keyframe,
            "copy packet"
        );
        muxer.write_packet(out)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{CodecParams, MediaKind, MuxOptions, OutputStream};

    #[derive(Default)]
    struct RecordingMuxer {
        written: Vec<Packet>,
    }

    impl Muxer for RecordingMuxer {
        fn add_stream(&mut self, _stream: &OutputStream) -> Result<usize> {
            Ok(0)
        }
        fn open_io(&mut self) -> Result<()> {
            Ok(())
        }
        fn write_header(&mut self, _options: &MuxOptions) -> Result<()> {
            Ok(())
        }
        fn stream_time_base(&self, _index: usize) -> Option<TimeBase> {
            None
        }
        fn write_packet(&mut self, packet: Packet) -> Result<()> {
            self.written.push(packet);
            Ok(())
        }
        fn write_trailer(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn video_source() -> StreamDescriptor {
        StreamDescriptor {
            index: 2,
            kind: MediaKind::Video,
            time_base: TimeBase::per_second(90_000),
            codec_params: CodecParams::default(),
        }
    }

    fn packet(stream_index: usize, pts: i64) -> Packet {
        Packet {
            stream_index,
            pts: Some(pts),
            dts: Some(pts),
            duration: 3600,
            position: None,
            is_keyframe: true,
            data: vec![0xAB; 4],
        }
    }

    #[test]
    fn copies_matching_stream_with_rebased_timing() -> anyhow::Result<()> {
        let copy = StreamCopy::new(&video_source(), 0, TimeBase::per_second(16_000));
        let mut muxer = RecordingMuxer::default();

        assert!(copy.copy(packet(2, 90_000), &mut muxer)?);

        let out = &muxer.written[0];
        assert_eq!(out.stream_index, 0);
        assert_eq!(out.pts, Some(16_000));
        assert_eq!(out.duration, 640);
        assert!(out.is_keyframe);
        assert_eq!(out.data, vec![0xAB; 4]);
        Ok(())
    }

    #[test]
    fn ignores_other_streams() -> anyhow::Result<()> {
        let copy = StreamCopy::new(&video_source(), 0, TimeBase::per_second(16_000));
        let mut muxer = RecordingMuxer::default();

        assert!(!copy.copy(packet(1, 90_000), &mut muxer)?);
        assert!(muxer.written.is_empty());
        Ok(())
    }
}
