//! Pull-based scan over a container's video keyframes.

use serde::Serialize;
use tracing::trace;

use crate::Result;
use crate::container::ContainerSession;

/// One video keyframe as seen by the demuxer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Keyframe {
    pub position: Option<i64>,
    pub duration: i64,
    pub pts: i64,
    pub dts: Option<i64>,
}

/// Single-pass iterator over the keyframes of the primary video stream.
///
/// It consumes the session's read cursor; to scan again, seek the session back to the start
/// and build a new scanner. Keyframes without a pts cannot be segment boundaries and are
/// skipped.
pub struct KeyframeScanner<'a> {
    session: &'a mut ContainerSession,
    video_index: usize,
    stream_end: Option<i64>,
    done: bool,
}

impl<'a> KeyframeScanner<'a> {
    /// Scan from the session's current read position.
    pub fn new(session: &'a mut ContainerSession) -> Result<Self> {
        let video_index = session.video_stream()?.index;
        Ok(Self {
            session,
            video_index,
            stream_end: None,
            done: false,
        })
    }

    /// Largest `pts + duration` over every video packet read so far.
    ///
    /// After the iterator is exhausted this is the end of the video stream.
    pub fn stream_end(&self) -> Option<i64> {
        self.stream_end
    }
}

impl Iterator for KeyframeScanner<'_> {
    type Item = Result<Keyframe>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let packet = match self.session.read_next() {
                Ok(Some(packet)) => packet,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };

            if packet.stream_index != self.video_index {
                continue;
            }
            let Some(pts) = packet.pts else {
                continue;
            };

            let end = pts.saturating_add(packet.duration.max(0));
            self.stream_end = Some(self.stream_end.map_or(end, |cur| cur.max(end)));

            if packet.is_keyframe {
                trace!(pts, position = ?packet.position, "keyframe");
                return Some(Ok(Keyframe {
                    position: packet.position,
                    duration: packet.duration,
                    pts,
                    dts: packet.dts,
                }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::scripted::{ScriptedBackend, ScriptedSource};

    fn session(source: ScriptedSource) -> Result<ContainerSession> {
        ContainerSession::open(&ScriptedBackend::new(source), "scan.mp4")
    }

    #[test]
    fn yields_only_video_keyframes_in_order() -> anyhow::Result<()> {
        let mut session = session(ScriptedSource::av(5_000, 1_000))?;
        let pts: Vec<i64> = KeyframeScanner::new(&mut session)?
            .map(|k| k.map(|k| k.pts))
            .collect::<Result<_>>()?;
        assert_eq!(pts, vec![0, 1_000, 2_000, 3_000, 4_000]);
        Ok(())
    }

    #[test]
    fn stream_end_covers_last_video_packet() -> anyhow::Result<()> {
        let mut session = session(ScriptedSource::av(5_000, 2_000))?;
        let mut scanner = KeyframeScanner::new(&mut session)?;
        assert_eq!(scanner.stream_end(), None);

        let last = scanner.by_ref().last().transpose()?;
        assert_eq!(last.map(|k| k.pts), Some(4_000));
        assert_eq!(scanner.stream_end(), Some(5_000));
        assert!(scanner.next().is_none());
        Ok(())
    }

    #[test]
    fn keyframe_free_stream_still_reports_its_end() -> anyhow::Result<()> {
        let mut session = session(ScriptedSource::video_only(2_000, 1_000).without_keyframes())?;
        let mut scanner = KeyframeScanner::new(&mut session)?;
        assert!(scanner.next().is_none());
        assert_eq!(scanner.stream_end(), Some(2_000));
        Ok(())
    }

    #[test]
    fn requires_a_video_stream() -> anyhow::Result<()> {
        let mut session = session(ScriptedSource::audio_only(1_000))?;
        assert!(KeyframeScanner::new(&mut session).is_err());
        Ok(())
    }
}
