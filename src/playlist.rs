//! VOD playlist synthesis.
//!
//! Segments are cut on video keyframes: a segment closes on the first keyframe at least one
//! target chunk past the previous cut, so every segment is at least a chunk long. Content after
//! the last cut is not listed.
//!
//! Each entry points back at the same resource with a `transcode` action bounded by the
//! segment's pts range.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::{Error, Result};
use crate::container::ContainerSession;
use crate::keyframes::KeyframeScanner;
use crate::media::SeekTarget;
use crate::request::Profile;
use crate::timebase::TimeBase;

pub const PLAYLIST_CONTENT_TYPE: &str = "application/x-mpegurl";

/// A `[start_pts, end_pts)` range of the primary video stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Segment {
    pub start_pts: i64,
    pub end_pts: i64,
    pub duration_seconds: f64,
}

/// A rendered playlist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Playlist {
    pub segments: Vec<Segment>,
    pub target_duration: u64,
    pub content_type: &'static str,
    pub body: String,
}

/// Builds a [`Playlist`] from a container session.
#[derive(Debug, Clone)]
pub struct PlaylistBuilder {
    target_chunk_seconds: u32,
}

impl PlaylistBuilder {
    /// Fails with `InvalidRequest` for a zero chunk, which would cut empty segments.
    pub fn new(target_chunk_seconds: u32) -> Result<Self> {
        if target_chunk_seconds == 0 {
            return Err(Error::InvalidRequest(
                "target chunk must be at least one second".to_owned(),
            ));
        }
        Ok(Self {
            target_chunk_seconds,
        })
    }

    /// Rewind `session`, scan its keyframes and render the manifest for `base_uri`.
    pub fn build(&self, session: &mut ContainerSession, base_uri: &str) -> Result<Playlist> {
        let time_base = session.video_stream()?.time_base;
        rewind(session)?;

        let segments = self.segments(session, time_base)?;
        let target_duration = target_duration(self.target_chunk_seconds, &segments);

        let body = Manifest {
            base: strip_query(base_uri),
            profile: Profile::Apple,
            target_duration,
            segments: &segments,
        }
        .to_string();

        debug!(
            source = session.source_ref(),
            segments = segments.len(),
            target_duration,
            "built playlist"
        );

        Ok(Playlist {
            segments,
            target_duration,
            content_type: PLAYLIST_CONTENT_TYPE,
            body,
        })
    }

    /// Cut keyframe-aligned segments from the session's current position.
    pub fn segments(
        &self,
        session: &mut ContainerSession,
        time_base: TimeBase,
    ) -> Result<Vec<Segment>> {
        let chunk_ticks = time_base.ticks_for_seconds(self.target_chunk_seconds);
        let segment = |start_pts: i64, end_pts: i64| Segment {
            start_pts,
            end_pts,
            duration_seconds: time_base.to_seconds(end_pts - start_pts),
        };

        let mut segments = Vec::new();
        let mut previous = 0i64;

        for keyframe in KeyframeScanner::new(session)? {
            let keyframe = keyframe?;
            if keyframe.pts - previous >= chunk_ticks {
                segments.push(segment(previous, keyframe.pts));
                previous = keyframe.pts;
            }
        }

        Ok(segments)
    }
}

fn rewind(session: &mut ContainerSession) -> Result<()> {
    match session.seek(SeekTarget::Time(0.0)) {
        Ok(()) => Ok(()),
        Err(err) => {
            debug!(error = %err, "time seek to start failed, seeking to byte 0");
            session.seek(SeekTarget::Position(0))
        }
    }
}

/// `max(chunk + 1, ceil(longest segment))`.
fn target_duration(chunk_seconds: u32, segments: &[Segment]) -> u64 {
    let longest = segments
        .iter()
        .map(|s| s.duration_seconds)
        .fold(0.0f64, f64::max);
    (u64::from(chunk_seconds) + 1).max(longest.ceil() as u64)
}

fn strip_query(uri: &str) -> &str {
    uri.split_once('?').map_or(uri, |(base, _)| base)
}

struct Manifest<'a> {
    base: &'a str,
    profile: Profile,
    target_duration: u64,
    segments: &'a [Segment],
}

impl fmt::Display for Manifest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#EXTM3U")?;
        writeln!(f, "#EXT-X-PLAYLIST-TYPE:VOD")?;
        writeln!(f, "#EXT-X-VERSION:3")?;
        writeln!(f, "#EXT-X-MEDIA-SEQUENCE:0")?;
        writeln!(f, "#EXT-X-ALLOW-CACHE:NO")?;
        writeln!(f, "#EXT-X-TARGETDURATION:{}", self.target_duration)?;

        for segment in self.segments {
            writeln!(f, "#EXTINF:{:.6},", segment.duration_seconds)?;
            writeln!(
                f,
                "{}?action=transcode&startTs={}&endTs={}&profile={}",
                self.base,
                segment.start_pts,
                segment.end_pts,
                self.profile.as_str()
            )?;
        }

        writeln!(f, "#EXT-X-ENDLIST")
    }
}
