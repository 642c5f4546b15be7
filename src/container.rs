// src/container.rs

//! Container sessions over a demuxer.
//!
//! Responsibilities:
//! - open a source once and keep its stream table stable for the session's lifetime
//! - pick "the" video and audio stream (first of each kind)
//! - expose a positionable packet cursor (`seek` + `read_next`)
//!
//! [`LazySession`] adds the shared, open-once behavior a facade needs: the first operation
//! opens the source, every later (or concurrent) operation reuses that outcome.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::backend::{Demuxer, MediaBackend};
use crate::media::{MediaKind, Packet, SeekTarget, StreamDescriptor};
use crate::{Error, Result};

/// Pick the first stream of `kind`, if any.
pub fn select_primary_stream(
    streams: &[StreamDescriptor],
    kind: MediaKind,
) -> Option<&StreamDescriptor> {
    streams.iter().find(|s| s.kind == kind)
}

/// An opened source container with a read cursor.
pub struct ContainerSession {
    source_ref: String,
    demuxer: Box<dyn Demuxer>,
    video_index: Option<usize>,
    audio_index: Option<usize>,
}

impl ContainerSession {
    /// Open `source_ref` through the backend and read its stream table.
    pub fn open(backend: &dyn MediaBackend, source_ref: &str) -> Result<Self> {
        let demuxer = backend.open_demuxer(source_ref).map_err(|err| match err {
            Error::Open { .. } => err,
            other => Error::Open {
                source_ref: source_ref.to_owned(),
                reason: other.to_string(),
            },
        })?;

        let streams = demuxer.streams();
        let video_index = select_primary_stream(streams, MediaKind::Video).map(|s| s.index);
        let audio_index = select_primary_stream(streams, MediaKind::Audio).map(|s| s.index);

        debug!(
            source = source_ref,
            streams = streams.len(),
            ?video_index,
            ?audio_index,
            "opened container"
        );

        Ok(Self {
            source_ref: source_ref.to_owned(),
            demuxer,
            video_index,
            audio_index,
        })
    }

    pub fn source_ref(&self) -> &str {
        &self.source_ref
    }

    pub fn streams(&self) -> &[StreamDescriptor] {
        self.demuxer.streams()
    }

    /// The primary video stream, or `StreamNotFound`.
    pub fn video_stream(&self) -> Result<&StreamDescriptor> {
        self.primary(self.video_index, MediaKind::Video)
    }

    /// The primary audio stream, or `StreamNotFound`.
    pub fn audio_stream(&self) -> Result<&StreamDescriptor> {
        self.primary(self.audio_index, MediaKind::Audio)
    }

    fn primary(&self, index: Option<usize>, kind: MediaKind) -> Result<&StreamDescriptor> {
        index
            .and_then(|i| self.streams().iter().find(|s| s.index == i))
            .ok_or(Error::StreamNotFound(kind))
    }

    /// Move the read cursor.
    pub fn seek(&mut self, target: SeekTarget) -> Result<()> {
        if let SeekTarget::Timestamp { stream_index, .. } = target
            && !self.streams().iter().any(|s| s.index == stream_index)
        {
            return Err(Error::Seek {
                target: target.to_string(),
                reason: "no such stream".to_owned(),
            });
        }

        debug!(source = %self.source_ref, %target, "seek");
        self.demuxer.seek(target).map_err(|err| match err {
            Error::Seek { .. } => err,
            other => Error::Seek {
                target: target.to_string(),
                reason: other.to_string(),
            },
        })
    }

    /// Read the next packet; `Ok(None)` at end of stream.
    pub fn read_next(&mut self) -> Result<Option<Packet>> {
        self.demuxer.read_packet()
    }
}

enum Slot {
    Unopened,
    Open(ContainerSession),
    Failed(String),
}

/// A container session that opens on first use and is shared by all later operations.
///
/// Operations are serialized: the slot stays locked for the whole closure, so a caller that
/// arrives while the open is in flight waits for it and then observes the same outcome
/// (including a failed open, which is not retried).
pub struct LazySession {
    backend: Arc<dyn MediaBackend>,
    source_ref: String,
    slot: Mutex<Slot>,
}

impl LazySession {
    pub fn new(backend: Arc<dyn MediaBackend>, source_ref: impl Into<String>) -> Self {
        Self {
            backend,
            source_ref: source_ref.into(),
            slot: Mutex::new(Slot::Unopened),
        }
    }

    pub fn source_ref(&self) -> &str {
        &self.source_ref
    }

    /// Run `f` against the opened session, opening it first if needed.
    pub fn with_session<T>(
        &self,
        f: impl FnOnce(&mut ContainerSession) -> Result<T>,
    ) -> Result<T> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| Error::msg("container session mutex poisoned"))?;

        if matches!(*slot, Slot::Unopened) {
            *slot = match ContainerSession::open(self.backend.as_ref(), &self.source_ref) {
                Ok(session) => Slot::Open(session),
                Err(err) => {
                    warn!(source = %self.source_ref, error = %err, "open failed");
                    Slot::Failed(err.to_string())
                }
            };
        }

        match &mut *slot {
            Slot::Open(session) => f(session),
            Slot::Failed(reason) => Err(Error::Open {
                source_ref: self.source_ref.clone(),
                reason: reason.clone(),
            }),
            Slot::Unopened => Err(Error::msg("container session was not opened")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::CodecParams;
    use crate::timebase::TimeBase;

    fn stream(index: usize, kind: MediaKind) -> StreamDescriptor {
        StreamDescriptor {
            index,
            kind,
            time_base: TimeBase::per_second(1000),
            codec_params: CodecParams::default(),
        }
    }

    #[test]
    fn select_primary_stream_takes_first_of_kind() {
        let streams = vec![
            stream(0, MediaKind::Other),
            stream(1, MediaKind::Audio),
            stream(2, MediaKind::Video),
            stream(3, MediaKind::Audio),
        ];

        let audio = select_primary_stream(&streams, MediaKind::Audio).map(|s| s.index);
        let video = select_primary_stream(&streams, MediaKind::Video).map(|s| s.index);
        assert_eq!(audio, Some(1));
        assert_eq!(video, Some(2));
    }

    #[test]
    fn select_primary_stream_reports_absence() {
        let streams = vec![stream(0, MediaKind::Audio)];
        assert!(select_primary_stream(&streams, MediaKind::Video).is_none());
    }
}
