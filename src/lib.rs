//! `clipcast` serves stored media on demand: still frames, fragmented-MP4 sub-clips and
//! keyframe-aligned VOD playlists that point back at those sub-clips.
//!
//! This crate provides:
//! - A container session with a positionable packet cursor
//! - Stream-copy and decode → filter → encode paths with timestamp rebasing
//! - A remux session that writes one copied video and one transcoded audio stream
//! - Keyframe scanning and playlist synthesis
//!
//! Codec work goes through the [`backend::MediaBackend`] capability. The real implementation
//! lives in `backends::ffmpeg` (feature `ffmpeg`); `backends::scripted` is an in-memory stand-in
//! for tests.

// High-level API (most consumers should start here).
pub mod opts;
pub mod request;
pub mod source;

// Codec capability and its implementations.
pub mod backend;
pub mod backends;

// Data model and timing.
pub mod media;
pub mod timebase;

// Pipeline stages.
pub mod container;
pub mod keyframes;
pub mod playlist;
pub mod remux;
pub mod stream_copy;
pub mod transcode;

// Logging configuration and control.
#[cfg(feature = "logging")]
pub mod logging;

mod error;

pub use error::{Error, Result};
pub use opts::SourceOpts;
pub use source::{MediaSource, StillImage};

#[cfg(feature = "logging")]
pub use logging::init as init_logging;
