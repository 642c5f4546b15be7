use std::error::Error as StdError;

use thiserror::Error;

use crate::media::MediaKind;

/// Clipcast's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Clipcast's crate-wide error type.
///
/// Every variant surfaces to the immediate caller; nothing in the pipeline retries. Front ends
/// translate these into protocol-level responses.
///
/// This is intentionally decoupled from `anyhow` so downstream libraries aren't forced to
/// adopt `anyhow` in their own public APIs.
#[derive(Debug, Error)]
pub enum Error {
    /// The source could not be opened or is not a supported container.
    #[error("failed to open media source '{source_ref}': {reason}")]
    Open { source_ref: String, reason: String },

    /// A seek was out of range or used criteria the demuxer cannot honor.
    #[error("seek to {target} failed: {reason}")]
    Seek { target: String, reason: String },

    /// The source has no stream of the required kind.
    #[error("no {0} stream found")]
    StreamNotFound(MediaKind),

    /// No decodable video frame exists at or after the requested time.
    #[error("no video frame found at {at_seconds:.3}s")]
    FrameNotFound { at_seconds: f64 },

    /// The audio reformat filter could not be built from the negotiated parameters.
    #[error("failed to configure filter '{graph}': {reason}")]
    FilterConfiguration { graph: String, reason: String },

    /// The output container could not be opened or its header written.
    #[error("failed to open output container: {0}")]
    MuxerOpen(String),

    /// The output container trailer could not be written; the output is incomplete.
    #[error("failed to finalize output container: {0}")]
    MuxerFinalize(String),

    /// Request parameters the pipeline cannot honor.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A session was driven out of order.
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// The codec capability failed to decode, filter, encode or write.
    #[error("codec failure: {0}")]
    Codec(String),

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub(crate) fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub(crate) fn codec(message: impl Into<String>) -> Self {
        Self::Codec(message.into())
    }

    /// Whether the error leaves a partially written output behind.
    ///
    /// Callers must treat such output as corrupt.
    pub fn is_corrupt_output(&self) -> bool {
        matches!(self, Self::MuxerFinalize(_))
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Message(format!("{err:#}"))
    }
}
