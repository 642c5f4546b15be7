/// In-memory backend used by tests and demos.
pub mod scripted;

/// FFmpeg backend (via `ffmpeg-next`).
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
