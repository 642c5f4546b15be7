use crate::timebase::TimeBase;

/// Options that control how a [`crate::MediaSource`] serves its operations.
///
/// This struct represents *library-level configuration*, not CLI flags directly.
/// Binaries map their flags into this type so that other frontends (tests, services) can
/// construct it programmatically.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceOpts {
    /// Minimum playlist segment length, in whole seconds.
    ///
    /// Segments are cut on the first keyframe at or past this distance from the previous cut,
    /// so real segments are at least this long.
    pub target_chunk_seconds: u32,

    /// Backpressure watermark for front ends that pipe sub-clip output to a consumer (bytes).
    ///
    /// The library itself writes muxed chunks straight through to the sink.
    pub output_buffer_bytes: usize,

    /// Time base requested for the copied video stream of a sub-clip.
    pub video_output_time_base: TimeBase,

    /// Codec used to encode still frames.
    pub still_image_codec: String,
}

impl Default for SourceOpts {
    fn default() -> Self {
        Self {
            target_chunk_seconds: 10,
            output_buffer_bytes: 64 * 1024,
            video_output_time_base: TimeBase::per_second(16_000),
            still_image_codec: "mjpeg".to_owned(),
        }
    }
}
