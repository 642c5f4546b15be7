// src/transcode.rs

//! Decode → reformat → encode chain for one audio stream.
//!
//! Responsibilities:
//! - derive the reformat filter from the decoder/encoder format mismatch
//! - push packets through decoder, filter and encoder, retagging output for the muxer
//! - drain buffered state at end of input without dropping samples
//!
//! Any stage may hold data back (codec delay, fixed encoder frame sizes), so every stage can
//! legitimately return nothing for a given input.

use tracing::{debug, trace};

use crate::backend::{Decoder, Encoder, Filter, MediaBackend};
use crate::media::{AudioFormat, Frame, Packet, StreamDescriptor};
use crate::timebase::TimeBase;
use crate::{Error, Result};

/// A fully negotiated audio filter graph description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    /// FFmpeg filtergraph text, e.g. `aresample=48000,aformat=...`.
    pub graph: String,
    pub input: AudioFormat,
    pub input_time_base: TimeBase,
    pub output: AudioFormat,
    /// Uniform output frame size, when the encoder needs one.
    pub frame_size: Option<usize>,
}

impl FilterSpec {
    /// Build the reformat graph taking `source` audio to `output`.
    ///
    /// Fails with `FilterConfiguration` when either side is missing the parameters a resampler
    /// needs.
    pub fn audio_reformat(
        source: &StreamDescriptor,
        output: &AudioFormat,
        frame_size: Option<usize>,
    ) -> Result<Self> {
        let mut graph = format!(
            "aresample={},aformat=sample_fmts={}:channel_layouts={}",
            output.sample_rate, output.sample_format, output.channel_layout
        );
        if let Some(n) = frame_size {
            graph.push_str(&format!(",asetnsamples=n={n}:p=1"));
        }

        let input = source
            .codec_params
            .audio
            .clone()
            .ok_or_else(|| Error::FilterConfiguration {
                graph: graph.clone(),
                reason: format!("stream {} has no audio parameters", source.index),
            })?;

        check_format("input", &input, &graph)?;
        check_format("output", output, &graph)?;
        if !source.time_base.is_valid() {
            return Err(Error::FilterConfiguration {
                graph,
                reason: format!("invalid input time base {}", source.time_base),
            });
        }
        if frame_size == Some(0) {
            return Err(Error::FilterConfiguration {
                graph,
                reason: "encoder frame size is zero".to_owned(),
            });
        }

        Ok(Self {
            graph,
            input,
            input_time_base: source.time_base,
            output: output.clone(),
            frame_size,
        })
    }
}

fn check_format(side: &str, format: &AudioFormat, graph: &str) -> Result<()> {
    let problem = if format.sample_rate == 0 {
        Some("sample rate is zero")
    } else if format.sample_format.is_empty() {
        Some("sample format is unknown")
    } else if format.channel_layout.is_empty() || format.channels == 0 {
        Some("channel layout is unknown")
    } else {
        None
    };

    match problem {
        Some(reason) => Err(Error::FilterConfiguration {
            graph: graph.to_owned(),
            reason: format!("{side} {reason}"),
        }),
        None => Ok(()),
    }
}

/// Decoder → filter → encoder for one source stream, tagged for one output stream.
pub struct TranscodePath {
    source_index: usize,
    dest_index: usize,
    decoder: Box<dyn Decoder>,
    filter: Box<dyn Filter>,
    encoder: Box<dyn Encoder>,
    drained: bool,
}

impl TranscodePath {
    /// Open decoder and filter for `source` around an already opened `encoder`.
    ///
    /// The filter is built first so an impossible conversion fails before anything else is
    /// opened or any packet is read.
    pub fn open(
        backend: &dyn MediaBackend,
        source: &StreamDescriptor,
        encoder: Box<dyn Encoder>,
        output: &AudioFormat,
        dest_index: usize,
    ) -> Result<Self> {
        let spec = FilterSpec::audio_reformat(source, output, encoder.frame_size())?;
        debug!(graph = %spec.graph, "configuring audio filter");

        let filter = backend.open_filter(&spec).map_err(|err| match err {
            Error::FilterConfiguration { .. } => err,
            other => Error::FilterConfiguration {
                graph: spec.graph.clone(),
                reason: other.to_string(),
            },
        })?;
        let decoder = backend.open_decoder(source)?;

        Ok(Self::from_parts(
            source.index,
            dest_index,
            decoder,
            filter,
            encoder,
        ))
    }

    /// Assemble a path from already opened stages.
    pub fn from_parts(
        source_index: usize,
        dest_index: usize,
        decoder: Box<dyn Decoder>,
        filter: Box<dyn Filter>,
        encoder: Box<dyn Encoder>,
    ) -> Self {
        Self {
            source_index,
            dest_index,
            decoder,
            filter,
            encoder,
            drained: false,
        }
    }

    pub fn source_index(&self) -> usize {
        self.source_index
    }

    pub fn dest_index(&self) -> usize {
        self.dest_index
    }

    /// Time base of the packets this path yields.
    pub fn time_base(&self) -> TimeBase {
        self.encoder.time_base()
    }

    /// Push one source packet through the chain.
    ///
    /// Packets of other streams are ignored. The result may be empty while stages buffer.
    pub fn feed(&mut self, packet: &Packet) -> Result<Vec<Packet>> {
        if self.drained {
            return Err(Error::InvalidState {
                operation: "feed",
                state: "drained",
            });
        }
        if packet.stream_index != self.source_index {
            return Ok(Vec::new());
        }

        let decoded = self.decoder.decode(packet)?;
        let mut filtered = Vec::new();
        for frame in decoded {
            filtered.extend(self.filter.push(frame)?);
        }

        let out = self.encode_all(filtered)?;
        trace!(
            pts = ?packet.pts,
            encoded = out.len(),
            "transcoded packet"
        );
        Ok(out)
    }

    /// Flush every stage at end of input.
    ///
    /// Order: decoder flush → filter → filter flush → encoder → encoder flush. Allowed once.
    pub fn drain(&mut self) -> Result<Vec<Packet>> {
        if self.drained {
            return Err(Error::InvalidState {
                operation: "drain",
                state: "drained",
            });
        }
        self.drained = true;

        let decoded = self.decoder.flush()?;
        let mut filtered = Vec::new();
        for frame in decoded {
            filtered.extend(self.filter.push(frame)?);
        }
        filtered.extend(self.filter.flush()?);

        let mut out = self.encode_all(filtered)?;
        let flushed = self.encoder.flush()?;
        out.extend(self.retag(flushed));

        debug!(packets = out.len(), "drained transcode path");
        Ok(out)
    }

    fn encode_all(&mut self, frames: Vec<Frame>) -> Result<Vec<Packet>> {
        let mut out = Vec::new();
        for frame in frames {
            let packets = self.encoder.encode(frame)?;
            out.extend(self.retag(packets));
        }
        Ok(out)
    }

    fn retag(&self, packets: Vec<Packet>) -> Vec<Packet> {
        packets
            .into_iter()
            .map(|mut p| {
                p.stream_index = self.dest_index;
                p
            })
            .collect()
    }
}
