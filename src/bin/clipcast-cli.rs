use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clipcast::backends::ffmpeg::FfmpegBackend;
use clipcast::container::ContainerSession;
use clipcast::keyframes::KeyframeScanner;
use clipcast::request::TranscodeRequest;
use clipcast::{MediaSource, SourceOpts};

fn main() -> Result<()> {
    clipcast::init_logging();
    let params = Params::parse();

    let backend = Arc::new(FfmpegBackend::new().context("failed to initialize FFmpeg")?);
    let opts = SourceOpts {
        target_chunk_seconds: params.chunk_seconds,
        ..SourceOpts::default()
    };
    let source_ref = params.source.to_string_lossy().into_owned();
    let mut out = open_output(params.out.as_ref())?;

    match params.command {
        Command::Image { time } => {
            let source = MediaSource::new(backend, source_ref, opts);
            let image = source
                .still_frame(time)
                .with_context(|| format!("failed to extract frame at {time}s"))?;
            out.write_all(&image.bytes)?;
        }
        Command::Clip {
            start_ts,
            end_ts,
            start_pos,
            end_pos,
        } => {
            let source = MediaSource::new(backend, source_ref, opts);
            let request = TranscodeRequest {
                start_timestamp: start_ts,
                end_timestamp: end_ts,
                start_position: start_pos,
                end_position: end_pos,
                ..TranscodeRequest::default()
            };
            source
                .sub_clip(&request, out)
                .context("failed to produce sub-clip")?;
            return Ok(());
        }
        Command::Playlist { base_uri } => {
            let source = MediaSource::new(backend, source_ref, opts);
            let playlist = source
                .playlist(&base_uri)
                .context("failed to build playlist")?;
            out.write_all(playlist.body.as_bytes())?;
        }
        Command::Keyframes => {
            let mut session = ContainerSession::open(backend.as_ref(), &source_ref)?;
            let mut scanner = KeyframeScanner::new(&mut session)?;
            let mut lines = BufWriter::new(&mut out);
            for keyframe in scanner.by_ref() {
                serde_json::to_writer(&mut lines, &keyframe?)?;
                lines.write_all(b"\n")?;
            }
            lines.flush()?;
            if let Some(end) = scanner.stream_end() {
                eprintln!("stream end: {end}");
            }
        }
    }

    out.flush()?;
    Ok(())
}

/// Unbuffered, so sub-clips reach a pipe as they are muxed.
fn open_output(path: Option<&PathBuf>) -> Result<Box<dyn Write + Send>> {
    Ok(match path {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("cannot create '{}'", path.display()))?,
        ),
        None => Box::new(io::stdout()),
    })
}

#[derive(Parser, Debug)]
#[command(name = "clipcast")]
#[command(about = "Extract frames, sub-clips and playlists from a media file")]
struct Params {
    /// Media file to read.
    #[arg(short = 's', long = "source")]
    pub source: PathBuf,

    /// Where to write the result (stdout when omitted).
    #[arg(short = 'o', long = "out")]
    pub out: Option<PathBuf>,

    /// Minimum playlist segment length in seconds.
    #[arg(
        long = "chunk-seconds",
        default_value_t = 10,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub chunk_seconds: u32,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Still image of the frame shown at `--time` seconds.
    Image {
        #[arg(short = 't', long = "time")]
        time: f64,
    },
    /// Fragmented MP4 sub-clip. Timestamps are in the video stream's time base.
    Clip {
        #[arg(long = "start-ts")]
        start_ts: Option<i64>,
        #[arg(long = "end-ts")]
        end_ts: Option<i64>,
        #[arg(long = "start-pos")]
        start_pos: Option<i64>,
        #[arg(long = "end-pos")]
        end_pos: Option<i64>,
    },
    /// VOD playlist whose segments point at `--base-uri`.
    Playlist {
        #[arg(short = 'b', long = "base-uri")]
        base_uri: String,
    },
    /// Video keyframes as JSON lines.
    Keyframes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_seconds_must_be_positive() {
        let parse = |chunk: &str| {
            Params::try_parse_from([
                "clipcast",
                "--source",
                "movie.mp4",
                "--chunk-seconds",
                chunk,
                "playlist",
                "--base-uri",
                "http://media.test/movie.mp4",
            ])
        };
        assert!(parse("0").is_err());
        assert!(parse("1").is_ok_and(|p| p.chunk_seconds == 1));
    }
}
