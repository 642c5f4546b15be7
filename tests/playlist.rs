mod common;

use std::sync::Arc;
use std::thread;

use clipcast::{Error, SourceOpts};
use clipcast::backends::scripted::{Event, ScriptedBackend, ScriptedSource};
use clipcast::playlist::Segment;

use common::{source_for, source_with_opts};

const BASE: &str = "http://media.test/media/movie.mp4?action=playlist";

fn bounds(segments: &[Segment]) -> Vec<(i64, i64)> {
    segments.iter().map(|s| (s.start_pts, s.end_pts)).collect()
}

#[test]
fn segments_are_keyframe_aligned_and_contiguous() -> anyhow::Result<()> {
    let (source, _) = source_for(ScriptedBackend::new(ScriptedSource::av(25_000, 2_000)));
    let playlist = source.playlist(BASE)?;

    // The 5 seconds after the last cut never reach a further keyframe a chunk away, so
    // they are not listed.
    assert_eq!(
        bounds(&playlist.segments),
        vec![(0, 10_000), (10_000, 20_000)]
    );
    assert!(
        playlist
            .segments
            .windows(2)
            .all(|w| w[0].end_pts == w[1].start_pts)
    );
    assert!(playlist.segments.iter().all(|s| s.duration_seconds >= 10.0));
    assert_eq!(playlist.target_duration, 11);
    Ok(())
}

#[test]
fn manifest_points_segments_at_sub_clips() -> anyhow::Result<()> {
    let (source, _) = source_for(ScriptedBackend::new(ScriptedSource::av(25_000, 2_000)));
    let playlist = source.playlist(BASE)?;

    assert_eq!(playlist.content_type, "application/x-mpegurl");
    let lines: Vec<&str> = playlist.body.lines().collect();
    assert_eq!(
        &lines[..6],
        &[
            "#EXTM3U",
            "#EXT-X-PLAYLIST-TYPE:VOD",
            "#EXT-X-VERSION:3",
            "#EXT-X-MEDIA-SEQUENCE:0",
            "#EXT-X-ALLOW-CACHE:NO",
            "#EXT-X-TARGETDURATION:11",
        ]
    );
    assert_eq!(lines[6], "#EXTINF:10.000000,");
    assert_eq!(
        lines[7],
        "http://media.test/media/movie.mp4?action=transcode&startTs=0&endTs=10000&profile=apple"
    );
    assert_eq!(lines.last(), Some(&"#EXT-X-ENDLIST"));
    assert_eq!(lines.iter().filter(|l| l.starts_with("#EXTINF")).count(), 2);
    Ok(())
}

#[test]
fn uneven_keyframes_stretch_segments_past_the_chunk() -> anyhow::Result<()> {
    let opts = SourceOpts {
        target_chunk_seconds: 4,
        ..SourceOpts::default()
    };
    let (source, _) =
        source_with_opts(ScriptedBackend::new(ScriptedSource::av(10_000, 3_000)), opts);
    let playlist = source.playlist(BASE)?;

    // Keyframes at 0, 3, 6 and 9 seconds: 3 is too close to 0, 9 is too close to 6.
    assert_eq!(bounds(&playlist.segments), vec![(0, 6_000)]);
    assert_eq!(playlist.target_duration, 6);
    Ok(())
}

#[test]
fn source_without_keyframes_yields_empty_playlist() -> anyhow::Result<()> {
    let media = ScriptedSource::av(5_000, 1_000).without_keyframes();
    let (source, _) = source_for(ScriptedBackend::new(media));
    let playlist = source.playlist(BASE)?;

    assert!(playlist.segments.is_empty());
    assert!(!playlist.body.contains("#EXTINF"));
    assert!(playlist.body.ends_with("#EXT-X-ENDLIST\n"));
    Ok(())
}

#[test]
fn repeated_builds_reuse_one_session() -> anyhow::Result<()> {
    let (source, journal) = source_for(ScriptedBackend::new(ScriptedSource::av(12_000, 2_000)));

    let first = source.playlist(BASE)?;
    let second = source.playlist(BASE)?;
    assert_eq!(first, second);
    assert_eq!(journal.count(|e| matches!(e, Event::OpenDemuxer(_))), 1);
    Ok(())
}

#[test]
fn playlist_requires_video() {
    let (source, _) = source_for(ScriptedBackend::new(ScriptedSource::audio_only(3_000)));
    let err = source.playlist(BASE).unwrap_err();
    assert_eq!(err.to_string(), "no video stream found");
}

#[test]
fn zero_length_chunks_are_rejected() {
    let opts = SourceOpts {
        target_chunk_seconds: 0,
        ..SourceOpts::default()
    };
    let (source, journal) =
        source_with_opts(ScriptedBackend::new(ScriptedSource::av(5_000, 1_000)), opts);

    let err = source.playlist(BASE).unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));
    assert_eq!(journal.count(|e| matches!(e, Event::OpenDemuxer(_))), 0);
}

#[test]
fn concurrent_requests_share_one_open() -> anyhow::Result<()> {
    let (source, journal) = source_for(ScriptedBackend::new(ScriptedSource::av(12_000, 2_000)));
    let source = Arc::new(source);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let source = Arc::clone(&source);
            thread::spawn(move || -> clipcast::Result<()> {
                if i % 2 == 0 {
                    source.playlist(BASE).map(drop)
                } else {
                    source.still_frame(f64::from(i)).map(drop)
                }
            })
        })
        .collect();
    for handle in handles {
        handle
            .join()
            .map_err(|_| anyhow::anyhow!("request thread panicked"))??;
    }

    assert_eq!(journal.count(|e| matches!(e, Event::OpenDemuxer(_))), 1);
    Ok(())
}
