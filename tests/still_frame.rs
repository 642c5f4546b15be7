mod common;

use clipcast::Error;
use clipcast::backends::scripted::{Event, ScriptOptions, ScriptedBackend, ScriptedSource};
use clipcast::media::{MediaKind, SeekTarget};

use common::source_for;

#[test]
fn encodes_frame_from_keyframe_at_or_before_time() -> anyhow::Result<()> {
    let (source, journal) = source_for(ScriptedBackend::new(ScriptedSource::av(25_000, 2_000)));
    let still = source.still_frame(11.5)?;

    assert_eq!(still.mime_type, "image/jpeg");
    assert_eq!(&still.bytes[..2], &[0xFF, 0xD8]);
    assert!(String::from_utf8_lossy(&still.bytes).contains("pts=Some(10000)"));

    let events = journal.events();
    assert!(events.contains(&Event::Seek(SeekTarget::Time(11.5))));
    assert!(events.contains(&Event::OpenEncoder {
        codec: "mjpeg".into()
    }));
    Ok(())
}

#[test]
fn delayed_decoder_is_flushed_for_its_frame() -> anyhow::Result<()> {
    let backend = ScriptedBackend::new(ScriptedSource::av(25_000, 2_000)).with_options(
        ScriptOptions {
            decoder_delay: 1,
            encoder_delay: 1,
            ..ScriptOptions::default()
        },
    );
    let (source, journal) = source_for(backend);
    let still = source.still_frame(10.0)?;

    assert!(String::from_utf8_lossy(&still.bytes).contains("pts=Some(10000)"));
    assert_eq!(
        journal.count(|e| matches!(e, Event::DecoderFlush { stream: 0 })),
        1
    );
    assert_eq!(journal.count(|e| matches!(e, Event::EncoderFlush)), 1);
    Ok(())
}

#[test]
fn unusable_times_report_frame_not_found() {
    let (source, _) = source_for(ScriptedBackend::new(ScriptedSource::av(25_000, 2_000)));

    for at in [100.0, -1.0, f64::NAN, f64::INFINITY] {
        let err = source.still_frame(at).unwrap_err();
        assert!(
            matches!(err, Error::FrameNotFound { .. }),
            "unexpected error for {at}: {err}"
        );
    }
}

#[test]
fn source_without_keyframes_has_no_frames() {
    let media = ScriptedSource::av(5_000, 1_000).without_keyframes();
    let (source, _) = source_for(ScriptedBackend::new(media));
    assert!(matches!(
        source.still_frame(1.0).unwrap_err(),
        Error::FrameNotFound { .. }
    ));
}

#[test]
fn audio_only_source_has_no_video_stream() {
    let (source, _) = source_for(ScriptedBackend::new(ScriptedSource::audio_only(5_000)));
    assert!(matches!(
        source.still_frame(1.0).unwrap_err(),
        Error::StreamNotFound(MediaKind::Video)
    ));
}

#[test]
fn frames_can_be_taken_repeatedly_from_one_source() -> anyhow::Result<()> {
    let (source, journal) = source_for(ScriptedBackend::new(ScriptedSource::av(8_000, 1_000)));

    let early = source.still_frame(1.2)?;
    let late = source.still_frame(6.9)?;
    assert!(String::from_utf8_lossy(&early.bytes).contains("pts=Some(1000)"));
    assert!(String::from_utf8_lossy(&late.bytes).contains("pts=Some(6000)"));
    assert_eq!(journal.count(|e| matches!(e, Event::OpenDemuxer(_))), 1);
    Ok(())
}
