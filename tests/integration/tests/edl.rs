//! Integration tests for edit decision lists
//!
//! These tests verify EDL files end to end:
//! - Loading and validation errors
//! - Skip windows never reaching the screen
//! - Mute windows toggling the audio device
//! - Backward seeks landing inside a skip window

use anyhow::Result;
use avclock::decoder::SeekStyle;
use avclock::{load_edl, AvClockError, EdlAction, EdlRecord, PlayerEvent};
use avclock_integration_tests::{EdlFixture, SessionBuilder};

#[test]
fn test_edl_file_skip_and_mute() -> Result<()> {
    let fixture = EdlFixture::new()?;
    let path = fixture.write(
        "movie.edl",
        "# credits and a swear word\n\
         1.0 2.0 0\n\
         00:03 00:04 1\n",
    )?;
    let records = load_edl(&path)?;
    assert_eq!(records.len(), 2);

    let (builder, _clock) = SessionBuilder::virtual_time(6.0, 25.0);
    let mut session = builder.edl(records).build()?;
    let audio = session.audio.clone().unwrap();

    session.controller.play()?;
    let mut muted_between = Vec::new();
    while session.controller.context().clock.video_pts < 5.0 {
        session.controller.run_iteration()?;
        let pts = session.controller.context().clock.video_pts;
        muted_between.push((pts, audio.muted()));
    }

    let presented = session.video.as_ref().unwrap().presented();
    assert!(presented
        .iter()
        .all(|&pts| pts <= 1.0 + 1e-9 || pts >= 2.0 - 1e-9));

    for (pts, muted) in muted_between {
        if pts > 3.05 && pts < 3.95 {
            assert!(muted, "not muted at {}", pts);
        }
        if pts > 4.05 || pts < 2.95 {
            assert!(!muted, "muted at {}", pts);
        }
    }

    assert!(session
        .events
        .contains(&PlayerEvent::EdlSkip { start: 1.0, stop: 2.0 }));
    Ok(())
}

#[test]
fn test_malformed_edl_reports_line() -> Result<()> {
    let fixture = EdlFixture::new()?;
    let path = fixture.write("bad.edl", "10 20 0\n30 25 0\n")?;

    match load_edl(&path) {
        Err(AvClockError::EdlParse { line, .. }) => assert_eq!(line, 2),
        other => panic!("expected a parse error, got {:?}", other),
    }

    let missing = fixture.path().join("missing.edl");
    assert!(matches!(load_edl(&missing), Err(AvClockError::Io(_))));
    Ok(())
}

#[test]
fn test_backward_seek_into_skip_window_rewinds() -> Result<()> {
    let records = vec![EdlRecord::new(10.0, 20.0, EdlAction::Skip)];
    let (builder, _clock) = SessionBuilder::virtual_time(30.0, 25.0);
    let mut session = builder.without_audio().edl(records).build()?;

    session.controller.play()?;
    session.controller.request_seek(25.0, SeekStyle::ABSOLUTE);
    session.controller.run_iteration()?;
    session.controller.run_iteration()?;

    // back into the window: lands 2s before it instead
    session.controller.request_seek(15.0, SeekStyle::ABSOLUTE);
    session.controller.run_iteration()?;
    session.controller.run_iteration()?;

    let seeks = session.media.seeks();
    assert_eq!(seeks.len(), 3);
    assert!((seeks[2] - 8.0).abs() < 1e-6, "rewound to {}", seeks[2]);

    // playing forward from there skips the window again
    while session.controller.context().clock.video_pts < 21.0 {
        session.controller.run_iteration()?;
    }
    let seeks = session.media.seeks();
    assert!((seeks[3] - 20.0).abs() < 1e-6);

    // only the landing frame of the backward seek was shown inside the window
    let presented = session.video.as_ref().unwrap().presented();
    let inside: Vec<f64> = presented
        .into_iter()
        .filter(|&pts| pts > 10.0 + 1e-9 && pts < 20.0 - 1e-9)
        .collect();
    assert_eq!(inside.len(), 1);
    assert!((inside[0] - 15.0).abs() < 1e-6);
    Ok(())
}

#[test]
fn test_skip_window_at_stream_start() -> Result<()> {
    let records = vec![EdlRecord::new(0.0, 1.0, EdlAction::Skip)];
    let (builder, _clock) = SessionBuilder::virtual_time(2.0, 25.0);
    let mut session = builder.without_audio().edl(records).build()?;

    session.controller.run()?;
    let presented = session.video.as_ref().unwrap().presented();
    assert!((presented[0] - 0.0).abs() < 1e-9);
    assert!((presented[1] - 1.0).abs() < 1e-6);
    Ok(())
}
