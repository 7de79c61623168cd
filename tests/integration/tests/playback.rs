//! Integration tests for the playback control loop
//!
//! These tests verify complete sessions over synthetic media:
//! - A/V, video-only and audio-only playback to the end
//! - Frame dropping under slow presentation
//! - Seeking, pausing and stopping through the command channel

use anyhow::Result;
use avclock::decoder::SeekStyle;
use avclock::sim::SimMedia;
use avclock::utils::{Config, FrameDropPolicy, SystemTimeSource, TimeSource};
use avclock::{Iteration, PlayerCommand, PlayerEvent, StopReason, TransportState};
use avclock_integration_tests::{largest_gap, SessionBuilder};
use serial_test::serial;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_av_playback_runs_to_end() -> Result<()> {
    let (builder, clock) = SessionBuilder::virtual_time(3.0, 25.0);
    let mut session = builder.build()?;

    let reason = session.controller.run()?;
    assert_eq!(reason, StopReason::EndOfStream);

    let presented = session.video.as_ref().unwrap().presented();
    assert_eq!(presented.len(), 75);
    assert!(largest_gap(&presented) < 0.041);
    assert!((clock.now() - 3.0).abs() < 0.1);

    let status = session.controller.status_handle().snapshot();
    assert_eq!(status.state, TransportState::Stopped);
    assert_eq!(status.frames_presented, 75);
    assert_eq!(status.frames_dropped, 0);
    assert!(session.events.contains(&PlayerEvent::EndOfStream));
    Ok(())
}

#[test]
fn test_video_only_playback() -> Result<()> {
    let (builder, clock) = SessionBuilder::virtual_time(2.0, 30.0);
    let mut session = builder.without_audio().build()?;

    assert_eq!(session.controller.run()?, StopReason::EndOfStream);
    assert_eq!(session.video.as_ref().unwrap().presented().len(), 60);
    assert!((clock.now() - 2.0).abs() < 0.05);
    Ok(())
}

#[test]
fn test_audio_only_playback() -> Result<()> {
    let (builder, clock) = SessionBuilder::virtual_time(2.0, 25.0);
    let mut session = builder.without_video().build()?;

    assert_eq!(session.controller.run()?, StopReason::EndOfStream);
    assert!(clock.now() > 1.9);
    assert!(session.video.is_none());
    Ok(())
}

#[test]
fn test_slow_output_drops_frames() -> Result<()> {
    let mut config = Config::default();
    config.scheduler.framedrop = FrameDropPolicy::SkipDisplay;

    let (builder, _clock) = SessionBuilder::virtual_time(4.0, 25.0);
    let mut session = builder.present_cost(0.06).config(config).build()?;

    assert_eq!(session.controller.run()?, StopReason::EndOfStream);

    let status = session.controller.status_handle().snapshot();
    assert!(status.frames_dropped > 0);
    assert!(status.frames_presented > 0);
    assert_eq!(status.frames_presented + status.frames_dropped, 100);
    assert_eq!(
        session.video.as_ref().unwrap().presented().len() as u64,
        status.frames_presented
    );
    Ok(())
}

#[test]
fn test_seek_through_command_channel() -> Result<()> {
    let (builder, _clock) = SessionBuilder::virtual_time(120.0, 25.0);
    let mut session = builder.build()?;
    let commands = session.controller.command_sender();

    session.controller.play()?;
    for _ in 0..10 {
        session.controller.run_iteration()?;
    }

    commands.send(PlayerCommand::Seek {
        amount: 0.5,
        style: SeekStyle::ABSOLUTE_FRACTION,
    })?;
    session.controller.run_iteration()?;
    assert!((session.controller.status_handle().position() - 60.0).abs() < 1e-6);

    commands.send(PlayerCommand::Seek {
        amount: -20.0,
        style: SeekStyle::RELATIVE,
    })?;
    session.controller.run_iteration()?;
    assert!((session.controller.status_handle().position() - 40.0).abs() < 1e-6);

    // playback continues from the new position
    for _ in 0..25 {
        session.controller.run_iteration()?;
    }
    let presented = session.video.as_ref().unwrap().presented();
    let last = *presented.last().unwrap();
    assert!(last > 40.5 && last < 41.5, "last presented {}", last);

    let seeks = session.events.count(|e| matches!(e, PlayerEvent::Seeked { .. }));
    assert_eq!(seeks, 2);
    Ok(())
}

#[test]
fn test_pause_toggle_pair_in_one_batch() -> Result<()> {
    let (builder, _clock) = SessionBuilder::virtual_time(10.0, 25.0);
    let mut session = builder.build()?;
    let commands = session.controller.command_sender();

    session.controller.play()?;
    session.controller.run_iteration()?;

    commands.send(PlayerCommand::TogglePause)?;
    commands.send(PlayerCommand::ToggleMute)?;
    commands.send(PlayerCommand::TogglePause)?;
    assert_eq!(session.controller.run_iteration()?, Iteration::Continue);

    // the mute ran while paused
    assert!(session.audio.as_ref().unwrap().muted());
    assert!(!session.audio.as_ref().unwrap().paused());
    assert_eq!(session.controller.transport_state(), TransportState::Playing);
    assert!(session
        .events
        .contains(&PlayerEvent::StateChanged(TransportState::Paused)));
    Ok(())
}

#[test]
fn test_stop_command_ends_run() -> Result<()> {
    let (builder, _clock) = SessionBuilder::virtual_time(3600.0, 25.0);
    let mut session = builder.build()?;
    let commands = session.controller.command_sender();
    commands.send(PlayerCommand::Stop)?;

    assert_eq!(session.controller.run()?, StopReason::UserStop);
    assert_eq!(session.controller.transport_state(), TransportState::Stopped);
    Ok(())
}

#[test]
#[serial]
fn test_pause_in_real_time() -> Result<()> {
    let time: Arc<dyn TimeSource> = Arc::new(SystemTimeSource::new());
    let mut session = SessionBuilder::new(SimMedia::new(1.0, 25.0), time).build()?;
    let commands = session.controller.command_sender();
    let status = session.controller.status_handle();
    let audio = session.audio.clone().unwrap();

    let started = Instant::now();
    let player = thread::spawn(move || {
        let reason = session.controller.run();
        (reason, session)
    });

    thread::sleep(Duration::from_millis(300));
    commands.send(PlayerCommand::TogglePause)?;
    thread::sleep(Duration::from_millis(100));

    assert_eq!(status.state(), TransportState::Paused);
    assert!(audio.paused());
    let paused_at = status.position();

    thread::sleep(Duration::from_millis(400));
    assert_eq!(status.position(), paused_at);
    commands.send(PlayerCommand::TogglePause)?;

    let (reason, session) = player.join().expect("player thread panicked");
    assert_eq!(reason?, StopReason::EndOfStream);
    assert!(started.elapsed() >= Duration::from_millis(1300));

    // the paused interval did not count as lateness
    assert_eq!(session.video.as_ref().unwrap().presented().len(), 25);
    assert!(!session.events.contains(&PlayerEvent::Desync));
    Ok(())
}
