//! Integration tests against mocked collaborators
//!
//! These tests verify the calls the engine makes on its collaborators:
//! - A demuxer refusing to seek
//! - Video output control requests on seek and pause

use anyhow::Result;
use avclock::decoder::{Demuxer, Frame, SeekStyle};
use avclock::player::{transition, AudioChain, SideEffect, TransportEvent, VideoChain};
use avclock::renderer::{NoSubtitles, VideoOutput, VoControl};
use avclock::sim::{SimAudioOut, SimMedia, VirtualClock};
use avclock::utils::AudioConfig;
use avclock::{ControllerBuilder, Iteration, MediaIo, PlayerCommand, TransportState};
use avclock_integration_tests::EventLog;
use mockall::predicate::eq;
use mockall::{mock, Sequence};

mock! {
    pub Demux {}

    impl Demuxer for Demux {
        fn seek(&mut self, amount: f64, style: SeekStyle) -> bool;
        fn video_pts(&self) -> f64;
        fn duration(&self) -> Option<f64>;
    }
}

mock! {
    pub Vo {}

    impl VideoOutput for Vo {
        fn control(&mut self, request: VoControl);
        fn present(&mut self, frame: &Frame);
        fn check_events(&mut self);
    }
}

fn io_with(media: &SimMedia, clock: &std::sync::Arc<VirtualClock>, demuxer: Box<dyn Demuxer>, vo: MockVo) -> MediaIo {
    let out = SimAudioOut::new(clock.clone(), media.audio_params().bytes_per_second(), 0.5);
    MediaIo {
        demuxer,
        audio: Some(AudioChain::new(
            Box::new(media.audio_decoder()),
            Box::new(out),
            &AudioConfig::default(),
        )),
        video: Some(VideoChain::new(Box::new(media.video_decoder()), Box::new(vo))),
        subtitles: Box::new(NoSubtitles),
    }
}

fn presenting_vo() -> MockVo {
    let mut vo = MockVo::new();
    vo.expect_present().returning(|_| ());
    vo.expect_check_events().returning(|| ());
    vo
}

#[test]
fn test_refused_seek_keeps_playing() -> Result<()> {
    let clock = VirtualClock::new();
    let media = SimMedia::new(60.0, 25.0);

    let mut demuxer = MockDemux::new();
    demuxer.expect_video_pts().return_const(0.0);
    demuxer.expect_duration().return_const(Some(60.0));
    demuxer.expect_seek().times(1).returning(|_, _| false);

    let mut vo = presenting_vo();
    vo.expect_control().never();

    let events = EventLog::default();
    let io = io_with(&media, &clock, Box::new(demuxer), vo);
    let mut controller = ControllerBuilder::new(io, clock.clone())
        .with_event_handler(Box::new(events.clone()))
        .build()?;

    controller.play()?;
    controller.run_iteration()?;
    controller.request_seek(30.0, SeekStyle::ABSOLUTE);

    assert_eq!(controller.run_iteration()?, Iteration::Continue);
    assert_eq!(controller.transport_state(), TransportState::Playing);
    assert!(controller.context().clock.video_pts < 1.0);
    assert!(!events
        .events()
        .iter()
        .any(|e| matches!(e, avclock::PlayerEvent::Seeked { .. })));
    Ok(())
}

#[test]
fn test_seek_resets_video_output_once() -> Result<()> {
    let clock = VirtualClock::new();
    let media = SimMedia::new(60.0, 25.0);

    let mut vo = presenting_vo();
    vo.expect_control()
        .with(eq(VoControl::Reset))
        .times(1)
        .return_const(());

    let io = io_with(&media, &clock, Box::new(media.demuxer()), vo);
    let mut controller = ControllerBuilder::new(io, clock.clone()).build()?;

    controller.play()?;
    controller.run_iteration()?;
    controller.request_seek(5.0, SeekStyle::RELATIVE);
    controller.run_iteration()?;
    controller.run_iteration()?;
    Ok(())
}

#[test]
fn test_pause_suspends_and_resumes_video_output() -> Result<()> {
    let clock = VirtualClock::new();
    let media = SimMedia::new(60.0, 25.0);

    let mut seq = Sequence::new();
    let mut vo = presenting_vo();
    vo.expect_control()
        .with(eq(VoControl::Pause))
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    vo.expect_control()
        .with(eq(VoControl::Resume))
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());

    let io = io_with(&media, &clock, Box::new(media.demuxer()), vo);
    let mut controller = ControllerBuilder::new(io, clock.clone()).build()?;
    let commands = controller.command_sender();

    controller.play()?;
    controller.run_iteration()?;
    commands.send(PlayerCommand::TogglePause)?;
    commands.send(PlayerCommand::TogglePause)?;
    controller.run_iteration()?;

    assert_eq!(controller.transport_state(), TransportState::Playing);
    Ok(())
}

#[test]
fn test_transition_table() {
    use TransportState::*;

    let t = transition(Stopped, TransportEvent::Play).unwrap();
    assert_eq!(t.to, Playing);
    assert_eq!(t.effects, &[SideEffect::RearmClock]);

    let t = transition(Paused, TransportEvent::Seek).unwrap();
    assert_eq!(t.to, Paused);
    assert!(t.effects.contains(&SideEffect::DiscardAudio));

    let t = transition(Paused, TransportEvent::Resume { eof: true }).unwrap();
    assert!(t.effects.contains(&SideEffect::DiscardAudio));
    assert!(!t.effects.contains(&SideEffect::ResumeAudio));

    assert!(transition(Stopped, TransportEvent::Pause).is_err());
    assert!(transition(Stopped, TransportEvent::Seek).is_err());
    assert!(transition(Paused, TransportEvent::EndOfStream).is_err());
}
