//! Transport state machine
//!
//! Every allowed `(state, event)` pair maps to a next state and the side
//! effects to run on the collaborators, in order. Anything not in the table
//! is rejected without touching state.

use crate::decoder::SeekStyle;
use crate::player::scheduler::max_pts_correction;
use crate::player::{
    apply_mute, CommandQueue, MediaIo, PlaybackContext, PlayerCommand, TransportEvent,
    TransportState,
};
use crate::renderer::VoControl;
use crate::utils::config::SchedulerConfig;
use crate::utils::error::{AvClockError, Result};
use crate::utils::format_timestamp;
use crate::utils::timer::RelativeClock;
use log::{debug, info, warn};

/// Interval at which the pause loop polls for commands (seconds)
const PAUSE_POLL: f64 = 0.020;

/// Work done on collaborators during a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// Pause the audio device, keeping its buffer
    SuspendAudio,

    /// Continue the audio device
    ResumeAudio,

    /// Drop everything queued for audio
    DiscardAudio,

    SuspendVideo,
    ResumeVideo,

    /// Drop queued video frames
    ResetVideo,

    /// Flush subtitles for the new position
    FlushSubtitles,

    /// Exclude the elapsed interval from the relative clock
    RearmClock,
}

/// Result of a table lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: TransportState,
    pub to: TransportState,
    pub effects: &'static [SideEffect],
}

use SideEffect::*;
use TransportEvent as E;
use TransportState as S;

/// Look up the transition for `event` in `state`
pub fn transition(from: TransportState, event: TransportEvent) -> Result<Transition> {
    let (to, effects): (TransportState, &'static [SideEffect]) = match (from, event) {
        (S::Stopped, E::Play) => (S::Playing, &[RearmClock]),
        (S::Playing, E::Pause) => (S::Paused, &[SuspendAudio, SuspendVideo]),
        (S::Paused, E::Resume { eof: false }) => (S::Playing, &[ResumeAudio, ResumeVideo, RearmClock]),
        (S::Paused, E::Resume { eof: true }) => (S::Playing, &[DiscardAudio, ResumeVideo, RearmClock]),
        (S::Playing, E::Seek) => (S::Playing, &[ResetVideo, DiscardAudio, FlushSubtitles]),
        (S::Paused, E::Seek) => (S::Paused, &[ResetVideo, DiscardAudio, FlushSubtitles]),
        (S::Playing, E::Stop) | (S::Paused, E::Stop) => (S::Stopped, &[DiscardAudio, ResetVideo]),
        (S::Playing, E::EndOfStream) => (S::Stopped, &[]),
        (from, event) => return Err(AvClockError::InvalidTransition { from, event }),
    };

    Ok(Transition { from, to, effects })
}

/// Owns the transport state of a session
pub struct TransportController {
    state: TransportState,
}

impl TransportController {
    pub fn new() -> Self {
        Self {
            state: TransportState::Stopped,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Run `event` through the table and apply its effects
    pub fn apply(
        &mut self,
        event: TransportEvent,
        ctx: &PlaybackContext,
        io: &mut MediaIo,
        clock: &mut RelativeClock,
    ) -> Result<TransportState> {
        let t = transition(self.state, event)?;
        for effect in t.effects {
            execute(*effect, ctx, io, clock);
        }
        if t.from != t.to {
            debug!("Transport {:?} -> {:?} on {:?}", t.from, t.to, event);
        }
        self.state = t.to;
        Ok(t.to)
    }

    /// Reposition the stream.
    ///
    /// A refused seek is reported as [`AvClockError::NotSeekable`] and leaves
    /// every piece of state as it was. On success all timing state derived
    /// from the old position is cleared and the EDL is told to re-sync.
    pub fn seek(
        &mut self,
        ctx: &mut PlaybackContext,
        io: &mut MediaIo,
        clock: &mut RelativeClock,
        config: &SchedulerConfig,
        amount: f64,
        style: SeekStyle,
    ) -> Result<f64> {
        let t = transition(self.state, TransportEvent::Seek)?;

        let from = ctx.clock.video_pts;
        let target = style.target(amount, from, io.demuxer.duration());

        if !io.demuxer.seek(amount, style) {
            warn!("Seek by {:.3} ({:?}) refused: stream is not seekable", amount, style.origin);
            return Err(AvClockError::NotSeekable);
        }

        let landed = io.demuxer.video_pts();
        ctx.clock.reset(landed);
        ctx.clock.max_pts_correction = max_pts_correction(config, io.frame_time());
        ctx.time_frame = 0.0;
        ctx.buffered_frames = 0;
        ctx.eof = false;
        ctx.edl_needs_reset = true;
        ctx.edl_backward = target.map(|to| to < from).unwrap_or(landed < from);
        ctx.stats.reset_after_seek();

        for effect in t.effects {
            execute(*effect, ctx, io, clock);
        }

        info!("Seek to {}", format_timestamp(landed));
        Ok(landed)
    }

    /// Stay paused until a command ends the pause.
    ///
    /// Mute and audio delay changes run in place. A second pause toggle just
    /// resumes; any other command resumes and is handed back for the caller
    /// to run. The paused interval never reaches the frame timing.
    pub fn pause_loop(
        &mut self,
        ctx: &mut PlaybackContext,
        io: &mut MediaIo,
        commands: &mut CommandQueue,
        clock: &mut RelativeClock,
    ) -> Result<Option<PlayerCommand>> {
        self.apply(TransportEvent::Pause, ctx, io, clock)?;
        ctx.osd_paused = true;
        info!("Paused at {}", format_timestamp(ctx.clock.video_pts));

        let ending = loop {
            match commands.pop() {
                Some(PlayerCommand::TogglePause) => break None,
                Some(command) if command.keeps_paused() => run_paused(command, ctx, io),
                Some(command) => break Some(command),
                None if commands.is_disconnected() => break Some(PlayerCommand::Stop),
                None => {
                    if let Some(video) = io.video.as_mut() {
                        video.out.check_events();
                    }
                    clock.sleep(PAUSE_POLL);
                }
            }
        };

        ctx.osd_paused = false;
        self.apply(TransportEvent::Resume { eof: ctx.eof }, ctx, io, clock)?;
        info!("Resumed at {}", format_timestamp(ctx.clock.video_pts));
        Ok(ending)
    }
}

impl Default for TransportController {
    fn default() -> Self {
        Self::new()
    }
}

fn run_paused(command: PlayerCommand, ctx: &mut PlaybackContext, io: &mut MediaIo) {
    match command {
        PlayerCommand::ToggleMute => {
            ctx.user_muted = !ctx.user_muted;
            apply_mute(ctx, io);
        }
        PlayerCommand::AdjustAudioDelay(delta) => {
            ctx.audio_delay += delta;
            debug!("Audio delay now {:.3}s", ctx.audio_delay);
        }
        _ => {}
    }
}

fn execute(effect: SideEffect, ctx: &PlaybackContext, io: &mut MediaIo, clock: &mut RelativeClock) {
    match effect {
        SuspendAudio => {
            if let Some(audio) = io.audio.as_mut() {
                audio.out.pause();
            }
        }
        ResumeAudio => {
            if let Some(audio) = io.audio.as_mut() {
                audio.out.resume();
            }
        }
        DiscardAudio => {
            if let Some(audio) = io.audio.as_mut() {
                audio.out.reset();
                audio.pump.flush();
            }
        }
        SuspendVideo => {
            if let Some(video) = io.video.as_mut() {
                video.out.control(VoControl::Pause);
            }
        }
        ResumeVideo => {
            if let Some(video) = io.video.as_mut() {
                video.out.control(VoControl::Resume);
            }
        }
        ResetVideo => {
            if let Some(video) = io.video.as_mut() {
                video.out.control(VoControl::Reset);
            }
        }
        FlushSubtitles => io.subtitles.update(ctx.clock.video_pts, true),
        RearmClock => clock.rearm(),
    }
}
