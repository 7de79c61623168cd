//! Playback controller
//!
//! Runs the control loop one iteration at a time: feed audio, decode the
//! next frame, sleep until it is due, present it, correct drift, then handle
//! EDL actions, commands and seeks. All timing state lives in one
//! [`PlaybackContext`] owned here.

use crate::audio::{compute_playing_audio_pts, output_sample_rate, AudioSnapshot};
use crate::decoder::{AudioParams, Frame, SeekOrigin, SeekStyle, SeekUnit};
use crate::edl::{EdlEngine, EdlEvent, EdlRecord};
use crate::internal_error;
use crate::net::{SlaveDecision, SyncLink};
use crate::player::scheduler::{max_pts_correction, DropDecision, FrameScheduler, StatusLine};
use crate::player::transport::TransportController;
use crate::player::{
    apply_mute, CommandQueue, CommandSender, MediaIo, PlaybackContext, PlayerCommand, PlayerEvent,
    PlayerEventHandler, TransportEvent, TransportState,
};
use crate::utils::config::Config;
use crate::utils::error::{AvClockError, Result};
use crate::utils::format_timestamp;
use crate::utils::timer::{RelativeClock, TimeSource};
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::sync::Arc;

/// Device delay under which an ended audio-only stream stops waiting
const DRAIN_WAIT_MIN: f64 = 0.01;

/// Longest single wait while an ended audio-only stream drains
const DRAIN_WAIT_MAX: f64 = 0.1;

/// Why playback stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    UserStop,
    MasterExited,
}

/// Result of one control loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iteration {
    Continue,
    Stopped(StopReason),

    /// Nothing is playing
    Idle,
}

/// Playback status readable from other threads
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub state: TransportState,
    pub position: f64,
    pub audio_pts: Option<f64>,
    pub av_delay: f64,
    pub c_total: f64,
    pub frames_presented: u64,
    pub frames_dropped: u64,
    pub muted: bool,
    pub speed: f64,
    pub audio_delay: f64,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            state: TransportState::Stopped,
            position: 0.0,
            audio_pts: None,
            av_delay: 0.0,
            c_total: 0.0,
            frames_presented: 0,
            frames_dropped: 0,
            muted: false,
            speed: 1.0,
            audio_delay: 0.0,
        }
    }
}

/// Shared handle to the controller's published status
#[derive(Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<StatusSnapshot>>,
}

impl StatusHandle {
    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner.read().clone()
    }

    pub fn state(&self) -> TransportState {
        self.inner.read().state
    }

    pub fn position(&self) -> f64 {
        self.inner.read().position
    }

    fn set_state(&self, state: TransportState) {
        self.inner.write().state = state;
    }

    fn publish(&self, snapshot: StatusSnapshot) {
        *self.inner.write() = snapshot;
    }
}

/// Builder for [`PlaybackController`]
pub struct ControllerBuilder {
    io: MediaIo,
    time: Arc<dyn TimeSource>,
    config: Config,
    edl: Vec<EdlRecord>,
    sync: Option<SyncLink>,
    event_handlers: Vec<Box<dyn PlayerEventHandler>>,
}

impl ControllerBuilder {
    pub fn new(io: MediaIo, time: Arc<dyn TimeSource>) -> Self {
        Self {
            io,
            time,
            config: Config::default(),
            edl: Vec::new(),
            sync: None,
            event_handlers: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Apply an edit decision list to the stream
    pub fn with_edl(mut self, records: Vec<EdlRecord>) -> Self {
        self.edl = records;
        self
    }

    /// Take part in UDP sync
    pub fn with_sync(mut self, link: SyncLink) -> Self {
        self.sync = Some(link);
        self
    }

    pub fn with_event_handler(mut self, handler: Box<dyn PlayerEventHandler>) -> Self {
        self.event_handlers.push(handler);
        self
    }

    pub fn build(self) -> Result<PlaybackController> {
        self.config.validate()?;

        if self.io.audio.is_none() && self.io.video.is_none() {
            return Err(AvClockError::InvalidInput(
                "Stream has neither audio nor video".to_string(),
            ));
        }

        let mut edl = EdlEngine::new(self.edl, self.config.edl.backward_delay)?;
        if edl.is_active() && self.io.video.is_none() {
            warn!("EDL needs a video stream, disabling it");
            edl.disable();
        }

        let (sender, commands) = CommandQueue::new();
        let ctx = PlaybackContext::new(self.config.audio.speed, self.config.audio.audio_delay);
        let scheduler = FrameScheduler::new(self.config.scheduler.clone());
        let requested_speed = self.config.audio.speed;

        let mut controller = PlaybackController {
            ctx,
            io: self.io,
            transport: TransportController::new(),
            scheduler,
            edl,
            sync: self.sync,
            commands,
            sender,
            clock: RelativeClock::new(self.time),
            status: StatusHandle::default(),
            handlers: self.event_handlers,
            pending_seek: None,
            pending_frame: None,
            frame_time_remaining: false,
            video_eof: false,
            last_line: None,
            requested_speed,
            stall_reported: false,
            status_line: self.config.general.status_line,
        };
        controller.set_speed(requested_speed);
        Ok(controller)
    }
}

/// Drives playback of one stream
pub struct PlaybackController {
    ctx: PlaybackContext,
    io: MediaIo,
    transport: TransportController,
    scheduler: FrameScheduler,
    edl: EdlEngine,
    sync: Option<SyncLink>,
    commands: CommandQueue,
    sender: CommandSender,
    clock: RelativeClock,
    status: StatusHandle,
    handlers: Vec<Box<dyn PlayerEventHandler>>,

    /// Seek to run at the end of the iteration
    pending_seek: Option<(f64, SeekStyle)>,

    /// Decoded frame waiting for its presentation time
    pending_frame: Option<Frame>,

    /// Last sleep was split or cut short; present on the next iteration
    frame_time_remaining: bool,

    /// Video ended while audio is still playing out
    video_eof: bool,

    last_line: Option<StatusLine>,
    requested_speed: f64,
    stall_reported: bool,
    status_line: bool,
}

impl PlaybackController {
    /// Sender for commands from other threads
    pub fn command_sender(&self) -> CommandSender {
        self.sender.clone()
    }

    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn transport_state(&self) -> TransportState {
        self.transport.state()
    }

    pub fn context(&self) -> &PlaybackContext {
        &self.ctx
    }

    /// Most recent status line
    pub fn last_status(&self) -> Option<StatusLine> {
        self.last_line
    }

    /// Start playing from the demuxer's current position
    pub fn play(&mut self) -> Result<()> {
        self.transport
            .apply(TransportEvent::Play, &self.ctx, &mut self.io, &mut self.clock)?;

        let speed = self.ctx.clock.playback_speed;
        let audio_delay = self.ctx.audio_delay;
        let user_muted = self.ctx.user_muted;
        let output_muted = self.ctx.output_muted;
        self.ctx = PlaybackContext::new(speed, audio_delay);
        self.ctx.user_muted = user_muted;
        // the device is still in whatever mute state the last item left it
        self.ctx.output_muted = output_muted;
        self.ctx.clock.video_pts = self.io.demuxer.video_pts();
        self.ctx.clock.max_pts_correction =
            max_pts_correction(self.scheduler.config(), self.io.frame_time());
        self.frame_time_remaining = false;
        self.video_eof = false;
        self.pending_frame = None;
        self.sync_mute();

        info!("Playback started at {}", format_timestamp(self.ctx.clock.video_pts));
        self.emit(PlayerEvent::StateChanged(TransportState::Playing));
        self.publish_status();
        Ok(())
    }

    /// Stop playback
    pub fn stop(&mut self) -> Result<()> {
        self.transport
            .apply(TransportEvent::Stop, &self.ctx, &mut self.io, &mut self.clock)?;
        info!("Playback stopped");
        self.emit(PlayerEvent::StateChanged(TransportState::Stopped));
        self.publish_status();
        Ok(())
    }

    /// Queue a seek; it runs at the end of the current iteration.
    ///
    /// Relative seeks in seconds requested within the same iteration add up.
    /// An absolute seek already queued wins over later relative ones: an EDL
    /// skip measured from the old position means nothing at the new one, and
    /// the EDL is re-evaluated where the seek lands.
    pub fn request_seek(&mut self, amount: f64, style: SeekStyle) {
        let relative = |s: &SeekStyle| s.origin == SeekOrigin::Relative && s.unit == SeekUnit::Seconds;
        self.pending_seek = match self.pending_seek {
            Some((queued, queued_style)) if relative(&queued_style) && relative(&style) => {
                Some((queued + amount, style))
            }
            Some((queued, queued_style))
                if queued_style.origin == SeekOrigin::Absolute && style.origin == SeekOrigin::Relative =>
            {
                debug!("Relative seek of {:.3} dropped behind absolute seek to {:.3}", amount, queued);
                Some((queued, queued_style))
            }
            _ => Some((amount, style)),
        };
    }

    /// Hand a newly presented position to its consumers: the sync master
    /// broadcasts it and the EDL checks it.
    pub fn notify_position(&mut self, pts: f64) {
        self.ctx.clock.video_pts = pts;
        if let Some(SyncLink::Master(master)) = &self.sync {
            master.send_position(pts);
        }
        self.run_edl();
    }

    /// Play until the stream ends or playback is stopped
    pub fn run(&mut self) -> Result<StopReason> {
        if self.transport.state() == TransportState::Stopped {
            self.play()?;
        }

        loop {
            match self.run_iteration()? {
                Iteration::Continue => {}
                Iteration::Stopped(reason) => return Ok(reason),
                Iteration::Idle => return Ok(StopReason::UserStop),
            }
        }
    }

    /// Run one pass of the control loop
    pub fn run_iteration(&mut self) -> Result<Iteration> {
        if self.transport.state() != TransportState::Playing {
            return Ok(Iteration::Idle);
        }

        let has_video = self.io.video.is_some() && !self.video_eof;
        let speed = self.ctx.clock.playback_speed;

        if let Some(audio) = self.io.audio.as_mut() {
            let started = self.clock.now();
            let outcome = audio.pump.fill(
                audio.decoder.as_mut(),
                audio.out.as_mut(),
                &mut self.ctx.clock.delay,
                speed,
                has_video,
                &self.clock,
            );
            self.ctx.stats.audio_time_usage += self.clock.now() - started;

            if !has_video && audio.pump.is_eof() && !outcome.drained {
                let wait = audio.out.get_delay().clamp(DRAIN_WAIT_MIN, DRAIN_WAIT_MAX);
                self.clock.sleep(wait);
            }

            if outcome.stalled && !self.stall_reported {
                self.stall_reported = true;
                self.emit(PlayerEvent::DeviceStalled);
            }
            if let Some(params) = outcome.format_change {
                self.reconfigure_audio(params);
            }
            if outcome.drained && !has_video {
                self.ctx.eof = true;
            }
        }

        if has_video {
            if let Some(stopped) = self.video_step()? {
                return Ok(Iteration::Stopped(stopped));
            }
        } else {
            if let Some(snapshot) = self.audio_snapshot() {
                self.ctx.clock.audio_pts = Some(compute_playing_audio_pts(&snapshot));
            }
            if self.ctx.eof {
                return self.end_of_stream();
            }
        }

        if let Some(stopped) = self.process_commands()? {
            return Ok(Iteration::Stopped(stopped));
        }
        self.apply_pending_seek()?;
        self.publish_status();
        Ok(Iteration::Continue)
    }

    /// Decode, schedule and present one frame
    fn video_step(&mut self) -> Result<Option<StopReason>> {
        let speed = self.ctx.clock.playback_speed;
        let frame_time = self.io.frame_time();

        // pre-sleep phase: one snapshot for the drop check and the sleep
        let snapshot = self.audio_snapshot();

        if !self.frame_time_remaining {
            let decision = self
                .scheduler
                .check_framedrop(&mut self.ctx, snapshot.as_ref(), frame_time);

            let started = self.clock.now();
            let frame = self
                .io
                .video
                .as_mut()
                .and_then(|video| video.decoder.decode(decision == DropDecision::SkipDecode));
            self.ctx.stats.video_time_usage += self.clock.now() - started;

            let Some(mut frame) = frame else {
                if self.io.audio.is_some() {
                    info!("Video ended at {}, playing out audio", format_timestamp(self.ctx.clock.video_pts));
                    self.video_eof = true;
                    self.pending_frame = None;
                    return Ok(None);
                }
                return match self.end_of_stream()? {
                    Iteration::Stopped(reason) => Ok(Some(reason)),
                    other => Err(internal_error!("end of stream left playback in {:?}", other)),
                };
            };

            frame.dropped |= decision != DropDecision::Keep;
            self.ctx.clock.video_pts = frame.pts;
            self.ctx.clock.delay -= frame.frame_time;
            self.ctx.time_frame += frame.frame_time / speed;
            self.ctx.buffered_frames += 1;
            self.ctx.stats.frames_decoded += 1;
            self.io.subtitles.update(frame.pts, false);
            self.pending_frame = Some(frame);
        }

        let sleep = self.scheduler.sleep_until_update(
            &mut self.ctx,
            snapshot.as_ref(),
            &mut self.clock,
            &mut self.commands,
        );
        // a command cut the sleep short: handle it, then finish the wait
        self.frame_time_remaining = sleep.frame_time_remaining || sleep.cancelled;

        if !self.frame_time_remaining {
            if let Some(SyncLink::Slave(slave)) = self.sync.as_mut() {
                match slave.sync(self.ctx.clock.video_pts, &self.clock, &mut self.commands) {
                    SlaveDecision::Present => {}
                    SlaveDecision::Seek(target) => self.request_seek(target, SeekStyle::ABSOLUTE),
                    SlaveDecision::MasterExited => {
                        self.emit(PlayerEvent::MasterExited);
                        self.stop()?;
                        return Ok(Some(StopReason::MasterExited));
                    }
                }
            }

            if let Some(frame) = self.pending_frame.take() {
                self.present(frame);
            }
        }

        // post-presentation phase
        let snapshot = self.audio_snapshot();
        let line = self.scheduler.adjust_sync(
            &mut self.ctx,
            snapshot.as_ref(),
            self.frame_time_remaining,
            frame_time,
        );
        if line.desync_reset {
            self.emit(PlayerEvent::Desync);
        }
        if self.status_line && !self.frame_time_remaining {
            debug!("{}", line);
        }
        self.last_line = Some(line);

        Ok(None)
    }

    fn present(&mut self, frame: Frame) {
        let started = self.clock.now();
        if frame.dropped {
            self.ctx.stats.frames_dropped += 1;
        } else {
            if let Some(video) = self.io.video.as_mut() {
                video.out.present(&frame);
            }
            self.ctx.stats.frames_presented += 1;
        }
        self.ctx.stats.vout_time_usage += self.clock.now() - started;
        self.ctx.buffered_frames = 0;
        self.notify_position(frame.pts);
    }

    fn audio_snapshot(&self) -> Option<AudioSnapshot> {
        let speed = self.ctx.clock.playback_speed;
        self.io.audio.as_ref().map(|audio| {
            AudioSnapshot::capture(audio.decoder.as_ref(), audio.out.as_ref(), &audio.pump, speed)
        })
    }

    fn run_edl(&mut self) {
        let has_video = self.io.video.is_some();
        for event in self.edl.update(&mut self.ctx, has_video) {
            match event {
                EdlEvent::Skip { start, stop, seek } => {
                    if let Some(offset) = seek {
                        info!("EDL skip from {} to {}", format_timestamp(start), format_timestamp(stop));
                        self.request_seek(offset, SeekStyle::RELATIVE);
                    }
                    self.emit(PlayerEvent::EdlSkip { start, stop });
                }
                EdlEvent::Rewind { seek } => self.request_seek(seek, SeekStyle::RELATIVE),
                EdlEvent::Mute { .. } => {}
            }
        }
        self.sync_mute();
    }

    fn sync_mute(&mut self) {
        let before = self.ctx.output_muted;
        apply_mute(&mut self.ctx, &mut self.io);
        if self.ctx.output_muted != before {
            self.emit(PlayerEvent::MuteChanged {
                muted: self.ctx.output_muted,
            });
        }
    }

    fn process_commands(&mut self) -> Result<Option<StopReason>> {
        while let Some(command) = self.commands.pop() {
            if let Some(stopped) = self.dispatch(command)? {
                return Ok(Some(stopped));
            }
        }
        Ok(None)
    }

    fn dispatch(&mut self, command: PlayerCommand) -> Result<Option<StopReason>> {
        debug!("Command {:?}", command);
        match command {
            PlayerCommand::Seek { amount, style } => self.request_seek(amount, style),
            PlayerCommand::TogglePause => {
                self.status.set_state(TransportState::Paused);
                self.emit(PlayerEvent::StateChanged(TransportState::Paused));
                let ending = self.transport.pause_loop(
                    &mut self.ctx,
                    &mut self.io,
                    &mut self.commands,
                    &mut self.clock,
                )?;
                self.emit(PlayerEvent::StateChanged(TransportState::Playing));
                self.publish_status();
                if let Some(command) = ending {
                    return self.dispatch(command);
                }
            }
            PlayerCommand::Stop => {
                self.stop()?;
                return Ok(Some(StopReason::UserStop));
            }
            PlayerCommand::ToggleMute => {
                self.ctx.user_muted = !self.ctx.user_muted;
                self.sync_mute();
            }
            PlayerCommand::SetSpeed(speed) => {
                self.requested_speed = speed;
                self.set_speed(speed);
            }
            PlayerCommand::AdjustAudioDelay(delta) => {
                self.ctx.audio_delay += delta;
                info!("Audio delay {:.3}s", self.ctx.audio_delay);
            }
        }
        Ok(None)
    }

    fn apply_pending_seek(&mut self) -> Result<()> {
        let Some((amount, style)) = self.pending_seek.take() else {
            return Ok(());
        };

        match self.transport.seek(
            &mut self.ctx,
            &mut self.io,
            &mut self.clock,
            self.scheduler.config(),
            amount,
            style,
        ) {
            Ok(position) => {
                self.scheduler.reset();
                self.frame_time_remaining = false;
                self.video_eof = false;
                self.pending_frame = None;
                self.emit(PlayerEvent::Seeked { position });
                Ok(())
            }
            // already logged, playback goes on where it was
            Err(AvClockError::NotSeekable) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn set_speed(&mut self, speed: f64) {
        if !(speed > 0.0) {
            warn!("Ignoring invalid playback speed {}", speed);
            return;
        }

        let effective = match self.io.audio.as_ref() {
            Some(audio) => output_sample_rate(audio.decoder.params().sample_rate, speed).effective_speed,
            None => speed,
        };
        if effective != speed {
            warn!("Speed {} not reachable with this audio, playing at {:.3}", speed, effective);
        }
        if effective != self.ctx.clock.playback_speed {
            info!("Playback speed {:.3}", effective);
        }
        self.ctx.clock.playback_speed = effective;
    }

    fn reconfigure_audio(&mut self, params: AudioParams) {
        let rate = output_sample_rate(params.sample_rate, self.requested_speed);
        debug!(
            "Audio output reconfigured to {} Hz for {} Hz input",
            rate.sample_rate, params.sample_rate
        );
        self.set_speed(self.requested_speed);
    }

    fn end_of_stream(&mut self) -> Result<Iteration> {
        info!("End of stream at {}", format_timestamp(self.position()));
        self.ctx.eof = true;
        self.transport
            .apply(TransportEvent::EndOfStream, &self.ctx, &mut self.io, &mut self.clock)?;
        self.emit(PlayerEvent::EndOfStream);
        self.emit(PlayerEvent::StateChanged(TransportState::Stopped));
        self.publish_status();
        Ok(Iteration::Stopped(StopReason::EndOfStream))
    }

    fn position(&self) -> f64 {
        if self.io.video.is_some() && !self.video_eof {
            self.ctx.clock.video_pts
        } else {
            self.ctx.clock.audio_pts.unwrap_or(self.ctx.clock.video_pts)
        }
    }

    fn publish_status(&self) {
        self.status.publish(StatusSnapshot {
            state: self.transport.state(),
            position: self.position(),
            audio_pts: self.ctx.clock.audio_pts,
            av_delay: self.last_line.map(|l| l.av_delay).unwrap_or(0.0),
            c_total: self.ctx.stats.c_total,
            frames_presented: self.ctx.stats.frames_presented,
            frames_dropped: self.ctx.stats.frames_dropped,
            muted: self.ctx.effective_muted(),
            speed: self.ctx.clock.playback_speed,
            audio_delay: self.ctx.audio_delay,
        });
    }

    fn emit(&mut self, event: PlayerEvent) {
        for handler in &mut self.handlers {
            handler.handle_event(event.clone());
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        if let Some(SyncLink::Master(master)) = &self.sync {
            master.send_bye();
        }
    }
}
