//! Frame scheduler
//!
//! Decides per frame whether to drop it, how long to sleep before presenting
//! it, and how much to nudge the delay accumulator to pull audio and video
//! back together. Every decision is taken against one [`AudioSnapshot`] so
//! device state cannot change between two computations of the same phase.

use crate::audio::{compute_audio_written_pts, compute_playing_audio_pts, AudioSnapshot};
use crate::player::{CommandQueue, PlaybackContext};
use crate::utils::config::{FrameDropPolicy, SchedulerConfig};
use crate::utils::timer::RelativeClock;
use log::{debug, warn};
use std::fmt;

/// Outcome of the drop check for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropDecision {
    /// Decode and present
    Keep,

    /// Decode, do not present
    SkipDisplay,

    /// Skip decoding as well
    SkipDecode,
}

/// What one scheduling sleep did
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SleepOutcome {
    /// The sleep was split; the frame is not due yet
    pub frame_time_remaining: bool,

    /// A command arrived during a long sleep and cut it short
    pub cancelled: bool,
}

/// One drift correction step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Correction {
    /// Amount added to the delay accumulator
    pub applied: f64,

    /// Clamp in force for this step
    pub limit: f64,
}

/// Status line printed once per frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusLine {
    pub audio_pos: Option<f64>,
    pub video_pos: f64,
    pub av_delay: f64,
    pub c_total: f64,
    pub frames_presented: u64,
    pub frames_decoded: u64,
    pub dropped: u64,
    pub correction: Correction,

    /// Timestamps were found broken and the clock hard-reset this step
    pub desync_reset: bool,
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.audio_pos {
            Some(a) => write!(
                f,
                "A:{:6.1} V:{:6.1} A-V:{:7.3} ct:{:7.3} {:3}/{:3} dropped:{}",
                a,
                self.video_pos,
                self.av_delay,
                self.c_total,
                self.frames_presented,
                self.frames_decoded,
                self.dropped
            ),
            None => write!(
                f,
                "V:{:6.1} {:3}/{:3} dropped:{}",
                self.video_pos, self.frames_presented, self.frames_decoded, self.dropped
            ),
        }
    }
}

/// Per-step drift correction clamp
pub fn max_pts_correction(config: &SchedulerConfig, frame_time: f64) -> f64 {
    config
        .max_pts_correction
        .unwrap_or(frame_time * config.max_pts_correction_ratio)
}

/// Frame scheduler
pub struct FrameScheduler {
    config: SchedulerConfig,

    /// Consecutive frames found droppable
    dropped_streak: u32,

    desync_warned: bool,
    underflow_warned: bool,
}

impl FrameScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            dropped_streak: 0,
            desync_warned: false,
            underflow_warned: false,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Decide whether the next frame may be dropped.
    ///
    /// Only applies while audio plays: a frame is droppable when video lags
    /// the audio clock by more than the slack, widened by one frame per
    /// frame already dropped in a row. Never drops while paused.
    pub fn check_framedrop(
        &mut self,
        ctx: &mut PlaybackContext,
        audio: Option<&AudioSnapshot>,
        frame_time: f64,
    ) -> DropDecision {
        let Some(snapshot) = audio.filter(|s| !s.eof) else {
            return DropDecision::Keep;
        };

        ctx.stats.total_frame_cnt += 1;

        let d = snapshot.speed * snapshot.device_delay - ctx.clock.delay;
        let allowed = -(self.dropped_streak as f64) * frame_time - self.config.framedrop_slack;

        if d < allowed && !ctx.osd_paused {
            self.dropped_streak += 1;
            ctx.stats.drop_frame_cnt += 1;
            return match self.config.framedrop {
                FrameDropPolicy::Disabled => DropDecision::Keep,
                FrameDropPolicy::SkipDisplay => DropDecision::SkipDisplay,
                FrameDropPolicy::SkipDecode => DropDecision::SkipDecode,
            };
        }

        self.dropped_streak = 0;
        DropDecision::Keep
    }

    /// Work out how long until the pending frame is due and sleep for it.
    ///
    /// With audio the target is derived from the device delay and the
    /// accumulator. A target longer than a fraction of the device delay is
    /// split so the audio buffer gets refilled in between; the caller then
    /// runs another iteration without decoding.
    pub fn sleep_until_update(
        &mut self,
        ctx: &mut PlaybackContext,
        audio: Option<&AudioSnapshot>,
        clock: &mut RelativeClock,
        commands: &mut CommandQueue,
    ) -> SleepOutcome {
        let mut outcome = SleepOutcome {
            frame_time_remaining: false,
            cancelled: false,
        };

        ctx.time_frame -= clock.relative_time();

        match audio.filter(|s| !s.eof) {
            Some(snapshot) => {
                let speed = ctx.clock.playback_speed;
                let mut delay = snapshot.device_delay;

                if self.config.autosync > 0 {
                    let predicted = ctx.clock.delay / speed + ctx.time_frame;
                    let difference = delay - predicted;
                    delay = predicted + difference / self.config.autosync as f64;
                }

                ctx.time_frame = delay - ctx.clock.delay / speed;

                let bound = delay.clamp(self.config.device_delay_min, self.config.device_delay_max);
                if ctx.time_frame > bound * self.config.oversleep_ratio {
                    outcome.frame_time_remaining = true;
                    ctx.time_frame = bound * self.config.split_sleep_ratio;
                }
            }
            None => {
                if ctx.time_frame < -self.config.catchup_limit {
                    ctx.time_frame = 0.0;
                }
            }
        }

        if ctx.time_frame > 0.0 {
            ctx.stats.sleep_time += ctx.time_frame;
        }

        if ctx.time_frame > self.config.min_sleep {
            let (remaining, cancelled) = self.timing_sleep(ctx.time_frame, clock, commands);
            ctx.time_frame = remaining;
            outcome.cancelled = cancelled;
        }

        outcome
    }

    /// Sleep for `time_frame` seconds, returning what is left.
    ///
    /// Long sleeps go in chunks and stop early when a command is waiting, so
    /// input stays responsive. In soft-sleep mode the last tick is
    /// busy-waited for precision.
    pub fn timing_sleep(
        &mut self,
        time_frame: f64,
        clock: &mut RelativeClock,
        commands: &mut CommandQueue,
    ) -> (f64, bool) {
        let margin = if self.config.softsleep {
            self.config.softsleep_margin
        } else {
            0.0
        };

        let mut remaining = time_frame;
        while remaining > margin {
            let chunk = if remaining > self.config.chunk_threshold {
                if commands.has_pending() {
                    debug!("Sleep cut short by a pending command, {:.3}s left", remaining);
                    return (remaining, true);
                }
                self.config.sleep_chunk
            } else {
                remaining - margin
            };
            clock.sleep(chunk);
            remaining -= clock.relative_time();
        }

        if self.config.softsleep {
            if remaining < 0.0 && !self.underflow_warned {
                self.underflow_warned = true;
                warn!("Soft sleep underflow: overslept by {:.4}s", -remaining);
            }
            while remaining > 0.0 {
                clock.spin();
                remaining -= clock.relative_time();
            }
        }

        (remaining, false)
    }

    /// Measure the A-V offset after a frame and correct the accumulator.
    ///
    /// A large positive offset together with sustained lag means broken
    /// timestamps, not drift, and resets the accumulator outright. Otherwise
    /// a proportional correction, clamped per step, is applied unless the
    /// loop is between the halves of a split sleep.
    pub fn adjust_sync(
        &mut self,
        ctx: &mut PlaybackContext,
        audio: Option<&AudioSnapshot>,
        between_frames: bool,
        frame_time: f64,
    ) -> StatusLine {
        let mut line = StatusLine {
            audio_pos: None,
            video_pos: ctx.clock.video_pts,
            av_delay: 0.0,
            c_total: ctx.stats.c_total,
            frames_presented: ctx.stats.frames_presented,
            frames_decoded: ctx.stats.frames_decoded,
            dropped: ctx.stats.drop_frame_cnt,
            correction: Correction::default(),
            desync_reset: false,
        };

        let Some(snapshot) = audio else {
            return line;
        };

        let a_pts = if self.config.autosync > 0 {
            compute_audio_written_pts(snapshot) - ctx.clock.delay
        } else {
            compute_playing_audio_pts(snapshot)
        };
        ctx.clock.audio_pts = Some(a_pts);

        let v_pts = ctx.clock.video_pts;
        let mut av_delay = a_pts - ctx.audio_delay - v_pts;

        let broken = av_delay > self.config.desync_threshold
            && (ctx.stats.drop_frame_cnt > self.config.desync_drop_count
                || ctx.clock.delay < -ctx.audio_delay - self.config.desync_stall_limit);

        if broken {
            if !self.desync_warned {
                self.desync_warned = true;
                warn!(
                    "Audio/Video desynchronisation of {:.3}s after {} dropped frames, timestamps look broken: resetting",
                    av_delay, ctx.stats.drop_frame_cnt
                );
            }
            ctx.clock.delay = -ctx.audio_delay;
            av_delay = 0.0;
            line.desync_reset = true;
        } else {
            let limit = ctx.clock.max_pts_correction;
            let x = (av_delay * self.config.correction_gain).clamp(-limit, limit);
            line.correction.limit = limit;
            if !between_frames {
                ctx.clock.delay += x;
                ctx.stats.c_total += x;
                line.correction.applied = x;
            }
        }

        ctx.clock.max_pts_correction = max_pts_correction(&self.config, frame_time);

        line.audio_pos = Some(a_pts - ctx.audio_delay);
        line.av_delay = av_delay;
        line.c_total = ctx.stats.c_total;
        line
    }

    /// Forget drop streaks after a seek
    pub fn reset(&mut self) {
        self.dropped_streak = 0;
    }
}
