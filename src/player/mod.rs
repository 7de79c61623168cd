//! Playback control loop for avclock
//!
//! This module holds the per-stream [`PlaybackContext`] that every component
//! reads and mutates, the bundle of external collaborators ([`MediaIo`]), and
//! the components that drive them: the frame scheduler, the transport state
//! machine and the controller that runs one iteration at a time.

mod command;
mod controller;
mod scheduler;
mod transport;

pub use command::{CommandQueue, CommandSender, PlayerCommand};
pub use controller::{ControllerBuilder, Iteration, PlaybackController, StatusHandle, StatusSnapshot, StopReason};
pub use scheduler::{max_pts_correction, Correction, DropDecision, FrameScheduler, SleepOutcome, StatusLine};
pub use transport::{transition, SideEffect, Transition, TransportController};

use crate::audio::{AudioOut, AudioPump, PlaybackClock};
use crate::utils::config::AudioConfig;
use crate::decoder::{AudioDecoder, Demuxer, VideoDecoder};
use crate::renderer::{SubtitleSink, VideoOutput};

/// Transport state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// No item playing
    Stopped,

    /// Currently playing
    Playing,

    /// Playback paused
    Paused,
}

/// Events fed to the transport state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// Start playing an item
    Play,

    /// Suspend playback
    Pause,

    /// Continue after a pause; `eof` if the stream ended meanwhile
    Resume { eof: bool },

    /// Jump to another position
    Seek,

    /// User stop
    Stop,

    /// Stream played out
    EndOfStream,
}

/// Drift-correction and frame statistics, reset on every seek
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SyncStats {
    /// Sum of all drift corrections applied since the last seek
    pub c_total: f64,

    /// Frames found late enough to drop
    pub drop_frame_cnt: u64,

    /// Frames checked for dropping
    pub total_frame_cnt: u64,

    pub frames_decoded: u64,
    pub frames_presented: u64,
    pub frames_dropped: u64,

    /// Total time the scheduler asked to sleep
    pub sleep_time: f64,

    /// Wall time spent feeding audio
    pub audio_time_usage: f64,

    /// Wall time spent decoding video
    pub video_time_usage: f64,

    /// Wall time spent presenting video
    pub vout_time_usage: f64,
}

impl SyncStats {
    /// Clear the counters a position jump invalidates
    pub fn reset_after_seek(&mut self) {
        self.c_total = 0.0;
        self.drop_frame_cnt = 0;
        self.audio_time_usage = 0.0;
        self.video_time_usage = 0.0;
        self.vout_time_usage = 0.0;
    }
}

/// Mutable state of one playing stream
///
/// Owned by the control loop and passed by reference to every component.
#[derive(Debug, Clone)]
pub struct PlaybackContext {
    pub clock: PlaybackClock,

    /// Seconds until the pending frame is due
    pub time_frame: f64,

    /// Decoded frames not yet presented
    pub buffered_frames: u32,

    /// EDL cursor must be rewound before the next check
    pub edl_needs_reset: bool,

    /// Last seek went backwards
    pub edl_backward: bool,

    pub user_muted: bool,
    pub edl_muted: bool,

    /// Mute state last pushed to the audio device
    pub output_muted: bool,

    /// Stream has ended
    pub eof: bool,

    /// On-screen function is in the pause state
    pub osd_paused: bool,

    /// User audio delay in seconds
    pub audio_delay: f64,

    pub stats: SyncStats,
}

impl PlaybackContext {
    pub fn new(playback_speed: f64, audio_delay: f64) -> Self {
        Self {
            clock: PlaybackClock::new(playback_speed),
            time_frame: 0.0,
            buffered_frames: 0,
            edl_needs_reset: true,
            edl_backward: false,
            user_muted: false,
            edl_muted: false,
            output_muted: false,
            eof: false,
            osd_paused: false,
            audio_delay,
            stats: SyncStats::default(),
        }
    }

    /// Mute state the output should be in
    pub fn effective_muted(&self) -> bool {
        self.user_muted || self.edl_muted
    }
}

/// Audio decode and output for one stream
pub struct AudioChain {
    pub decoder: Box<dyn AudioDecoder>,
    pub out: Box<dyn AudioOut>,
    pub pump: AudioPump,
}

impl AudioChain {
    pub fn new(decoder: Box<dyn AudioDecoder>, out: Box<dyn AudioOut>, config: &AudioConfig) -> Self {
        Self {
            decoder,
            out,
            pump: AudioPump::new(config.stall_polls),
        }
    }
}

/// Video decode and output for one stream
pub struct VideoChain {
    pub decoder: Box<dyn VideoDecoder>,
    pub out: Box<dyn VideoOutput>,
}

impl VideoChain {
    pub fn new(decoder: Box<dyn VideoDecoder>, out: Box<dyn VideoOutput>) -> Self {
        Self { decoder, out }
    }
}

/// External collaborators of one playing stream
pub struct MediaIo {
    pub demuxer: Box<dyn Demuxer>,
    pub audio: Option<AudioChain>,
    pub video: Option<VideoChain>,
    pub subtitles: Box<dyn SubtitleSink>,
}

impl MediaIo {
    /// Nominal video frame duration, 0 without video
    pub fn frame_time(&self) -> f64 {
        self.video.as_ref().map(|v| v.decoder.frame_time()).unwrap_or(0.0)
    }
}

/// Push the effective mute state to the audio device if it changed
pub fn apply_mute(ctx: &mut PlaybackContext, io: &mut MediaIo) {
    let muted = ctx.effective_muted();
    if muted == ctx.output_muted {
        return;
    }
    if let Some(audio) = io.audio.as_mut() {
        audio.out.set_muted(muted);
    }
    ctx.output_muted = muted;
}

/// Player event for external observers
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Transport state changed
    StateChanged(TransportState),

    /// A seek landed
    Seeked { position: f64 },

    /// EDL skipped a region
    EdlSkip { start: f64, stop: f64 },

    /// Effective output mute changed
    MuteChanged { muted: bool },

    /// Timestamps were found broken and the clock hard-reset
    Desync,

    /// The audio device stopped accepting data
    DeviceStalled,

    /// The sync master announced its exit
    MasterExited,

    /// End of stream reached
    EndOfStream,
}

/// Player event handler trait
pub trait PlayerEventHandler: Send {
    fn handle_event(&mut self, event: PlayerEvent);
}
