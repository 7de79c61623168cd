//! Presentation-side collaborators
//!
//! The video output and the subtitle renderer are owned by other subsystems.
//! The engine only tells them when to present, reset, pause and resume.

use crate::decoder::Frame;

/// Control requests understood by a video output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoControl {
    /// Drop any queued frames after a position jump
    Reset,

    /// Stop refreshing, keep the last frame on screen
    Pause,

    /// Continue after `Pause`
    Resume,
}

/// Video output interface
pub trait VideoOutput: Send {
    /// Send a control request
    fn control(&mut self, request: VoControl);

    /// Show a decoded frame now
    fn present(&mut self, frame: &Frame);

    /// Service window events; called periodically while paused
    fn check_events(&mut self) {}
}

/// Subtitle/overlay update hook
pub trait SubtitleSink: Send {
    /// Update overlays for `video_pts`. `reset` flushes queued subtitles.
    fn update(&mut self, video_pts: f64, reset: bool);
}

/// Subtitle sink for streams without subtitles
pub struct NoSubtitles;

impl SubtitleSink for NoSubtitles {
    fn update(&mut self, _video_pts: f64, _reset: bool) {}
}
