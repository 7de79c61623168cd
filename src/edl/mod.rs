//! Edit decision list engine
//!
//! An EDL is a sorted list of time windows, each either skipped or muted.
//! Mute windows are expanded into two toggle points, one at each edge. The
//! engine walks a cursor over the points as the video position advances and
//! tells the controller which seeks and mute changes to make.

mod parser;

pub use parser::{load_edl, parse_edl};

use crate::player::PlaybackContext;
use crate::utils::error::{AvClockError, Result};
use log::{debug, info, warn};

/// What to do inside a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdlAction {
    Skip,
    Mute,
}

/// One EDL window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdlRecord {
    pub start_sec: f64,
    pub stop_sec: f64,
    pub action: EdlAction,
}

impl EdlRecord {
    pub fn new(start_sec: f64, stop_sec: f64, action: EdlAction) -> Self {
        Self {
            start_sec,
            stop_sec,
            action,
        }
    }

    pub fn length(&self) -> f64 {
        self.stop_sec - self.start_sec
    }
}

/// Request from the engine to the controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdlEvent {
    /// A skip window was reached. `seek` is the relative seek that jumps
    /// past it; `None` when playback is already past its end.
    Skip {
        start: f64,
        stop: f64,
        seek: Option<f64>,
    },

    /// The EDL mute state changed
    Mute { muted: bool },

    /// A backward seek landed inside a skip window; seek this far back
    Rewind { seek: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PointKind {
    Skip,
    MuteToggle,
}

#[derive(Debug, Clone, Copy)]
struct EdlPoint {
    at: f64,
    stop: f64,
    kind: PointKind,
}

/// Applies an EDL as playback advances
pub struct EdlEngine {
    points: Vec<EdlPoint>,
    cursor: usize,
    backward_delay: f64,

    /// Skip point whose seek was issued last
    just_skipped: Option<usize>,
}

impl EdlEngine {
    /// Build an engine from records sorted by start time without overlaps
    pub fn new(records: Vec<EdlRecord>, backward_delay: f64) -> Result<Self> {
        let mut last_stop = f64::NEG_INFINITY;
        for record in &records {
            if !(record.start_sec <= record.stop_sec) {
                return Err(AvClockError::InvalidInput(format!(
                    "EDL record {:?} ends before it starts",
                    record
                )));
            }
            if record.start_sec < last_stop {
                return Err(AvClockError::InvalidInput(format!(
                    "EDL record {:?} overlaps the previous one",
                    record
                )));
            }
            last_stop = record.stop_sec;
        }

        let mut points = Vec::with_capacity(records.len() * 2);
        for record in &records {
            match record.action {
                EdlAction::Skip => points.push(EdlPoint {
                    at: record.start_sec,
                    stop: record.stop_sec,
                    kind: PointKind::Skip,
                }),
                EdlAction::Mute => {
                    points.push(EdlPoint {
                        at: record.start_sec,
                        stop: record.stop_sec,
                        kind: PointKind::MuteToggle,
                    });
                    points.push(EdlPoint {
                        at: record.stop_sec,
                        stop: record.stop_sec,
                        kind: PointKind::MuteToggle,
                    });
                }
            }
        }

        if !points.is_empty() {
            let skipped: f64 = records
                .iter()
                .filter(|r| r.action == EdlAction::Skip)
                .map(EdlRecord::length)
                .sum();
            info!("Loaded EDL with {} records, {:.1}s skipped", records.len(), skipped);
        }

        Ok(Self {
            points,
            cursor: 0,
            backward_delay,
            just_skipped: None,
        })
    }

    pub fn is_active(&self) -> bool {
        !self.points.is_empty()
    }

    /// Drop all records
    pub fn disable(&mut self) {
        self.points.clear();
        self.cursor = 0;
        self.just_skipped = None;
    }

    /// Check the EDL against the current video position
    pub fn update(&mut self, ctx: &mut PlaybackContext, has_video: bool) -> Vec<EdlEvent> {
        let mut events = Vec::new();
        if self.points.is_empty() {
            return events;
        }

        if !has_video {
            warn!("EDL needs a video stream, disabling it");
            self.disable();
            return events;
        }

        let pts = ctx.clock.video_pts;

        if ctx.edl_needs_reset {
            ctx.edl_needs_reset = false;
            if let Some(rewind) = self.reset(ctx, pts, &mut events) {
                events.push(rewind);
                return events;
            }
        }

        while let Some(point) = self.points.get(self.cursor).copied() {
            if point.at > pts {
                break;
            }

            match point.kind {
                PointKind::Skip => {
                    let seek = (point.stop > pts).then(|| point.stop - pts);
                    debug!(
                        "EDL skip [{:.3}, {:.3}] at {:.3}",
                        point.at, point.stop, pts
                    );
                    if seek.is_some() {
                        self.just_skipped = Some(self.cursor);
                    }
                    events.push(EdlEvent::Skip {
                        start: point.at,
                        stop: point.stop,
                        seek,
                    });
                }
                PointKind::MuteToggle => {
                    ctx.edl_muted = !ctx.edl_muted;
                    debug!("EDL mute {} at {:.3}", ctx.edl_muted, pts);
                    events.push(EdlEvent::Mute {
                        muted: ctx.edl_muted,
                    });
                }
            }
            self.cursor += 1;
        }

        events
    }

    /// Re-derive cursor and mute state after a position jump.
    ///
    /// Returns a rewind request when a backward seek landed inside a skip
    /// window, so playback resumes a little before it instead.
    fn reset(&mut self, ctx: &mut PlaybackContext, pts: f64, events: &mut Vec<EdlEvent>) -> Option<EdlEvent> {
        let was_muted = ctx.edl_muted;
        let backward = ctx.edl_backward;
        let just_skipped = self.just_skipped.take();
        ctx.edl_backward = false;
        ctx.edl_muted = false;
        self.cursor = 0;

        while let Some(point) = self.points.get(self.cursor).copied() {
            if point.at > pts {
                break;
            }

            match point.kind {
                PointKind::MuteToggle => ctx.edl_muted = !ctx.edl_muted,
                PointKind::Skip if pts < point.stop => {
                    if backward && point.at > 0.0 {
                        let target = (point.at - self.backward_delay).max(0.0);
                        debug!("Backward seek landed in EDL skip window, rewinding to {:.3}", target);
                        return Some(EdlEvent::Rewind { seek: target - pts });
                    }
                    if just_skipped != Some(self.cursor) {
                        // the per-frame check skips it
                        break;
                    }
                }
                PointKind::Skip => {}
            }
            self.cursor += 1;
        }

        if ctx.edl_muted != was_muted {
            events.push(EdlEvent::Mute {
                muted: ctx.edl_muted,
            });
        }
        None
    }
}
