//! Feeds decoded audio into the output device
//!
//! Every byte the device accepts advances the delay accumulator by
//! `speed * bytes / bps`: that is how far audio has been written ahead of
//! the presented video. Bytes decoded but refused by the device stay in the
//! pump and are reported to the clock model as held back.

use crate::audio::AudioOut;
use crate::decoder::{AudioDecode, AudioDecoder, AudioParams};
use crate::utils::timer::RelativeClock;
use log::{debug, info, warn};

/// Upper bound for a single device write
const MAX_OUTBURST: usize = 65536;

/// Device delay under which a finished stream counts as fully played
const DRAIN_THRESHOLD: f64 = 0.04;

/// Shortest wait between space polls in audio-only playback (seconds)
const MIN_POLL_SLEEP: f64 = 0.010;

/// What one fill pass did
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FillOutcome {
    /// Bytes accepted by the device
    pub played: usize,

    /// The device never freed space during this pass
    pub stalled: bool,

    /// The stream ended and the device has played it out
    pub drained: bool,

    /// Decoder switched to a new output format
    pub format_change: Option<AudioParams>,
}

/// Moves audio from the decoder to the device
pub struct AudioPump {
    /// Decoded bytes waiting for device space
    pending: Vec<u8>,

    /// Decoder reported end of stream
    eof: bool,

    /// Consecutive polls that found no free space
    stall_polls: u32,

    /// Polls after which the device counts as stuck
    stall_limit: u32,

    /// Stuck-device warning already emitted
    stall_warned: bool,
}

impl AudioPump {
    pub fn new(stall_limit: u32) -> Self {
        Self {
            pending: Vec::with_capacity(MAX_OUTBURST),
            eof: false,
            stall_polls: 0,
            stall_limit: stall_limit.max(1),
            stall_warned: false,
        }
    }

    /// Decoded bytes the device has not accepted yet
    pub fn held_back(&self) -> usize {
        self.pending.len()
    }

    /// The decoder has reported end of stream
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// The device has been found stuck at least once
    pub fn is_stalled(&self) -> bool {
        self.stall_warned
    }

    /// Drop held-back audio after a seek
    pub fn flush(&mut self) {
        self.pending.clear();
        self.eof = false;
        self.stall_polls = 0;
    }

    /// Push as much audio as the device accepts.
    ///
    /// Without video there is nothing else to schedule, so the pump waits
    /// for the device to free at least one outburst, polling up to the stall
    /// limit. With video it never waits. A device that keeps reporting no
    /// space is logged once; playback goes on with audio lagging.
    pub fn fill(
        &mut self,
        decoder: &mut dyn AudioDecoder,
        out: &mut dyn AudioOut,
        delay: &mut f64,
        speed: f64,
        has_video: bool,
        clock: &RelativeClock,
    ) -> FillOutcome {
        let mut outcome = FillOutcome::default();
        let outburst = out.outburst().max(1);

        let mut space = out.get_space();
        if !has_video {
            let mut polls = 0;
            while space < outburst && !self.eof && polls < self.stall_limit {
                let missing = (outburst - space) as f64;
                let wait = (missing / out.bytes_per_second().max(1.0)).max(MIN_POLL_SLEEP);
                clock.sleep(wait);
                space = out.get_space();
                polls += 1;
            }
        }

        if space == 0 {
            self.note_stall(&mut outcome);
        } else {
            self.stall_polls = 0;
        }

        let mut scratch = vec![0u8; outburst.min(MAX_OUTBURST)];
        while space > 0 {
            let playsize = space.min(MAX_OUTBURST);

            while self.pending.len() < playsize && !self.eof {
                match decoder.decode(&mut scratch) {
                    AudioDecode::Decoded(0) => break,
                    AudioDecode::Decoded(n) => self.pending.extend_from_slice(&scratch[..n]),
                    AudioDecode::Eof => {
                        debug!("Audio decoder reached end of stream");
                        self.eof = true;
                    }
                    AudioDecode::FormatChange(params) => {
                        info!(
                            "Audio format changed to {} Hz, {} channels",
                            params.sample_rate, params.channels
                        );
                        outcome.format_change = Some(params);
                        break;
                    }
                }
            }

            if outcome.format_change.is_some() {
                break;
            }

            let chunk = playsize.min(self.pending.len());
            if chunk == 0 {
                break;
            }

            let final_chunk = self.eof && chunk == self.pending.len();
            let played = out.play(&self.pending[..chunk], final_chunk);
            if played == 0 {
                break;
            }

            self.pending.drain(..played);
            *delay += speed * played as f64 / out.bytes_per_second().max(1.0);
            outcome.played += played;
            space = space.saturating_sub(played);
        }

        if self.eof && self.pending.is_empty() && out.get_delay() < DRAIN_THRESHOLD {
            outcome.drained = true;
        }

        outcome
    }

    fn note_stall(&mut self, outcome: &mut FillOutcome) {
        self.stall_polls += 1;
        if self.stall_polls >= self.stall_limit {
            outcome.stalled = true;
            if !self.stall_warned {
                self.stall_warned = true;
                warn!(
                    "Audio device got stuck: no free space after {} polls, continuing without it",
                    self.stall_polls
                );
            }
        }
    }
}
