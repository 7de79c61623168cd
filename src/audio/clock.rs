//! Audio clock model
//!
//! Reconciles the decoder's timestamps with the bytes sitting in buffers
//! between the decoder and the speaker. All functions here are pure: they
//! read one [`AudioSnapshot`] taken by the caller, so two computations in the
//! same scheduling phase can never see inconsistent device state.

use crate::audio::{AudioOut, AudioPump};
use crate::decoder::{AudioDecoder, DecoderPts};

/// Lowest output sample rate the filter chain is configured with
pub const MIN_OUTPUT_RATE: u32 = 8000;

/// Highest output sample rate the filter chain is configured with
pub const MAX_OUTPUT_RATE: u32 = 192000;

/// Authoritative clock state of the main loop
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackClock {
    /// Seconds of audio written ahead of the presented video, signed
    pub delay: f64,

    /// Currently audible audio pts, when audio is playing
    pub audio_pts: Option<f64>,

    /// Pts of the last decoded video frame
    pub video_pts: f64,

    /// Playback speed multiplier, always > 0
    pub playback_speed: f64,

    /// Per-step clamp for drift correction
    pub max_pts_correction: f64,
}

impl PlaybackClock {
    pub fn new(playback_speed: f64) -> Self {
        Self {
            delay: 0.0,
            audio_pts: None,
            video_pts: 0.0,
            playback_speed,
            max_pts_correction: 0.0,
        }
    }

    /// Forget accumulated delay and timestamps after a position jump
    pub fn reset(&mut self, video_pts: f64) {
        self.delay = 0.0;
        self.audio_pts = None;
        self.video_pts = video_pts;
    }
}

/// Output rate chosen for a given speed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputRate {
    /// Sample rate the filter chain resamples to
    pub sample_rate: u32,

    /// Speed actually achieved after clamping the rate
    pub effective_speed: f64,
}

/// Compute the output sample rate for playing `input_rate` audio at `speed`.
///
/// The rate is clamped to `[MIN_OUTPUT_RATE, MAX_OUTPUT_RATE]`; when clamping
/// kicks in the effective speed is recomputed from the clamped rate.
pub fn output_sample_rate(input_rate: u32, speed: f64) -> OutputRate {
    if input_rate == 0 || !(speed > 0.0) {
        return OutputRate {
            sample_rate: input_rate.clamp(MIN_OUTPUT_RATE, MAX_OUTPUT_RATE),
            effective_speed: 1.0,
        };
    }

    let wanted = (input_rate as f64 * speed).round();
    let sample_rate = wanted.clamp(MIN_OUTPUT_RATE as f64, MAX_OUTPUT_RATE as f64) as u32;
    let effective_speed = if sample_rate as f64 == wanted {
        speed
    } else {
        sample_rate as f64 / input_rate as f64
    };

    OutputRate {
        sample_rate,
        effective_speed,
    }
}

/// Decoder and device state captured at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioSnapshot {
    /// Decoder timestamp bookkeeping
    pub decoder: DecoderPts,

    /// Decoder output byte rate
    pub decoder_bps: f64,

    /// Decoded bytes the device has not accepted yet
    pub held_back: usize,

    /// Device latency in seconds
    pub device_delay: f64,

    /// Device byte rate
    pub device_bps: f64,

    /// Playback speed at capture time
    pub speed: f64,

    /// Audio stream has ended
    pub eof: bool,
}

impl AudioSnapshot {
    /// Query decoder, pump and device once
    pub fn capture(
        decoder: &dyn AudioDecoder,
        out: &dyn AudioOut,
        pump: &AudioPump,
        speed: f64,
    ) -> Self {
        Self {
            decoder: decoder.pts_state(),
            decoder_bps: decoder.params().bytes_per_second(),
            held_back: pump.held_back(),
            device_delay: out.get_delay(),
            device_bps: out.bytes_per_second(),
            speed,
            eof: pump.is_eof(),
        }
    }
}

/// Pts of the end of the audio already handed to the output device.
///
/// Starts from the decoder's latest pts plus what it decoded since, then
/// subtracts everything decoded but not yet in the device. Decoders that do
/// not track output pts fall back to the demuxer pts plus the input bytes
/// consumed since, divided by the input bitrate.
pub fn compute_audio_written_pts(snapshot: &AudioSnapshot) -> f64 {
    let d = &snapshot.decoder;
    let decoder_bps = if snapshot.decoder_bps > 0.0 { snapshot.decoder_bps } else { 1.0 };

    let mut a_pts = match d.pts {
        Some(pts) => pts + d.pts_bytes as f64 / decoder_bps,
        None => {
            let mut pts = d.demux_pts;
            if d.input_bps > 0 {
                pts += d.demux_bytes.saturating_sub(d.input_buffered) as f64 / d.input_bps as f64;
            }
            pts
        }
    };

    // decoded, not filtered
    a_pts -= d.unfiltered as f64 / decoder_bps;

    // filters shorten audio by the playback speed, so scale back
    if snapshot.device_bps > 0.0 {
        let buffered_output = d.filter_delay + snapshot.held_back as f64;
        a_pts -= buffered_output * snapshot.speed / snapshot.device_bps;
    }

    a_pts
}

/// Pts of the audio currently coming out of the speaker
pub fn compute_playing_audio_pts(snapshot: &AudioSnapshot) -> f64 {
    compute_audio_written_pts(snapshot) - snapshot.speed * snapshot.device_delay
}
