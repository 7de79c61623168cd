//! Audio side of the playback clock
//!
//! The audio device is the reference clock whenever a stream has audio. This
//! module defines the narrow device interface the engine drives, the clock
//! model that turns decoder and device state into a position, and the pump
//! that keeps the device fed.

pub mod clock;
pub mod pump;

pub use clock::{
    compute_audio_written_pts, compute_playing_audio_pts, output_sample_rate, AudioSnapshot,
    OutputRate, PlaybackClock, MAX_OUTPUT_RATE, MIN_OUTPUT_RATE,
};
pub use pump::{AudioPump, FillOutcome};

/// Audio output device interface
///
/// Implementations own the actual sound device. The engine only queries
/// latency and free space, hands over bytes, and issues control calls.
pub trait AudioOut: Send {
    /// Seconds of queued audio that have not been heard yet
    fn get_delay(&self) -> f64;

    /// Bytes the device accepts right now without blocking
    fn get_space(&self) -> usize;

    /// Queue audio bytes. Returns the number of bytes accepted.
    ///
    /// `final_chunk` marks the last data of the stream, which the device
    /// should accept even if it is shorter than its preferred block size.
    fn play(&mut self, data: &[u8], final_chunk: bool) -> usize;

    /// Stop and discard everything queued
    fn reset(&mut self);

    /// Stop playing but keep queued data
    fn pause(&mut self);

    /// Continue after `pause`
    fn resume(&mut self);

    /// Silence or restore output
    fn set_muted(&mut self, muted: bool);

    /// Byte rate the device consumes at normal speed
    fn bytes_per_second(&self) -> f64;

    /// Preferred write size in bytes
    fn outburst(&self) -> usize {
        4096
    }
}
