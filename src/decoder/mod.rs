//! Decode-side collaborators
//!
//! Demuxing and decoding are not part of this crate. The engine consumes them
//! through the narrow traits below: seek the container, pull decoded audio
//! bytes, pull decoded video frames, and read the decoder's timestamp state.

/// Whether a seek amount is an offset or a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    Relative,
    Absolute,
}

/// Whether a seek amount is in seconds or a fraction of the duration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekUnit {
    Seconds,
    Fraction,
}

/// How a seek amount is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekStyle {
    pub origin: SeekOrigin,
    pub unit: SeekUnit,
}

impl SeekStyle {
    pub const RELATIVE: SeekStyle = SeekStyle {
        origin: SeekOrigin::Relative,
        unit: SeekUnit::Seconds,
    };

    pub const ABSOLUTE: SeekStyle = SeekStyle {
        origin: SeekOrigin::Absolute,
        unit: SeekUnit::Seconds,
    };

    pub const RELATIVE_FRACTION: SeekStyle = SeekStyle {
        origin: SeekOrigin::Relative,
        unit: SeekUnit::Fraction,
    };

    pub const ABSOLUTE_FRACTION: SeekStyle = SeekStyle {
        origin: SeekOrigin::Absolute,
        unit: SeekUnit::Fraction,
    };

    /// Resolve `amount` to a target position in seconds.
    ///
    /// Fractional styles need the stream duration; `None` is returned when it
    /// is unknown.
    pub fn target(&self, amount: f64, current: f64, duration: Option<f64>) -> Option<f64> {
        let seconds = match self.unit {
            SeekUnit::Seconds => amount,
            SeekUnit::Fraction => amount * duration?,
        };

        Some(match self.origin {
            SeekOrigin::Relative => current + seconds,
            SeekOrigin::Absolute => seconds,
        })
    }
}

/// Container seeking
pub trait Demuxer: Send {
    /// Reposition the stream. Returns false if the stream cannot seek.
    fn seek(&mut self, amount: f64, style: SeekStyle) -> bool;

    /// Video timestamp the demuxer landed on after the last seek
    fn video_pts(&self) -> f64;

    /// Stream duration in seconds, when known
    fn duration(&self) -> Option<f64>;
}

/// Output format of the audio decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioParams {
    pub sample_rate: u32,
    pub channels: u16,
    pub bytes_per_sample: u16,
}

impl AudioParams {
    /// Bytes per second of decoded output
    pub fn bytes_per_second(&self) -> f64 {
        self.sample_rate as f64 * self.channels as f64 * self.bytes_per_sample as f64
    }
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            bytes_per_sample: 2,
        }
    }
}

/// Result of one audio decode call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioDecode {
    /// This many bytes were written into the buffer
    Decoded(usize),

    /// No more audio in the stream
    Eof,

    /// The output format changed; nothing was written
    FormatChange(AudioParams),
}

/// Timestamp bookkeeping exposed by the audio decoder
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DecoderPts {
    /// Pts of the last decoded packet with a known timestamp
    pub pts: Option<f64>,

    /// Bytes the decoder has output since `pts`
    pub pts_bytes: usize,

    /// Pts of the last packet the demuxer handed to the decoder
    pub demux_pts: f64,

    /// Bytes read by the decoder since `demux_pts`
    pub demux_bytes: usize,

    /// Read but not yet decoded input bytes
    pub input_buffered: usize,

    /// Input bitrate in bytes per second, 0 when unknown
    pub input_bps: u32,

    /// Decoded bytes not yet pushed through the filter chain
    pub unfiltered: usize,

    /// Latency of the filter chain in output bytes
    pub filter_delay: f64,
}

/// Audio decoding
pub trait AudioDecoder: Send {
    /// Decode into `buf`
    fn decode(&mut self, buf: &mut [u8]) -> AudioDecode;

    /// Current output format
    fn params(&self) -> AudioParams;

    /// Timestamp state for the clock model
    fn pts_state(&self) -> DecoderPts;
}

/// One decoded video frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    /// Presentation timestamp in seconds
    pub pts: f64,

    /// Nominal duration in seconds
    pub frame_time: f64,

    /// Decoder skipped this frame on request
    pub dropped: bool,
}

/// Video decoding
pub trait VideoDecoder: Send {
    /// Decode the next frame. `drop` asks the decoder to skip the work.
    /// Returns `None` at end of stream.
    fn decode(&mut self, drop: bool) -> Option<Frame>;

    /// Nominal frame duration in seconds
    fn frame_time(&self) -> f64;
}
