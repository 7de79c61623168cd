//! Simulated media and devices
//!
//! Deterministic stand-ins for the demuxer, decoders and output devices, all
//! running on a [`TimeSource`]. With a [`VirtualClock`] the whole control loop
//! runs as fast as the CPU allows while every sleep and device drain still
//! happens in simulated time.

use crate::audio::AudioOut;
use crate::decoder::{
    AudioDecode, AudioDecoder, AudioParams, DecoderPts, Demuxer, Frame, SeekStyle, VideoDecoder,
};
use crate::net::DatagramSource;
use crate::renderer::{SubtitleSink, VideoOutput, VoControl};
use crate::utils::timer::TimeSource;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

/// Shortest step a virtual sleep takes
const MIN_SLEEP_STEP: f64 = 1e-6;

/// Step of one virtual busy-wait iteration
const SPIN_STEP: f64 = 1e-4;

/// Manually driven clock. Sleeping advances it instantly.
pub struct VirtualClock {
    now: Mutex<f64>,
}

impl VirtualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { now: Mutex::new(0.0) })
    }

    /// Move time forward
    pub fn advance(&self, seconds: f64) {
        if seconds > 0.0 {
            *self.now.lock() += seconds;
        }
    }
}

impl TimeSource for VirtualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }

    fn sleep(&self, seconds: f64) {
        self.advance(seconds.max(MIN_SLEEP_STEP));
        std::thread::yield_now();
    }

    fn spin(&self) {
        self.advance(SPIN_STEP);
    }
}

struct MediaState {
    duration: f64,
    frame_time: f64,
    seekable: bool,

    next_frame: u64,
    last_pts: f64,

    audio_params: AudioParams,
    audio_offset: f64,
    audio_start: f64,
    audio_tail: f64,
    audio_produced: usize,

    seeks: Vec<f64>,
}

impl MediaState {
    fn frame_pts(&self, index: u64) -> f64 {
        index as f64 * self.frame_time
    }

    fn audio_total(&self) -> usize {
        let length = self.duration + self.audio_tail - self.audio_start;
        (length.max(0.0) * self.audio_params.bytes_per_second()).round() as usize
    }
}

/// A synthetic stream with constant frame rate video and silent audio
#[derive(Clone)]
pub struct SimMedia {
    state: Arc<Mutex<MediaState>>,
}

impl SimMedia {
    pub fn new(duration: f64, fps: f64) -> Self {
        let frame_time = if fps > 0.0 { 1.0 / fps } else { 0.04 };
        Self {
            state: Arc::new(Mutex::new(MediaState {
                duration,
                frame_time,
                seekable: true,
                next_frame: 0,
                last_pts: 0.0,
                audio_params: AudioParams::default(),
                audio_offset: 0.0,
                audio_start: 0.0,
                audio_tail: 0.0,
                audio_produced: 0,
                seeks: Vec::new(),
            })),
        }
    }

    pub fn with_audio_params(self, params: AudioParams) -> Self {
        self.state.lock().audio_params = params;
        self
    }

    /// Shift audio timestamps against video
    pub fn with_audio_offset(self, offset: f64) -> Self {
        self.state.lock().audio_offset = offset;
        self
    }

    /// Let audio run on for `seconds` after the last video frame
    pub fn with_audio_tail(self, seconds: f64) -> Self {
        self.state.lock().audio_tail = seconds;
        self
    }

    pub fn unseekable(self) -> Self {
        self.state.lock().seekable = false;
        self
    }

    pub fn demuxer(&self) -> SimDemuxer {
        SimDemuxer {
            state: self.state.clone(),
        }
    }

    pub fn audio_decoder(&self) -> SimAudioDecoder {
        SimAudioDecoder {
            state: self.state.clone(),
        }
    }

    pub fn video_decoder(&self) -> SimVideoDecoder {
        SimVideoDecoder {
            state: self.state.clone(),
        }
    }

    pub fn audio_params(&self) -> AudioParams {
        self.state.lock().audio_params
    }

    pub fn frame_time(&self) -> f64 {
        self.state.lock().frame_time
    }

    /// Positions every successful seek landed on
    pub fn seeks(&self) -> Vec<f64> {
        self.state.lock().seeks.clone()
    }
}

/// Demuxer over a [`SimMedia`]
pub struct SimDemuxer {
    state: Arc<Mutex<MediaState>>,
}

impl Demuxer for SimDemuxer {
    fn seek(&mut self, amount: f64, style: SeekStyle) -> bool {
        let mut state = self.state.lock();
        if !state.seekable {
            return false;
        }

        let Some(target) = style.target(amount, state.last_pts, Some(state.duration)) else {
            return false;
        };
        let target = target.clamp(0.0, state.duration);

        // land on the frame at or before the target
        let index = (target / state.frame_time + 1e-9).floor().max(0.0) as u64;
        let landed = state.frame_pts(index);

        state.next_frame = index;
        state.last_pts = landed;
        state.audio_start = landed;
        state.audio_produced = 0;
        state.seeks.push(landed);
        true
    }

    fn video_pts(&self) -> f64 {
        self.state.lock().last_pts
    }

    fn duration(&self) -> Option<f64> {
        Some(self.state.lock().duration)
    }
}

/// Audio decoder producing silence at the stream's byte rate
pub struct SimAudioDecoder {
    state: Arc<Mutex<MediaState>>,
}

impl SimAudioDecoder {
    /// Standalone decoder for `duration` seconds of audio starting at `start_pts`
    pub fn new(params: AudioParams, start_pts: f64, duration: f64) -> Self {
        let media = SimMedia::new(start_pts + duration, 25.0).with_audio_params(params);
        {
            let mut state = media.state.lock();
            state.audio_start = start_pts;
        }
        media.audio_decoder()
    }
}

impl AudioDecoder for SimAudioDecoder {
    fn decode(&mut self, buf: &mut [u8]) -> AudioDecode {
        let mut state = self.state.lock();
        let remaining = state.audio_total().saturating_sub(state.audio_produced);
        if remaining == 0 {
            return AudioDecode::Eof;
        }

        let n = remaining.min(buf.len());
        buf[..n].fill(0);
        state.audio_produced += n;
        AudioDecode::Decoded(n)
    }

    fn params(&self) -> AudioParams {
        self.state.lock().audio_params
    }

    fn pts_state(&self) -> DecoderPts {
        let state = self.state.lock();
        DecoderPts {
            pts: Some(state.audio_start + state.audio_offset),
            pts_bytes: state.audio_produced,
            ..Default::default()
        }
    }
}

/// Constant frame rate video decoder
pub struct SimVideoDecoder {
    state: Arc<Mutex<MediaState>>,
}

impl VideoDecoder for SimVideoDecoder {
    fn decode(&mut self, drop: bool) -> Option<Frame> {
        let mut state = self.state.lock();
        let pts = state.frame_pts(state.next_frame);
        if pts >= state.duration - 1e-9 {
            return None;
        }

        state.next_frame += 1;
        state.last_pts = pts;
        Some(Frame {
            pts,
            frame_time: state.frame_time,
            dropped: drop,
        })
    }

    fn frame_time(&self) -> f64 {
        self.state.lock().frame_time
    }
}

struct DeviceState {
    time: Arc<dyn TimeSource>,
    bps: f64,
    capacity: usize,
    queued: f64,
    last: f64,
    paused: bool,
    stuck: bool,
    muted: bool,
    resets: u32,
}

impl DeviceState {
    fn settle(&mut self) {
        let now = self.time.now();
        if !self.paused {
            self.queued = (self.queued - (now - self.last) * self.bps).max(0.0);
        }
        self.last = now;
    }

    fn space(&self) -> usize {
        if self.stuck {
            return 0;
        }
        self.capacity.saturating_sub(self.queued.ceil() as usize)
    }
}

/// Audio device draining its buffer in real or virtual time
pub struct SimAudioOut {
    state: Arc<Mutex<DeviceState>>,
}

impl SimAudioOut {
    pub fn new(time: Arc<dyn TimeSource>, bytes_per_second: f64, buffer_secs: f64) -> Self {
        let last = time.now();
        Self {
            state: Arc::new(Mutex::new(DeviceState {
                time,
                bps: bytes_per_second,
                capacity: (bytes_per_second * buffer_secs).round() as usize,
                queued: 0.0,
                last,
                paused: false,
                stuck: false,
                muted: false,
                resets: 0,
            })),
        }
    }

    /// Make the device stop reporting free space
    pub fn set_stuck(&self, stuck: bool) {
        self.state.lock().stuck = stuck;
    }

    /// Inspection handle that stays valid after the device is boxed
    pub fn handle(&self) -> SimAudioHandle {
        SimAudioHandle {
            state: self.state.clone(),
        }
    }
}

impl AudioOut for SimAudioOut {
    fn get_delay(&self) -> f64 {
        let mut state = self.state.lock();
        state.settle();
        state.queued / state.bps
    }

    fn get_space(&self) -> usize {
        let mut state = self.state.lock();
        state.settle();
        state.space()
    }

    fn play(&mut self, data: &[u8], _final_chunk: bool) -> usize {
        let mut state = self.state.lock();
        state.settle();
        let accepted = data.len().min(state.space());
        state.queued += accepted as f64;
        accepted
    }

    fn reset(&mut self) {
        let mut state = self.state.lock();
        state.settle();
        state.queued = 0.0;
        state.paused = false;
        state.resets += 1;
    }

    fn pause(&mut self) {
        let mut state = self.state.lock();
        state.settle();
        state.paused = true;
    }

    fn resume(&mut self) {
        let mut state = self.state.lock();
        state.settle();
        state.paused = false;
    }

    fn set_muted(&mut self, muted: bool) {
        self.state.lock().muted = muted;
    }

    fn bytes_per_second(&self) -> f64 {
        self.state.lock().bps
    }

    fn outburst(&self) -> usize {
        ((self.state.lock().bps * 0.05).round() as usize).max(1)
    }
}

/// Read-only view of a [`SimAudioOut`]
#[derive(Clone)]
pub struct SimAudioHandle {
    state: Arc<Mutex<DeviceState>>,
}

impl SimAudioHandle {
    pub fn muted(&self) -> bool {
        self.state.lock().muted
    }

    pub fn paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn resets(&self) -> u32 {
        self.state.lock().resets
    }

    pub fn set_stuck(&self, stuck: bool) {
        self.state.lock().stuck = stuck;
    }
}

#[derive(Default)]
struct VideoLog {
    presented: Vec<f64>,
    controls: Vec<VoControl>,
    event_checks: u64,
}

/// Video output recording what it was asked to do
pub struct SimVideoOut {
    log: Arc<Mutex<VideoLog>>,
    time: Arc<dyn TimeSource>,
    present_cost: f64,
}

impl SimVideoOut {
    pub fn new(time: Arc<dyn TimeSource>) -> Self {
        Self {
            log: Arc::new(Mutex::new(VideoLog::default())),
            time,
            present_cost: 0.0,
        }
    }

    /// Make every present take this long
    pub fn with_present_cost(mut self, seconds: f64) -> Self {
        self.present_cost = seconds;
        self
    }

    pub fn handle(&self) -> SimVideoHandle {
        SimVideoHandle {
            log: self.log.clone(),
        }
    }
}

impl VideoOutput for SimVideoOut {
    fn control(&mut self, request: VoControl) {
        self.log.lock().controls.push(request);
    }

    fn present(&mut self, frame: &Frame) {
        if self.present_cost > 0.0 {
            self.time.sleep(self.present_cost);
        }
        self.log.lock().presented.push(frame.pts);
    }

    fn check_events(&mut self) {
        self.log.lock().event_checks += 1;
    }
}

/// Read-only view of a [`SimVideoOut`]
#[derive(Clone)]
pub struct SimVideoHandle {
    log: Arc<Mutex<VideoLog>>,
}

impl SimVideoHandle {
    /// Pts of every presented frame, in order
    pub fn presented(&self) -> Vec<f64> {
        self.log.lock().presented.clone()
    }

    pub fn controls(&self) -> Vec<VoControl> {
        self.log.lock().controls.clone()
    }

    pub fn event_checks(&self) -> u64 {
        self.log.lock().event_checks
    }
}

/// Subtitle sink counting its updates
#[derive(Clone, Default)]
pub struct SimSubtitles {
    updates: Arc<Mutex<Vec<(f64, bool)>>>,
}

impl SimSubtitles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of flushing updates
    pub fn resets(&self) -> usize {
        self.updates.lock().iter().filter(|(_, reset)| *reset).count()
    }

    pub fn updates(&self) -> Vec<(f64, bool)> {
        self.updates.lock().clone()
    }
}

impl SubtitleSink for SimSubtitles {
    fn update(&mut self, video_pts: f64, reset: bool) {
        self.updates.lock().push((video_pts, reset));
    }
}

/// Datagram source replaying scripted packets on a virtual clock.
///
/// Each packet becomes readable at its due time. A blocking receive jumps
/// the clock forward to the next due packet, or by the whole timeout when
/// none is due in time, like a real socket that hears nothing.
pub struct ScriptedDatagrams {
    queue: Arc<Mutex<VecDeque<(f64, Vec<u8>)>>>,
    clock: Arc<VirtualClock>,
}

impl ScriptedDatagrams {
    pub fn new(clock: Arc<VirtualClock>) -> (Self, DatagramScript) {
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        (
            Self {
                queue: queue.clone(),
                clock,
            },
            DatagramScript { queue },
        )
    }
}

impl DatagramSource for ScriptedDatagrams {
    fn try_recv(&mut self) -> io::Result<Option<Vec<u8>>> {
        let now = self.clock.now();
        let mut queue = self.queue.lock();
        match queue.front() {
            Some((due, _)) if *due <= now => Ok(queue.pop_front().map(|(_, d)| d)),
            _ => Ok(None),
        }
    }

    fn recv_timeout(&mut self, timeout: f64) -> io::Result<Option<Vec<u8>>> {
        let timeout = timeout.max(MIN_SLEEP_STEP);
        let now = self.clock.now();
        let mut queue = self.queue.lock();
        match queue.front() {
            Some((due, _)) if *due <= now + timeout => {
                self.clock.advance(*due - now);
                Ok(queue.pop_front().map(|(_, d)| d))
            }
            _ => {
                self.clock.advance(timeout);
                Ok(None)
            }
        }
    }
}

/// Feeds packets into a [`ScriptedDatagrams`]
#[derive(Clone)]
pub struct DatagramScript {
    queue: Arc<Mutex<VecDeque<(f64, Vec<u8>)>>>,
}

impl DatagramScript {
    /// Queue a position readable right away
    pub fn push_position(&self, pts: f64) {
        self.push_position_at(pts, 0.0);
    }

    /// Queue a position that arrives at virtual time `due`
    pub fn push_position_at(&self, pts: f64, due: f64) {
        self.push_at(crate::net::encode_position(pts).into_bytes(), due);
    }

    pub fn push_bye(&self) {
        self.push_at(crate::net::BYE.as_bytes().to_vec(), 0.0);
    }

    pub fn push_raw(&self, datagram: Vec<u8>) {
        self.push_at(datagram, 0.0);
    }

    fn push_at(&self, datagram: Vec<u8>, due: f64) {
        self.queue.lock().push_back((due, datagram));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_clock_sleep_advances() {
        let clock = VirtualClock::new();
        clock.sleep(0.25);
        assert!((clock.now() - 0.25).abs() < 1e-12);
        clock.spin();
        assert!(clock.now() > 0.25);
    }

    #[test]
    fn test_video_decoder_runs_to_duration() {
        let media = SimMedia::new(1.0, 25.0);
        let mut decoder = media.video_decoder();
        let mut count = 0;
        while let Some(frame) = decoder.decode(false) {
            assert!((frame.pts - count as f64 * 0.04).abs() < 1e-9);
            count += 1;
        }
        assert_eq!(count, 25);
    }

    #[test]
    fn test_demuxer_seek_lands_on_frame() {
        let media = SimMedia::new(60.0, 25.0);
        let mut demuxer = media.demuxer();
        let mut decoder = media.video_decoder();

        assert!(demuxer.seek(10.01, SeekStyle::ABSOLUTE));
        assert!((demuxer.video_pts() - 10.0).abs() < 1e-9);
        let frame = decoder.decode(false).unwrap();
        assert!((frame.pts - 10.0).abs() < 1e-9);

        assert!(demuxer.seek(-5.0, SeekStyle::RELATIVE));
        assert!((demuxer.video_pts() - 5.0).abs() < 1e-9);
        assert_eq!(media.seeks().len(), 2);
    }

    #[test]
    fn test_unseekable_media() {
        let media = SimMedia::new(60.0, 25.0).unseekable();
        assert!(!media.demuxer().seek(10.0, SeekStyle::ABSOLUTE));
        assert!(media.seeks().is_empty());
    }

    #[test]
    fn test_audio_out_drains_with_time() {
        let clock = VirtualClock::new();
        let mut out = SimAudioOut::new(clock.clone(), 1000.0, 0.5);
        assert_eq!(out.get_space(), 500);
        assert_eq!(out.play(&[0u8; 300], false), 300);
        assert!((out.get_delay() - 0.3).abs() < 1e-9);

        clock.advance(0.1);
        assert!((out.get_delay() - 0.2).abs() < 1e-9);

        out.pause();
        clock.advance(1.0);
        assert!((out.get_delay() - 0.2).abs() < 1e-9);

        out.resume();
        clock.advance(1.0);
        assert_eq!(out.get_delay(), 0.0);
    }

    #[test]
    fn test_scripted_datagrams_time_out() {
        let clock = VirtualClock::new();
        let (mut source, script) = ScriptedDatagrams::new(clock.clone());
        script.push_position(1.5);

        assert_eq!(source.try_recv().unwrap(), Some(b"1.500000".to_vec()));
        assert_eq!(source.recv_timeout(0.2).unwrap(), None);
        assert!((clock.now() - 0.2).abs() < 1e-12);
    }
}
