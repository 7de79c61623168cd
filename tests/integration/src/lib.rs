//! Integration test utilities for avclock
//!
//! This module provides common utilities for integration testing including:
//! - Sessions wired from the synthetic media collaborators
//! - Event recording
//! - Temporary EDL files

use anyhow::Result;
use avclock::edl::EdlRecord;
use avclock::player::{AudioChain, VideoChain};
use avclock::renderer::NoSubtitles;
use avclock::sim::{SimAudioHandle, SimAudioOut, SimMedia, SimVideoHandle, SimVideoOut, VirtualClock};
use avclock::utils::{Config, TimeSource};
use avclock::{ControllerBuilder, MediaIo, PlaybackController, PlayerEvent, PlayerEventHandler, SyncLink};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Collects every event a controller emits
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<PlayerEvent>>>,
}

impl EventLog {
    pub fn events(&self) -> Vec<PlayerEvent> {
        self.events.lock().clone()
    }

    pub fn contains(&self, event: &PlayerEvent) -> bool {
        self.events.lock().contains(event)
    }

    pub fn count(&self, pred: impl Fn(&PlayerEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

impl PlayerEventHandler for EventLog {
    fn handle_event(&mut self, event: PlayerEvent) {
        self.events.lock().push(event);
    }
}

/// A controller over synthetic media plus handles to inspect its outputs
pub struct Session {
    pub controller: PlaybackController,
    pub media: SimMedia,
    pub audio: Option<SimAudioHandle>,
    pub video: Option<SimVideoHandle>,
    pub events: EventLog,
}

/// Builder for [`Session`]
pub struct SessionBuilder {
    media: SimMedia,
    time: Arc<dyn TimeSource>,
    audio: bool,
    video: bool,
    present_cost: f64,
    config: Config,
    edl: Vec<EdlRecord>,
    sync: Option<SyncLink>,
}

impl SessionBuilder {
    pub fn new(media: SimMedia, time: Arc<dyn TimeSource>) -> Self {
        Self {
            media,
            time,
            audio: true,
            video: true,
            present_cost: 0.0,
            config: Config::default(),
            edl: Vec::new(),
            sync: None,
        }
    }

    /// Synthetic media on a fresh virtual clock
    pub fn virtual_time(duration: f64, fps: f64) -> (Self, Arc<VirtualClock>) {
        let clock = VirtualClock::new();
        (Self::new(SimMedia::new(duration, fps), clock.clone()), clock)
    }

    pub fn without_audio(mut self) -> Self {
        self.audio = false;
        self
    }

    pub fn without_video(mut self) -> Self {
        self.video = false;
        self
    }

    /// Make every presented frame cost this much time
    pub fn present_cost(mut self, seconds: f64) -> Self {
        self.present_cost = seconds;
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn edl(mut self, records: Vec<EdlRecord>) -> Self {
        self.edl = records;
        self
    }

    pub fn sync(mut self, link: SyncLink) -> Self {
        self.sync = Some(link);
        self
    }

    pub fn build(self) -> Result<Session> {
        let mut audio_handle = None;
        let mut video_handle = None;

        let audio = if self.audio {
            let out = SimAudioOut::new(
                self.time.clone(),
                self.media.audio_params().bytes_per_second(),
                0.5,
            );
            audio_handle = Some(out.handle());
            Some(AudioChain::new(
                Box::new(self.media.audio_decoder()),
                Box::new(out),
                &self.config.audio,
            ))
        } else {
            None
        };

        let video = if self.video {
            let out = SimVideoOut::new(self.time.clone()).with_present_cost(self.present_cost);
            video_handle = Some(out.handle());
            Some(VideoChain::new(Box::new(self.media.video_decoder()), Box::new(out)))
        } else {
            None
        };

        let io = MediaIo {
            demuxer: Box::new(self.media.demuxer()),
            audio,
            video,
            subtitles: Box::new(NoSubtitles),
        };

        let events = EventLog::default();
        let mut builder = ControllerBuilder::new(io, self.time)
            .with_config(self.config)
            .with_edl(self.edl)
            .with_event_handler(Box::new(events.clone()));
        if let Some(link) = self.sync {
            builder = builder.with_sync(link);
        }

        Ok(Session {
            controller: builder.build()?,
            media: self.media,
            audio: audio_handle,
            video: video_handle,
            events,
        })
    }
}

/// Temporary directory holding EDL files
pub struct EdlFixture {
    pub temp_dir: TempDir,
}

impl EdlFixture {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
        })
    }

    /// Write an EDL file and return its path
    pub fn write(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }
}

/// Largest gap between consecutive presented positions
pub fn largest_gap(presented: &[f64]) -> f64 {
    presented
        .windows(2)
        .map(|w| w[1] - w[0])
        .fold(0.0, f64::max)
}
