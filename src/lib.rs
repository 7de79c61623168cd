//! avclock - playback clock and A/V sync engine
//!
//! Keeps video presentation locked to the audio device clock (or to wall
//! time without audio), drops late frames, corrects drift, applies edit
//! decision lists and follows a UDP sync master.
//!
//! Demuxing, decoding and output devices are collaborators behind the traits
//! in [`decoder`], [`audio`] and [`renderer`]. The [`sim`] module provides
//! synthetic implementations driven by a virtual clock.

pub mod audio;
pub mod decoder;
pub mod edl;
pub mod net;
pub mod player;
pub mod renderer;
pub mod sim;
pub mod utils;

pub use edl::{load_edl, parse_edl, EdlAction, EdlEngine, EdlRecord};
pub use net::SyncLink;
pub use player::{
    ControllerBuilder, Iteration, MediaIo, PlaybackController, PlayerCommand, PlayerEvent,
    PlayerEventHandler, StatusHandle, StopReason, TransportState,
};
pub use utils::{AvClockError, Config, Result};
