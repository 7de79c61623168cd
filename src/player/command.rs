//! Player commands and the queue they arrive on

use crate::decoder::SeekStyle;
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use std::collections::VecDeque;

/// Commands accepted by the control loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerCommand {
    /// Seek by or to `amount`
    Seek { amount: f64, style: SeekStyle },

    /// Enter or leave pause
    TogglePause,

    /// Stop playback
    Stop,

    /// Toggle the user mute
    ToggleMute,

    /// Change playback speed
    SetSpeed(f64),

    /// Add to the user audio delay (seconds)
    AdjustAudioDelay(f64),
}

impl PlayerCommand {
    /// Commands that run without leaving pause
    pub fn keeps_paused(&self) -> bool {
        matches!(
            self,
            PlayerCommand::ToggleMute | PlayerCommand::AdjustAudioDelay(_)
        )
    }
}

/// Sending half handed to input sources
pub type CommandSender = Sender<PlayerCommand>;

/// Receiving half owned by the control loop
///
/// Commands pulled off the channel to answer [`CommandQueue::has_pending`]
/// are buffered locally so peeking never loses one.
pub struct CommandQueue {
    receiver: Receiver<PlayerCommand>,
    buffered: VecDeque<PlayerCommand>,
    disconnected: bool,
}

impl CommandQueue {
    /// Create a queue and its sender
    pub fn new() -> (CommandSender, Self) {
        let (tx, rx) = unbounded();
        (
            tx,
            Self {
                receiver: rx,
                buffered: VecDeque::new(),
                disconnected: false,
            },
        )
    }

    /// A command is waiting
    pub fn has_pending(&mut self) -> bool {
        self.pull();
        !self.buffered.is_empty()
    }

    /// Take the next command, if any
    pub fn pop(&mut self) -> Option<PlayerCommand> {
        self.pull();
        self.buffered.pop_front()
    }

    /// All senders are gone
    pub fn is_disconnected(&self) -> bool {
        self.disconnected && self.buffered.is_empty()
    }

    fn pull(&mut self) {
        loop {
            match self.receiver.try_recv() {
                Ok(command) => self.buffered.push_back(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    break;
                }
            }
        }
    }
}
