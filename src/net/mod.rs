//! UDP master/slave playback sync
//!
//! A master broadcasts its video position after every presented frame. A
//! slave keeps only the newest position it heard and either presents, waits
//! for the master to catch up, or seeks to it. Datagrams are plain ASCII: a
//! decimal pts with six fractional digits, or `bye` when the master exits.

mod master;
mod slave;

pub use master::UdpMaster;
pub use slave::{SlaveDecision, UdpDatagramSource, UdpSlave};

use crate::utils::config::{SyncRole, UdpConfig};
use crate::utils::error::Result;
use std::io;

/// Datagram announcing that the master is exiting
pub const BYE: &str = "bye";

/// Receive buffer size; longer datagrams are truncated
pub const MAX_DATAGRAM: usize = 100;

/// One decoded sync datagram
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncMessage {
    Position(f64),
    Bye,
}

/// Encode a position the way the master sends it
pub fn encode_position(pts: f64) -> String {
    format!("{:.6}", pts)
}

/// Decode a datagram. Returns `None` for anything unparseable.
pub fn parse_datagram(datagram: &[u8]) -> Option<SyncMessage> {
    let text = std::str::from_utf8(datagram).ok()?;
    let text = text.trim_end_matches('\0').trim();
    if text == BYE {
        return Some(SyncMessage::Bye);
    }

    let pts: f64 = text.parse().ok()?;
    pts.is_finite().then_some(SyncMessage::Position(pts))
}

/// Source of sync datagrams
pub trait DatagramSource: Send {
    /// Next queued datagram without blocking
    fn try_recv(&mut self) -> io::Result<Option<Vec<u8>>>;

    /// Wait up to `timeout` seconds for a datagram
    fn recv_timeout(&mut self, timeout: f64) -> io::Result<Option<Vec<u8>>>;
}

/// Sync role of a running controller
pub enum SyncLink {
    Master(UdpMaster),
    Slave(UdpSlave),
}

impl SyncLink {
    /// Open the socket for the configured role, if any
    pub fn from_config(config: &UdpConfig) -> Result<Option<Self>> {
        Ok(match config.role {
            SyncRole::Off => None,
            SyncRole::Master => Some(SyncLink::Master(UdpMaster::connect(&config.ip, config.port)?)),
            SyncRole::Slave => Some(SyncLink::Slave(UdpSlave::bind(config)?)),
        })
    }
}
