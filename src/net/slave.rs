//! Sync slave: follows the master's position

use crate::net::{parse_datagram, DatagramSource, SyncMessage, MAX_DATAGRAM};
use crate::player::CommandQueue;
use crate::utils::config::UdpConfig;
use crate::utils::error::{IntoAvClockError, Result};
use crate::utils::timer::RelativeClock;
use log::{debug, info, warn};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

/// Longest single blocking receive while waiting for the master (seconds)
const WAIT_SLICE: f64 = 0.2;

/// What the slave should do with the pending frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlaveDecision {
    /// Present the frame now
    Present,

    /// Seek to this absolute position
    Seek(f64),

    /// The master has exited
    MasterExited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Received {
    Nothing,
    Position,
    Bye,
}

/// Blocking/non-blocking receiver over a real UDP socket
pub struct UdpDatagramSource {
    socket: UdpSocket,
}

impl UdpDatagramSource {
    pub fn bind(ip: &str, port: u16) -> Result<Self> {
        let socket = UdpSocket::bind((ip, port)).network_err("Binding sync slave socket")?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().network_err("Querying sync socket address")
    }

    fn recv(&self) -> io::Result<Option<Vec<u8>>> {
        let mut buf = [0u8; MAX_DATAGRAM];
        match self.socket.recv_from(&mut buf) {
            Ok((n, _)) => Ok(Some(buf[..n].to_vec())),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl DatagramSource for UdpDatagramSource {
    fn try_recv(&mut self) -> io::Result<Option<Vec<u8>>> {
        self.socket.set_nonblocking(true)?;
        self.recv()
    }

    fn recv_timeout(&mut self, timeout: f64) -> io::Result<Option<Vec<u8>>> {
        self.socket.set_nonblocking(false)?;
        self.socket
            .set_read_timeout(Some(Duration::from_secs_f64(timeout.max(0.001))))?;
        self.recv()
    }
}

/// Follows a sync master
pub struct UdpSlave {
    source: Box<dyn DatagramSource>,

    /// Newest position heard from the master
    master_position: Option<f64>,

    /// The last wait ran into the timeout; do not block again until the
    /// master is heard from
    timed_out: bool,

    parse_warned: bool,

    seek_threshold: f64,
    tolerance: f64,
    timeout: f64,
}

impl UdpSlave {
    pub fn new(source: Box<dyn DatagramSource>, config: &UdpConfig) -> Self {
        Self {
            source,
            master_position: None,
            timed_out: false,
            parse_warned: false,
            seek_threshold: config.seek_threshold,
            tolerance: config.tolerance,
            timeout: config.timeout,
        }
    }

    /// Listen on the configured port on all interfaces
    pub fn bind(config: &UdpConfig) -> Result<Self> {
        let source = UdpDatagramSource::bind("0.0.0.0", config.port)?;
        info!("UDP sync slave listening on port {}", config.port);
        Ok(Self::new(Box::new(source), config))
    }

    pub fn master_position(&self) -> Option<f64> {
        self.master_position
    }

    /// Decide what to do with the frame at `video_pts`.
    ///
    /// Drains everything queued and keeps the newest position. Far from the
    /// master the slave seeks; behind or level with it the frame is shown.
    /// Ahead of it the slave blocks until the master catches up, a command
    /// arrives, or the timeout passes.
    pub fn sync(&mut self, video_pts: f64, clock: &RelativeClock, commands: &mut CommandQueue) -> SlaveDecision {
        let mut received = self.drain();

        loop {
            if received == Received::Bye {
                info!("Sync master exited");
                return SlaveDecision::MasterExited;
            }

            let Some(master) = self.master_position else {
                return SlaveDecision::Present;
            };

            if (video_pts - master).abs() >= self.seek_threshold {
                debug!("Slave at {:.3} is far from master at {:.3}, seeking", video_pts, master);
                return SlaveDecision::Seek(master);
            }

            if master + self.tolerance >= video_pts || self.timed_out {
                return SlaveDecision::Present;
            }

            received = self.wait(clock, commands);
            if received == Received::Nothing {
                return SlaveDecision::Present;
            }
        }
    }

    /// Read every queued datagram without blocking
    fn drain(&mut self) -> Received {
        let mut result = Received::Nothing;
        loop {
            match self.source.try_recv() {
                Ok(Some(datagram)) => match self.accept(&datagram) {
                    Received::Bye => return Received::Bye,
                    Received::Position => result = Received::Position,
                    Received::Nothing => {}
                },
                Ok(None) => break,
                Err(e) => {
                    debug!("Sync receive failed: {}", e);
                    break;
                }
            }
        }
        result
    }

    /// Block for the next datagram in slices, giving up on a pending command
    /// or after the timeout
    fn wait(&mut self, clock: &RelativeClock, commands: &mut CommandQueue) -> Received {
        let deadline = clock.now() + self.timeout;

        loop {
            if commands.has_pending() {
                return Received::Nothing;
            }

            let left = deadline - clock.now();
            if left <= 0.0 {
                warn!(
                    "No sync datagram from the master for {:.0}s, playing on without it",
                    self.timeout
                );
                self.timed_out = true;
                return Received::Nothing;
            }

            match self.source.recv_timeout(left.min(WAIT_SLICE)) {
                Ok(Some(datagram)) => match self.accept(&datagram) {
                    Received::Nothing => {}
                    Received::Bye => return Received::Bye,
                    Received::Position => {
                        return match self.drain() {
                            Received::Bye => Received::Bye,
                            _ => Received::Position,
                        };
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    debug!("Sync receive failed: {}", e);
                    return Received::Nothing;
                }
            }
        }
    }

    fn accept(&mut self, datagram: &[u8]) -> Received {
        match parse_datagram(datagram) {
            Some(SyncMessage::Bye) => Received::Bye,
            Some(SyncMessage::Position(pts)) => {
                self.master_position = Some(pts);
                self.timed_out = false;
                Received::Position
            }
            None => {
                if !self.parse_warned {
                    self.parse_warned = true;
                    warn!("Ignoring unparseable sync datagram {:?}", String::from_utf8_lossy(datagram));
                }
                Received::Nothing
            }
        }
    }
}
