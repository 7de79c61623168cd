//! Sync master: broadcasts the presented position

use crate::net::{encode_position, BYE};
use crate::utils::error::{AvClockError, IntoAvClockError, Result};
use log::{debug, info};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

/// Sends the local video position to slaves
pub struct UdpMaster {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpMaster {
    /// Open a broadcast-capable socket aimed at `ip:port`
    pub fn connect(ip: &str, port: u16) -> Result<Self> {
        let target = (ip, port)
            .to_socket_addrs()
            .network_err("Resolving sync address")?
            .next()
            .ok_or_else(|| AvClockError::Network(format!("No address for {}", ip)))?;

        let bind_addr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).network_err("Binding sync master socket")?;
        socket
            .set_broadcast(true)
            .network_err("Enabling broadcast on sync socket")?;

        info!("UDP sync master sending to {}", target);
        Ok(Self { socket, target })
    }

    /// Send the position of the frame just presented. Failures are ignored.
    pub fn send_position(&self, pts: f64) {
        self.send(&encode_position(pts));
    }

    /// Tell slaves the master is exiting
    pub fn send_bye(&self) {
        info!("UDP sync master exiting");
        self.send(BYE);
    }

    fn send(&self, message: &str) {
        if let Err(e) = self.socket.send_to(message.as_bytes(), self.target) {
            debug!("Sync datagram to {} not sent: {}", self.target, e);
        }
    }
}
