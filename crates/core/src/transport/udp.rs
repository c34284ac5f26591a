use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use crate::error::BackendError;

/// UDP transport for outbound RTP packet delivery.
///
/// Binds a single ephemeral socket of the destination's address family
/// and sends every packet to one resolved peer. It knows nothing about
/// RTP; the sink hands it finished packets.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UdpTransport {
    /// Resolve `destination` (`host:port`) and bind an ephemeral socket for it.
    pub fn bind(destination: &str) -> Result<Self, BackendError> {
        let peer = destination
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| BackendError::NotFound(format!("no address for {destination}")))?;

        let local = if peer.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local)?;

        tracing::debug!(%peer, local = ?socket.local_addr().ok(), "UDP transport bound");
        Ok(Self { socket, peer })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> Result<SocketAddr, BackendError> {
        Ok(self.socket.local_addr()?)
    }

    /// Send one datagram to the peer.
    pub fn send(&self, payload: &[u8]) -> Result<usize, BackendError> {
        Ok(self.socket.send_to(payload, self.peer)?)
    }
}
