//! The datagram transport abstraction.
//!
//! [`TunnelSocket`] is the seam between the session state machine and the
//! network: send one [`Frame`], receive the next one. The real
//! implementation ([`UdpTransport`]) wraps a connected `tokio::net::UdpSocket`
//! — one UDP datagram is always exactly one KNXnet/IP frame, so there is no
//! length-prefix reframing to do here, unlike a TCP-based read loop. Tests
//! run the session state machine against [`MockSocket`] instead of a real
//! socket.

use std::net::SocketAddr;

use async_trait::async_trait;
use knxnet_proto::{decode_frame, encode_frame, Frame};
use tokio::net::UdpSocket;
use tracing::{debug, trace};

use crate::error::TunnelError;

/// Maximum KNXnet/IP frame size this client will ever send or accept.
/// Far larger than any real tunneling frame (cEMI payloads are tens of
/// bytes); guards against an oversized read allocation.
const MAX_FRAME_SIZE: usize = 2048;

/// Sends and receives whole KNXnet/IP frames.
///
/// Implementations run on a single underlying connection to one gateway;
/// `send`/`recv` may be called concurrently from different tasks (the
/// supervisor, the outbound sender, the heartbeat monitor all send; only
/// the dispatcher calls `recv`). `#[async_trait]` boxes the returned futures
/// so they stay `Send` across the generic `S: TunnelSocket` boundary that
/// `tokio::spawn` needs in `inbound`/`heartbeat`.
#[async_trait]
pub trait TunnelSocket: Send + Sync + 'static {
    /// Encodes and transmits `frame` to the gateway.
    async fn send(&self, frame: &Frame) -> Result<(), TunnelError>;

    /// Waits for and decodes the next frame from the gateway.
    ///
    /// Returns `Err(TunnelError::InboundClosed)` once the underlying
    /// transport can no longer produce frames.
    async fn recv(&self) -> Result<Frame, TunnelError>;
}

/// UDP-backed [`TunnelSocket`], connected to a single gateway address.
///
/// A connected `UdpSocket` lets us use `send`/`recv` instead of
/// `send_to`/`recv_from` — the kernel filters out datagrams from any other
/// peer, which is exactly the single-gateway model this client needs.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Binds an ephemeral local UDP socket and connects it to `gateway_addr`.
    pub async fn connect(gateway_addr: SocketAddr) -> Result<Self, TunnelError> {
        let local_any: SocketAddr = if gateway_addr.is_ipv4() {
            "0.0.0.0:0".parse().unwrap()
        } else {
            "[::]:0".parse().unwrap()
        };
        let socket = UdpSocket::bind(local_any).await?;
        socket.connect(gateway_addr).await?;
        debug!(gateway = %gateway_addr, local = ?socket.local_addr(), "udp transport connected");
        Ok(Self { socket })
    }

    /// The ephemeral local address the kernel assigned this socket.
    pub fn local_addr(&self) -> Result<SocketAddr, TunnelError> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait]
impl TunnelSocket for UdpTransport {
    async fn send(&self, frame: &Frame) -> Result<(), TunnelError> {
        let bytes = encode_frame(frame);
        self.socket.send(&bytes).await?;
        trace!(service = ?frame.service_type(), bytes = bytes.len(), "sent frame");
        Ok(())
    }

    async fn recv(&self) -> Result<Frame, TunnelError> {
        let mut buf = vec![0u8; MAX_FRAME_SIZE];
        let n = self.socket.recv(&mut buf).await?;
        let frame = decode_frame(&buf[..n])?;
        trace!(service = ?frame.service_type(), bytes = n, "received frame");
        Ok(frame)
    }
}
