//! CONNECT_REQUEST / CONNECT_RESPONSE handshake.

use std::net::SocketAddr;

use knxnet_proto::service::{ConnectRequest, ConnectResponse};
use knxnet_proto::{frame::Hpai, Frame};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::TunnelConfig;
use crate::error::TunnelError;
use crate::relay::ReplySlot;
use crate::socket::TunnelSocket;

/// `CONNECT_RESPONSE` status meaning the gateway accepted the connection.
const STATUS_OK: u8 = 0x00;
/// `E_NO_MORE_CONNECTIONS` — the gateway has no free tunnel slots right now.
/// Not fatal: the client keeps waiting rather than backing off or failing.
const STATUS_BUSY: u8 = 0x24;

/// A `CONNECT_RESPONSE`, relayed from the dispatcher to an in-progress
/// [`reconnect`] rather than read directly off the socket — see that
/// function's doc comment for why.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnectOutcome {
    pub channel_id: u8,
    pub status: u8,
    pub control_endpoint: SocketAddr,
}

impl From<&ConnectResponse> for ConnectOutcome {
    fn from(resp: &ConnectResponse) -> Self {
        Self {
            channel_id: resp.channel_id,
            status: resp.status,
            control_endpoint: SocketAddr::from((resp.data_endpoint.address, resp.data_endpoint.port)),
        }
    }
}

/// Drives `CONNECT_REQUEST` → `CONNECT_RESPONSE`, with resend on timeout.
///
/// `local_hpai` is sent as both the control and data endpoint — this client
/// has no separate data channel. Returns the channel id and control
/// endpoint the gateway assigned on success.
///
/// Bounded by `config.response_timeout` end-to-end: a `BUSY` response resets
/// neither the resend timer nor the outer deadline, it just keeps the
/// handshake waiting rather than accelerating the retry.
pub async fn connect<S: TunnelSocket>(
    socket: &S,
    local_hpai: Hpai,
    config: TunnelConfig,
    cancel: &CancellationToken,
) -> Result<(u8, SocketAddr), TunnelError> {
    let attempt = async {
        let request = Frame::ConnectRequest(ConnectRequest::new(local_hpai, local_hpai));
        socket.send(&request).await?;

        let mut resend = tokio::time::interval(config.resend_interval);
        resend.tick().await; // first tick resolves immediately; the request above covers it

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(TunnelError::Cancelled),
                _ = resend.tick() => {
                    debug!("no CONNECT_RESPONSE yet, resending CONNECT_REQUEST");
                    socket.send(&request).await?;
                }
                frame = socket.recv() => {
                    match frame? {
                        Frame::ConnectResponse(resp) => match resp.status {
                            STATUS_OK => {
                                let control_endpoint = SocketAddr::from((
                                    resp.data_endpoint.address,
                                    resp.data_endpoint.port,
                                ));
                                return Ok((resp.channel_id, control_endpoint));
                            }
                            STATUS_BUSY => {
                                debug!("gateway busy, continuing to wait");
                            }
                            other => return Err(TunnelError::ConnectRejected { status: other }),
                        },
                        other => trace!(?other, "ignoring non-CONNECT_RESPONSE frame during handshake"),
                    }
                }
            }
        }
    };

    match tokio::time::timeout(config.response_timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(TunnelError::Timeout),
    }
}

/// Drives `CONNECT_REQUEST` → `CONNECT_RESPONSE` during a supervised
/// reconnect, when the dispatcher is already running and is therefore
/// already the socket's sole reader. Unlike [`connect`], this never calls
/// `socket.recv()` itself — it sends the request directly but waits for the
/// matching response on `connect_channel`, which the dispatcher feeds from
/// its own read loop, mirroring how `heartbeat`/`outbound` wait on their own
/// relay channels instead of reading the socket.
pub(crate) async fn reconnect<S: TunnelSocket>(
    socket: &S,
    local_hpai: Hpai,
    config: TunnelConfig,
    cancel: &CancellationToken,
    connect_channel: &ReplySlot<ConnectOutcome>,
) -> Result<(u8, SocketAddr), TunnelError> {
    let attempt = async {
        let request = Frame::ConnectRequest(ConnectRequest::new(local_hpai, local_hpai));
        socket.send(&request).await?;

        let mut outcome_rx = connect_channel.begin().await;
        let mut resend = tokio::time::interval(config.resend_interval);
        resend.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(TunnelError::Cancelled),
                _ = resend.tick() => {
                    debug!("no CONNECT_RESPONSE yet, resending CONNECT_REQUEST");
                    socket.send(&request).await?;
                }
                outcome = outcome_rx.recv() => {
                    match outcome {
                        None => return Err(TunnelError::Disconnected),
                        Some(outcome) if outcome.status == STATUS_OK => {
                            return Ok((outcome.channel_id, outcome.control_endpoint));
                        }
                        Some(outcome) if outcome.status == STATUS_BUSY => {
                            debug!("gateway busy, continuing to wait");
                        }
                        Some(outcome) => return Err(TunnelError::ConnectRejected { status: outcome.status }),
                    }
                }
            }
        }
    };

    let result = match tokio::time::timeout(config.response_timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(TunnelError::Timeout),
    };
    connect_channel.reset().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use knxnet_proto::service::ConnectResponse;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use crate::socket::mock::MockSocket;

    fn local_hpai() -> Hpai {
        Hpai::new(Ipv4Addr::new(192, 168, 1, 50), 51000)
    }

    fn fast_config() -> TunnelConfig {
        TunnelConfig {
            resend_interval: Duration::from_millis(20),
            heartbeat_interval: Duration::from_secs(10),
            response_timeout: Duration::from_millis(300),
        }
    }

    #[tokio::test]
    async fn ok_response_adopts_channel_and_control_endpoint() {
        let socket = MockSocket::new();
        socket.push_inbound(Frame::ConnectResponse(ConnectResponse {
            channel_id: 7,
            status: STATUS_OK,
            data_endpoint: Hpai::new(Ipv4Addr::new(192, 168, 1, 1), 3671),
            crd: [0x04, 0x00, 0x11, 0x01],
        }));

        let cancel = CancellationToken::new();
        let (channel, control) = connect(&socket, local_hpai(), fast_config(), &cancel)
            .await
            .unwrap();

        assert_eq!(channel, 7);
        assert_eq!(control, "192.168.1.1:3671".parse().unwrap());
        assert_eq!(socket.sent_frames().len(), 1);
    }

    #[tokio::test]
    async fn busy_then_ok_succeeds_without_error() {
        let socket = MockSocket::new();
        socket.push_inbound(Frame::ConnectResponse(ConnectResponse {
            channel_id: 0,
            status: STATUS_BUSY,
            data_endpoint: Hpai::new(Ipv4Addr::UNSPECIFIED, 0),
            crd: [0; 4],
        }));
        socket.push_inbound(Frame::ConnectResponse(ConnectResponse {
            channel_id: 0,
            status: STATUS_BUSY,
            data_endpoint: Hpai::new(Ipv4Addr::UNSPECIFIED, 0),
            crd: [0; 4],
        }));
        socket.push_inbound(Frame::ConnectResponse(ConnectResponse {
            channel_id: 3,
            status: STATUS_OK,
            data_endpoint: Hpai::new(Ipv4Addr::new(192, 168, 1, 1), 3671),
            crd: [0x04, 0x00, 0x11, 0x02],
        }));

        let cancel = CancellationToken::new();
        let (channel, _) = connect(&socket, local_hpai(), fast_config(), &cancel)
            .await
            .unwrap();
        assert_eq!(channel, 3);
    }

    #[tokio::test]
    async fn non_busy_error_status_is_rejected() {
        let socket = MockSocket::new();
        socket.push_inbound(Frame::ConnectResponse(ConnectResponse {
            channel_id: 0,
            status: 0x22, // E_CONNECTION_TYPE
            data_endpoint: Hpai::new(Ipv4Addr::UNSPECIFIED, 0),
            crd: [0; 4],
        }));

        let cancel = CancellationToken::new();
        let err = connect(&socket, local_hpai(), fast_config(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::ConnectRejected { status: 0x22 }));
    }

    #[tokio::test]
    async fn resends_on_timer_when_no_response_arrives() {
        let socket = MockSocket::new();
        let cancel = CancellationToken::new();
        let err = connect(&socket, local_hpai(), fast_config(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::Timeout));
        // resend_interval=20ms, response_timeout=300ms: several resends expected.
        assert!(socket.sent_frames().len() >= 2);
    }

    #[tokio::test]
    async fn cancellation_stops_the_handshake_promptly() {
        let socket = MockSocket::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = connect(&socket, local_hpai(), fast_config(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::Cancelled));
    }

    #[tokio::test]
    async fn reconnect_resolves_from_the_relay_channel_not_the_socket() {
        let socket = MockSocket::new();
        let connect_channel = std::sync::Arc::new(ReplySlot::new());
        let cancel = CancellationToken::new();

        let outcome = ConnectOutcome {
            channel_id: 9,
            status: STATUS_OK,
            control_endpoint: "192.168.1.1:3671".parse().unwrap(),
        };
        let connect_channel_bg = connect_channel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            connect_channel_bg
                .deliver(outcome, Duration::from_millis(100))
                .await;
        });

        // Pushing a frame onto the socket's inbound queue must have no
        // bearing on `reconnect`: it never calls `socket.recv()`.
        socket.push_inbound(Frame::ConnectResponse(ConnectResponse {
            channel_id: 255,
            status: STATUS_OK,
            data_endpoint: Hpai::new(Ipv4Addr::new(10, 0, 0, 1), 1),
            crd: [0; 4],
        }));

        let (channel, control) =
            reconnect(&socket, local_hpai(), fast_config(), &cancel, &connect_channel)
                .await
                .unwrap();
        assert_eq!(channel, 9);
        assert_eq!(control, "192.168.1.1:3671".parse().unwrap());
    }

    #[tokio::test]
    async fn reconnect_times_out_when_relay_channel_gets_nothing() {
        let socket = MockSocket::new();
        let connect_channel = ReplySlot::new();
        let cancel = CancellationToken::new();

        let err = reconnect(&socket, local_hpai(), fast_config(), &cancel, &connect_channel)
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::Timeout));
    }
}
