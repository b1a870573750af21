//! Outbound tunnel request/ack loop.
//!
//! One `send()` at a time proceeds past sequence acquisition, enforced by
//! holding [`crate::session::SessionState::out_seq`]'s guard for the whole
//! operation: not just the one write, but until the matching ack arrives
//! or the attempt fails, so a concurrent caller can never reuse the
//! in-flight sequence number.

use std::sync::Arc;

use knxnet_proto::service::TunnelingRequest;
use knxnet_proto::{CemiFrame, Frame};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::TunnelError;
use crate::relay::ReplySlot;
use crate::session::SessionState;
use crate::socket::TunnelSocket;

/// A `TUNNELING_ACK` reduced to the fields the outbound loop needs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TunnelAck {
    pub seq: u8,
    pub status: u8,
}

/// The hand-off point between the inbound dispatcher and whichever `send()`
/// is currently in flight.
///
/// Only one sender is ever installed at a time (the session only allows one
/// in-flight tunnel request). A reconnect clears the slot, dropping the
/// sender; any `send()` still waiting on its receiver observes the channel
/// closed and fails fast with `TunnelError::Disconnected`, rather than
/// waiting out its own resend/timeout loop against a channel nobody will
/// ever answer again (Open Question decision, see DESIGN.md).
pub(crate) type AckChannel = ReplySlot<TunnelAck>;

/// Serializes and retransmits outbound `TUNNELING_REQUEST`s, correlating
/// the reply by sequence number.
pub(crate) struct OutboundSender<S: TunnelSocket> {
    socket: Arc<S>,
    session: Arc<SessionState>,
    ack_channel: Arc<AckChannel>,
}

impl<S: TunnelSocket> OutboundSender<S> {
    pub fn new(socket: Arc<S>, session: Arc<SessionState>, ack_channel: Arc<AckChannel>) -> Self {
        Self {
            socket,
            session,
            ack_channel,
        }
    }

    /// Sends `payload` as a `TUNNELING_REQUEST`, retransmitting until acked,
    /// cancelled, or the ack channel is torn down by a reconnect.
    pub async fn send(
        &self,
        payload: CemiFrame,
        cancel: &CancellationToken,
    ) -> Result<(), TunnelError> {
        let mut seq_guard = self.session.out_seq.lock().await;
        let n = *seq_guard;
        let channel = self.session.snapshot_channel().await;

        let frame = Frame::TunnelingRequest(TunnelingRequest::new(
            channel.channel_id,
            n,
            payload.into_bytes(),
        ));
        self.socket.send(&frame).await?;

        let mut ack_rx = self.ack_channel.begin().await;
        let mut resend = tokio::time::interval(self.session.config.resend_interval);
        resend.tick().await;

        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Err(TunnelError::Cancelled),
                _ = resend.tick() => {
                    if let Err(e) = self.socket.send(&frame).await {
                        break Err(e);
                    }
                }
                ack = ack_rx.recv() => {
                    match ack {
                        None => break Err(TunnelError::Disconnected),
                        Some(ack) if ack.seq != n => {
                            debug!(got = ack.seq, expected = n, "ignoring stale ack");
                        }
                        Some(ack) => {
                            *seq_guard = n.wrapping_add(1);
                            break if ack.status == 0 {
                                Ok(())
                            } else {
                                Err(TunnelError::TunnelRejected { status: ack.status })
                            };
                        }
                    }
                }
            }
        };

        self.ack_channel.reset().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TunnelConfig;
    use crate::socket::mock::MockSocket;
    use std::net::SocketAddr;
    use std::time::Duration;

    fn fast_config() -> TunnelConfig {
        TunnelConfig {
            resend_interval: Duration::from_millis(20),
            heartbeat_interval: Duration::from_secs(10),
            response_timeout: Duration::from_millis(500),
        }
    }

    fn addr() -> SocketAddr {
        "10.0.0.1:3671".parse().unwrap()
    }

    #[tokio::test]
    async fn send_succeeds_on_matching_ack_and_advances_seq() {
        let socket = Arc::new(MockSocket::new());
        let session = Arc::new(SessionState::new(7, addr(), fast_config()));
        let ack_channel = Arc::new(AckChannel::new());
        let sender = OutboundSender::new(socket.clone(), session.clone(), ack_channel.clone());
        let cancel = CancellationToken::new();

        let ack_channel_bg = ack_channel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            ack_channel_bg
                .deliver(TunnelAck { seq: 0, status: 0 }, Duration::from_millis(100))
                .await;
        });

        sender
            .send(CemiFrame::new(vec![0x01]), &cancel)
            .await
            .unwrap();
        assert_eq!(*session.out_seq.lock().await, 1);
        assert_eq!(socket.sent_frames().len(), 1);
    }

    #[tokio::test]
    async fn stale_ack_is_ignored() {
        let socket = Arc::new(MockSocket::new());
        let session = Arc::new(SessionState::new(7, addr(), fast_config()));
        let ack_channel = Arc::new(AckChannel::new());
        let sender = OutboundSender::new(socket.clone(), session.clone(), ack_channel.clone());
        let cancel = CancellationToken::new();

        let ack_channel_bg = ack_channel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            // Stale ack for a different sequence: must be ignored, not terminate the send.
            ack_channel_bg
                .deliver(TunnelAck { seq: 9, status: 0 }, Duration::from_millis(30))
                .await;
            tokio::time::sleep(Duration::from_millis(5)).await;
            ack_channel_bg
                .deliver(TunnelAck { seq: 0, status: 0 }, Duration::from_millis(100))
                .await;
        });

        sender
            .send(CemiFrame::new(vec![0x01]), &cancel)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_zero_ack_status_is_rejected_but_seq_still_advances() {
        let socket = Arc::new(MockSocket::new());
        let session = Arc::new(SessionState::new(7, addr(), fast_config()));
        let ack_channel = Arc::new(AckChannel::new());
        let sender = OutboundSender::new(socket.clone(), session.clone(), ack_channel.clone());
        let cancel = CancellationToken::new();

        let ack_channel_bg = ack_channel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            ack_channel_bg
                .deliver(TunnelAck { seq: 0, status: 0x22 }, Duration::from_millis(100))
                .await;
        });

        let err = sender
            .send(CemiFrame::new(vec![0x01]), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::TunnelRejected { status: 0x22 }));
    }

    #[tokio::test]
    async fn reset_during_send_fails_fast_with_disconnected() {
        let socket = Arc::new(MockSocket::new());
        let session = Arc::new(SessionState::new(7, addr(), fast_config()));
        let ack_channel = Arc::new(AckChannel::new());
        let sender = OutboundSender::new(socket.clone(), session.clone(), ack_channel.clone());
        let cancel = CancellationToken::new();

        let ack_channel_bg = ack_channel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            ack_channel_bg.reset().await;
        });

        let err = sender
            .send(CemiFrame::new(vec![0x01]), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::Disconnected));
    }

    #[tokio::test]
    async fn cancellation_returns_promptly() {
        let socket = Arc::new(MockSocket::new());
        let session = Arc::new(SessionState::new(7, addr(), fast_config()));
        let ack_channel = Arc::new(AckChannel::new());
        let sender = OutboundSender::new(socket, session, ack_channel);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = sender
            .send(CemiFrame::new(vec![0x01]), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::Cancelled));
    }

    #[tokio::test]
    async fn no_ack_triggers_retransmission() {
        let socket = Arc::new(MockSocket::new());
        let session = Arc::new(SessionState::new(7, addr(), fast_config()));
        let ack_channel = Arc::new(AckChannel::new());
        let sender = OutboundSender::new(socket.clone(), session, ack_channel.clone());
        let cancel = CancellationToken::new();

        let ack_channel_bg = ack_channel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            ack_channel_bg
                .deliver(TunnelAck { seq: 0, status: 0 }, Duration::from_millis(100))
                .await;
        });

        sender
            .send(CemiFrame::new(vec![0x01]), &cancel)
            .await
            .unwrap();
        assert!(socket.sent_frames().len() >= 2, "expected at least one resend");
    }
}
