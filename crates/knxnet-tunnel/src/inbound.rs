//! Inbound frame dispatcher: the single reader of the socket's frame stream.
//!
//! UDP datagrams arrive already framed one-frame-per-receive — there is no
//! length-prefixed reassembly state to keep here, just dispatch-by-service-type.

use std::sync::Arc;

use knxnet_proto::service::{
    ConnectResponse, ConnectionHeader, ConnectionStateResponse, DisconnectRequest,
    DisconnectResponse, TunnelingAck, TunnelingRequest,
};
use knxnet_proto::{CemiFrame, Frame};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::TunnelError;
use crate::handshake::ConnectOutcome;
use crate::outbound::{AckChannel, TunnelAck};
use crate::relay::ReplySlot;
use crate::session::SessionState;
use crate::socket::TunnelSocket;
use crate::supervisor::SupervisorSignal;

/// Reads frames from the socket until it closes, routing each to the right
/// collaborator.
pub(crate) struct InboundDispatcher<S: TunnelSocket> {
    socket: Arc<S>,
    session: Arc<SessionState>,
    ack_channel: Arc<AckChannel>,
    heartbeat_channel: Arc<ReplySlot<u8>>,
    connect_channel: Arc<ReplySlot<ConnectOutcome>>,
    consumer_tx: mpsc::Sender<CemiFrame>,
    supervisor_tx: mpsc::Sender<SupervisorSignal>,
}

impl<S: TunnelSocket> InboundDispatcher<S> {
    pub fn new(
        socket: Arc<S>,
        session: Arc<SessionState>,
        ack_channel: Arc<AckChannel>,
        heartbeat_channel: Arc<ReplySlot<u8>>,
        connect_channel: Arc<ReplySlot<ConnectOutcome>>,
        consumer_tx: mpsc::Sender<CemiFrame>,
        supervisor_tx: mpsc::Sender<SupervisorSignal>,
    ) -> Self {
        Self {
            socket,
            session,
            ack_channel,
            heartbeat_channel,
            connect_channel,
            consumer_tx,
            supervisor_tx,
        }
    }

    /// Runs until the socket's inbound stream closes. Consumes `self` since
    /// there is exactly one dispatcher per connection generation.
    pub async fn run(self) {
        loop {
            match self.socket.recv().await {
                Ok(frame) => self.handle(frame).await,
                Err(TunnelError::InboundClosed) => {
                    debug!("inbound stream closed, dispatcher exiting");
                    let _ = self.supervisor_tx.try_send(SupervisorSignal::InboundClosed);
                    return;
                }
                Err(e) => {
                    warn!("error reading inbound frame: {e}");
                }
            }
        }
    }

    async fn handle(&self, frame: Frame) {
        match frame {
            Frame::DisconnectRequest(req) => self.handle_disconnect_request(req).await,
            Frame::DisconnectResponse(resp) => self.handle_disconnect_response(resp).await,
            Frame::TunnelingRequest(req) => self.handle_tunneling_request(req).await,
            Frame::TunnelingAck(ack) => self.handle_tunneling_ack(ack).await,
            Frame::ConnectionStateResponse(resp) => self.handle_state_response(resp).await,
            Frame::ConnectResponse(resp) => self.handle_connect_response(resp).await,
            other => {
                debug!(service = ?other.service_type(), "ignoring unexpected frame");
            }
        }
    }

    async fn handle_disconnect_request(&self, req: DisconnectRequest) {
        if !self.session.check_channel(req.channel_id).await {
            warn!(channel = req.channel_id, "DISCONNECT_REQUEST channel mismatch, dropping");
            return;
        }
        let reply = Frame::DisconnectResponse(DisconnectResponse::new(req.channel_id, 0));
        if let Err(e) = self.socket.send(&reply).await {
            warn!("failed to send DISCONNECT_RESPONSE: {e}");
        }
        info!("gateway requested disconnect");
        let _ = self.supervisor_tx.try_send(SupervisorSignal::GatewayDisconnected);
    }

    async fn handle_disconnect_response(&self, resp: DisconnectResponse) {
        if !self.session.check_channel(resp.channel_id).await {
            return;
        }
        info!("clean disconnect acknowledged by gateway");
        let _ = self.supervisor_tx.try_send(SupervisorSignal::CleanClose);
    }

    async fn handle_tunneling_request(&self, req: TunnelingRequest) {
        let ConnectionHeader {
            channel_id,
            sequence_counter: seq,
        } = req.connection_header;

        if !self.session.check_channel(channel_id).await {
            warn!(channel = channel_id, "TUNNELING_REQUEST channel mismatch, dropping");
            return;
        }

        let expected = self.session.expected_in_seq();
        if seq == expected {
            self.session.advance_in_seq();
            self.deliver_to_consumer(CemiFrame::new(req.cemi));
        } else if seq == expected.wrapping_sub(1) {
            debug!(seq, "duplicate TUNNELING_REQUEST, acking without redelivery");
        } else {
            warn!(seq, expected, "TUNNELING_REQUEST sequence out of window, dropping");
            return;
        }

        let ack = Frame::TunnelingAck(TunnelingAck::new(ConnectionHeader::new(channel_id, seq), 0));
        if let Err(e) = self.socket.send(&ack).await {
            warn!("failed to send TUNNELING_ACK: {e}");
        }
    }

    fn deliver_to_consumer(&self, payload: CemiFrame) {
        if self.consumer_tx.try_send(payload).is_err() {
            warn!("consumer inbound queue full or closed, dropping cEMI frame");
        }
    }

    async fn handle_tunneling_ack(&self, ack: TunnelingAck) {
        if !self.session.check_channel(ack.connection_header.channel_id).await {
            return;
        }
        self.ack_channel
            .deliver(
                TunnelAck {
                    seq: ack.connection_header.sequence_counter,
                    status: ack.status,
                },
                self.session.config.resend_interval,
            )
            .await;
    }

    async fn handle_state_response(&self, resp: ConnectionStateResponse) {
        if !self.session.check_channel(resp.channel_id).await {
            return;
        }
        self.heartbeat_channel
            .deliver(resp.status, self.session.config.resend_interval)
            .await;
    }

    /// Unlike the other handlers, there is no channel to validate against:
    /// a `CONNECT_RESPONSE` is exactly what assigns one. Relayed to whichever
    /// reconnect attempt is currently waiting (see
    /// [`crate::handshake::reconnect`]); dropped on the floor if none is.
    async fn handle_connect_response(&self, resp: ConnectResponse) {
        self.connect_channel
            .deliver((&resp).into(), self.session.config.resend_interval)
            .await;
    }
}
