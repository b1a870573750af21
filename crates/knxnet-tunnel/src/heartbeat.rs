//! Periodic liveness probe over `CONNECTIONSTATE_REQUEST`/`RESPONSE`.

use std::sync::Arc;

use knxnet_proto::frame::Hpai;
use knxnet_proto::service::ConnectionStateRequest;
use knxnet_proto::Frame;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::relay::ReplySlot;
use crate::session::SessionState;
use crate::socket::TunnelSocket;
use crate::supervisor::SupervisorSignal;

/// `CONNECTIONSTATE_RESPONSE` status meaning the gateway considers the
/// tunnel alive.
const STATUS_NORMAL: u8 = 0x00;

/// Sends one `CONNECTIONSTATE_REQUEST` per `heartbeat_interval` tick and
/// reports failure (no response, or a non-Normal response) to the
/// supervisor. Only one probe is ever in flight, since `run` does not start
/// the next tick's probe until the previous one resolves.
pub(crate) struct HeartbeatMonitor<S: TunnelSocket> {
    socket: Arc<S>,
    session: Arc<SessionState>,
    heartbeat_channel: Arc<ReplySlot<u8>>,
    local_hpai: Hpai,
    supervisor_tx: mpsc::Sender<SupervisorSignal>,
}

impl<S: TunnelSocket> HeartbeatMonitor<S> {
    pub fn new(
        socket: Arc<S>,
        session: Arc<SessionState>,
        heartbeat_channel: Arc<ReplySlot<u8>>,
        local_hpai: Hpai,
        supervisor_tx: mpsc::Sender<SupervisorSignal>,
    ) -> Self {
        Self {
            socket,
            session,
            heartbeat_channel,
            local_hpai,
            supervisor_tx,
        }
    }

    /// Runs until cancelled or a probe fails. On failure this returns after
    /// notifying the supervisor; it does not retry — reconnecting and
    /// restarting the monitor is the supervisor's job.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.session.config.heartbeat_interval);
        ticker.tick().await; // immediate first tick; wait a full interval before the first probe

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    if self.probe(&cancel).await.is_err() {
                        warn!("heartbeat probe failed");
                        let _ = self.supervisor_tx.try_send(SupervisorSignal::HeartbeatFailed);
                        return;
                    }
                }
            }
        }
    }

    async fn probe(&self, cancel: &CancellationToken) -> Result<(), ()> {
        let channel = self.session.snapshot_channel().await;
        let request = Frame::ConnectionStateRequest(ConnectionStateRequest::new(
            channel.channel_id,
            self.local_hpai,
        ));
        if self.socket.send(&request).await.is_err() {
            return Err(());
        }

        let mut status_rx = self.heartbeat_channel.begin().await;
        let mut resend = tokio::time::interval(self.session.config.resend_interval);
        resend.tick().await;

        let wait = async {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break Err(()),
                    _ = resend.tick() => {
                        debug!("no CONNECTIONSTATE_RESPONSE yet, resending probe");
                        if self.socket.send(&request).await.is_err() {
                            break Err(());
                        }
                    }
                    status = status_rx.recv() => {
                        break match status {
                            Some(STATUS_NORMAL) => Ok(()),
                            _ => Err(()),
                        };
                    }
                }
            }
        };

        let result = match tokio::time::timeout(self.session.config.response_timeout, wait).await {
            Ok(r) => r,
            Err(_) => Err(()),
        };
        self.heartbeat_channel.reset().await;
        result
    }
}
