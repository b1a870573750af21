//! The public [`Tunnel`] handle and the supervisor task that owns its
//! lifecycle: initial handshake, the dispatcher/heartbeat/sender actors, and
//! reconnection after a gateway-initiated disconnect or heartbeat failure.
//!
//! This crate is a library, so the supervisor is one spawned task rather
//! than an application entry point.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use knxnet_proto::frame::Hpai;
use knxnet_proto::service::DisconnectRequest;
use knxnet_proto::{CemiFrame, Frame};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::TunnelConfig;
use crate::error::TunnelError;
use crate::handshake::{self, ConnectOutcome};
use crate::heartbeat::HeartbeatMonitor;
use crate::inbound::InboundDispatcher;
use crate::outbound::{AckChannel, OutboundSender};
use crate::relay::ReplySlot;
use crate::session::SessionState;
use crate::socket::{TunnelSocket, UdpTransport};

/// Inbound delivery queue capacity. A slow consumer must never stall frame
/// processing, so overflow drops the newest frame rather than blocking the
/// dispatcher.
const INBOUND_QUEUE_CAPACITY: usize = 64;
/// Capacity of the channel the dispatcher/heartbeat use to signal the
/// supervisor. Small and never expected to back up: at most one signal is
/// meaningful at a time (the session either is or isn't being torn down).
const SUPERVISOR_SIGNAL_CAPACITY: usize = 8;

/// Signals the dispatcher or heartbeat monitor raise to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SupervisorSignal {
    /// The gateway sent `DISCONNECT_REQUEST`; we acked it. Reconnect.
    GatewayDisconnected,
    /// The gateway acked a disconnect we initiated. No reconnect wanted.
    CleanClose,
    /// A heartbeat probe timed out or returned a non-Normal status. Reconnect.
    HeartbeatFailed,
    /// The socket's inbound stream ended. Fatal; no reconnect is possible.
    InboundClosed,
}

/// Consumer-facing stream of tunneled cEMI payloads, yielded in the
/// gateway's send order with duplicates already suppressed by the dispatcher.
///
/// Backed by a bounded `mpsc::Receiver` rather than `tokio_stream`'s
/// `ReceiverStream` wrapper (not in this crate's dependency set) — a
/// one-method `futures::Stream` impl over `poll_recv` is all this needs.
pub struct InboundStream {
    rx: mpsc::Receiver<CemiFrame>,
}

impl futures::Stream for InboundStream {
    type Item = CemiFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// A live KNXnet/IP tunnel connection.
///
/// Generic over the transport so tests can drive the whole supervised
/// lifecycle against [`crate::socket::mock::MockSocket`] instead of a real
/// UDP socket; [`Tunnel::open`] is the only place `S` is pinned to
/// [`UdpTransport`].
pub struct Tunnel<S: TunnelSocket = UdpTransport> {
    id: Uuid,
    socket: Arc<S>,
    session: Arc<SessionState>,
    sender: Arc<OutboundSender<S>>,
    ack_channel: Arc<AckChannel>,
    consumer_rx: Mutex<Option<mpsc::Receiver<CemiFrame>>>,
    local_hpai: Hpai,
    cancel: CancellationToken,
    dispatcher_handle: Mutex<Option<JoinHandle<()>>>,
    heartbeat_handle: Mutex<Option<JoinHandle<()>>>,
    supervisor_handle: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Tunnel<UdpTransport> {
    /// Binds a UDP socket, performs the CONNECT handshake against
    /// `gateway_addr` (bounded by `config.response_timeout`), and spawns the
    /// supervised session. Non-positive config durations are replaced with
    /// their defaults before anything is sent.
    pub async fn open(gateway_addr: SocketAddr, config: TunnelConfig) -> Result<Self, TunnelError> {
        let config = config.normalized();
        let socket = UdpTransport::connect(gateway_addr).await?;
        let local_addr = socket.local_addr()?;
        let local_hpai = Hpai::new(
            match local_addr.ip() {
                std::net::IpAddr::V4(v4) => v4,
                // The HPAI wire format this crate speaks is IPv4-only; an
                // IPv6-bound socket presents the NAT-transparent 0.0.0.0:0
                // endpoint instead of failing the connect.
                std::net::IpAddr::V6(_) => std::net::Ipv4Addr::UNSPECIFIED,
            },
            local_addr.port(),
        );
        Self::open_with_socket(socket, local_hpai, config).await
    }
}

impl<S: TunnelSocket> Tunnel<S> {
    /// Transport-generic constructor shared by [`Tunnel::open`] and tests.
    /// `local_hpai` is presented to the gateway as both the control and data
    /// endpoint: this client always sends the same HPAI as both.
    pub(crate) async fn open_with_socket(
        socket: S,
        local_hpai: Hpai,
        config: TunnelConfig,
    ) -> Result<Self, TunnelError> {
        let id = Uuid::new_v4();
        let socket = Arc::new(socket);
        let cancel = CancellationToken::new();

        let (channel_id, control_endpoint) =
            handshake::connect(socket.as_ref(), local_hpai, config, &cancel).await?;

        let session = Arc::new(SessionState::new(channel_id, control_endpoint, config));
        let ack_channel = Arc::new(AckChannel::new());
        let heartbeat_channel = Arc::new(ReplySlot::new());
        let connect_channel = Arc::new(ReplySlot::new());
        let (consumer_tx, consumer_rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
        let (supervisor_tx, supervisor_rx) = mpsc::channel(SUPERVISOR_SIGNAL_CAPACITY);

        let dispatcher_handle = spawn_dispatcher(
            socket.clone(),
            session.clone(),
            ack_channel.clone(),
            heartbeat_channel.clone(),
            connect_channel.clone(),
            consumer_tx,
            supervisor_tx.clone(),
        );
        let heartbeat_handle = spawn_heartbeat(
            socket.clone(),
            session.clone(),
            heartbeat_channel.clone(),
            local_hpai,
            supervisor_tx.clone(),
            cancel.clone(),
        );
        let sender = Arc::new(OutboundSender::new(
            socket.clone(),
            session.clone(),
            ack_channel.clone(),
        ));

        let supervisor_handle = spawn_supervisor(SupervisorContext {
            id,
            socket: socket.clone(),
            session: session.clone(),
            ack_channel: ack_channel.clone(),
            heartbeat_channel,
            connect_channel,
            local_hpai,
            cancel: cancel.clone(),
            supervisor_tx,
            supervisor_rx,
        });

        info!(tunnel_id = %id, channel = channel_id, "tunnel established");
        Ok(Self {
            id,
            socket,
            session,
            sender,
            ack_channel,
            consumer_rx: Mutex::new(Some(consumer_rx)),
            local_hpai,
            cancel,
            dispatcher_handle: Mutex::new(Some(dispatcher_handle)),
            heartbeat_handle: Mutex::new(Some(heartbeat_handle)),
            supervisor_handle: Mutex::new(Some(supervisor_handle)),
            closed: AtomicBool::new(false),
        })
    }

    /// Sends `payload` as a tunneled cEMI frame, bounded by
    /// `config.response_timeout`. At most one `send` proceeds past sequence
    /// acquisition at a time (enforced inside [`OutboundSender`]).
    pub async fn send(&self, payload: CemiFrame) -> Result<(), TunnelError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TunnelError::Disconnected);
        }
        let timeout = self.session.config.response_timeout;
        match tokio::time::timeout(timeout, self.sender.send(payload, &self.cancel)).await {
            Ok(result) => result,
            Err(_) => Err(TunnelError::Timeout),
        }
    }

    /// The consumer-side stream of delivered cEMI payloads. May only be
    /// taken once; a second call panics, since a dropped `InboundStream`
    /// cannot be un-dropped to hand frames to two readers.
    pub fn inbound(&self) -> InboundStream {
        let rx = self
            .consumer_rx
            .try_lock()
            .ok()
            .and_then(|mut guard| guard.take())
            .expect("Tunnel::inbound() called more than once");
        InboundStream { rx }
    }

    /// Best-effort graceful shutdown: sends `DISCONNECT_REQUEST`, cancels the
    /// shared cancellation token (aborting any in-flight `send`/handshake),
    /// and stops the dispatcher, heartbeat, and supervisor tasks. Idempotent
    /// — a second call observes the same closed state and is a no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let channel = self.session.snapshot_channel().await;
        let request = Frame::DisconnectRequest(DisconnectRequest::new(
            channel.channel_id,
            self.local_hpai,
        ));
        if let Err(e) = self.socket.send(&request).await {
            debug!("best-effort DISCONNECT_REQUEST failed: {e}");
        }

        self.cancel.cancel();
        self.ack_channel.reset().await;

        if let Some(handle) = self.heartbeat_handle.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.dispatcher_handle.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.supervisor_handle.lock().await.take() {
            handle.abort();
        }
    }
}

/// Everything [`spawn_supervisor`]'s task needs, bundled so the call site
/// doesn't grow an unreadable ten-argument function call.
struct SupervisorContext<S: TunnelSocket> {
    id: Uuid,
    socket: Arc<S>,
    session: Arc<SessionState>,
    ack_channel: Arc<AckChannel>,
    heartbeat_channel: Arc<ReplySlot<u8>>,
    connect_channel: Arc<ReplySlot<ConnectOutcome>>,
    local_hpai: Hpai,
    cancel: CancellationToken,
    supervisor_tx: mpsc::Sender<SupervisorSignal>,
    supervisor_rx: mpsc::Receiver<SupervisorSignal>,
}

/// Spawns the task that reacts to [`SupervisorSignal`]s: reconnects on
/// `GatewayDisconnected`/`HeartbeatFailed`, tears down on `CleanClose`,
/// `InboundClosed`, or external cancellation.
fn spawn_supervisor<S: TunnelSocket>(mut ctx: SupervisorContext<S>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let signal = tokio::select! {
                _ = ctx.cancel.cancelled() => return,
                signal = ctx.supervisor_rx.recv() => match signal {
                    Some(signal) => signal,
                    None => return,
                },
            };

            match signal {
                SupervisorSignal::CleanClose => {
                    debug!(tunnel_id = %ctx.id, "clean close acknowledged");
                    return;
                }
                SupervisorSignal::InboundClosed => {
                    warn!(tunnel_id = %ctx.id, "inbound socket closed, session terminated");
                    ctx.ack_channel.reset().await;
                    ctx.heartbeat_channel.reset().await;
                    ctx.connect_channel.reset().await;
                    return;
                }
                SupervisorSignal::GatewayDisconnected | SupervisorSignal::HeartbeatFailed => {
                    warn!(tunnel_id = %ctx.id, ?signal, "session interrupted, attempting reconnect");
                    ctx.ack_channel.reset().await;

                    // The dispatcher is already running and is the socket's
                    // sole reader; `reconnect` waits on `connect_channel`
                    // instead of racing it for `recv()`.
                    match handshake::reconnect(
                        ctx.socket.as_ref(),
                        ctx.local_hpai,
                        ctx.session.config,
                        &ctx.cancel,
                        &ctx.connect_channel,
                    )
                    .await
                    {
                        Ok((channel_id, control_endpoint)) => {
                            ctx.session.adopt_channel(channel_id, control_endpoint).await;
                            info!(tunnel_id = %ctx.id, channel = channel_id, "reconnected");
                            if signal == SupervisorSignal::HeartbeatFailed {
                                // The monitor that raised this signal already
                                // exited; spawn a fresh one for the new session.
                                spawn_heartbeat(
                                    ctx.socket.clone(),
                                    ctx.session.clone(),
                                    ctx.heartbeat_channel.clone(),
                                    ctx.local_hpai,
                                    ctx.supervisor_tx.clone(),
                                    ctx.cancel.clone(),
                                );
                            }
                        }
                        Err(e) => {
                            warn!(tunnel_id = %ctx.id, error = %e, "reconnect failed, terminating session");
                            ctx.ack_channel.reset().await;
                            ctx.heartbeat_channel.reset().await;
                            return;
                        }
                    }
                }
            }
        }
    })
}

fn spawn_dispatcher<S: TunnelSocket>(
    socket: Arc<S>,
    session: Arc<SessionState>,
    ack_channel: Arc<AckChannel>,
    heartbeat_channel: Arc<ReplySlot<u8>>,
    connect_channel: Arc<ReplySlot<ConnectOutcome>>,
    consumer_tx: mpsc::Sender<CemiFrame>,
    supervisor_tx: mpsc::Sender<SupervisorSignal>,
) -> JoinHandle<()> {
    let dispatcher = InboundDispatcher::new(
        socket,
        session,
        ack_channel,
        heartbeat_channel,
        connect_channel,
        consumer_tx,
        supervisor_tx,
    );
    tokio::spawn(dispatcher.run())
}

fn spawn_heartbeat<S: TunnelSocket>(
    socket: Arc<S>,
    session: Arc<SessionState>,
    heartbeat_channel: Arc<ReplySlot<u8>>,
    local_hpai: Hpai,
    supervisor_tx: mpsc::Sender<SupervisorSignal>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let monitor = HeartbeatMonitor::new(socket, session, heartbeat_channel, local_hpai, supervisor_tx);
    tokio::spawn(monitor.run(cancel))
}
