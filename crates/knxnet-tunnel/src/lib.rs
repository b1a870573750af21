//! KNXnet/IP tunneling client: session state machine, UDP transport, CLI.
//!
//! The library surface is [`Tunnel`]: open a tunnel to a gateway, `send`
//! cEMI frames into it, and consume delivered frames from its
//! [`Tunnel::inbound`] stream. Everything else — the handshake, the
//! per-generation dispatcher/sender/heartbeat actors, and the supervisor
//! that reconnects after a gateway-initiated disconnect or a failed
//! heartbeat — is internal machinery, split into single-purpose
//! collaborators rather than one monolithic connection handle.
//!
//! # What does this client do? (for beginners)
//!
//! A KNXnet/IP gateway bridges an IP network to a KNX field bus. This
//! crate speaks the *tunneling* half of that protocol: it opens one
//! point-to-point session with a gateway (`CONNECT_REQUEST`/`RESPONSE`),
//! then exchanges KNX telegrams — opaque cEMI frames this crate never
//! interprets — as `TUNNELING_REQUEST`/`ACK` pairs, while a periodic
//! `CONNECTIONSTATE_REQUEST` heartbeat keeps the session alive. If the
//! gateway drops the session or a heartbeat goes unanswered, the supervisor
//! transparently reconnects; callers of [`Tunnel::send`]/[`Tunnel::inbound`]
//! never see the channel id or sequence counters that make this work.

pub mod config;
pub mod error;
pub mod socket;

mod handshake;
mod heartbeat;
mod inbound;
mod outbound;
mod relay;
mod session;
mod supervisor;

pub use config::TunnelConfig;
pub use error::TunnelError;
pub use supervisor::{InboundStream, Tunnel};

pub use knxnet_proto::CemiFrame;
