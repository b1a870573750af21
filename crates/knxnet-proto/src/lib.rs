//! # knxnet-proto
//!
//! Wire types and binary codec for the KNXnet/IP tunneling protocol
//! (CONNECT, CONNECTIONSTATE, DISCONNECT, TUNNELING services).
//!
//! This crate has zero dependencies on sockets, async runtimes, or OS APIs —
//! it only knows how to turn [`service`] structs into bytes and back. The
//! `knxnet-tunnel` crate owns the UDP socket, the session state machine, and
//! everything else that makes actual network calls.

pub mod cemi;
pub mod codec;
pub mod dpt;
pub mod frame;
pub mod service;

pub use cemi::CemiFrame;
pub use codec::{decode_frame, encode_frame, Frame, ProtocolError};
pub use frame::{FrameError, FrameHeader, Hpai};
