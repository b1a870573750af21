//! Session state shared across the tunnel's concurrent actors.
//!
//! Guards mutable connection state behind async mutexes sized to the access
//! pattern: `out_seq` is mutated by whichever task is mid-send (one at a
//! time, by contract), `channel` is mutated only across reconnects, and
//! `in_seq` is mutated by the inbound dispatcher on every accepted frame and
//! by `adopt_channel` across a reconnect, so a bare atomic (no lock) still
//! suffices.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::Mutex;

use crate::config::TunnelConfig;

/// The channel id and control endpoint assigned by the gateway, bundled so
/// a reconnect updates both atomically with respect to readers.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChannelInfo {
    pub channel_id: u8,
    pub control_endpoint: SocketAddr,
}

/// Shared state for one tunnel connection's lifetime (reset across reconnects).
pub(crate) struct SessionState {
    channel: Mutex<ChannelInfo>,
    /// Exclusion primitive for outbound sends: the holder of the guard has
    /// exclusive rights to the current sequence number for the whole send,
    /// from initial transmit through final ack or failure.
    pub out_seq: Mutex<u8>,
    /// Next sequence number this session expects from the peer. Written by
    /// `InboundDispatcher::run` on every accepted frame, and reset to 0 by
    /// `adopt_channel` across a reconnect (a new channel starts a fresh
    /// sequence space on both sides).
    in_seq: AtomicU8,
    pub config: TunnelConfig,
}

impl SessionState {
    pub fn new(channel_id: u8, control_endpoint: SocketAddr, config: TunnelConfig) -> Self {
        Self {
            channel: Mutex::new(ChannelInfo {
                channel_id,
                control_endpoint,
            }),
            out_seq: Mutex::new(0),
            in_seq: AtomicU8::new(0),
            config,
        }
    }

    /// Current channel id and control endpoint. Always read through here —
    /// never cached by callers across an `.await` point — since a reconnect
    /// may change both.
    pub async fn snapshot_channel(&self) -> ChannelInfo {
        *self.channel.lock().await
    }

    /// Replaces the channel id and control endpoint after a (re)connect, and
    /// resets both `out_seq` and `in_seq` to 0 per invariant 5: a new channel
    /// starts a fresh sequence space in both directions, so the dispatcher
    /// must expect seq 0 again rather than continuing from whatever it last
    /// saw on the old channel.
    pub async fn adopt_channel(&self, channel_id: u8, control_endpoint: SocketAddr) {
        let mut guard = self.channel.lock().await;
        *guard = ChannelInfo {
            channel_id,
            control_endpoint,
        };
        drop(guard);
        *self.out_seq.lock().await = 0;
        self.in_seq.store(0, Ordering::Release);
    }

    /// Whether `id` matches the session's current channel.
    pub async fn check_channel(&self, id: u8) -> bool {
        self.channel.lock().await.channel_id == id
    }

    /// The sequence number the dispatcher currently expects from the peer.
    pub fn expected_in_seq(&self) -> u8 {
        self.in_seq.load(Ordering::Acquire)
    }

    /// Advances `in_seq` by one (mod 256). Dispatcher-only.
    pub fn advance_in_seq(&self) {
        self.in_seq.fetch_add(1, Ordering::AcqRel);
    }
}
