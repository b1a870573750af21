//! Tunnel configuration.
//!
//! There is no file-based config layer here — the library has nothing to
//! load from disk. The CLI binary (`main.rs`) is the only place a
//! `TunnelConfig` is built from user input, via `clap`.

use std::time::Duration;

const DEFAULT_RESEND_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Timing knobs for a [`crate::Tunnel`].
///
/// A non-positive duration (zero) in any field is replaced with its default
/// by [`TunnelConfig::normalized`]; callers never need to special-case zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelConfig {
    /// Interval between retransmissions of an unanswered request.
    pub resend_interval: Duration,
    /// Idle period after which a liveness probe (heartbeat) is triggered.
    pub heartbeat_interval: Duration,
    /// Maximum wait for any single response exchange (connect, heartbeat, send).
    pub response_timeout: Duration,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            resend_interval: DEFAULT_RESEND_INTERVAL,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }
}

impl TunnelConfig {
    /// Returns a copy with every zero-duration field substituted by its default.
    pub fn normalized(self) -> Self {
        Self {
            resend_interval: non_zero_or(self.resend_interval, DEFAULT_RESEND_INTERVAL),
            heartbeat_interval: non_zero_or(self.heartbeat_interval, DEFAULT_HEARTBEAT_INTERVAL),
            response_timeout: non_zero_or(self.response_timeout, DEFAULT_RESPONSE_TIMEOUT),
        }
    }
}

fn non_zero_or(value: Duration, default: Duration) -> Duration {
    if value.is_zero() {
        default
    } else {
        value
    }
}
