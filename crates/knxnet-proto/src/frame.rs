//! KNXnet/IP frame header and Host Protocol Address Information (HPAI).
//!
//! Every KNXnet/IP frame on the wire begins with a fixed 6-byte header:
//!
//! ```text
//! ┌──────────────┬──────────────┬─────────────────────┐
//! │ Header Len   │ Protocol Ver │   Service Type ID    │
//! │   (1 byte)   │   (1 byte)   │      (2 bytes)       │
//! ├──────────────┴──────────────┴─────────────────────┤
//! │            Total Length (2 bytes)                   │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! followed by a service-specific body. This module owns the header and the
//! HPAI structure (endpoint address + port) that several service bodies embed.

use thiserror::Error;

/// KNXnet/IP protocol version this crate implements (v1.0).
pub const PROTOCOL_VERSION: u8 = 0x10;

/// Fixed header length field value for protocol version 1.0.
pub const HEADER_LENGTH: u8 = 0x06;

/// Host protocol code for "IPv4 UDP", the only transport this crate supports.
pub const IPV4_UDP: u8 = 0x01;

/// Errors raised while parsing or building the fixed frame header or HPAI.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("buffer too short: need at least {needed} bytes, got {available}")]
    TooShort { needed: usize, available: usize },

    #[error("unexpected header length byte: 0x{0:02X} (expected 0x06)")]
    BadHeaderLength(u8),

    #[error("unsupported KNXnet/IP protocol version: 0x{0:02X}")]
    UnsupportedVersion(u8),

    #[error("frame declares total_length {declared} but buffer has {available} bytes")]
    Truncated { declared: usize, available: usize },

    #[error("HPAI structure_length byte is {0}, expected 8")]
    BadHpaiLength(u8),
}

/// The 6-byte KNXnet/IP frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub service_type: u16,
    /// Total frame length, header included.
    pub total_length: u16,
}

impl FrameHeader {
    pub const SIZE: usize = 6;

    pub const fn new(service_type: u16, body_length: u16) -> Self {
        Self {
            service_type,
            total_length: Self::SIZE as u16 + body_length,
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < Self::SIZE {
            return Err(FrameError::TooShort {
                needed: Self::SIZE,
                available: data.len(),
            });
        }
        if data[0] != HEADER_LENGTH {
            return Err(FrameError::BadHeaderLength(data[0]));
        }
        if data[1] != PROTOCOL_VERSION {
            return Err(FrameError::UnsupportedVersion(data[1]));
        }
        let service_type = u16::from_be_bytes([data[2], data[3]]);
        let total_length = u16::from_be_bytes([data[4], data[5]]);
        Ok(Self {
            service_type,
            total_length,
        })
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(HEADER_LENGTH);
        buf.push(PROTOCOL_VERSION);
        buf.extend_from_slice(&self.service_type.to_be_bytes());
        buf.extend_from_slice(&self.total_length.to_be_bytes());
    }

    pub const fn body_length(&self) -> u16 {
        self.total_length.saturating_sub(Self::SIZE as u16)
    }
}

/// Host Protocol Address Information: an IPv4 address plus a UDP port.
///
/// Every CONNECT_REQUEST carries two of these (control and data endpoints),
/// and CONNECTIONSTATE_REQUEST/DISCONNECT_REQUEST each carry one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hpai {
    pub address: std::net::Ipv4Addr,
    pub port: u16,
}

impl Hpai {
    pub const SIZE: usize = 8;

    pub const fn new(address: std::net::Ipv4Addr, port: u16) -> Self {
        Self { address, port }
    }

    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < Self::SIZE {
            return Err(FrameError::TooShort {
                needed: Self::SIZE,
                available: data.len(),
            });
        }
        if data[0] != Self::SIZE as u8 {
            return Err(FrameError::BadHpaiLength(data[0]));
        }
        // data[1] is the host protocol code; we only ever speak IPv4 UDP and
        // accept whatever the gateway sends back here.
        let address = std::net::Ipv4Addr::new(data[2], data[3], data[4], data[5]);
        let port = u16::from_be_bytes([data[6], data[7]]);
        Ok(Self { address, port })
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(Self::SIZE as u8);
        buf.push(IPV4_UDP);
        buf.extend_from_slice(&self.address.octets());
        buf.extend_from_slice(&self.port.to_be_bytes());
    }
}

impl std::fmt::Display for Hpai {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let header = FrameHeader::new(0x0205, 20);
        let mut buf = Vec::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), FrameHeader::SIZE);
        let parsed = FrameHeader::parse(&buf).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.body_length(), 20);
    }

    #[test]
    fn header_rejects_wrong_version() {
        let mut buf = vec![0x06, 0x11, 0x02, 0x05, 0x00, 0x1A];
        assert!(matches!(
            FrameHeader::parse(&buf),
            Err(FrameError::UnsupportedVersion(0x11))
        ));
        buf[1] = 0x10;
        assert!(FrameHeader::parse(&buf).is_ok());
    }

    #[test]
    fn header_rejects_short_buffer() {
        assert!(matches!(
            FrameHeader::parse(&[0x06, 0x10]),
            Err(FrameError::TooShort { .. })
        ));
    }

    #[test]
    fn hpai_round_trip() {
        let hpai = Hpai::new(std::net::Ipv4Addr::new(192, 168, 1, 10), 3671);
        let mut buf = Vec::new();
        hpai.encode(&mut buf);
        assert_eq!(buf, vec![0x08, 0x01, 192, 168, 1, 10, 0x0E, 0x57]);
        assert_eq!(Hpai::parse(&buf).unwrap(), hpai);
    }

    #[test]
    fn hpai_rejects_bad_structure_length() {
        let buf = [0x09, 0x01, 192, 168, 1, 10, 0x0E, 0x57];
        assert!(matches!(
            Hpai::parse(&buf),
            Err(FrameError::BadHpaiLength(0x09))
        ));
    }
}
