//! Service bodies for the KNXnet/IP tunneling services this crate speaks:
//! CONNECT, CONNECTIONSTATE, DISCONNECT and TUNNELING.
//!
//! Each struct here is the *body* that follows the 6-byte [`crate::frame::FrameHeader`].
//! Bodies own their bytes (`Vec<u8>`/`String` free, these are all fixed-size or
//! cEMI-carrying) and expose `encode`/`parse` pairs, mirroring the header's API.

use crate::frame::{FrameError, Hpai};

/// KNXnet/IP service type identifiers (ETS/gateway wire values).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ServiceType {
    ConnectRequest = 0x0205,
    ConnectResponse = 0x0206,
    ConnectionStateRequest = 0x0207,
    ConnectionStateResponse = 0x0208,
    DisconnectRequest = 0x0209,
    DisconnectResponse = 0x020A,
    TunnelingRequest = 0x0420,
    TunnelingAck = 0x0421,
}

impl ServiceType {
    pub const fn from_u16(raw: u16) -> Option<Self> {
        Some(match raw {
            0x0205 => Self::ConnectRequest,
            0x0206 => Self::ConnectResponse,
            0x0207 => Self::ConnectionStateRequest,
            0x0208 => Self::ConnectionStateResponse,
            0x0209 => Self::DisconnectRequest,
            0x020A => Self::DisconnectResponse,
            0x0420 => Self::TunnelingRequest,
            0x0421 => Self::TunnelingAck,
            _ => return None,
        })
    }
}

/// `TUNNEL_CONNECTION` connection type, the only one this crate requests.
pub const CONNECTION_TYPE_TUNNEL: u8 = 0x04;
/// `TUNNEL_LINKLAYER` KNX layer, the only one this crate requests.
pub const KNX_LAYER_LINKLAYER: u8 = 0x02;

/// Connection Request Information: tells the gateway what kind of tunnel we want.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionRequestInfo {
    pub connection_type: u8,
    pub knx_layer: u8,
}

impl ConnectionRequestInfo {
    pub const SIZE: usize = 4;

    pub const fn tunnel_link_layer() -> Self {
        Self {
            connection_type: CONNECTION_TYPE_TUNNEL,
            knx_layer: KNX_LAYER_LINKLAYER,
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(Self::SIZE as u8);
        buf.push(self.connection_type);
        buf.push(self.knx_layer);
        buf.push(0x00); // reserved
    }

    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < Self::SIZE {
            return Err(FrameError::TooShort {
                needed: Self::SIZE,
                available: data.len(),
            });
        }
        Ok(Self {
            connection_type: data[1],
            knx_layer: data[2],
        })
    }
}

/// `CONNECT_REQUEST` body (service 0x0205).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub control_endpoint: Hpai,
    pub data_endpoint: Hpai,
    pub cri: ConnectionRequestInfo,
}

impl ConnectRequest {
    pub fn new(control_endpoint: Hpai, data_endpoint: Hpai) -> Self {
        Self {
            control_endpoint,
            data_endpoint,
            cri: ConnectionRequestInfo::tunnel_link_layer(),
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        self.control_endpoint.encode(buf);
        self.data_endpoint.encode(buf);
        self.cri.encode(buf);
    }

    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        let control_endpoint = Hpai::parse(data)?;
        let data_endpoint = Hpai::parse(&data[Hpai::SIZE..])?;
        let cri = ConnectionRequestInfo::parse(&data[Hpai::SIZE * 2..])?;
        Ok(Self {
            control_endpoint,
            data_endpoint,
            cri,
        })
    }
}

/// `CONNECT_RESPONSE` body (service 0x0206).
///
/// `status == 0` means the gateway accepted the connection and assigned
/// `channel_id`; any other value is a gateway-defined error code (E_NO_MORE_CONNECTIONS,
/// E_CONNECTION_TYPE, ...) and `data_endpoint`/`crd` should be ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectResponse {
    pub channel_id: u8,
    pub status: u8,
    pub data_endpoint: Hpai,
    /// Connection Response Data. For tunnel connections, bytes 2..4 carry the
    /// KNX individual address the gateway assigned this tunnel.
    pub crd: [u8; 4],
}

impl ConnectResponse {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.channel_id);
        buf.push(self.status);
        self.data_endpoint.encode(buf);
        buf.extend_from_slice(&self.crd);
    }

    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < 2 {
            return Err(FrameError::TooShort {
                needed: 2,
                available: data.len(),
            });
        }
        let channel_id = data[0];
        let status = data[1];
        if status != 0 {
            // Error responses omit the data endpoint and CRD in some gateway
            // implementations; only channel_id/status are guaranteed present.
            return Ok(Self {
                channel_id,
                status,
                data_endpoint: Hpai::new(std::net::Ipv4Addr::UNSPECIFIED, 0),
                crd: [0; 4],
            });
        }
        if data.len() < 2 + Hpai::SIZE + 4 {
            return Err(FrameError::TooShort {
                needed: 2 + Hpai::SIZE + 4,
                available: data.len(),
            });
        }
        let data_endpoint = Hpai::parse(&data[2..])?;
        let mut crd = [0u8; 4];
        crd.copy_from_slice(&data[2 + Hpai::SIZE..2 + Hpai::SIZE + 4]);
        Ok(Self {
            channel_id,
            status,
            data_endpoint,
            crd,
        })
    }

    pub const fn is_ok(&self) -> bool {
        self.status == 0
    }

    /// The KNX individual address the gateway assigned this tunnel, when `is_ok()`.
    pub const fn assigned_address(&self) -> u16 {
        u16::from_be_bytes([self.crd[2], self.crd[3]])
    }
}

/// `CONNECTIONSTATE_REQUEST` body (service 0x0207), the heartbeat probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStateRequest {
    pub channel_id: u8,
    pub control_endpoint: Hpai,
}

impl ConnectionStateRequest {
    pub const fn new(channel_id: u8, control_endpoint: Hpai) -> Self {
        Self {
            channel_id,
            control_endpoint,
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.channel_id);
        buf.push(0x00); // reserved
        self.control_endpoint.encode(buf);
    }

    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < 2 + Hpai::SIZE {
            return Err(FrameError::TooShort {
                needed: 2 + Hpai::SIZE,
                available: data.len(),
            });
        }
        Ok(Self {
            channel_id: data[0],
            control_endpoint: Hpai::parse(&data[2..])?,
        })
    }
}

/// `CONNECTIONSTATE_RESPONSE` body (service 0x0208).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStateResponse {
    pub channel_id: u8,
    pub status: u8,
}

impl ConnectionStateResponse {
    pub const fn new(channel_id: u8, status: u8) -> Self {
        Self { channel_id, status }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.channel_id);
        buf.push(self.status);
    }

    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < 2 {
            return Err(FrameError::TooShort {
                needed: 2,
                available: data.len(),
            });
        }
        Ok(Self {
            channel_id: data[0],
            status: data[1],
        })
    }

    pub const fn is_ok(&self) -> bool {
        self.status == 0
    }
}

/// `DISCONNECT_REQUEST` body (service 0x0209).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectRequest {
    pub channel_id: u8,
    pub control_endpoint: Hpai,
}

impl DisconnectRequest {
    pub const fn new(channel_id: u8, control_endpoint: Hpai) -> Self {
        Self {
            channel_id,
            control_endpoint,
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.channel_id);
        buf.push(0x00);
        self.control_endpoint.encode(buf);
    }

    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < 2 + Hpai::SIZE {
            return Err(FrameError::TooShort {
                needed: 2 + Hpai::SIZE,
                available: data.len(),
            });
        }
        Ok(Self {
            channel_id: data[0],
            control_endpoint: Hpai::parse(&data[2..])?,
        })
    }
}

/// `DISCONNECT_RESPONSE` body (service 0x020A).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectResponse {
    pub channel_id: u8,
    pub status: u8,
}

impl DisconnectResponse {
    pub const fn new(channel_id: u8, status: u8) -> Self {
        Self { channel_id, status }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.channel_id);
        buf.push(self.status);
    }

    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < 2 {
            return Err(FrameError::TooShort {
                needed: 2,
                available: data.len(),
            });
        }
        Ok(Self {
            channel_id: data[0],
            status: data[1],
        })
    }
}

/// The 4-byte connection header prefixing TUNNELING_REQUEST/ACK bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionHeader {
    pub channel_id: u8,
    pub sequence_counter: u8,
}

impl ConnectionHeader {
    pub const SIZE: usize = 4;

    pub const fn new(channel_id: u8, sequence_counter: u8) -> Self {
        Self {
            channel_id,
            sequence_counter,
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(Self::SIZE as u8);
        buf.push(self.channel_id);
        buf.push(self.sequence_counter);
        buf.push(0x00); // reserved (status in the ack's trailing byte, not here)
    }

    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < Self::SIZE {
            return Err(FrameError::TooShort {
                needed: Self::SIZE,
                available: data.len(),
            });
        }
        Ok(Self {
            channel_id: data[1],
            sequence_counter: data[2],
        })
    }
}

/// `TUNNELING_REQUEST` body (service 0x0420): carries one opaque cEMI frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelingRequest {
    pub connection_header: ConnectionHeader,
    pub cemi: Vec<u8>,
}

impl TunnelingRequest {
    pub fn new(channel_id: u8, sequence_counter: u8, cemi: Vec<u8>) -> Self {
        Self {
            connection_header: ConnectionHeader::new(channel_id, sequence_counter),
            cemi,
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        self.connection_header.encode(buf);
        buf.extend_from_slice(&self.cemi);
    }

    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        let connection_header = ConnectionHeader::parse(data)?;
        let cemi = data[ConnectionHeader::SIZE..].to_vec();
        Ok(Self {
            connection_header,
            cemi,
        })
    }
}

/// `TUNNELING_ACK` body (service 0x0421).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelingAck {
    pub connection_header: ConnectionHeader,
    pub status: u8,
}

impl TunnelingAck {
    pub const fn new(connection_header: ConnectionHeader, status: u8) -> Self {
        Self {
            connection_header,
            status,
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        self.connection_header.encode(buf);
        buf.push(self.status);
    }

    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        let connection_header = ConnectionHeader::parse(data)?;
        if data.len() < ConnectionHeader::SIZE + 1 {
            return Err(FrameError::TooShort {
                needed: ConnectionHeader::SIZE + 1,
                available: data.len(),
            });
        }
        Ok(Self {
            connection_header,
            status: data[ConnectionHeader::SIZE],
        })
    }

    pub const fn is_ok(&self) -> bool {
        self.status == 0
    }
}
