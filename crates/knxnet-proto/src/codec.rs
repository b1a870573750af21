//! Whole-datagram codec: wraps a [`crate::frame::FrameHeader`] around a service
//! body and back. Each KNXnet/IP service maps to exactly one UDP datagram, so
//! unlike a stream codec there is no partial-frame/consumed-bytes bookkeeping:
//! `encode_frame` produces one complete datagram and `decode_frame` consumes one.

use thiserror::Error;

use crate::frame::{FrameError, FrameHeader};
use crate::service::{
    ConnectRequest, ConnectResponse, ConnectionStateRequest, ConnectionStateResponse,
    DisconnectRequest, DisconnectResponse, ServiceType, TunnelingAck, TunnelingRequest,
};

/// Errors raised while encoding or decoding a complete KNXnet/IP frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("unsupported or unrecognized service type: 0x{0:04X}")]
    UnknownServiceType(u16),

    #[error("frame body was shorter than its service requires")]
    MalformedBody,
}

/// One parsed KNXnet/IP frame body, tagged by the service that produced it.
///
/// Search/description/routing services (SEARCH_REQUEST, DESCRIPTION_REQUEST, ...)
/// are out of scope for a tunneling client and have no variant here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    ConnectRequest(ConnectRequest),
    ConnectResponse(ConnectResponse),
    ConnectionStateRequest(ConnectionStateRequest),
    ConnectionStateResponse(ConnectionStateResponse),
    DisconnectRequest(DisconnectRequest),
    DisconnectResponse(DisconnectResponse),
    TunnelingRequest(TunnelingRequest),
    TunnelingAck(TunnelingAck),
}

impl Frame {
    pub const fn service_type(&self) -> ServiceType {
        match self {
            Self::ConnectRequest(_) => ServiceType::ConnectRequest,
            Self::ConnectResponse(_) => ServiceType::ConnectResponse,
            Self::ConnectionStateRequest(_) => ServiceType::ConnectionStateRequest,
            Self::ConnectionStateResponse(_) => ServiceType::ConnectionStateResponse,
            Self::DisconnectRequest(_) => ServiceType::DisconnectRequest,
            Self::DisconnectResponse(_) => ServiceType::DisconnectResponse,
            Self::TunnelingRequest(_) => ServiceType::TunnelingRequest,
            Self::TunnelingAck(_) => ServiceType::TunnelingAck,
        }
    }
}

/// Encodes a [`Frame`] into a complete UDP datagram, header included.
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let mut body = Vec::new();
    match frame {
        Frame::ConnectRequest(b) => b.encode(&mut body),
        Frame::ConnectResponse(b) => b.encode(&mut body),
        Frame::ConnectionStateRequest(b) => b.encode(&mut body),
        Frame::ConnectionStateResponse(b) => b.encode(&mut body),
        Frame::DisconnectRequest(b) => b.encode(&mut body),
        Frame::DisconnectResponse(b) => b.encode(&mut body),
        Frame::TunnelingRequest(b) => b.encode(&mut body),
        Frame::TunnelingAck(b) => b.encode(&mut body),
    }

    let header = FrameHeader::new(frame.service_type() as u16, body.len() as u16);
    let mut buf = Vec::with_capacity(FrameHeader::SIZE + body.len());
    header.encode(&mut buf);
    buf.extend_from_slice(&body);
    buf
}

/// Decodes one complete UDP datagram into a [`Frame`].
pub fn decode_frame(data: &[u8]) -> Result<Frame, ProtocolError> {
    let header = FrameHeader::parse(data)?;
    let total = header.total_length as usize;
    if data.len() < total {
        return Err(ProtocolError::Frame(FrameError::Truncated {
            declared: total,
            available: data.len(),
        }));
    }
    let body = &data[FrameHeader::SIZE..total];

    let service = ServiceType::from_u16(header.service_type)
        .ok_or(ProtocolError::UnknownServiceType(header.service_type))?;

    let frame = match service {
        ServiceType::ConnectRequest => Frame::ConnectRequest(ConnectRequest::parse(body)?),
        ServiceType::ConnectResponse => Frame::ConnectResponse(ConnectResponse::parse(body)?),
        ServiceType::ConnectionStateRequest => {
            Frame::ConnectionStateRequest(ConnectionStateRequest::parse(body)?)
        }
        ServiceType::ConnectionStateResponse => {
            Frame::ConnectionStateResponse(ConnectionStateResponse::parse(body)?)
        }
        ServiceType::DisconnectRequest => {
            Frame::DisconnectRequest(DisconnectRequest::parse(body)?)
        }
        ServiceType::DisconnectResponse => {
            Frame::DisconnectResponse(DisconnectResponse::parse(body)?)
        }
        ServiceType::TunnelingRequest => {
            if body.len() < 4 {
                return Err(ProtocolError::MalformedBody);
            }
            Frame::TunnelingRequest(TunnelingRequest::parse(body)?)
        }
        ServiceType::TunnelingAck => Frame::TunnelingAck(TunnelingAck::parse(body)?),
    };
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Hpai;
    use crate::service::ConnectionHeader;
    use std::net::Ipv4Addr;

    fn round_trip(frame: Frame) -> Frame {
        let bytes = encode_frame(&frame);
        decode_frame(&bytes).expect("decode should succeed")
    }

    #[test]
    fn connect_request_frame_round_trip() {
        let hpai = Hpai::new(Ipv4Addr::new(10, 0, 0, 5), 54321);
        let frame = Frame::ConnectRequest(ConnectRequest::new(hpai, hpai));
        assert_eq!(round_trip(frame.clone()), frame);
    }

    #[test]
    fn connect_response_frame_round_trip() {
        let frame = Frame::ConnectResponse(ConnectResponse {
            channel_id: 1,
            status: 0,
            data_endpoint: Hpai::new(Ipv4Addr::new(192, 168, 1, 1), 3671),
            crd: [0x04, 0x00, 0x11, 0x0A],
        });
        assert_eq!(round_trip(frame.clone()), frame);
    }

    #[test]
    fn tunneling_request_frame_round_trip() {
        let frame = Frame::TunnelingRequest(TunnelingRequest::new(
            2,
            200,
            vec![0x29, 0x00, 0xBC, 0xE0, 0x11, 0x01, 0x09, 0x01, 0x01, 0x00],
        ));
        assert_eq!(round_trip(frame.clone()), frame);
    }

    #[test]
    fn tunneling_ack_frame_round_trip() {
        let frame = Frame::TunnelingAck(TunnelingAck::new(ConnectionHeader::new(2, 200), 0));
        assert_eq!(round_trip(frame.clone()), frame);
    }

    #[test]
    fn decode_rejects_unknown_service_type() {
        let buf = vec![0x06, 0x10, 0xFF, 0xFF, 0x00, 0x06];
        let err = decode_frame(&buf).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownServiceType(0xFFFF)));
    }

    #[test]
    fn decode_rejects_truncated_frame() {
        let buf = [0x06, 0x10, 0x02, 0x06, 0x00, 0x20]; // declares 32 bytes, has 6
        assert!(matches!(
            decode_frame(&buf),
            Err(ProtocolError::Frame(FrameError::Truncated { .. }))
        ));
    }
}
