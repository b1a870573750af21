//! Integration tests for the `knxnet-proto` wire codec.
//!
//! Exercises the public `encode_frame`/`decode_frame` API the way the tunnel
//! crate uses it: build a [`Frame`], push it through the wire, and check the
//! decoded value is identical to what went in.

use knxnet_proto::codec::{decode_frame, encode_frame, Frame};
use knxnet_proto::frame::Hpai;
use knxnet_proto::service::{
    ConnectRequest, ConnectResponse, ConnectionHeader, ConnectionStateRequest,
    ConnectionStateResponse, DisconnectRequest, DisconnectResponse, TunnelingAck,
    TunnelingRequest,
};
use std::net::Ipv4Addr;

fn roundtrip(frame: Frame) -> Frame {
    let bytes = encode_frame(&frame);
    decode_frame(&bytes).expect("decode must succeed")
}

#[test]
fn connect_request_round_trip() {
    let hpai = Hpai::new(Ipv4Addr::new(192, 168, 1, 50), 0); // ephemeral port, as a real client sends
    let original = Frame::ConnectRequest(ConnectRequest::new(hpai, hpai));
    assert_eq!(original, roundtrip(original.clone()));
}

#[test]
fn connect_response_round_trip() {
    let original = Frame::ConnectResponse(ConnectResponse {
        channel_id: 12,
        status: 0,
        data_endpoint: Hpai::new(Ipv4Addr::new(192, 168, 1, 1), 3671),
        crd: [0x04, 0x00, 0x11, 0x2A],
    });
    assert_eq!(original, roundtrip(original.clone()));
}

#[test]
fn connectionstate_round_trip() {
    let hpai = Hpai::new(Ipv4Addr::new(192, 168, 1, 50), 51000);
    let req = Frame::ConnectionStateRequest(ConnectionStateRequest::new(12, hpai));
    assert_eq!(req.clone(), roundtrip(req));

    let resp = Frame::ConnectionStateResponse(ConnectionStateResponse::new(12, 0));
    assert_eq!(resp.clone(), roundtrip(resp));
}

#[test]
fn disconnect_round_trip() {
    let hpai = Hpai::new(Ipv4Addr::new(192, 168, 1, 50), 51000);
    let req = Frame::DisconnectRequest(DisconnectRequest::new(12, hpai));
    assert_eq!(req.clone(), roundtrip(req));

    let resp = Frame::DisconnectResponse(DisconnectResponse::new(12, 0));
    assert_eq!(resp.clone(), roundtrip(resp));
}

#[test]
fn tunneling_request_carries_cemi_untouched() {
    // A representative L_Data.req cEMI frame: group write to 1/2/3 with a
    // 1-byte APDU. The codec must not interpret any of these bytes.
    let cemi = vec![
        0x11, 0x00, 0xBC, 0xE0, 0x11, 0x01, 0x0A, 0x03, 0x01, 0x00, 0x81,
    ];
    let original = Frame::TunnelingRequest(TunnelingRequest::new(3, 42, cemi.clone()));
    let decoded = roundtrip(original);
    match decoded {
        Frame::TunnelingRequest(req) => {
            assert_eq!(req.cemi, cemi);
            assert_eq!(req.connection_header, ConnectionHeader::new(3, 42));
        }
        other => panic!("expected TunnelingRequest, got {other:?}"),
    }
}

#[test]
fn tunneling_ack_round_trip() {
    let original = Frame::TunnelingAck(TunnelingAck::new(ConnectionHeader::new(3, 42), 0));
    assert_eq!(original.clone(), roundtrip(original));
}

#[test]
fn sequence_counter_wraps_at_256_on_the_wire() {
    // Sequence counters are single bytes; 255 followed by 0 is a valid,
    // expected wraparound, not an error.
    let req = TunnelingRequest::new(1, 255, vec![0x01]);
    let bytes = encode_frame(&Frame::TunnelingRequest(req));
    let Frame::TunnelingRequest(decoded) = decode_frame(&bytes).unwrap() else {
        panic!("expected TunnelingRequest")
    };
    assert_eq!(decoded.connection_header.sequence_counter, 255);

    let req = TunnelingRequest::new(1, 0, vec![0x01]);
    let bytes = encode_frame(&Frame::TunnelingRequest(req));
    let Frame::TunnelingRequest(decoded) = decode_frame(&bytes).unwrap() else {
        panic!("expected TunnelingRequest")
    };
    assert_eq!(decoded.connection_header.sequence_counter, 0);
}

#[test]
fn decode_rejects_garbage_bytes() {
    let garbage = [0xFF, 0xFF, 0xFF, 0xFF];
    assert!(decode_frame(&garbage).is_err());
}
