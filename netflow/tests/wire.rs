//! Wire-level encoding laws and the netflow channel's close-socket
//! scenario, exercised end to end over a real loopback TCP connection.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::time::Duration;

use bytes::{Buf, BufMut, BytesMut};

use mw_netflow as netflow;
use netflow::wire::{self, ObservationKind};
use netflow::{feature, Base, ChannelEvent, Flags, NetflowClient, Observation, Signature};

fn encode_observation(sockfd: u64, obs: u16, extra: u64) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u16(obs);
    buf.put_u64(0); // t_start_s
    buf.put_u64(0); // t_start_ns
    buf.put_u64(1); // t_now_s
    buf.put_u64(0); // t_now_ns
    buf.put_u64(sockfd);
    buf.put_u32(4); // pvm address family
    buf.put_slice(&[10, 0, 0, 1]);
    buf.put_slice(&[0u8; 12]);
    buf.put_u16(1); // pvm port
    buf.put_u32(4); // remote address family
    buf.put_slice(&[10, 0, 0, 2]);
    buf.put_slice(&[0u8; 12]);
    buf.put_u16(2); // remote port
    buf.put_u64(0); // bytes_in
    buf.put_u64(0); // bytes_out
    buf.put_u64(extra);
    buf
}

#[test]
fn observation_decode_keeps_the_accepted_socket_distinct_from_the_listener() {
    let base = Base { sig: Signature::Info as u16, id: 1 };
    let mut payload = encode_observation(0x11, ObservationKind::Accept as u16, 0x22);
    assert_eq!(payload.len(), wire::OBSERVATION_PAYLOAD_LEN);

    let observation = Observation::decode(base, &mut payload).unwrap();
    assert_eq!(observation.kind(), Some(ObservationKind::Accept));
    assert_eq!(observation.sockfd, 0x11, "sockfd is the listening socket");
    assert_eq!(observation.extra, 0x22, "extra is the newly accepted connection");
    assert_ne!(observation.sockfd, observation.extra);
}

/// S4 — netflow close-socket mitigation: a feature request for closing
/// socket 0x22 is sent with the documented wire shape, and the matching
/// response is correlated back out of the outstanding-request table.
#[test]
fn s4_close_socket_feature_request_round_trips_through_the_channel() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let accept = std::thread::spawn(move || listener.accept().unwrap().0);

    let client = NetflowClient::connect(addr).unwrap();
    let mut instance_side = accept.join().unwrap();
    instance_side.set_nodelay(true).ok();

    let reader_stream = client.try_clone_stream().unwrap();
    let shutdown = common::ShutdownFlag::new();
    let (events, _reader_handle) = client.spawn_reader(reader_stream, shutdown.clone());

    let sockfd = 0x22u64;
    let id = client
        .send_feature_request(Flags::WRITE | Flags::BY_SOCK, feature::MT_SOCK_ATTRIB_OPEN, 0, 0, sockfd)
        .unwrap();
    assert_eq!(client.outstanding_count(), 1);

    let mut header = [0u8; wire::BASE_LEN];
    instance_side.read_exact(&mut header).unwrap();
    let base = Base::decode(&mut &header[..]).unwrap();
    assert_eq!(base.sig, Signature::FeatureRequest as u16);
    assert_eq!(base.id, id);

    let mut payload = [0u8; wire::FEATURE_REQUEST_PAYLOAD_LEN];
    instance_side.read_exact(&mut payload).unwrap();
    let mut body = &payload[..];
    let flags_bits = body.get_u16();
    let name = body.get_u16();
    let val0 = body.get_u64();
    let val1 = body.get_u64();
    let req_sockfd = body.get_u64();
    assert_eq!(flags_bits, 0x3, "WRITE|BY_SOCK");
    assert_eq!(name, feature::MT_SOCK_ATTRIB_OPEN);
    assert_eq!(val0, 0);
    assert_eq!(val1, 0);
    assert_eq!(req_sockfd, sockfd);

    let response_base = Base { sig: Signature::FeatureResponse as u16, id };
    let mut frame = BytesMut::new();
    response_base.encode(&mut frame);
    frame.put_i32(0);
    frame.put_slice(&[0u8; 16]);
    instance_side.write_all(&frame).unwrap();

    let event = events
        .recv_timeout(Duration::from_secs(2))
        .expect("the feature response should arrive on the channel");
    match event {
        ChannelEvent::FeatureResponse { response, request } => {
            assert_eq!(response.base.id, id);
            let request = request.expect("response should correlate to the outstanding request");
            assert_eq!(request.sockfd, sockfd);
            assert_eq!(request.name, feature::MT_SOCK_ATTRIB_OPEN);
        }
        other => panic!("expected a feature response, got {other:?}"),
    }
    assert_eq!(client.outstanding_count(), 0);

    shutdown.trigger();
}
