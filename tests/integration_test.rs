//! Full-stack test: spawns the real binary entry point against a loopback
//! TCP port and exchanges raw frames over it.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use codec::message::{Message, PingRequest, RequestBody, RequestMessage, SingleRequest, Version};
use tokio::net::TcpStream;
use tokio::time::sleep;

use profile_node::config::{Config, Limits, Log, PeerDiscovery, RoleEndpoint, RoleName, Storage};

const PORT: u16 = 18_443;

fn test_config() -> Arc<Config> {
    Arc::new(Config {
        server_interface: Ipv4Addr::LOCALHOST.into(),
        role_endpoints: vec![RoleEndpoint {
            interface: Ipv4Addr::LOCALHOST.into(),
            port: PORT,
            role: RoleName::Primary,
            tls: false,
        }],
        ssl: None,
        storage: Storage::default(),
        limits: Limits::default(),
        peer_discovery: PeerDiscovery::default(),
        log: Log::default(),
        test_mode: true,
    })
}

#[tokio::test]
async fn ping_round_trips_over_a_real_socket() {
    let config = test_config();
    tokio::spawn(async move {
        profile_node::server_main(config).await.unwrap();
    });

    // Give the role server's bind-retry loop a moment to come up.
    sleep(Duration::from_millis(200)).await;

    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), PORT);
    let mut socket = TcpStream::connect(addr).await.expect("connect to role server");

    let request = Message::Request(RequestMessage {
        id: 1,
        body: RequestBody::Single {
            version: Version::CURRENT,
            request: SingleRequest::Ping(PingRequest {
                payload: b"hello".to_vec(),
            }),
        },
    });

    codec::frame::write_frame(&mut socket, &request.encode())
        .await
        .expect("write ping frame");

    let mut reader = codec::frame::FrameReader::new();
    let body = reader.read_frame(&mut socket).await.expect("read ping response frame");
    let response = Message::decode(&body).expect("decode ping response");

    match response {
        Message::Response(response) => {
            assert_eq!(response.id, 1);
            assert!(response.status.is_ok());
            match response.payload {
                Some(codec::message::ResponsePayload::Ping(ping)) => {
                    assert_eq!(ping.payload, b"hello");
                }
                other => panic!("expected a ping payload, got {other:?}"),
            }
        }
        other => panic!("expected a response message, got {other:?}"),
    }
}

#[tokio::test]
async fn protocol_violations_close_the_connection() {
    let mut config = test_config();
    Arc::get_mut(&mut config).unwrap().role_endpoints[0].port = PORT + 1;
    tokio::spawn(async move {
        profile_node::server_main(config).await.unwrap();
    });

    sleep(Duration::from_millis(200)).await;

    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), PORT + 1);
    let mut socket = TcpStream::connect(addr).await.expect("connect to role server");

    codec::frame::write_frame(&mut socket, b"not a valid encoded message")
        .await
        .expect("write garbage frame");

    let mut reader = codec::frame::FrameReader::new();
    let body = reader.read_frame(&mut socket).await.expect("read protocol violation frame");
    let response = Message::decode(&body).expect("decode protocol violation response");

    match response {
        Message::Response(response) => assert!(!response.status.is_ok()),
        other => panic!("expected a response message, got {other:?}"),
    }

    // The server closes after a protocol violation; the next read observes EOF.
    let err = reader.read_frame(&mut socket).await;
    assert!(err.is_err());
}
