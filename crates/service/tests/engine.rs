//! Exercises the registry + handler table + dispatch loop end to end over a
//! real `AsyncWrite` half, rather than unit-testing each piece in
//! isolation.

use std::sync::Arc;
use std::time::Duration;

use codec::crypto::Keypair;
use codec::frame::FrameReader;
use codec::message::{
    ConversationRequest, Message, PingRequest, RequestBody, RequestMessage, Role, SingleRequest, UpdateProfileFlags, UpdateProfileRequest, Version,
};
use profile_node_service::image_store::memory::InMemoryImageStore;
use profile_node_service::repository::memory::InMemoryRepository;
use profile_node_service::{build_handler_table, dispatch, HandlerContext, SessionRegistry};

fn context(registry: &Arc<SessionRegistry>, role: Role) -> (HandlerContext, tokio::io::DuplexStream) {
    let (server_side, client_side) = tokio::io::duplex(4096);
    let session = registry.add_peer(role, "127.0.0.1:1".parse().unwrap(), false, Duration::from_secs(60), server_side);

    let ctx = HandlerContext {
        session,
        registry: registry.clone(),
        repository: Arc::new(InMemoryRepository::new()),
        image_store: InMemoryImageStore::new(),
        node_keypair: Arc::new(Keypair::generate()),
        role_endpoints: Arc::new(Vec::new()),
        max_hosted_identities: 10,
        max_profile_name_length_bytes: 64,
        max_profile_image_length_bytes: 65_536,
        max_extra_data_length_bytes: 1_024,
    };

    (ctx, client_side)
}

#[tokio::test]
async fn ping_round_trips_through_the_real_handler_table() {
    let registry = SessionRegistry::new();
    let table = build_handler_table();
    let (ctx, mut client_side) = context(&registry, Role::CLIENT_CUSTOMER);

    let request = Message::Request(RequestMessage {
        id: 42,
        body: RequestBody::Single {
            version: Version::CURRENT,
            request: SingleRequest::Ping(PingRequest {
                payload: b"ping".to_vec(),
            }),
        },
    });

    dispatch(&ctx, &table, request).await;

    let mut reader = FrameReader::new();
    let body = reader.read_frame(&mut client_side).await.expect("a response frame was written");
    let response = Message::decode(&body).expect("a valid response message");

    match response {
        Message::Response(response) => {
            assert_eq!(response.id, 42);
            assert!(response.status.is_ok());
        }
        other => panic!("expected a response, got {other:?}"),
    }
}

#[tokio::test]
async fn update_profile_is_rejected_before_authentication() {
    // UpdateProfile requires `ConversationStatus::Authenticated`; a
    // freshly-registered session that never ran the
    // StartConversation/VerifyIdentity handshake must be turned away by
    // `check_session_conditions` before the handler body ever runs.
    let registry = SessionRegistry::new();
    let table = build_handler_table();
    let (ctx, mut client_side) = context(&registry, Role::CLIENT_CUSTOMER);

    let request = Message::Request(RequestMessage {
        id: 7,
        body: RequestBody::Conversation(ConversationRequest::UpdateProfile(UpdateProfileRequest {
            flags: UpdateProfileFlags {
                set_name: true,
                ..Default::default()
            },
            version: None,
            name: Some("new name".to_string()),
            location: None,
            image: None,
            extra_data: None,
        })),
    });

    dispatch(&ctx, &table, request).await;

    let mut reader = FrameReader::new();
    let body = reader.read_frame(&mut client_side).await.expect("a response frame was written");
    let response = Message::decode(&body).expect("a valid response message");

    match response {
        Message::Response(response) => {
            assert_eq!(response.id, 7);
            assert!(!response.status.is_ok(), "an unauthenticated session must not be able to update a profile");
        }
        other => panic!("expected a response, got {other:?}"),
    }
}
