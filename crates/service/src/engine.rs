//! The conversation engine: the dispatch pivot for one decoded [`Message`]
//! on one session. Given a message and the session it arrived on, it
//! refreshes the idle deadline, classifies the message, runs the admission
//! check, dispatches to the static handler table, and writes the response —
//! or, for an inbound response to one of this session's own outbound
//! requests, correlates it against the pending map.

use codec::message::{Message, RequestMessage, ResponseMessage, ResponsePayload, Status};

use crate::handler::{classify, HandlerContext, HandlerTable, RequiredStatus};
use crate::session::{ConversationStatus, IoOutcome as SessionIoOutcome};

/// What the caller (the per-connection read loop) should do next. Distinct
/// from [`crate::session::IoOutcome`]: that one only describes the outcome
/// of a single write, whereas this describes the outcome of one full
/// dispatch cycle, including I/O failures that never got a response
/// written at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOutcome {
    KeepOpen,
    /// A protocol-violation response was written; the caller must close
    /// after the flush completes.
    ProtocolViolation,
    /// The write itself failed; nothing more can be sent.
    Close,
}

#[derive(Debug)]
pub enum EngineError {
    Io(std::io::Error),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Io(err) => write!(f, "engine write failed: {err}"),
        }
    }
}

impl std::error::Error for EngineError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    BadRole,
    BadConversationStatus,
    Unauthorized,
}

impl AdmissionError {
    fn status(self) -> Status {
        match self {
            AdmissionError::BadRole => Status::ErrorBadRole,
            AdmissionError::BadConversationStatus => Status::ErrorBadConversationStatus,
            AdmissionError::Unauthorized => Status::ErrorUnauthorized,
        }
    }
}

/// The admission gate every dispatched request passes through before its
/// handler runs.
///
/// - `required_role` not intersecting `session_role` → `BadRole`.
/// - `required_status` absent → always admitted (single requests).
/// - `required_status` is `NoConversation`/`ConversationStarted` and
///   `current` doesn't match exactly → `BadConversationStatus`.
/// - `required_status` is `Verified`/`Authenticated` and `current` is
///   neither that state nor `Authenticated` → `Unauthorized`.
pub fn check_session_conditions(
    session_role: codec::message::Role,
    required_role: codec::message::Role,
    current_status: ConversationStatus,
    required_status: RequiredStatus,
) -> Result<(), AdmissionError> {
    if !session_role.contains_any(required_role) {
        return Err(AdmissionError::BadRole);
    }

    if let Some(required) = required_status.0 {
        if !current_status.satisfies(required) {
            use ConversationStatus::*;
            return Err(match required {
                NoConversation | ConversationStarted => AdmissionError::BadConversationStatus,
                Verified | Authenticated => AdmissionError::Unauthorized,
            });
        }
    }

    Ok(())
}

/// The four response payload shapes an outbound request can expect back —
/// only these four requests have a dedicated response payload; the rest
/// reply with bare status + details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponsePayloadKind {
    Ping,
    ListRoles,
    IdentityLookup,
    StartConversation,
}

fn response_payload_kind(payload: &ResponsePayload) -> ResponsePayloadKind {
    match payload {
        ResponsePayload::Ping(_) => ResponsePayloadKind::Ping,
        ResponsePayload::ListRoles(_) => ResponsePayloadKind::ListRoles,
        ResponsePayload::IdentityLookup(_) => ResponsePayloadKind::IdentityLookup,
        ResponsePayload::StartConversation(_) => ResponsePayloadKind::StartConversation,
    }
}

fn expected_payload_kind(kind: crate::handler::RequestKind) -> Option<ResponsePayloadKind> {
    use crate::handler::RequestKind::*;
    match kind {
        Ping => Some(ResponsePayloadKind::Ping),
        ListRoles => Some(ResponsePayloadKind::ListRoles),
        IdentityLookup => Some(ResponsePayloadKind::IdentityLookup),
        ProfileLookup => Some(ResponsePayloadKind::IdentityLookup),
        StartConversation => Some(ResponsePayloadKind::StartConversation),
        _ => None,
    }
}

/// Entry point invoked by the per-connection read loop for every decoded
/// message.
pub async fn dispatch(ctx: &HandlerContext, table: &HandlerTable, message: Message) -> IoOutcome {
    ctx.session.refresh_keep_alive();

    match message {
        Message::Request(request) => dispatch_request(ctx, table, request).await,
        Message::Response(response) => dispatch_response(ctx, response).await,
    }
}

async fn dispatch_request(ctx: &HandlerContext, table: &HandlerTable, request: RequestMessage) -> IoOutcome {
    let id = request.id;
    let kind = classify(&request.body);

    let handler = match table.get(&kind) {
        Some(handler) => handler,
        None => {
            log::error!("no handler registered for {kind:?}");
            return write_response(ctx, ResponseMessage::error(id, Status::ErrorInternal)).await;
        }
    };

    if let Err(admission_error) = check_session_conditions(
        ctx.session.role,
        handler.required_role(),
        ctx.session.conversation_status(),
        handler.required_status(),
    ) {
        return write_response(ctx, ResponseMessage::error(id, admission_error.status())).await;
    }

    if let codec::message::RequestBody::Single { version, .. } = &request.body {
        if !version.is_supported() {
            return write_response(
                ctx,
                ResponseMessage::error_with_details(id, Status::ErrorProtocolViolation, "version"),
            )
            .await;
        }
    }

    let response = handler.handle(ctx, id, request.body).await;
    write_response(ctx, response).await
}

async fn dispatch_response(ctx: &HandlerContext, response: ResponseMessage) -> IoOutcome {
    let id = response.id;

    let pending = match ctx.session.take_pending(id) {
        Some(pending) => pending,
        None => {
            log::warn!("unmatched response id {id} on session {:?}", ctx.session.id);
            return write_response(ctx, ResponseMessage::protocol_violation()).await;
        }
    };

    if response.status.is_ok() {
        let expected = expected_payload_kind(classify(&pending.request));
        let actual = response.payload.as_ref().map(response_payload_kind);
        if actual != expected {
            log::warn!(
                "response variant mismatch for id {id} on session {:?}",
                ctx.session.id
            );
            return write_response(ctx, ResponseMessage::protocol_violation()).await;
        }
    }

    // The handler awaiting this reply may have already timed out and
    // dropped its receiver; that is not a protocol violation.
    let _ = pending.responder.send(response);
    IoOutcome::KeepOpen
}

async fn write_response(ctx: &HandlerContext, response: ResponseMessage) -> IoOutcome {
    match ctx.session.send_message(response).await {
        Ok(SessionIoOutcome::KeepOpen) => IoOutcome::KeepOpen,
        Ok(SessionIoOutcome::Close) => IoOutcome::ProtocolViolation,
        Err(err) => {
            log::warn!("{}", EngineError::Io(err));
            IoOutcome::Close
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;
    use crate::image_store::memory::InMemoryImageStore;
    use crate::registry::SessionRegistry;
    use crate::repository::memory::InMemoryRepository;
    use crate::session::{Session, SessionId};
    use async_trait::async_trait;
    use codec::message::{PingRequest, PingResponse, Role, SingleRequest, Version};
    use std::sync::Arc;
    use std::time::Duration;

    struct EchoPing;

    #[async_trait]
    impl Handler for EchoPing {
        fn required_role(&self) -> Role {
            Role::PRIMARY | Role::CLIENT_CUSTOMER | Role::CLIENT_NON_CUSTOMER | Role::CLIENT_APP_SERVICE | Role::SERVER_NEIGHBOR
        }

        fn required_status(&self) -> RequiredStatus {
            RequiredStatus::NONE
        }

        async fn handle(&self, _ctx: &HandlerContext, request_id: u32, body: codec::message::RequestBody) -> ResponseMessage {
            let payload = match body {
                codec::message::RequestBody::Single {
                    request: SingleRequest::Ping(PingRequest { payload }),
                    ..
                } => payload,
                _ => unreachable!(),
            };

            ResponseMessage::ok(
                request_id,
                ResponsePayload::Ping(PingResponse { payload, clock_ms: 0 }),
            )
        }
    }

    fn test_ctx(role: Role) -> HandlerContext {
        let session = Arc::new(Session::new(
            SessionId::new(role, 1),
            "127.0.0.1:1".parse().unwrap(),
            false,
            role,
            Duration::from_secs(60),
            tokio::io::sink(),
        ));

        HandlerContext {
            session,
            registry: SessionRegistry::new(),
            repository: Arc::new(InMemoryRepository::new()),
            image_store: InMemoryImageStore::new(),
            node_keypair: Arc::new(codec::crypto::Keypair::generate()),
            role_endpoints: Arc::new(Vec::new()),
            max_hosted_identities: 10,
            max_profile_name_length_bytes: 64,
            max_profile_image_length_bytes: 65536,
            max_extra_data_length_bytes: 1024,
        }
    }

    fn test_table() -> HandlerTable {
        let mut table = HandlerTable::default();
        table.insert(crate::handler::RequestKind::Ping, Arc::new(EchoPing) as Arc<dyn Handler>);
        table
    }

    #[tokio::test]
    async fn ping_is_admitted_on_any_role() {
        let ctx = test_ctx(Role::CLIENT_CUSTOMER);
        let table = test_table();

        let message = Message::Request(RequestMessage {
            id: 1,
            body: codec::message::RequestBody::Single {
                version: Version::CURRENT,
                request: SingleRequest::Ping(PingRequest { payload: vec![9] }),
            },
        });

        let outcome = dispatch(&ctx, &table, message).await;
        assert_eq!(outcome, IoOutcome::KeepOpen);
    }

    #[tokio::test]
    async fn unsupported_version_is_protocol_violation() {
        let ctx = test_ctx(Role::PRIMARY);
        let table = test_table();

        let bogus_version = Version { major: 9, minor: 9, patch: 9 };
        let message = Message::Request(RequestMessage {
            id: 2,
            body: codec::message::RequestBody::Single {
                version: bogus_version,
                request: SingleRequest::Ping(PingRequest { payload: vec![] }),
            },
        });

        let outcome = dispatch(&ctx, &table, message).await;
        assert_eq!(outcome, IoOutcome::ProtocolViolation);
    }

    #[tokio::test]
    async fn unregistered_request_kind_is_internal_error_not_violation() {
        let ctx = test_ctx(Role::PRIMARY);
        let table = HandlerTable::default();

        let message = Message::Request(RequestMessage {
            id: 3,
            body: codec::message::RequestBody::Single {
                version: Version::CURRENT,
                request: SingleRequest::ListRoles,
            },
        });

        let outcome = dispatch(&ctx, &table, message).await;
        assert_eq!(outcome, IoOutcome::KeepOpen);
    }

    #[tokio::test]
    async fn unmatched_response_is_protocol_violation() {
        let ctx = test_ctx(Role::PRIMARY);
        let table = test_table();

        let message = Message::Response(ResponseMessage::ok(
            404,
            ResponsePayload::Ping(PingResponse { payload: vec![], clock_ms: 0 }),
        ));

        let outcome = dispatch(&ctx, &table, message).await;
        assert_eq!(outcome, IoOutcome::ProtocolViolation);
    }

    #[test]
    fn check_session_conditions_distinguishes_error_kinds() {
        assert_eq!(
            check_session_conditions(Role::CLIENT_CUSTOMER, Role::PRIMARY, ConversationStatus::NoConversation, RequiredStatus::NONE),
            Err(AdmissionError::BadRole)
        );

        assert_eq!(
            check_session_conditions(
                Role::PRIMARY,
                Role::PRIMARY,
                ConversationStatus::NoConversation,
                RequiredStatus::of(ConversationStatus::ConversationStarted)
            ),
            Err(AdmissionError::BadConversationStatus)
        );

        assert_eq!(
            check_session_conditions(
                Role::PRIMARY,
                Role::PRIMARY,
                ConversationStatus::ConversationStarted,
                RequiredStatus::of(ConversationStatus::Authenticated)
            ),
            Err(AdmissionError::Unauthorized)
        );

        assert!(check_session_conditions(
            Role::PRIMARY,
            Role::PRIMARY,
            ConversationStatus::Authenticated,
            RequiredStatus::of(ConversationStatus::Verified)
        )
        .is_ok());
    }
}
