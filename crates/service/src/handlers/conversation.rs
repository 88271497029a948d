//! The three handshake handlers that drive the conversation state machine:
//! `StartConversation`, `VerifyIdentity`, `CheckIn`.

use async_trait::async_trait;
use codec::crypto::{self, CryptoError, PUBLIC_KEY_MAX_LEN};
use codec::message::{
    ChallengeResponseRequest, ConversationRequest, RequestBody, ResponseMessage, ResponsePayload, Role, Status,
    StartConversationRequest, StartConversationResponse, Version,
};

use crate::handler::{Handler, HandlerContext, RequiredStatus};
use crate::session::ConversationStatus;

pub struct StartConversation;

#[async_trait]
impl Handler for StartConversation {
    fn required_role(&self) -> Role {
        Role::PRIMARY | Role::SERVER_NEIGHBOR | Role::CLIENT_CUSTOMER | Role::CLIENT_NON_CUSTOMER | Role::CLIENT_APP_SERVICE
    }

    fn required_status(&self) -> RequiredStatus {
        RequiredStatus::of(ConversationStatus::NoConversation)
    }

    async fn handle(&self, ctx: &HandlerContext, request_id: u32, body: RequestBody) -> ResponseMessage {
        let request = match body {
            RequestBody::Conversation(ConversationRequest::StartConversation(request)) => request,
            _ => unreachable!("handler table guarantees the matching request variant"),
        };

        let StartConversationRequest {
            supported_versions,
            public_key,
            client_challenge,
        } = request;

        if public_key.len() > PUBLIC_KEY_MAX_LEN {
            return ResponseMessage::error_with_details(request_id, Status::ErrorInvalidValue, "public_key");
        }

        let Some(version) = Version::negotiate(&supported_versions) else {
            return ResponseMessage::error(request_id, Status::ErrorUnsupported);
        };

        let identity_id = crypto::identity_id(&public_key);
        let server_challenge = crypto::generate_challenge();
        let signature = ctx.node_keypair.sign(&client_challenge);

        ctx.registry.add_peer_with_identity(&ctx.session, public_key, identity_id);
        ctx.session.set_authentication_challenge(server_challenge);
        ctx.session.set_conversation_status(ConversationStatus::ConversationStarted);

        ResponseMessage::ok(
            request_id,
            ResponsePayload::StartConversation(StartConversationResponse {
                version,
                public_key: ctx.node_keypair.public_key_bytes().to_vec(),
                challenge: server_challenge,
                client_challenge,
                signature,
            }),
        )
    }
}

/// `VerifyIdentity`/`CheckIn` success carries no payload; only
/// `StartConversation` returns one among the conversation handlers.
fn ok_no_payload(request_id: u32) -> ResponseMessage {
    ResponseMessage {
        id: request_id,
        status: Status::Ok,
        details: None,
        payload: None,
    }
}

/// Shared by `VerifyIdentity` and `CheckIn`: both check the echoed
/// challenge and the signature over it against the session's stored
/// public key.
fn verify_challenge_response(ctx: &HandlerContext, request: &ChallengeResponseRequest) -> Result<(), Status> {
    let expected = ctx
        .session
        .authentication_challenge()
        .ok_or(Status::ErrorUninitialized)?;

    if request.challenge != expected {
        return Err(Status::ErrorInvalidSignature);
    }

    let public_key = ctx.session.public_key().ok_or(Status::ErrorUninitialized)?;

    crypto::verify(&public_key, &request.challenge, &request.signature).map_err(|err| match err {
        CryptoError::InvalidSignature | CryptoError::InvalidPublicKey | CryptoError::InvalidPublicKeyLength => {
            Status::ErrorInvalidSignature
        }
    })
}

pub struct VerifyIdentity;

#[async_trait]
impl Handler for VerifyIdentity {
    fn required_role(&self) -> Role {
        Role::PRIMARY | Role::SERVER_NEIGHBOR | Role::CLIENT_NON_CUSTOMER | Role::CLIENT_APP_SERVICE
    }

    fn required_status(&self) -> RequiredStatus {
        RequiredStatus::of(ConversationStatus::ConversationStarted)
    }

    async fn handle(&self, ctx: &HandlerContext, request_id: u32, body: RequestBody) -> ResponseMessage {
        let request = match body {
            RequestBody::Conversation(ConversationRequest::VerifyIdentity(request)) => request,
            _ => unreachable!("handler table guarantees the matching request variant"),
        };

        if let Err(status) = verify_challenge_response(ctx, &request) {
            return ResponseMessage::error(request_id, status);
        }

        ctx.session.set_conversation_status(ConversationStatus::Verified);
        ok_no_payload(request_id)
    }
}

pub struct CheckIn;

#[async_trait]
impl Handler for CheckIn {
    fn required_role(&self) -> Role {
        Role::CLIENT_CUSTOMER
    }

    fn required_status(&self) -> RequiredStatus {
        RequiredStatus::of(ConversationStatus::ConversationStarted)
    }

    async fn handle(&self, ctx: &HandlerContext, request_id: u32, body: RequestBody) -> ResponseMessage {
        let request = match body {
            RequestBody::Conversation(ConversationRequest::CheckIn(request)) => request,
            _ => unreachable!("handler table guarantees the matching request variant"),
        };

        if let Err(status) = verify_challenge_response(ctx, &request) {
            return ResponseMessage::error(request_id, status);
        }

        let Some(identity_id) = ctx.session.identity_id() else {
            return ResponseMessage::error(request_id, Status::ErrorUninitialized);
        };

        let hosting = match ctx.repository.lookup_hosting(&identity_id).await {
            Ok(Some(row)) => row,
            Ok(None) => return ResponseMessage::error(request_id, Status::ErrorNotFound),
            Err(_) => return ResponseMessage::error(request_id, Status::ErrorInternal),
        };

        let expired = hosting
            .expiration_date
            .is_some_and(|when| when <= std::time::SystemTime::now());
        if expired {
            return ResponseMessage::error(request_id, Status::ErrorNotFound);
        }

        ctx.session.set_conversation_status(ConversationStatus::Authenticated);

        if let Some(displaced) = ctx.registry.add_checked_in(&ctx.session) {
            tokio::spawn(async move {
                displaced.close().await;
            });
        }

        ok_no_payload(request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::test_ctx;
    use codec::crypto::Keypair;

    #[tokio::test]
    async fn start_conversation_transitions_and_signs_challenge() {
        let ctx = test_ctx(Role::CLIENT_CUSTOMER);
        let client_keys = Keypair::generate();
        let client_challenge = [7u8; 32];

        let body = RequestBody::Conversation(ConversationRequest::StartConversation(StartConversationRequest {
            supported_versions: vec![Version::CURRENT],
            public_key: client_keys.public_key_bytes().to_vec(),
            client_challenge,
        }));

        let response = StartConversation.handle(&ctx, 10, body).await;
        assert_eq!(ctx.session.conversation_status(), ConversationStatus::ConversationStarted);

        match response.payload {
            Some(ResponsePayload::StartConversation(payload)) => {
                assert_eq!(payload.client_challenge, client_challenge);
                crypto::verify(&payload.public_key, &client_challenge, &payload.signature).unwrap();
            }
            _ => panic!("expected a start-conversation payload"),
        }
    }

    #[tokio::test]
    async fn check_in_succeeds_for_hosted_identity() {
        let ctx = test_ctx(Role::CLIENT_CUSTOMER);
        let client_keys = Keypair::generate();

        let start_body = RequestBody::Conversation(ConversationRequest::StartConversation(StartConversationRequest {
            supported_versions: vec![Version::CURRENT],
            public_key: client_keys.public_key_bytes().to_vec(),
            client_challenge: [1; 32],
        }));
        let start_response = StartConversation.handle(&ctx, 1, start_body).await;
        let server_challenge = match start_response.payload {
            Some(ResponsePayload::StartConversation(payload)) => payload.challenge,
            _ => unreachable!(),
        };

        let identity_id = ctx.session.identity_id().unwrap();
        ctx.repository
            .lock_hosting_table()
            .await
            .unwrap()
            .insert_or_revive(identity_id, client_keys.public_key_bytes().to_vec())
            .await
            .unwrap();

        let signature = client_keys.sign(&server_challenge);
        let check_in_body = RequestBody::Conversation(ConversationRequest::CheckIn(ChallengeResponseRequest {
            challenge: server_challenge,
            signature,
        }));

        let response = CheckIn.handle(&ctx, 2, check_in_body).await;
        assert_eq!(response.status, Status::Ok);
        assert_eq!(ctx.session.conversation_status(), ConversationStatus::Authenticated);
        assert!(ctx.registry.get_checked_in(&identity_id).is_some());
    }

    #[tokio::test]
    async fn check_in_rejects_wrong_signature() {
        let ctx = test_ctx(Role::CLIENT_CUSTOMER);
        let client_keys = Keypair::generate();
        let attacker_keys = Keypair::generate();

        let start_body = RequestBody::Conversation(ConversationRequest::StartConversation(StartConversationRequest {
            supported_versions: vec![Version::CURRENT],
            public_key: client_keys.public_key_bytes().to_vec(),
            client_challenge: [1; 32],
        }));
        let start_response = StartConversation.handle(&ctx, 1, start_body).await;
        let server_challenge = match start_response.payload {
            Some(ResponsePayload::StartConversation(payload)) => payload.challenge,
            _ => unreachable!(),
        };

        let bad_signature = attacker_keys.sign(&server_challenge);
        let check_in_body = RequestBody::Conversation(ConversationRequest::CheckIn(ChallengeResponseRequest {
            challenge: server_challenge,
            signature: bad_signature,
        }));

        let response = CheckIn.handle(&ctx, 2, check_in_body).await;
        assert_eq!(response.status, Status::ErrorInvalidSignature);
    }
}
