//! `HomeNodeRequest` / `RegisterHosting`: establish a hosting agreement for
//! the caller's identity, under the hosting table's transactional lock.

use async_trait::async_trait;
use codec::message::{ConversationRequest, RequestBody, ResponseMessage, Role, Status};

use crate::handler::{Handler, HandlerContext, RequiredStatus};
use crate::repository::InsertOutcome;
use crate::session::ConversationStatus;

async fn register_hosting(ctx: &HandlerContext, request_id: u32) -> ResponseMessage {
    let identity_id = match ctx.session.identity_id() {
        Some(identity_id) => identity_id,
        None => return ResponseMessage::error(request_id, Status::ErrorUninitialized),
    };
    let public_key = ctx.session.public_key().unwrap_or_default();

    let mut guard = match ctx.repository.lock_hosting_table().await {
        Ok(guard) => guard,
        Err(_) => return ResponseMessage::error(request_id, Status::ErrorInternal),
    };

    let count = match guard.count_hosted_identities().await {
        Ok(count) => count,
        Err(_) => {
            guard.rollback();
            return ResponseMessage::error(request_id, Status::ErrorInternal);
        }
    };

    if count >= ctx.max_hosted_identities {
        guard.rollback();
        return ResponseMessage::error(request_id, Status::ErrorQuotaExceeded);
    }

    let outcome = match guard.insert_or_revive(identity_id, public_key).await {
        Ok(outcome) => outcome,
        Err(_) => {
            guard.rollback();
            return ResponseMessage::error(request_id, Status::ErrorInternal);
        }
    };

    if outcome == InsertOutcome::AlreadyActive {
        guard.rollback();
        return ResponseMessage::error(request_id, Status::ErrorAlreadyExists);
    }

    match guard.commit().await {
        Ok(()) => ResponseMessage {
            id: request_id,
            status: Status::Ok,
            details: None,
            payload: None,
        },
        Err(_) => ResponseMessage::error(request_id, Status::ErrorInternal),
    }
}

pub struct HomeNodeRequest;

#[async_trait]
impl Handler for HomeNodeRequest {
    fn required_role(&self) -> Role {
        Role::SERVER_NEIGHBOR | Role::CLIENT_NON_CUSTOMER
    }

    fn required_status(&self) -> RequiredStatus {
        RequiredStatus::of(ConversationStatus::ConversationStarted)
    }

    async fn handle(&self, ctx: &HandlerContext, request_id: u32, body: RequestBody) -> ResponseMessage {
        debug_assert!(matches!(body, RequestBody::Conversation(ConversationRequest::HomeNodeRequest)));
        register_hosting(ctx, request_id).await
    }
}

pub struct RegisterHosting;

#[async_trait]
impl Handler for RegisterHosting {
    fn required_role(&self) -> Role {
        Role::SERVER_NEIGHBOR | Role::CLIENT_NON_CUSTOMER
    }

    fn required_status(&self) -> RequiredStatus {
        RequiredStatus::of(ConversationStatus::ConversationStarted)
    }

    async fn handle(&self, ctx: &HandlerContext, request_id: u32, body: RequestBody) -> ResponseMessage {
        debug_assert!(matches!(body, RequestBody::Conversation(ConversationRequest::RegisterHosting)));
        register_hosting(ctx, request_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::test_ctx;

    #[tokio::test]
    async fn first_registration_succeeds() {
        let ctx = test_ctx(Role::CLIENT_NON_CUSTOMER);
        ctx.session.set_identity(vec![1; 32], [9; 32]);

        let response = register_hosting(&ctx, 1).await;
        assert_eq!(response.status, Status::Ok);
    }

    #[tokio::test]
    async fn duplicate_registration_is_already_exists() {
        let ctx = test_ctx(Role::CLIENT_NON_CUSTOMER);
        ctx.session.set_identity(vec![1; 32], [9; 32]);

        register_hosting(&ctx, 1).await;
        let response = register_hosting(&ctx, 2).await;
        assert_eq!(response.status, Status::ErrorAlreadyExists);
    }

    #[tokio::test]
    async fn quota_exceeded_when_table_is_full() {
        let mut ctx = test_ctx(Role::CLIENT_NON_CUSTOMER);
        ctx.max_hosted_identities = 0;
        ctx.session.set_identity(vec![1; 32], [9; 32]);

        let response = register_hosting(&ctx, 1).await;
        assert_eq!(response.status, Status::ErrorQuotaExceeded);
    }
}
