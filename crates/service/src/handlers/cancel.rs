//! `CancelHomeNodeAgreement` / `CancelHostingAgreement`: set
//! `expiration_date` to `now` (no redirect) or `now + 14 days` (with
//! redirect to the supplied node id); schedule image files for deletion;
//! make sure an uninitialized profile still reads back as present.
//!
//! Both wire variants carry the same [`CancelAgreementRequest`] shape and
//! the choice between the two expiration policies is driven entirely by
//! whether the request carries a redirect target, not by which of the two
//! variants was sent — so both handlers share one implementation.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use codec::message::{CancelAgreementRequest, ConversationRequest, RequestBody, ResponseMessage, Role, Status};

use crate::handler::{Handler, HandlerContext, RequiredStatus};
use crate::repository::ProfileUpdate;
use crate::session::ConversationStatus;

const GRACE_PERIOD: Duration = Duration::from_secs(14 * 24 * 60 * 60);

async fn cancel(ctx: &HandlerContext, request_id: u32, request: CancelAgreementRequest) -> ResponseMessage {
    let Some(identity_id) = ctx.session.identity_id() else {
        return ResponseMessage::error(request_id, Status::ErrorUninitialized);
    };

    let (expiration_date, redirect_target) = match request.redirect {
        Some(target) => (SystemTime::now() + GRACE_PERIOD, Some(target)),
        None => (SystemTime::now(), None),
    };

    let mut guard = match ctx.repository.lock_hosting_table().await {
        Ok(guard) => guard,
        Err(_) => return ResponseMessage::error(request_id, Status::ErrorInternal),
    };

    if guard
        .set_expiration(identity_id, Some(expiration_date), redirect_target)
        .await
        .is_err()
    {
        guard.rollback();
        return ResponseMessage::error(request_id, Status::ErrorInternal);
    }

    // Artificially initialize an uninitialized profile so subsequent
    // lookups still see a row rather than a bare "not found".
    if guard
        .update_profile(identity_id, ProfileUpdate::default())
        .await
        .is_err()
    {
        guard.rollback();
        return ResponseMessage::error(request_id, Status::ErrorInternal);
    }

    if guard.commit().await.is_err() {
        return ResponseMessage::error(request_id, Status::ErrorInternal);
    }

    let hosting = ctx.repository.lookup_hosting(&identity_id).await.ok().flatten();
    if let Some(hosting) = hosting {
        // Best-effort: a crash between the commit above and this delete can
        // leak files, same tradeoff as UpdateProfile's image swap.
        if let Some(image) = hosting.profile_image_id {
            let _ = ctx.image_store.delete_image(&image).await;
        }
        if let Some(thumbnail) = hosting.thumbnail_image_id {
            let _ = ctx.image_store.delete_image(&thumbnail).await;
        }
    }

    ResponseMessage {
        id: request_id,
        status: Status::Ok,
        details: None,
        payload: None,
    }
}

pub struct CancelHomeNodeAgreement;

#[async_trait]
impl Handler for CancelHomeNodeAgreement {
    fn required_role(&self) -> Role {
        Role::CLIENT_CUSTOMER
    }

    fn required_status(&self) -> RequiredStatus {
        RequiredStatus::of(ConversationStatus::Authenticated)
    }

    async fn handle(&self, ctx: &HandlerContext, request_id: u32, body: RequestBody) -> ResponseMessage {
        let request = match body {
            RequestBody::Conversation(ConversationRequest::CancelHomeNodeAgreement(request)) => request,
            _ => unreachable!("handler table guarantees the matching request variant"),
        };
        cancel(ctx, request_id, request).await
    }
}

pub struct CancelHostingAgreement;

#[async_trait]
impl Handler for CancelHostingAgreement {
    fn required_role(&self) -> Role {
        Role::CLIENT_CUSTOMER
    }

    fn required_status(&self) -> RequiredStatus {
        RequiredStatus::of(ConversationStatus::Authenticated)
    }

    async fn handle(&self, ctx: &HandlerContext, request_id: u32, body: RequestBody) -> ResponseMessage {
        let request = match body {
            RequestBody::Conversation(ConversationRequest::CancelHostingAgreement(request)) => request,
            _ => unreachable!("handler table guarantees the matching request variant"),
        };
        cancel(ctx, request_id, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::test_ctx;

    #[tokio::test]
    async fn cancellation_without_redirect_expires_immediately() {
        let ctx = test_ctx(Role::CLIENT_CUSTOMER);
        ctx.session.set_identity(vec![1; 32], [3; 32]);
        ctx.repository
            .lock_hosting_table()
            .await
            .unwrap()
            .insert_or_revive([3; 32], vec![1; 32])
            .await
            .unwrap();

        let response = cancel(&ctx, 1, CancelAgreementRequest { redirect: None }).await;
        assert_eq!(response.status, Status::Ok);

        let row = ctx.repository.lookup_hosting(&[3; 32]).await.unwrap().unwrap();
        assert!(row.expiration_date.unwrap() <= SystemTime::now());
        assert!(row.redirect_target.is_none());
        assert!(row.profile_initialized);
    }

    #[tokio::test]
    async fn cancellation_with_redirect_grants_a_grace_window() {
        let ctx = test_ctx(Role::CLIENT_CUSTOMER);
        ctx.session.set_identity(vec![1; 32], [4; 32]);
        ctx.repository
            .lock_hosting_table()
            .await
            .unwrap()
            .insert_or_revive([4; 32], vec![1; 32])
            .await
            .unwrap();

        let response = cancel(&ctx, 1, CancelAgreementRequest { redirect: Some([8; 32]) }).await;
        assert_eq!(response.status, Status::Ok);

        let row = ctx.repository.lookup_hosting(&[4; 32]).await.unwrap().unwrap();
        assert!(row.expiration_date.unwrap() > SystemTime::now());
        assert_eq!(row.redirect_target, Some([8; 32]));
    }
}
