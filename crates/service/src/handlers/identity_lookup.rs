//! `GetIdentityInformation` / `GetProfileInformation`: resolve a target
//! identity to either its hosted profile (fetching the current
//! image/thumbnail bytes and whether it is presently checked in) or a
//! `Moved` redirect.
//!
//! Both wire variants carry the same [`IdentityLookupRequest`] shape and
//! produce the same [`IdentityLookupResponse`] shape, differing only in
//! which name the caller used to ask for it, so both handlers share one
//! implementation — the same split `CancelHomeNodeAgreement`/
//! `CancelHostingAgreement` use in `cancel.rs`.

use async_trait::async_trait;
use codec::message::{
    IdentityLookupRequest, IdentityLookupResponse, RequestBody, ResponseMessage, ResponsePayload, Role, SingleRequest, Status,
};

use crate::handler::{Handler, HandlerContext, RequiredStatus};

async fn lookup(ctx: &HandlerContext, request_id: u32, identity_id: [u8; 32]) -> ResponseMessage {
    let hosting = match ctx.repository.lookup_hosting(&identity_id).await {
        Ok(Some(row)) => row,
        Ok(None) => return ResponseMessage::error(request_id, Status::ErrorNotFound),
        Err(_) => return ResponseMessage::error(request_id, Status::ErrorInternal),
    };

    if hosting.is_moved() {
        return ResponseMessage::ok(
            request_id,
            ResponsePayload::IdentityLookup(IdentityLookupResponse::Moved {
                target_home_node_id: hosting.redirect_target.expect("is_moved implies redirect_target"),
            }),
        );
    }

    let expired = hosting
        .expiration_date
        .is_some_and(|when| when <= std::time::SystemTime::now());
    if expired {
        return ResponseMessage::error(request_id, Status::ErrorNotFound);
    }

    // Hosted via HomeNodeRequest/RegisterHosting but never run through an
    // initializing UpdateProfile: there is no profile to hand back yet.
    if !hosting.profile_initialized {
        return ResponseMessage::error(request_id, Status::ErrorUninitialized);
    }

    let profile_image = match &hosting.profile_image_id {
        Some(id) => ctx.image_store.load_image(id).await.ok(),
        None => None,
    };
    let thumbnail = match &hosting.thumbnail_image_id {
        Some(id) => ctx.image_store.load_image(id).await.ok(),
        None => None,
    };

    ResponseMessage::ok(
        request_id,
        ResponsePayload::IdentityLookup(IdentityLookupResponse::Hosted {
            is_online: ctx.registry.checked_in_count_for(&identity_id) > 0,
            public_key: hosting.public_key,
            name: hosting.name,
            extra_data: hosting.extra_data,
            profile_image,
            thumbnail,
            application_services: hosting.application_services,
        }),
    )
}

pub struct IdentityLookup;

#[async_trait]
impl Handler for IdentityLookup {
    fn required_role(&self) -> Role {
        Role::CLIENT_CUSTOMER | Role::CLIENT_NON_CUSTOMER
    }

    fn required_status(&self) -> RequiredStatus {
        RequiredStatus::NONE
    }

    async fn handle(&self, ctx: &HandlerContext, request_id: u32, body: RequestBody) -> ResponseMessage {
        let IdentityLookupRequest { identity_id } = match body {
            RequestBody::Single {
                request: SingleRequest::IdentityLookup(request),
                ..
            } => request,
            _ => unreachable!("handler table guarantees the matching request variant"),
        };
        lookup(ctx, request_id, identity_id).await
    }
}

pub struct ProfileLookup;

#[async_trait]
impl Handler for ProfileLookup {
    fn required_role(&self) -> Role {
        Role::CLIENT_CUSTOMER | Role::CLIENT_NON_CUSTOMER
    }

    fn required_status(&self) -> RequiredStatus {
        RequiredStatus::NONE
    }

    async fn handle(&self, ctx: &HandlerContext, request_id: u32, body: RequestBody) -> ResponseMessage {
        let IdentityLookupRequest { identity_id } = match body {
            RequestBody::Single {
                request: SingleRequest::ProfileLookup(request),
                ..
            } => request,
            _ => unreachable!("handler table guarantees the matching request variant"),
        };
        lookup(ctx, request_id, identity_id).await
    }
}
