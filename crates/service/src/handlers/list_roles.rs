//! `ListRoles`: enumerate configured role endpoints with `(role, port, tcp,
//! tls)`. `Primary`-only: only the server-to-server control listener
//! exposes topology.

use async_trait::async_trait;
use codec::message::{ListRolesResponse, RequestBody, ResponseMessage, ResponsePayload, Role, SingleRequest};

use crate::handler::{Handler, HandlerContext, RequiredStatus};

pub struct ListRoles;

#[async_trait]
impl Handler for ListRoles {
    fn required_role(&self) -> Role {
        Role::PRIMARY
    }

    fn required_status(&self) -> RequiredStatus {
        RequiredStatus::NONE
    }

    async fn handle(&self, ctx: &HandlerContext, request_id: u32, body: RequestBody) -> ResponseMessage {
        debug_assert!(matches!(
            body,
            RequestBody::Single { request: SingleRequest::ListRoles, .. }
        ));

        ResponseMessage::ok(
            request_id,
            ResponsePayload::ListRoles(ListRolesResponse {
                roles: (*ctx.role_endpoints).clone(),
            }),
        )
    }
}
