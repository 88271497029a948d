//! `ApplicationServiceAdd` / `ApplicationServiceRemove`: application
//! services are advertised names a `ClientAppService` session registers
//! against its own session, capped at `MAX_APPLICATION_SERVICES`. Unlike
//! the hosting handlers, this state lives on the `Session`, not the
//! repository — a session's advertised services die with the connection.

use async_trait::async_trait;
use codec::message::{
    ApplicationServiceAddRequest, ApplicationServiceRemoveRequest, ConversationRequest, RequestBody, ResponseMessage, Role,
    Status, MAX_APPLICATION_SERVICE_NAME_LEN,
};

use crate::handler::{Handler, HandlerContext, RequiredStatus};
use crate::session::ConversationStatus;

fn ok_no_payload(request_id: u32) -> ResponseMessage {
    ResponseMessage {
        id: request_id,
        status: Status::Ok,
        details: None,
        payload: None,
    }
}

pub struct ApplicationServiceAdd;

#[async_trait]
impl Handler for ApplicationServiceAdd {
    fn required_role(&self) -> Role {
        Role::CLIENT_APP_SERVICE
    }

    fn required_status(&self) -> RequiredStatus {
        RequiredStatus::of(ConversationStatus::Authenticated)
    }

    async fn handle(&self, ctx: &HandlerContext, request_id: u32, body: RequestBody) -> ResponseMessage {
        let ApplicationServiceAddRequest { names } = match body {
            RequestBody::Conversation(ConversationRequest::ApplicationServiceAdd(request)) => request,
            _ => unreachable!("handler table guarantees the matching request variant"),
        };

        if names.iter().any(|name| name.is_empty() || name.len() > MAX_APPLICATION_SERVICE_NAME_LEN) {
            return ResponseMessage::error_with_details(request_id, Status::ErrorInvalidValue, "names");
        }

        if !ctx.session.add_application_services(&names) {
            return ResponseMessage::error(request_id, Status::ErrorQuotaExceeded);
        }

        ok_no_payload(request_id)
    }
}

pub struct ApplicationServiceRemove;

#[async_trait]
impl Handler for ApplicationServiceRemove {
    fn required_role(&self) -> Role {
        Role::CLIENT_APP_SERVICE
    }

    fn required_status(&self) -> RequiredStatus {
        RequiredStatus::of(ConversationStatus::Authenticated)
    }

    async fn handle(&self, ctx: &HandlerContext, request_id: u32, body: RequestBody) -> ResponseMessage {
        let ApplicationServiceRemoveRequest { name } = match body {
            RequestBody::Conversation(ConversationRequest::ApplicationServiceRemove(request)) => request,
            _ => unreachable!("handler table guarantees the matching request variant"),
        };

        if !ctx.session.remove_application_service(&name) {
            return ResponseMessage::error(request_id, Status::ErrorNotFound);
        }

        ok_no_payload(request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::test_ctx;

    #[tokio::test]
    async fn add_then_remove_round_trips() {
        let ctx = test_ctx(Role::CLIENT_APP_SERVICE);

        let add_body = RequestBody::Conversation(ConversationRequest::ApplicationServiceAdd(ApplicationServiceAddRequest {
            names: vec!["mail".into(), "chat".into()],
        }));
        let response = ApplicationServiceAdd.handle(&ctx, 1, add_body).await;
        assert_eq!(response.status, Status::Ok);
        assert_eq!(ctx.session.application_services(), vec!["mail".to_string(), "chat".to_string()]);

        let remove_body = RequestBody::Conversation(ConversationRequest::ApplicationServiceRemove(ApplicationServiceRemoveRequest {
            name: "mail".into(),
        }));
        let response = ApplicationServiceRemove.handle(&ctx, 2, remove_body).await;
        assert_eq!(response.status, Status::Ok);
        assert_eq!(ctx.session.application_services(), vec!["chat".to_string()]);
    }

    #[tokio::test]
    async fn removing_an_unknown_service_is_not_found() {
        let ctx = test_ctx(Role::CLIENT_APP_SERVICE);
        let body = RequestBody::Conversation(ConversationRequest::ApplicationServiceRemove(ApplicationServiceRemoveRequest {
            name: "ghost".into(),
        }));
        let response = ApplicationServiceRemove.handle(&ctx, 1, body).await;
        assert_eq!(response.status, Status::ErrorNotFound);
    }

    #[tokio::test]
    async fn rejects_an_oversized_service_name() {
        let ctx = test_ctx(Role::CLIENT_APP_SERVICE);
        let body = RequestBody::Conversation(ConversationRequest::ApplicationServiceAdd(ApplicationServiceAddRequest {
            names: vec!["x".repeat(MAX_APPLICATION_SERVICE_NAME_LEN + 1)],
        }));
        let response = ApplicationServiceAdd.handle(&ctx, 1, body).await;
        assert_eq!(response.status, Status::ErrorInvalidValue);
    }
}
