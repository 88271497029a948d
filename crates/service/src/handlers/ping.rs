//! `Ping`: echo the payload and the server clock (ms-Unix). The only
//! handler admitted on every role.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use codec::message::{PingRequest, PingResponse, RequestBody, ResponseMessage, ResponsePayload, Role, SingleRequest};

use crate::handler::{Handler, HandlerContext, RequiredStatus};

pub struct Ping;

#[async_trait]
impl Handler for Ping {
    fn required_role(&self) -> Role {
        Role::PRIMARY | Role::SERVER_NEIGHBOR | Role::CLIENT_CUSTOMER | Role::CLIENT_NON_CUSTOMER | Role::CLIENT_APP_SERVICE
    }

    fn required_status(&self) -> RequiredStatus {
        RequiredStatus::NONE
    }

    async fn handle(&self, _ctx: &HandlerContext, request_id: u32, body: RequestBody) -> ResponseMessage {
        let payload = match body {
            RequestBody::Single {
                request: SingleRequest::Ping(PingRequest { payload }),
                ..
            } => payload,
            _ => unreachable!("handler table guarantees the matching request variant"),
        };

        let clock_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        ResponseMessage::ok(request_id, ResponsePayload::Ping(PingResponse { payload, clock_ms }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::test_ctx;

    #[tokio::test]
    async fn echoes_payload_and_sets_a_clock() {
        let ctx = test_ctx(Role::PRIMARY);
        let body = RequestBody::Single {
            version: codec::message::Version::CURRENT,
            request: SingleRequest::Ping(PingRequest { payload: vec![1, 2, 3] }),
        };

        let response = Ping.handle(&ctx, 7, body).await;
        match response.payload {
            Some(ResponsePayload::Ping(PingResponse { payload, clock_ms })) => {
                assert_eq!(payload, vec![1, 2, 3]);
                assert!(clock_ms > 0);
            }
            _ => panic!("expected a ping payload"),
        }
    }
}
