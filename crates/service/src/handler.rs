//! The static handler table: a map keyed by the inner request enum
//! discriminant, each entry holding a required role mask, an optional
//! required conversation status, and the handler itself. Paired with the
//! context object every handler is invoked with, built once at startup and
//! shared by every connection rather than threaded through call by call.

use std::sync::Arc;

use async_trait::async_trait;
use codec::message::{ConversationRequest, RequestBody, ResponseMessage, Role, SingleRequest};

use codec::message::RoleInfo;
use codec::crypto::Keypair;

use crate::image_store::ImageStore;
use crate::registry::SessionRegistry;
use crate::repository::Repository;
use crate::session::{ConversationStatus, Session};

/// Everything a handler needs beyond the triggering request body itself.
/// One instance is shared by every connection on a process; it is built
/// once at startup from the role server's configuration and collaborators.
#[derive(Clone)]
pub struct HandlerContext {
    pub session: Arc<Session>,
    pub registry: Arc<SessionRegistry>,
    pub repository: Arc<dyn Repository>,
    pub image_store: Arc<dyn ImageStore>,
    /// This node's own Ed25519 key material, used to sign the server side
    /// of the `StartConversation` handshake.
    pub node_keypair: Arc<Keypair>,
    /// The process's configured role endpoints, for `ListRoles`.
    pub role_endpoints: Arc<Vec<RoleInfo>>,
    pub max_hosted_identities: usize,
    pub max_profile_name_length_bytes: usize,
    pub max_profile_image_length_bytes: usize,
    pub max_extra_data_length_bytes: usize,
}

/// A handler's conversation-status gate. `None` means no gating at all,
/// used by single requests. `Some(status)` defers
/// to [`ConversationStatus::satisfies`], which already encodes the
/// exact-match rule for `NoConversation`/`ConversationStarted` and the
/// exact-or-`Authenticated` rule for `Verified`/`Authenticated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredStatus(pub Option<ConversationStatus>);

impl RequiredStatus {
    pub const NONE: RequiredStatus = RequiredStatus(None);

    pub fn of(status: ConversationStatus) -> Self {
        RequiredStatus(Some(status))
    }

    pub fn admits(self, current: ConversationStatus) -> bool {
        match self.0 {
            None => true,
            Some(required) => current.satisfies(required),
        }
    }
}

/// The inner request-type discriminant the handler table is keyed by.
/// Flattens `SingleRequest`/`ConversationRequest` into one enum so the
/// table has a single index type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Ping,
    ListRoles,
    IdentityLookup,
    ProfileLookup,
    StartConversation,
    VerifyIdentity,
    CheckIn,
    HomeNodeRequest,
    RegisterHosting,
    UpdateProfile,
    CancelHomeNodeAgreement,
    CancelHostingAgreement,
    ApplicationServiceAdd,
    ApplicationServiceRemove,
}

pub fn classify(body: &RequestBody) -> RequestKind {
    match body {
        RequestBody::Single { request, .. } => match request {
            SingleRequest::Ping(_) => RequestKind::Ping,
            SingleRequest::ListRoles => RequestKind::ListRoles,
            SingleRequest::IdentityLookup(_) => RequestKind::IdentityLookup,
            SingleRequest::ProfileLookup(_) => RequestKind::ProfileLookup,
        },
        RequestBody::Conversation(conversation) => match conversation {
            ConversationRequest::StartConversation(_) => RequestKind::StartConversation,
            ConversationRequest::VerifyIdentity(_) => RequestKind::VerifyIdentity,
            ConversationRequest::CheckIn(_) => RequestKind::CheckIn,
            ConversationRequest::HomeNodeRequest => RequestKind::HomeNodeRequest,
            ConversationRequest::RegisterHosting => RequestKind::RegisterHosting,
            ConversationRequest::UpdateProfile(_) => RequestKind::UpdateProfile,
            ConversationRequest::CancelHomeNodeAgreement(_) => RequestKind::CancelHomeNodeAgreement,
            ConversationRequest::CancelHostingAgreement(_) => RequestKind::CancelHostingAgreement,
            ConversationRequest::ApplicationServiceAdd(_) => RequestKind::ApplicationServiceAdd,
            ConversationRequest::ApplicationServiceRemove(_) => RequestKind::ApplicationServiceRemove,
        },
    }
}

/// One entry in the static handler table. Every handler MUST: declare its
/// role/status gate, produce a response of the matching variant, and never
/// mutate session state on the unhappy path.
#[async_trait]
pub trait Handler: Send + Sync {
    fn required_role(&self) -> Role;
    fn required_status(&self) -> RequiredStatus;
    async fn handle(&self, ctx: &HandlerContext, request_id: u32, body: RequestBody) -> ResponseMessage;
}

pub type HandlerTable = ahash::HashMap<RequestKind, Arc<dyn Handler>>;
