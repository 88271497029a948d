//! Top-level `Message` shape: a `Request` or a `Response`, each carrying a
//! correlation id. A frame's body (see [`crate::frame`]) decodes to exactly
//! one `Message`.
//!
//! Requests are split into two categories: `Single` requests are stateless
//! and admitted regardless of conversation status; `Conversation` requests
//! drive the per-session state machine and are gated by it. Error responses
//! carry no payload — `ResponseMessage::payload` is `None` whenever `status`
//! is not [`Status::Ok`].

pub mod primitives;
pub mod payloads;
mod wire;

use bytes::Bytes;

use crate::Error;

pub use primitives::{Role, Status, Version};
pub use payloads::*;

use wire::{Reader, Writer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SingleRequest {
    Ping(PingRequest),
    ListRoles,
    IdentityLookup(IdentityLookupRequest),
    /// Same wire shape as `IdentityLookup`; kept as a distinct variant so
    /// `GetIdentityInformation` and `GetProfileInformation` remain two
    /// separately named operations on the wire, the same way
    /// `CancelHomeNodeAgreement`/`CancelHostingAgreement` share a body but
    /// not a tag.
    ProfileLookup(IdentityLookupRequest),
}

impl SingleRequest {
    fn write(&self, w: &mut Writer) {
        match self {
            Self::Ping(body) => {
                w.u8(0);
                body.write(w);
            }
            Self::ListRoles => w.u8(1),
            Self::IdentityLookup(body) => {
                w.u8(2);
                body.write(w);
            }
            Self::ProfileLookup(body) => {
                w.u8(3);
                body.write(w);
            }
        }
    }

    fn read(r: &mut Reader) -> Result<Self, Error> {
        Ok(match r.u8()? {
            0 => Self::Ping(PingRequest::read(r)?),
            1 => Self::ListRoles,
            2 => Self::IdentityLookup(IdentityLookupRequest::read(r)?),
            3 => Self::ProfileLookup(IdentityLookupRequest::read(r)?),
            tag => return Err(Error::UnknownTag(tag)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationRequest {
    StartConversation(StartConversationRequest),
    VerifyIdentity(ChallengeResponseRequest),
    CheckIn(ChallengeResponseRequest),
    HomeNodeRequest,
    RegisterHosting,
    UpdateProfile(UpdateProfileRequest),
    CancelHomeNodeAgreement(CancelAgreementRequest),
    CancelHostingAgreement(CancelAgreementRequest),
    ApplicationServiceAdd(ApplicationServiceAddRequest),
    ApplicationServiceRemove(ApplicationServiceRemoveRequest),
}

impl ConversationRequest {
    fn write(&self, w: &mut Writer) {
        match self {
            Self::StartConversation(body) => {
                w.u8(0);
                body.write(w);
            }
            Self::VerifyIdentity(body) => {
                w.u8(1);
                body.write(w);
            }
            Self::CheckIn(body) => {
                w.u8(2);
                body.write(w);
            }
            Self::HomeNodeRequest => w.u8(3),
            Self::RegisterHosting => w.u8(4),
            Self::UpdateProfile(body) => {
                w.u8(5);
                body.write(w);
            }
            Self::CancelHomeNodeAgreement(body) => {
                w.u8(6);
                body.write(w);
            }
            Self::CancelHostingAgreement(body) => {
                w.u8(7);
                body.write(w);
            }
            Self::ApplicationServiceAdd(body) => {
                w.u8(8);
                body.write(w);
            }
            Self::ApplicationServiceRemove(body) => {
                w.u8(9);
                body.write(w);
            }
        }
    }

    fn read(r: &mut Reader) -> Result<Self, Error> {
        Ok(match r.u8()? {
            0 => Self::StartConversation(StartConversationRequest::read(r)?),
            1 => Self::VerifyIdentity(ChallengeResponseRequest::read(r)?),
            2 => Self::CheckIn(ChallengeResponseRequest::read(r)?),
            3 => Self::HomeNodeRequest,
            4 => Self::RegisterHosting,
            5 => Self::UpdateProfile(UpdateProfileRequest::read(r)?),
            6 => Self::CancelHomeNodeAgreement(CancelAgreementRequest::read(r)?),
            7 => Self::CancelHostingAgreement(CancelAgreementRequest::read(r)?),
            8 => Self::ApplicationServiceAdd(ApplicationServiceAddRequest::read(r)?),
            9 => Self::ApplicationServiceRemove(ApplicationServiceRemoveRequest::read(r)?),
            tag => return Err(Error::UnknownTag(tag)),
        })
    }
}

/// A single request carries its own protocol version tag; the version
/// check on inbound dispatch applies only to this variant — conversation
/// requests are version-locked by the `StartConversation` handshake
/// instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Single { version: Version, request: SingleRequest },
    Conversation(ConversationRequest),
}

impl RequestBody {
    fn write(&self, w: &mut Writer) {
        match self {
            Self::Single { version, request } => {
                w.u8(0);
                version.write(w);
                request.write(w);
            }
            Self::Conversation(body) => {
                w.u8(1);
                body.write(w);
            }
        }
    }

    fn read(r: &mut Reader) -> Result<Self, Error> {
        Ok(match r.u8()? {
            0 => Self::Single {
                version: Version::read(r)?,
                request: SingleRequest::read(r)?,
            },
            1 => Self::Conversation(ConversationRequest::read(r)?),
            tag => return Err(Error::UnknownTag(tag)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMessage {
    pub id: u32,
    pub body: RequestBody,
}

impl RequestMessage {
    fn write(&self, w: &mut Writer) {
        w.u32(self.id);
        self.body.write(w);
    }

    fn read(r: &mut Reader) -> Result<Self, Error> {
        Ok(Self {
            id: r.u32()?,
            body: RequestBody::read(r)?,
        })
    }
}

/// Payload carried by a successful response. Absent (`ResponseMessage::payload
/// == None`) on every error response — error responses bypass the
/// inner-type match entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePayload {
    Ping(PingResponse),
    ListRoles(ListRolesResponse),
    IdentityLookup(IdentityLookupResponse),
    StartConversation(StartConversationResponse),
}

impl ResponsePayload {
    fn write(&self, w: &mut Writer) {
        match self {
            Self::Ping(body) => {
                w.u8(0);
                body.write(w);
            }
            Self::ListRoles(body) => {
                w.u8(1);
                body.write(w);
            }
            Self::IdentityLookup(body) => {
                w.u8(2);
                body.write(w);
            }
            Self::StartConversation(body) => {
                w.u8(3);
                body.write(w);
            }
        }
    }

    fn read(r: &mut Reader) -> Result<Self, Error> {
        Ok(match r.u8()? {
            0 => Self::Ping(PingResponse::read(r)?),
            1 => Self::ListRoles(ListRolesResponse::read(r)?),
            2 => Self::IdentityLookup(IdentityLookupResponse::read(r)?),
            3 => Self::StartConversation(StartConversationResponse::read(r)?),
            tag => return Err(Error::UnknownTag(tag)),
        })
    }
}

/// Id used on the final protocol-violation envelope when no originating
/// request id is known (bad leading byte, oversize frame, unmatched
/// response).
pub const PROTOCOL_VIOLATION_ID: u32 = 0x0BAD_C0DE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMessage {
    pub id: u32,
    pub status: Status,
    pub details: Option<String>,
    pub payload: Option<ResponsePayload>,
}

impl ResponseMessage {
    pub fn ok(id: u32, payload: ResponsePayload) -> Self {
        Self {
            id,
            status: Status::Ok,
            details: None,
            payload: Some(payload),
        }
    }

    pub fn error(id: u32, status: Status) -> Self {
        debug_assert!(!status.is_ok(), "use ResponseMessage::ok for success");
        Self {
            id,
            status,
            details: None,
            payload: None,
        }
    }

    pub fn error_with_details(id: u32, status: Status, details: impl Into<String>) -> Self {
        let mut response = Self::error(id, status);
        response.details = Some(details.into());
        response
    }

    /// The response sent for a framing-level protocol violation: no prior
    /// request id is known, so [`PROTOCOL_VIOLATION_ID`] is used.
    pub fn protocol_violation() -> Self {
        Self::error(PROTOCOL_VIOLATION_ID, Status::ErrorProtocolViolation)
    }

    fn write(&self, w: &mut Writer) {
        w.u32(self.id);
        self.status.write(w);
        w.option(&self.details, |w, v| w.string(v));
        w.option(&self.payload, |w, p| p.write(w));
    }

    fn read(r: &mut Reader) -> Result<Self, Error> {
        Ok(Self {
            id: r.u32()?,
            status: Status::read(r)?,
            details: r.option(Reader::string)?,
            payload: r.option(ResponsePayload::read)?,
        })
    }
}

/// The decoded body of one [`crate::frame`] frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Request(RequestMessage),
    Response(ResponseMessage),
}

impl Message {
    /// Encode this message to a frame body (not yet length-prefixed; pass the
    /// result to [`crate::frame::write_frame`]).
    ///
    /// # Test
    ///
    /// ```
    /// use profile_node_codec::message::{Message, RequestMessage, RequestBody, SingleRequest, Version};
    ///
    /// let msg = Message::Request(RequestMessage {
    ///     id: 7,
    ///     body: RequestBody::Single { version: Version::CURRENT, request: SingleRequest::ListRoles },
    /// });
    /// let body = msg.encode();
    /// assert_eq!(Message::decode(&body).unwrap(), msg);
    /// ```
    pub fn encode(&self) -> Bytes {
        let mut w = Writer::new();
        match self {
            Self::Request(req) => {
                w.u8(0);
                req.write(&mut w);
            }
            Self::Response(resp) => {
                w.u8(1);
                resp.write(&mut w);
            }
        }
        w.finish().freeze()
    }

    pub fn decode(body: &[u8]) -> Result<Self, Error> {
        let mut r = Reader::new(body);
        Ok(match r.u8()? {
            0 => Self::Request(RequestMessage::read(&mut r)?),
            1 => Self::Response(ResponseMessage::read(&mut r)?),
            tag => return Err(Error::UnknownTag(tag)),
        })
    }
}
