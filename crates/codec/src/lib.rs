//! Wire framing and message codec for the profile node protocol.
//!
//! A frame is `[0x0D][u32 LE body_length][body]` (see [`frame`]). A frame's
//! body decodes to one [`message::Message`] — a `Request` or a `Response`
//! carrying an id, a status and, for requests, a version or a conversation
//! signature. [`crypto`] provides the Ed25519 signing/verification and the
//! `identity_id = SHA-256(public_key)` derivation used by the conversation
//! handshake.

pub mod crypto;
pub mod frame;
pub mod message;

use std::{array::TryFromSliceError, fmt, string::FromUtf8Error};

#[derive(Debug)]
pub enum Error {
    UnexpectedEof,
    UnknownTag(u8),
    TooLong,
    Utf8Error(FromUtf8Error),
    TryFromSliceError(TryFromSliceError),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<FromUtf8Error> for Error {
    fn from(value: FromUtf8Error) -> Self {
        Self::Utf8Error(value)
    }
}

impl From<TryFromSliceError> for Error {
    fn from(value: TryFromSliceError) -> Self {
        Self::TryFromSliceError(value)
    }
}
