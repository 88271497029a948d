//! Small wire-level value types shared by requests and responses: role
//! flags, response status codes, and the protocol version tuple.

use std::fmt;

use crate::Error;

use super::wire::{Reader, Writer};

/// Role bit flags. A listener is tagged with one or more of these; a
/// request is admitted only if the listener's roles intersect the
/// handler's `required_role` mask.
///
/// Legacy `NodeNeighbor`/`NodeColleague` flags from earlier protocol
/// generations are kept as aliases of `ServerNeighbor` so stored
/// configuration using the old names still parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Role(u16);

impl Role {
    pub const NONE: Role = Role(0);
    pub const PRIMARY: Role = Role(1 << 0);
    pub const SERVER_NEIGHBOR: Role = Role(1 << 1);
    pub const CLIENT_CUSTOMER: Role = Role(1 << 2);
    pub const CLIENT_NON_CUSTOMER: Role = Role(1 << 3);
    pub const CLIENT_APP_SERVICE: Role = Role(1 << 4);

    /// Legacy alias, retained for on-disk config compatibility.
    pub const NODE_NEIGHBOR: Role = Role::SERVER_NEIGHBOR;
    /// Legacy alias, retained for on-disk config compatibility.
    pub const NODE_COLLEAGUE: Role = Role::SERVER_NEIGHBOR;

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn from_bits(bits: u16) -> Self {
        Role(bits)
    }

    pub fn contains_any(self, mask: Role) -> bool {
        self.0 & mask.0 != 0
    }

    pub fn is_customer(self) -> bool {
        self.contains_any(Role::CLIENT_CUSTOMER)
    }

    pub(crate) fn write(self, w: &mut Writer) {
        w.u16(self.0);
    }

    pub(crate) fn read(r: &mut Reader) -> Result<Self, Error> {
        Ok(Role(r.u16()?))
    }
}

impl std::ops::BitOr for Role {
    type Output = Role;

    fn bitor(self, rhs: Role) -> Role {
        Role(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for Role {
    fn bitor_assign(&mut self, rhs: Role) {
        self.0 |= rhs.0;
    }
}

/// Response status codes, carried on every `Response`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0,
    ErrorProtocolViolation = 1,
    ErrorUnsupported = 2,
    ErrorBadRole = 3,
    ErrorBadConversationStatus = 4,
    ErrorUnauthorized = 5,
    ErrorBanned = 6,
    ErrorBusy = 7,
    ErrorInternal = 8,
    ErrorQuotaExceeded = 9,
    ErrorInvalidSignature = 10,
    ErrorNotFound = 11,
    ErrorInvalidValue = 12,
    ErrorAlreadyExists = 13,
    ErrorNotAvailable = 14,
    ErrorRejected = 15,
    ErrorUninitialized = 16,
}

impl Status {
    pub fn is_ok(self) -> bool {
        matches!(self, Status::Ok)
    }

    pub(crate) fn write(self, w: &mut Writer) {
        w.u8(self as u8);
    }

    pub(crate) fn read(r: &mut Reader) -> Result<Self, Error> {
        Status::from_u8(r.u8()?).ok_or(Error::UnknownTag(0))
    }

    pub fn from_u8(value: u8) -> Option<Status> {
        use Status::*;
        Some(match value {
            0 => Ok,
            1 => ErrorProtocolViolation,
            2 => ErrorUnsupported,
            3 => ErrorBadRole,
            4 => ErrorBadConversationStatus,
            5 => ErrorUnauthorized,
            6 => ErrorBanned,
            7 => ErrorBusy,
            8 => ErrorInternal,
            9 => ErrorQuotaExceeded,
            10 => ErrorInvalidSignature,
            11 => ErrorNotFound,
            12 => ErrorInvalidValue,
            13 => ErrorAlreadyExists,
            14 => ErrorNotAvailable,
            15 => ErrorRejected,
            16 => ErrorUninitialized,
            _ => return None,
        })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// `major.minor.patch`. Only `1.0.0` is valid at present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl Version {
    pub const CURRENT: Version = Version {
        major: 1,
        minor: 0,
        patch: 0,
    };

    pub const SUPPORTED: &'static [Version] = &[Version::CURRENT];

    pub fn is_supported(self) -> bool {
        Self::SUPPORTED.contains(&self)
    }

    pub fn to_bytes(self) -> [u8; 3] {
        [self.major, self.minor, self.patch]
    }

    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        Version {
            major: bytes[0],
            minor: bytes[1],
            patch: bytes[2],
        }
    }

    pub(crate) fn write(self, w: &mut Writer) {
        w.bytes(&self.to_bytes());
    }

    pub(crate) fn read(r: &mut Reader) -> Result<Self, Error> {
        Ok(Version::from_bytes(r.array::<3>()?))
    }

    /// Select the first client-offered version, in the client's stated
    /// preference order, that the server also supports.
    ///
    /// # Test
    ///
    /// ```
    /// use profile_node_codec::message::primitives::Version;
    ///
    /// let v1 = Version { major: 1, minor: 0, patch: 0 };
    /// let v2 = Version { major: 2, minor: 0, patch: 0 };
    ///
    /// assert_eq!(Version::negotiate(&[v2, v1]), Some(v1));
    /// assert_eq!(Version::negotiate(&[v2]), None);
    /// ```
    pub fn negotiate(client_offered: &[Version]) -> Option<Version> {
        client_offered
            .iter()
            .copied()
            .find(|v| v.is_supported())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
