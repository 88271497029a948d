//! Per-request-type payload bodies.

use crate::Error;

use super::primitives::{Role, Version};
use super::wire::{Reader, Writer};

pub const MAX_APPLICATION_SERVICE_NAME_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingRequest {
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingResponse {
    pub payload: Vec<u8>,
    pub clock_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleInfo {
    pub role: super::primitives::Role,
    pub port: u16,
    pub tcp: bool,
    pub tls: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRolesResponse {
    pub roles: Vec<RoleInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartConversationRequest {
    pub supported_versions: Vec<Version>,
    pub public_key: Vec<u8>,
    pub client_challenge: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartConversationResponse {
    pub version: Version,
    pub public_key: Vec<u8>,
    pub challenge: [u8; 32],
    pub client_challenge: [u8; 32],
    pub signature: [u8; 64],
}

/// Shared shape of `VerifyIdentity` and `CheckIn`: a challenge echo plus a
/// signature over it. Kept as one struct since the two handlers validate it
/// identically; they remain distinct request variants so the admission
/// table can gate them by different roles/statuses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeResponseRequest {
    pub challenge: [u8; 32],
    pub signature: [u8; 64],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateProfileFlags {
    pub set_version: bool,
    pub set_name: bool,
    pub set_location: bool,
    pub set_image: bool,
    pub set_extra_data: bool,
}

impl UpdateProfileFlags {
    pub fn any(self) -> bool {
        self.set_version || self.set_name || self.set_location || self.set_image || self.set_extra_data
    }

    pub fn is_initialization(self) -> bool {
        self.set_version && self.set_name && self.set_location
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateProfileRequest {
    pub flags: UpdateProfileFlags,
    pub version: Option<Version>,
    pub name: Option<String>,
    pub location: Option<(i32, i32)>,
    pub image: Option<Vec<u8>>,
    pub extra_data: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelAgreementRequest {
    pub redirect: Option<[u8; 32]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationServiceAddRequest {
    pub names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationServiceRemoveRequest {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityLookupRequest {
    pub identity_id: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityLookupResponse {
    Hosted {
        is_online: bool,
        public_key: Vec<u8>,
        name: String,
        extra_data: String,
        profile_image: Option<Vec<u8>>,
        thumbnail: Option<Vec<u8>>,
        application_services: Vec<String>,
    },
    Moved {
        target_home_node_id: [u8; 32],
    },
}

impl PingRequest {
    pub(crate) fn write(&self, w: &mut Writer) {
        w.blob(&self.payload);
    }

    pub(crate) fn read(r: &mut Reader) -> Result<Self, Error> {
        Ok(Self { payload: r.blob()? })
    }
}

impl PingResponse {
    pub(crate) fn write(&self, w: &mut Writer) {
        w.blob(&self.payload);
        w.u64(self.clock_ms);
    }

    pub(crate) fn read(r: &mut Reader) -> Result<Self, Error> {
        Ok(Self {
            payload: r.blob()?,
            clock_ms: r.u64()?,
        })
    }
}

impl RoleInfo {
    fn write(&self, w: &mut Writer) {
        self.role.write(w);
        w.u16(self.port);
        w.bool(self.tcp);
        w.bool(self.tls);
    }

    fn read(r: &mut Reader) -> Result<Self, Error> {
        Ok(Self {
            role: Role::read(r)?,
            port: r.u16()?,
            tcp: r.bool()?,
            tls: r.bool()?,
        })
    }
}

impl ListRolesResponse {
    pub(crate) fn write(&self, w: &mut Writer) {
        w.u32(self.roles.len() as u32);
        for role in &self.roles {
            role.write(w);
        }
    }

    pub(crate) fn read(r: &mut Reader) -> Result<Self, Error> {
        let count = r.u32()? as usize;
        let mut roles = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            roles.push(RoleInfo::read(r)?);
        }
        Ok(Self { roles })
    }
}

impl StartConversationRequest {
    pub(crate) fn write(&self, w: &mut Writer) {
        w.u32(self.supported_versions.len() as u32);
        for version in &self.supported_versions {
            version.write(w);
        }
        w.blob(&self.public_key);
        w.bytes(&self.client_challenge);
    }

    pub(crate) fn read(r: &mut Reader) -> Result<Self, Error> {
        let count = r.u32()? as usize;
        let mut supported_versions = Vec::with_capacity(count.min(256));
        for _ in 0..count {
            supported_versions.push(Version::read(r)?);
        }

        Ok(Self {
            supported_versions,
            public_key: r.blob()?,
            client_challenge: r.array::<32>()?,
        })
    }
}

impl StartConversationResponse {
    pub(crate) fn write(&self, w: &mut Writer) {
        self.version.write(w);
        w.blob(&self.public_key);
        w.bytes(&self.challenge);
        w.bytes(&self.client_challenge);
        w.bytes(&self.signature);
    }

    pub(crate) fn read(r: &mut Reader) -> Result<Self, Error> {
        Ok(Self {
            version: Version::read(r)?,
            public_key: r.blob()?,
            challenge: r.array::<32>()?,
            client_challenge: r.array::<32>()?,
            signature: r.array::<64>()?,
        })
    }
}

impl ChallengeResponseRequest {
    pub(crate) fn write(&self, w: &mut Writer) {
        w.bytes(&self.challenge);
        w.bytes(&self.signature);
    }

    pub(crate) fn read(r: &mut Reader) -> Result<Self, Error> {
        Ok(Self {
            challenge: r.array::<32>()?,
            signature: r.array::<64>()?,
        })
    }
}

impl UpdateProfileFlags {
    pub(crate) fn write(&self, w: &mut Writer) {
        let mut bits = 0u8;
        bits |= (self.set_version as u8) << 0;
        bits |= (self.set_name as u8) << 1;
        bits |= (self.set_location as u8) << 2;
        bits |= (self.set_image as u8) << 3;
        bits |= (self.set_extra_data as u8) << 4;
        w.u8(bits);
    }

    pub(crate) fn read(r: &mut Reader) -> Result<Self, Error> {
        let bits = r.u8()?;
        Ok(Self {
            set_version: bits & 1 != 0,
            set_name: bits & 2 != 0,
            set_location: bits & 4 != 0,
            set_image: bits & 8 != 0,
            set_extra_data: bits & 16 != 0,
        })
    }
}

impl UpdateProfileRequest {
    pub(crate) fn write(&self, w: &mut Writer) {
        self.flags.write(w);
        w.option(&self.version, |w, v| v.write(w));
        w.option(&self.name, |w, v| w.string(v));
        w.option(&self.location, |w, v| {
            w.i32(v.0);
            w.i32(v.1);
        });
        w.option(&self.image, |w, v| w.blob(v));
        w.option(&self.extra_data, |w, v| w.string(v));
    }

    pub(crate) fn read(r: &mut Reader) -> Result<Self, Error> {
        Ok(Self {
            flags: UpdateProfileFlags::read(r)?,
            version: r.option(Version::read)?,
            name: r.option(Reader::string)?,
            location: r.option(|r| Ok((r.i32()?, r.i32()?)))?,
            image: r.option(Reader::blob)?,
            extra_data: r.option(Reader::string)?,
        })
    }
}

impl CancelAgreementRequest {
    pub(crate) fn write(&self, w: &mut Writer) {
        w.option(&self.redirect, |w, v| w.bytes(v));
    }

    pub(crate) fn read(r: &mut Reader) -> Result<Self, Error> {
        Ok(Self {
            redirect: r.option(|r| r.array::<32>())?,
        })
    }
}

impl ApplicationServiceAddRequest {
    pub(crate) fn write(&self, w: &mut Writer) {
        w.u32(self.names.len() as u32);
        for name in &self.names {
            w.string(name);
        }
    }

    pub(crate) fn read(r: &mut Reader) -> Result<Self, Error> {
        let count = r.u32()? as usize;
        let mut names = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            names.push(r.string()?);
        }
        Ok(Self { names })
    }
}

impl ApplicationServiceRemoveRequest {
    pub(crate) fn write(&self, w: &mut Writer) {
        w.string(&self.name);
    }

    pub(crate) fn read(r: &mut Reader) -> Result<Self, Error> {
        Ok(Self { name: r.string()? })
    }
}

impl IdentityLookupRequest {
    pub(crate) fn write(&self, w: &mut Writer) {
        w.bytes(&self.identity_id);
    }

    pub(crate) fn read(r: &mut Reader) -> Result<Self, Error> {
        Ok(Self {
            identity_id: r.array::<32>()?,
        })
    }
}

impl IdentityLookupResponse {
    pub(crate) fn write(&self, w: &mut Writer) {
        match self {
            Self::Hosted {
                is_online,
                public_key,
                name,
                extra_data,
                profile_image,
                thumbnail,
                application_services,
            } => {
                w.u8(0);
                w.bool(*is_online);
                w.blob(public_key);
                w.string(name);
                w.string(extra_data);
                w.option(profile_image, |w, v| w.blob(v));
                w.option(thumbnail, |w, v| w.blob(v));
                w.u32(application_services.len() as u32);
                for name in application_services {
                    w.string(name);
                }
            }
            Self::Moved { target_home_node_id } => {
                w.u8(1);
                w.bytes(target_home_node_id);
            }
        }
    }

    pub(crate) fn read(r: &mut Reader) -> Result<Self, Error> {
        Ok(match r.u8()? {
            0 => {
                let is_online = r.bool()?;
                let public_key = r.blob()?;
                let name = r.string()?;
                let extra_data = r.string()?;
                let profile_image = r.option(Reader::blob)?;
                let thumbnail = r.option(Reader::blob)?;
                let count = r.u32()? as usize;
                let mut application_services = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    application_services.push(r.string()?);
                }

                Self::Hosted {
                    is_online,
                    public_key,
                    name,
                    extra_data,
                    profile_image,
                    thumbnail,
                    application_services,
                }
            }
            1 => Self::Moved {
                target_home_node_id: r.array::<32>()?,
            },
            tag => return Err(Error::UnknownTag(tag)),
        })
    }
}
