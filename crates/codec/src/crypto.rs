//! Ed25519 signing/verification and the identity id derivation.
//!
//! An identity id is `SHA-256(public_key)`; it is what peers use to address
//! each other on the network instead of the raw public key.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

pub const IDENTITY_ID_LEN: usize = 32;
pub const PUBLIC_KEY_MAX_LEN: usize = 128;
pub const CHALLENGE_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    InvalidPublicKeyLength,
    InvalidPublicKey,
    InvalidSignature,
}

impl std::error::Error for CryptoError {}

impl std::fmt::Display for CryptoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPublicKeyLength => write!(f, "public key exceeds maximum length"),
            Self::InvalidPublicKey => write!(f, "public key is not a valid Ed25519 point"),
            Self::InvalidSignature => write!(f, "signature verification failed"),
        }
    }
}

/// `identity_id = SHA-256(public_key)`.
///
/// # Test
///
/// ```
/// use profile_node_codec::crypto::identity_id;
///
/// let a = identity_id(b"key-a");
/// let b = identity_id(b"key-b");
/// assert_ne!(a, b);
/// assert_eq!(identity_id(b"key-a"), a);
/// ```
pub fn identity_id(public_key: &[u8]) -> [u8; IDENTITY_ID_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(public_key);
    hasher.finalize().into()
}

/// An Ed25519 keypair the server holds for a single session or for its own
/// node identity.
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.signing_key.sign(message).to_bytes()
    }
}

/// Verify a detached Ed25519 signature against a raw public key.
///
/// # Test
///
/// ```
/// use profile_node_codec::crypto::{Keypair, verify};
///
/// let keypair = Keypair::generate();
/// let signature = keypair.sign(b"challenge");
/// assert!(verify(&keypair.public_key_bytes(), b"challenge", &signature).is_ok());
/// assert!(verify(&keypair.public_key_bytes(), b"tampered", &signature).is_err());
/// ```
pub fn verify(
    public_key: &[u8],
    message: &[u8],
    signature: &[u8; SIGNATURE_LEN],
) -> Result<(), CryptoError> {
    if public_key.len() > PUBLIC_KEY_MAX_LEN {
        return Err(CryptoError::InvalidPublicKeyLength);
    }

    let key_bytes: [u8; 32] = public_key
        .try_into()
        .map_err(|_| CryptoError::InvalidPublicKey)?;

    let verifying_key =
        VerifyingKey::from_bytes(&key_bytes).map_err(|_| CryptoError::InvalidPublicKey)?;

    let signature = Signature::from_bytes(signature);

    verifying_key
        .verify(message, &signature)
        .map_err(|_| CryptoError::InvalidSignature)
}

/// 32 random challenge bytes, generated server-side at `StartConversation`.
pub fn generate_challenge() -> [u8; CHALLENGE_LEN] {
    use rand::RngCore;
    let mut challenge = [0u8; CHALLENGE_LEN];
    OsRng.fill_bytes(&mut challenge);
    challenge
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_roundtrip() {
        let keypair = Keypair::generate();
        let challenge = generate_challenge();
        let signature = keypair.sign(&challenge);

        verify(&keypair.public_key_bytes(), &challenge, &signature).unwrap();
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let signer = Keypair::generate();
        let other = Keypair::generate();
        let challenge = generate_challenge();
        let signature = signer.sign(&challenge);

        assert!(verify(&other.public_key_bytes(), &challenge, &signature).is_err());
    }
}
