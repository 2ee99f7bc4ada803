//! Credential encoding
//!
//! Salted SHA-1 (`{SSHA}`) encoding of plaintext passwords into the
//! `userPassword` format understood by OpenLDAP and compatible servers.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use sha1::{Digest, Sha1};

/// Scheme tag prefixed to every encoded credential.
pub const SSHA_SCHEME: &str = "{SSHA}";

/// Number of salt characters.
pub const SALT_LENGTH: usize = 16;

/// Length of a SHA-1 digest in bytes.
const DIGEST_LENGTH: usize = 20;

/// One-way encoder for directory credentials.
///
/// There is no decode: verifying a password is the directory server's job.
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialCodec;

impl CredentialCodec {
    /// Encode a plaintext password as `{SSHA}base64(sha1(password || salt) || salt)`.
    ///
    /// A fresh 16-character alphanumeric salt is drawn from the OS CSPRNG on every call.
    pub fn encode(plaintext: &str) -> String {
        let salt: Vec<u8> = OsRng.sample_iter(&Alphanumeric).take(SALT_LENGTH).collect();
        Self::encode_with_salt(plaintext, &salt)
    }

    /// Encode with a caller-provided salt.
    pub fn encode_with_salt(plaintext: &str, salt: &[u8]) -> String {
        let mut hasher = Sha1::new();
        hasher.update(plaintext.as_bytes());
        hasher.update(salt);
        let digest = hasher.finalize();

        let mut payload = Vec::with_capacity(DIGEST_LENGTH + salt.len());
        payload.extend_from_slice(&digest);
        payload.extend_from_slice(salt);

        format!("{}{}", SSHA_SCHEME, STANDARD.encode(payload))
    }

    /// Extract the salt from an encoded credential, if it is well formed.
    pub fn salt_of(stored: &str) -> Option<Vec<u8>> {
        let encoded = stored.strip_prefix(SSHA_SCHEME)?;
        let payload = STANDARD.decode(encoded).ok()?;
        if payload.len() <= DIGEST_LENGTH {
            return None;
        }
        Some(payload[DIGEST_LENGTH..].to_vec())
    }
}
