//! Signed, time-bounded session tokens.
//!
//! A session token is the proof of a completed authentication. It carries
//! the identity id, role, issuance time, and expiry, signed with the
//! process-wide session key. There is no revocation store: expiry is the
//! only termination mechanism, so TTLs are the security boundary.

use base64::prelude::*;

use ledgerid_core::{IdentityId, Role};
use uuid::Uuid;

use crate::keys::{PrivateKey, PublicKey, Signature};

/// Current wire format version.
const TOKEN_VERSION: u8 = 1;

/// Domain separation prefix for session signing.
///
/// Prevents cross-protocol attacks: a session signature is only valid in the
/// session context, never as an assertion or anything else.
const DOMAIN_PREFIX: &[u8] = b"LEDGERID-SESSION-v1:";

/// Encoded token length: version(1) + id(16) + role(1) + issued_at(8) +
/// expires_at(8) + signature(64).
const TOKEN_LEN: usize = 98;

/// TTL for authentication-originated sessions (24 hours).
pub const AUTHENTICATION_TTL_SECONDS: i64 = 24 * 60 * 60;

/// TTL for registration-originated sessions (7 days).
pub const REGISTRATION_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Errors from session token verification or decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum SessionError {
    /// The token is structurally invalid or its signature does not verify.
    #[error("invalid session token")]
    Invalid,

    /// The token verified but has expired.
    #[error("session expired")]
    Expired,
}

/// Verified claims extracted from a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    pub identity_id: IdentityId,
    pub role: Role,
    /// Unix seconds.
    pub issued_at: i64,
    /// Unix seconds.
    pub expires_at: i64,
}

/// A signed session token.
///
/// Wire format (v1, 98 bytes total):
/// - 1 byte: version (currently 1)
/// - 16 bytes: identity id (UUID bytes)
/// - 1 byte: role tag (0x00 user, 0x01 admin)
/// - 8 bytes: issued-at (Unix seconds, big-endian i64)
/// - 8 bytes: expires-at (Unix seconds, big-endian i64)
/// - 64 bytes: Ed25519 signature over
///   (DOMAIN_PREFIX || version || id || role || issued_at || expires_at)
#[derive(Clone)]
pub struct SessionToken {
    version: u8,
    identity_id: IdentityId,
    role: Role,
    issued_at: i64,
    expires_at: i64,
    signature: Signature,
}

fn role_tag(role: Role) -> u8 {
    match role {
        Role::User => 0x00,
        Role::Admin => 0x01,
    }
}

fn role_from_tag(tag: u8) -> Result<Role, SessionError> {
    match tag {
        0x00 => Ok(Role::User),
        0x01 => Ok(Role::Admin),
        _ => Err(SessionError::Invalid),
    }
}

impl SessionToken {
    /// Get the claims without verification.
    ///
    /// For display/debugging only; never trust these before [`verify`]
    /// succeeds.
    ///
    /// [`verify`]: SessionToken::verify
    #[must_use]
    pub fn unverified_claims(&self) -> SessionClaims {
        SessionClaims {
            identity_id: self.identity_id,
            role: self.role,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
        }
    }

    /// Verify signature and expiry against the issuer's public key.
    ///
    /// The signature is checked BEFORE expiration: checking expiry first
    /// would let an attacker probe expired tokens to learn whether they were
    /// ever legitimate.
    ///
    /// # Errors
    ///
    /// `Invalid` for version/signature problems, `Expired` when
    /// `now >= expires_at`.
    pub fn verify(&self, public_key: &PublicKey, now: i64) -> Result<SessionClaims, SessionError> {
        if self.version != TOKEN_VERSION {
            return Err(SessionError::Invalid);
        }

        let message = Self::build_signing_message(
            self.version,
            &self.identity_id,
            self.role,
            self.issued_at,
            self.expires_at,
        );
        if !public_key.verify(&message, &self.signature) {
            return Err(SessionError::Invalid);
        }

        if now >= self.expires_at {
            return Err(SessionError::Expired);
        }

        Ok(self.unverified_claims())
    }

    /// Format: DOMAIN_PREFIX || version || id || role || issued_at (BE) ||
    /// expires_at (BE).
    fn build_signing_message(
        version: u8,
        identity_id: &IdentityId,
        role: Role,
        issued_at: i64,
        expires_at: i64,
    ) -> Vec<u8> {
        let mut message = Vec::with_capacity(DOMAIN_PREFIX.len() + 1 + 16 + 1 + 8 + 8);
        message.extend_from_slice(DOMAIN_PREFIX);
        message.push(version);
        message.extend_from_slice(identity_id.as_uuid().as_bytes());
        message.push(role_tag(role));
        message.extend_from_slice(&issued_at.to_be_bytes());
        message.extend_from_slice(&expires_at.to_be_bytes());
        message
    }

    /// Encode for transport.
    #[must_use]
    pub fn to_base64(&self) -> String {
        let mut bytes = Vec::with_capacity(TOKEN_LEN);
        bytes.push(self.version);
        bytes.extend_from_slice(self.identity_id.as_uuid().as_bytes());
        bytes.push(role_tag(self.role));
        bytes.extend_from_slice(&self.issued_at.to_be_bytes());
        bytes.extend_from_slice(&self.expires_at.to_be_bytes());
        bytes.extend_from_slice(&self.signature.to_bytes());
        BASE64_STANDARD.encode(&bytes)
    }

    /// Decode from transport encoding.
    ///
    /// Decoding does not verify; call [`verify`](SessionToken::verify) on
    /// the result.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Invalid` for bad base64, wrong length, or an
    /// unsupported version.
    pub fn from_base64(encoded: &str) -> Result<Self, SessionError> {
        let bytes = BASE64_STANDARD
            .decode(encoded)
            .map_err(|_| SessionError::Invalid)?;

        if bytes.len() != TOKEN_LEN {
            return Err(SessionError::Invalid);
        }

        let version = bytes[0];
        if version != TOKEN_VERSION {
            return Err(SessionError::Invalid);
        }

        let id_bytes: [u8; 16] = bytes[1..17].try_into().map_err(|_| SessionError::Invalid)?;
        let identity_id = IdentityId(Uuid::from_bytes(id_bytes));

        let role = role_from_tag(bytes[17])?;

        let issued_at = i64::from_be_bytes(
            bytes[18..26].try_into().map_err(|_| SessionError::Invalid)?,
        );
        let expires_at = i64::from_be_bytes(
            bytes[26..34].try_into().map_err(|_| SessionError::Invalid)?,
        );

        let signature =
            Signature::from_bytes(&bytes[34..98]).map_err(|_| SessionError::Invalid)?;

        Ok(Self {
            version,
            identity_id,
            role,
            issued_at,
            expires_at,
            signature,
        })
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("identity_id", &self.identity_id)
            .field("role", &self.role)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Mints and verifies session tokens with one process-wide key.
///
/// Stateless beyond the signing key; verification needs nothing but the
/// token and the clock.
pub struct SessionIssuer {
    key: PrivateKey,
}

impl SessionIssuer {
    pub fn new(key: PrivateKey) -> Self {
        Self { key }
    }

    /// The verification key for this issuer.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }

    /// Mint a token for the identity with the given TTL in seconds.
    ///
    /// `ttl_seconds` is taken as-is; a zero or negative TTL produces a token
    /// that is already expired.
    ///
    /// # Panics
    ///
    /// Panics if the system clock is set before the Unix epoch. This
    /// indicates a severely misconfigured system and is not recoverable.
    #[must_use]
    pub fn issue(&self, identity_id: IdentityId, role: Role, ttl_seconds: i64) -> SessionToken {
        let issued_at = current_timestamp();
        let expires_at = issued_at.saturating_add(ttl_seconds);

        let message = SessionToken::build_signing_message(
            TOKEN_VERSION,
            &identity_id,
            role,
            issued_at,
            expires_at,
        );
        let signature = self.key.sign(&message);

        SessionToken {
            version: TOKEN_VERSION,
            identity_id,
            role,
            issued_at,
            expires_at,
            signature,
        }
    }

    /// Verify an encoded token against this issuer's key at the current time.
    ///
    /// # Errors
    ///
    /// `Invalid` or `Expired`, per [`SessionToken::verify`].
    pub fn verify_encoded(&self, encoded: &str) -> Result<SessionClaims, SessionError> {
        let token = SessionToken::from_base64(encoded)?;
        token.verify(&self.public_key(), current_timestamp())
    }
}

fn current_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time before Unix epoch")
        .as_secs() as i64
}
