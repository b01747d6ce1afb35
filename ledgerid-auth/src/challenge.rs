//! Single-use authentication challenges.
//!
//! A challenge proves freshness of an authentication exchange: the server
//! issues 32 bytes of entropy bound to one handle, the client signs over
//! them, and the server consumes the challenge exactly once when verifying.
//! Consumption removes the entry whether or not verification later succeeds,
//! so a captured assertion can never be replayed.

use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use dashmap::DashMap;
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;

/// Default time-to-live for an outstanding challenge.
pub const DEFAULT_CHALLENGE_TTL: Duration = Duration::from_secs(5 * 60);

/// Errors that can occur when consuming a challenge.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ChallengeError {
    /// No outstanding challenge for this handle.
    #[error("challenge not found")]
    NotFound,

    /// A challenge existed but outlived its TTL. It has been removed.
    #[error("challenge expired")]
    Expired,

    /// The encoded challenge could not be decoded.
    #[error("malformed challenge encoding")]
    Malformed,
}

/// A single-use random challenge value.
///
/// 32 bytes (256 bits) of OS entropy. Equality is constant-time and the
/// `Debug` output is redacted, since an outstanding challenge is a secret
/// until consumed.
#[derive(Clone, Eq)]
pub struct Challenge([u8; 32]);

impl PartialEq for Challenge {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl std::fmt::Debug for Challenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Challenge(..)")
    }
}

impl Challenge {
    /// Generate a new random challenge.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create a challenge from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw challenge bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encode for transport (URL-safe base64, no padding).
    #[must_use]
    pub fn to_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    /// Decode from the transport encoding.
    ///
    /// # Errors
    ///
    /// Returns `ChallengeError::Malformed` for bad base64 or wrong length.
    pub fn from_base64(encoded: &str) -> Result<Self, ChallengeError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| ChallengeError::Malformed)?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| ChallengeError::Malformed)?;
        Ok(Self(bytes))
    }
}

/// Keyed store of outstanding challenges.
///
/// # Thread Safety
///
/// Uses `&self` to allow concurrent access. Implementations must use
/// interior mutability (e.g. a concurrent map or conditional storage
/// operation).
///
/// # Atomicity
///
/// `consume` **MUST be an atomic read-and-delete**: two concurrent consumers
/// of the same handle must never both receive the challenge. Issuing
/// overwrites any prior unconsumed challenge, so at most one challenge is
/// outstanding per handle at any time.
pub trait ChallengeStore: Send + Sync {
    /// Issue a fresh challenge for the handle, replacing any prior one.
    fn issue(&self, handle: &str) -> Challenge;

    /// Atomically take the outstanding challenge for the handle.
    ///
    /// The entry is removed even when the result is `Expired`; expiry is
    /// only reported, never left behind.
    fn consume(&self, handle: &str) -> Result<Challenge, ChallengeError>;
}

struct IssuedChallenge {
    challenge: Challenge,
    issued_at: Instant,
}

/// In-process challenge store for single-instance deployments.
///
/// Multi-instance deployments substitute a shared-cache implementation of
/// [`ChallengeStore`]; nothing above this trait cares which one is in use.
///
/// # Concurrency
///
/// Backed by a sharded concurrent map; `consume` relies on the map's atomic
/// remove, so unrelated handles never contend on a shared lock.
pub struct InMemoryChallengeStore {
    entries: DashMap<String, IssuedChallenge>,
    ttl: Duration,
}

impl InMemoryChallengeStore {
    /// Create a store with the given challenge TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Number of outstanding challenges (expired entries included until
    /// swept or consumed).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove expired entries.
    ///
    /// Call periodically to reclaim memory. Not required for correctness;
    /// expired entries are rejected on consumption either way.
    pub fn sweep_expired(&self) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| entry.issued_at.elapsed() < ttl);
    }
}

impl Default for InMemoryChallengeStore {
    fn default() -> Self {
        Self::new(DEFAULT_CHALLENGE_TTL)
    }
}

impl ChallengeStore for InMemoryChallengeStore {
    fn issue(&self, handle: &str) -> Challenge {
        let challenge = Challenge::generate();
        self.entries.insert(
            handle.to_string(),
            IssuedChallenge {
                challenge: challenge.clone(),
                issued_at: Instant::now(),
            },
        );
        challenge
    }

    fn consume(&self, handle: &str) -> Result<Challenge, ChallengeError> {
        // DashMap::remove is the atomic read-and-delete; the entry is gone
        // before the expiry check runs, so even an expired challenge is
        // consumed exactly once.
        let (_, entry) = self.entries.remove(handle).ok_or(ChallengeError::NotFound)?;

        if entry.issued_at.elapsed() >= self.ttl {
            return Err(ChallengeError::Expired);
        }
        Ok(entry.challenge)
    }
}
