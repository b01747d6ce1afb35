//! Pure authentication library for LedgerID.
//!
//! This crate is intentionally IO-free apart from OS entropy:
//! - No filesystem operations
//! - No network calls
//! - No database interactions
//! - No logging
//!
//! State it does hold (outstanding challenges) lives behind a trait:
//! - [`challenge::ChallengeStore`] - single-use challenge issuance/consumption
//!
//! # Example
//!
//! ```ignore
//! use ledgerid_auth::challenge::{ChallengeStore, InMemoryChallengeStore};
//! use ledgerid_auth::assertion::verify_authentication;
//!
//! let store = InMemoryChallengeStore::default();
//! let challenge = store.issue("alice@example.com");
//! // ... client signs, then ...
//! let challenge = store.consume("alice@example.com")?;
//! verify_authentication("alice@example.com", &challenge, &public_key, &assertion)?;
//! ```

pub mod assertion;
pub mod challenge;
pub mod keys;
pub mod session;

pub use assertion::{
    AssertionError, AuthenticationAssertion, CreationOptions, RegistrationAssertion,
    RequestOptions, VerifiedCredential, verify_authentication, verify_registration,
};
pub use challenge::{Challenge, ChallengeError, ChallengeStore, InMemoryChallengeStore};
pub use keys::{KeyError, PrivateKey, PublicKey, Signature};
pub use session::{SessionClaims, SessionError, SessionIssuer, SessionToken};
