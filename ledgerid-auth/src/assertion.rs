//! Assertion verification for registration and login.
//!
//! The client proves possession of an authenticator's private key by signing
//! a canonical message binding the handle, the issued challenge, and the
//! credential being exercised. The server rebuilds the same message and
//! verifies the signature before any state changes.
//!
//! Domain-separated prefixes keep a registration signature from ever
//! validating as a login signature (and vice versa), and keep both out of
//! any other protocol context.

use serde::{Deserialize, Serialize};

use crate::challenge::Challenge;
use crate::keys::{PublicKey, Signature};

/// Maximum allowed handle length in a canonical message (fits in u16).
const MAX_HANDLE_LEN: usize = 255;

/// Maximum allowed credential id length in a canonical message (fits in u16).
const MAX_CREDENTIAL_ID_LEN: usize = 1024;

/// Domain separation prefix for registration assertions.
const REGISTER_DOMAIN: &[u8] = b"LEDGERID-REGISTER-v1:";

/// Domain separation prefix for authentication assertions.
const LOGIN_DOMAIN: &[u8] = b"LEDGERID-LOGIN-v1:";

/// Errors that can occur during assertion verification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum AssertionError {
    /// The assertion is structurally invalid (empty credential id, oversized
    /// fields, key material that is not a valid public key).
    #[error("malformed assertion")]
    Malformed,

    /// The signature does not verify against the canonical message.
    #[error("invalid signature")]
    InvalidSignature,
}

/// Assertion presented to complete a registration.
///
/// # Note on Public Fields
///
/// This is a data transfer object - validation happens in
/// [`verify_registration`], not at construction time. Constructing one does
/// NOT mean it's valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationAssertion {
    /// Opaque credential identifier chosen by the authenticator.
    pub credential_id: String,
    /// Raw Ed25519 public key bytes of the new credential.
    pub public_key: Vec<u8>,
    /// Signature over the registration canonical message, by the new
    /// credential's private key.
    pub signature: Vec<u8>,
}

/// Assertion presented to complete an authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationAssertion {
    /// Credential identifier of the authenticator being exercised.
    pub credential_id: String,
    /// Signature counter claimed by the authenticator for this assertion.
    pub counter: u32,
    /// Signature over the login canonical message.
    pub signature: Vec<u8>,
}

/// A registration assertion that passed verification.
///
/// Can only be produced by [`verify_registration`], so holding one means the
/// signature checked out against the issued challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCredential {
    pub credential_id: String,
    pub public_key: Vec<u8>,
}

/// Build the canonical message for a registration assertion.
///
/// Wire format (all multi-byte integers are big-endian):
///
/// | Field             | Size | Description                      |
/// |-------------------|------|----------------------------------|
/// | domain prefix     | 21   | "LEDGERID-REGISTER-v1:"          |
/// | handle_len        | 2    | Length of handle (u16 BE)        |
/// | handle            | var  | UTF-8 handle                     |
/// | challenge         | 32   | Raw challenge bytes              |
/// | credential_id_len | 2    | Length of credential id (u16 BE) |
/// | credential_id     | var  | UTF-8 credential id              |
fn registration_message(
    handle: &str,
    challenge: &Challenge,
    credential_id: &str,
) -> Result<Vec<u8>, AssertionError> {
    canonical_message(REGISTER_DOMAIN, handle, challenge, credential_id, None)
}

/// Build the canonical message for an authentication assertion.
///
/// Same layout as registration under the "LEDGERID-LOGIN-v1:" prefix, with
/// the claimed counter (u32 BE) appended so a relayed assertion cannot be
/// replayed with a different counter value.
fn login_message(
    handle: &str,
    challenge: &Challenge,
    credential_id: &str,
    counter: u32,
) -> Result<Vec<u8>, AssertionError> {
    canonical_message(LOGIN_DOMAIN, handle, challenge, credential_id, Some(counter))
}

fn canonical_message(
    domain: &[u8],
    handle: &str,
    challenge: &Challenge,
    credential_id: &str,
    counter: Option<u32>,
) -> Result<Vec<u8>, AssertionError> {
    let handle_bytes = handle.as_bytes();
    let credential_bytes = credential_id.as_bytes();

    // Validate lengths before encoding to prevent silent truncation.
    if handle_bytes.is_empty() || handle_bytes.len() > MAX_HANDLE_LEN {
        return Err(AssertionError::Malformed);
    }
    if credential_bytes.is_empty() || credential_bytes.len() > MAX_CREDENTIAL_ID_LEN {
        return Err(AssertionError::Malformed);
    }

    let mut msg = Vec::with_capacity(
        domain.len() + 2 + handle_bytes.len() + 32 + 2 + credential_bytes.len() + 4,
    );
    msg.extend_from_slice(domain);
    msg.extend_from_slice(&(handle_bytes.len() as u16).to_be_bytes());
    msg.extend_from_slice(handle_bytes);
    msg.extend_from_slice(challenge.as_bytes());
    msg.extend_from_slice(&(credential_bytes.len() as u16).to_be_bytes());
    msg.extend_from_slice(credential_bytes);
    if let Some(counter) = counter {
        msg.extend_from_slice(&counter.to_be_bytes());
    }
    Ok(msg)
}

/// Sign a registration canonical message (client side).
///
/// # Errors
///
/// Returns `AssertionError::Malformed` for out-of-range field lengths.
pub fn sign_registration(
    key: &crate::keys::PrivateKey,
    handle: &str,
    challenge: &Challenge,
    credential_id: &str,
) -> Result<Signature, AssertionError> {
    let message = registration_message(handle, challenge, credential_id)?;
    Ok(key.sign(&message))
}

/// Sign a login canonical message (client side).
///
/// # Errors
///
/// Returns `AssertionError::Malformed` for out-of-range field lengths.
pub fn sign_authentication(
    key: &crate::keys::PrivateKey,
    handle: &str,
    challenge: &Challenge,
    credential_id: &str,
    counter: u32,
) -> Result<Signature, AssertionError> {
    let message = login_message(handle, challenge, credential_id, counter)?;
    Ok(key.sign(&message))
}

/// Verify a registration assertion against the consumed challenge.
///
/// Checks, in order: structural validity (non-empty credential id, parseable
/// public key, well-formed signature), then the signature over the canonical
/// message. Only a fully verified assertion yields a [`VerifiedCredential`].
///
/// # Errors
///
/// `Malformed` for structural problems, `InvalidSignature` when the
/// signature does not verify.
pub fn verify_registration(
    handle: &str,
    challenge: &Challenge,
    assertion: &RegistrationAssertion,
) -> Result<VerifiedCredential, AssertionError> {
    let public_key =
        PublicKey::from_bytes(&assertion.public_key).map_err(|_| AssertionError::Malformed)?;
    let signature =
        Signature::from_bytes(&assertion.signature).map_err(|_| AssertionError::Malformed)?;

    let message = registration_message(handle, challenge, &assertion.credential_id)?;
    if !public_key.verify(&message, &signature) {
        return Err(AssertionError::InvalidSignature);
    }

    Ok(VerifiedCredential {
        credential_id: assertion.credential_id.clone(),
        public_key: assertion.public_key.clone(),
    })
}

/// Verify an authentication assertion against the consumed challenge and the
/// stored credential public key.
///
/// # Errors
///
/// `Malformed` for structural problems, `InvalidSignature` when the
/// signature does not verify.
pub fn verify_authentication(
    handle: &str,
    challenge: &Challenge,
    stored_public_key: &[u8],
    assertion: &AuthenticationAssertion,
) -> Result<(), AssertionError> {
    let public_key =
        PublicKey::from_bytes(stored_public_key).map_err(|_| AssertionError::Malformed)?;
    let signature =
        Signature::from_bytes(&assertion.signature).map_err(|_| AssertionError::Malformed)?;

    let message = login_message(
        handle,
        challenge,
        &assertion.credential_id,
        assertion.counter,
    )?;
    if !public_key.verify(&message, &signature) {
        return Err(AssertionError::InvalidSignature);
    }
    Ok(())
}

/// Description of a public-key creation request, returned from
/// begin-registration.
///
/// Purely descriptive output for the client-side authenticator; the server
/// keeps no state beyond the challenge itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationOptions {
    /// Challenge in transport encoding.
    pub challenge: String,
    /// Relying party identifier (e.g. the service hostname).
    pub relying_party_id: String,
    /// Human-readable relying party name.
    pub relying_party_name: String,
    /// Handle the credential will be bound to.
    pub user_handle: String,
    /// Display name for the credential prompt.
    pub user_display_name: String,
    /// Accepted signature algorithms, COSE identifiers (-8 = EdDSA).
    pub algorithms: Vec<i32>,
    /// Required verification level.
    pub user_verification: String,
    /// Client-side timeout in milliseconds.
    pub timeout_ms: u64,
}

/// Description of an assertion request, returned from begin-authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Challenge in transport encoding.
    pub challenge: String,
    /// Relying party identifier.
    pub relying_party_id: String,
    /// Credential ids the identity may answer with.
    pub allowed_credentials: Vec<String>,
    /// Required verification level.
    pub user_verification: String,
    /// Client-side timeout in milliseconds.
    pub timeout_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::PrivateKey;

    fn registered(handle: &str, challenge: &Challenge) -> (PrivateKey, RegistrationAssertion) {
        let key = PrivateKey::generate();
        let credential_id = "cred-1".to_string();
        let signature = sign_registration(&key, handle, challenge, &credential_id).unwrap();
        let assertion = RegistrationAssertion {
            credential_id,
            public_key: key.public_key().to_bytes().to_vec(),
            signature: signature.to_bytes().to_vec(),
        };
        (key, assertion)
    }

    #[test]
    fn test_registration_verifies() {
        let challenge = Challenge::generate();
        let (_, assertion) = registered("a@x.com", &challenge);

        let verified = verify_registration("a@x.com", &challenge, &assertion).unwrap();
        assert_eq!(verified.credential_id, "cred-1");
        assert_eq!(verified.public_key, assertion.public_key);
    }

    #[test]
    fn test_registration_rejects_wrong_challenge() {
        let challenge = Challenge::generate();
        let (_, assertion) = registered("a@x.com", &challenge);

        let other = Challenge::generate();
        assert_eq!(
            verify_registration("a@x.com", &other, &assertion),
            Err(AssertionError::InvalidSignature)
        );
    }

    #[test]
    fn test_registration_rejects_wrong_handle() {
        let challenge = Challenge::generate();
        let (_, assertion) = registered("a@x.com", &challenge);

        assert_eq!(
            verify_registration("b@x.com", &challenge, &assertion),
            Err(AssertionError::InvalidSignature)
        );
    }

    #[test]
    fn test_registration_rejects_empty_credential_id() {
        let challenge = Challenge::generate();
        let key = PrivateKey::generate();
        let assertion = RegistrationAssertion {
            credential_id: String::new(),
            public_key: key.public_key().to_bytes().to_vec(),
            signature: vec![0u8; 64],
        };

        assert_eq!(
            verify_registration("a@x.com", &challenge, &assertion),
            Err(AssertionError::Malformed)
        );
    }

    #[test]
    fn test_registration_rejects_bad_key_material() {
        let challenge = Challenge::generate();
        let assertion = RegistrationAssertion {
            credential_id: "cred-1".into(),
            public_key: vec![1, 2, 3],
            signature: vec![0u8; 64],
        };

        assert_eq!(
            verify_registration("a@x.com", &challenge, &assertion),
            Err(AssertionError::Malformed)
        );
    }

    #[test]
    fn test_authentication_verifies() {
        let challenge = Challenge::generate();
        let key = PrivateKey::generate();
        let signature = sign_authentication(&key, "a@x.com", &challenge, "cred-1", 7).unwrap();
        let assertion = AuthenticationAssertion {
            credential_id: "cred-1".into(),
            counter: 7,
            signature: signature.to_bytes().to_vec(),
        };

        let stored = key.public_key().to_bytes();
        verify_authentication("a@x.com", &challenge, &stored, &assertion).unwrap();
    }

    #[test]
    fn test_authentication_rejects_counter_tamper() {
        let challenge = Challenge::generate();
        let key = PrivateKey::generate();
        let signature = sign_authentication(&key, "a@x.com", &challenge, "cred-1", 7).unwrap();
        let assertion = AuthenticationAssertion {
            credential_id: "cred-1".into(),
            counter: 8,
            signature: signature.to_bytes().to_vec(),
        };

        let stored = key.public_key().to_bytes();
        assert_eq!(
            verify_authentication("a@x.com", &challenge, &stored, &assertion),
            Err(AssertionError::InvalidSignature)
        );
    }

    #[test]
    fn test_authentication_rejects_foreign_key() {
        let challenge = Challenge::generate();
        let key = PrivateKey::generate();
        let other = PrivateKey::generate();
        let signature = sign_authentication(&other, "a@x.com", &challenge, "cred-1", 1).unwrap();
        let assertion = AuthenticationAssertion {
            credential_id: "cred-1".into(),
            counter: 1,
            signature: signature.to_bytes().to_vec(),
        };

        let stored = key.public_key().to_bytes();
        assert_eq!(
            verify_authentication("a@x.com", &challenge, &stored, &assertion),
            Err(AssertionError::InvalidSignature)
        );
    }

    #[test]
    fn test_domain_separation_between_flows() {
        // A signature produced for registration must not validate as a login
        // signature, even over the same handle/challenge/credential.
        let challenge = Challenge::generate();
        let key = PrivateKey::generate();
        let reg_sig = sign_registration(&key, "a@x.com", &challenge, "cred-1").unwrap();

        let assertion = AuthenticationAssertion {
            credential_id: "cred-1".into(),
            counter: 0,
            signature: reg_sig.to_bytes().to_vec(),
        };
        let stored = key.public_key().to_bytes();
        assert_eq!(
            verify_authentication("a@x.com", &challenge, &stored, &assertion),
            Err(AssertionError::InvalidSignature)
        );
    }

    #[test]
    fn test_oversized_handle_rejected() {
        let challenge = Challenge::generate();
        let key = PrivateKey::generate();
        let long_handle = "x".repeat(300);
        assert_eq!(
            sign_registration(&key, &long_handle, &challenge, "cred-1"),
            Err(AssertionError::Malformed)
        );
    }

    #[test]
    fn test_options_serialize() {
        let options = CreationOptions {
            challenge: Challenge::generate().to_base64(),
            relying_party_id: "localhost".into(),
            relying_party_name: "LedgerID".into(),
            user_handle: "a@x.com".into(),
            user_display_name: "A".into(),
            algorithms: vec![-8],
            user_verification: "required".into(),
            timeout_ms: 60_000,
        };
        let json = serde_json::to_string(&options).unwrap();
        assert!(json.contains(r#""algorithms":[-8]"#));
        assert!(json.contains(r#""user_verification":"required""#));
    }
}
