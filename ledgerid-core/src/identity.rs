//! Identity, credential, and addressing types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an identity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(pub Uuid);

impl IdentityId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for IdentityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors from handle normalization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum HandleError {
    /// The handle is empty after trimming.
    #[error("empty handle")]
    Empty,
}

/// A unique login handle (email-equivalent).
///
/// Handles are normalized to trimmed lowercase at construction so that
/// lookups and uniqueness checks never depend on caller casing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(String);

impl Handle {
    /// Normalize and validate a raw handle string.
    ///
    /// # Errors
    ///
    /// Returns `HandleError::Empty` if nothing remains after trimming.
    pub fn parse(raw: &str) -> Result<Self, HandleError> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(HandleError::Empty);
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors from address validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum AddressError {
    /// The address has the wrong number of hex digits.
    #[error("invalid address length: expected {expected} hex digits, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// The address is missing the 0x prefix or contains non-hex characters.
    #[error("invalid address format")]
    InvalidFormat,
}

/// An account or contract address on the registry chain.
///
/// Format: `0x` followed by 40 hex digits, normalized to lowercase.
/// Validation happens at construction; a held `Address` is always
/// well-formed, so downstream code never re-checks it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    const HEX_DIGITS: usize = 40;

    /// Parse and normalize an address string.
    ///
    /// # Errors
    ///
    /// Returns `AddressError::InvalidFormat` when the `0x` prefix is missing
    /// or a non-hex character appears, `AddressError::InvalidLength` when the
    /// digit count is wrong.
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or(AddressError::InvalidFormat)?;

        if digits.len() != Self::HEX_DIGITS {
            return Err(AddressError::InvalidLength {
                expected: Self::HEX_DIGITS,
                actual: digits.len(),
            });
        }
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AddressError::InvalidFormat);
        }

        Ok(Self(format!("0x{}", digits.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role determining an identity's permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full control: manage identities, read the full directory.
    Admin,
    /// Regular identity: own profile and login flows only.
    User,
}

impl Role {
    /// Whether this role satisfies a required role.
    ///
    /// Admin satisfies everything; user satisfies only user.
    pub fn satisfies(&self, required: Role) -> bool {
        match self {
            Role::Admin => true,
            Role::User => required == Role::User,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Opaque identifier of a bound public-key credential.
///
/// Uniqueness is global across the whole store, not per-identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialId(pub String);

impl CredentialId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CredentialId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The authoritative local record of a principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub handle: Handle,
    pub username: String,
    pub display_name: String,
    pub role: Role,
    /// Wallet address, unique when present.
    pub wallet: Option<Address>,
    /// Opaque password-derived hash; the hashing primitive is external.
    pub secret_hash: Option<String>,
    /// Set when the on-chain registry has diverged from this record.
    pub chain_pending: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl Identity {
    /// Whether this identity can complete any login flow.
    ///
    /// At least one of {secret hash, wallet, bound authenticator} must
    /// exist; the authenticator count lives in the store, so the caller
    /// supplies it.
    pub fn is_loginable(&self, authenticator_count: usize) -> bool {
        self.secret_hash.is_some() || self.wallet.is_some() || authenticator_count > 0
    }
}

/// Fields for creating a new identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIdentity {
    pub handle: Handle,
    pub username: String,
    pub display_name: String,
    pub role: Role,
    pub wallet: Option<Address>,
    pub secret_hash: Option<String>,
}

/// Partial update of an identity's profile fields.
///
/// `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityPatch {
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub role: Option<Role>,
    pub wallet: Option<Address>,
}

impl IdentityPatch {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.display_name.is_none()
            && self.role.is_none()
            && self.wallet.is_none()
    }
}

/// A registered public-key credential tied to one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundAuthenticator {
    pub credential_id: CredentialId,
    pub identity_id: IdentityId,
    /// Opaque public-key material; interpreted by the auth layer.
    pub public_key: Vec<u8>,
    /// Monotonically increasing signature counter. A repeat or decrease
    /// signals a cloned authenticator.
    pub counter: u32,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_normalizes_case_and_whitespace() {
        let handle = Handle::parse("  Alice@Example.COM ").unwrap();
        assert_eq!(handle.as_str(), "alice@example.com");
    }

    #[test]
    fn handle_rejects_empty() {
        assert_eq!(Handle::parse("   "), Err(HandleError::Empty));
    }

    #[test]
    fn handle_serde_transparent() {
        let handle = Handle::parse("a@x.com").unwrap();
        let json = serde_json::to_string(&handle).unwrap();
        assert_eq!(json, r#""a@x.com""#);
    }

    #[test]
    fn address_parse_normalizes_to_lowercase() {
        let addr = Address::parse("0xABCDEFabcdef0123456789ABCDEFabcdef012345").unwrap();
        assert_eq!(addr.as_str(), "0xabcdefabcdef0123456789abcdefabcdef012345");
    }

    #[test]
    fn address_rejects_missing_prefix() {
        let result = Address::parse("abcdefabcdef0123456789abcdefabcdef012345");
        assert_eq!(result, Err(AddressError::InvalidFormat));
    }

    #[test]
    fn address_rejects_wrong_length() {
        let result = Address::parse("0xabc");
        assert_eq!(
            result,
            Err(AddressError::InvalidLength {
                expected: 40,
                actual: 3
            })
        );
    }

    #[test]
    fn address_rejects_non_hex() {
        let result = Address::parse("0xzzcdefabcdef0123456789abcdefabcdef012345");
        assert_eq!(result, Err(AddressError::InvalidFormat));
    }

    #[test]
    fn role_snake_case() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), r#""admin""#);
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), r#""user""#);
    }

    #[test]
    fn role_satisfies() {
        assert!(Role::Admin.satisfies(Role::Admin));
        assert!(Role::Admin.satisfies(Role::User));
        assert!(Role::User.satisfies(Role::User));
        assert!(!Role::User.satisfies(Role::Admin));
    }

    #[test]
    fn role_from_str_roundtrip() {
        for role in [Role::Admin, Role::User] {
            let parsed: Role = role.as_str().parse().unwrap();
            assert_eq!(parsed, role);
        }
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn identity_loginable_requires_some_credential() {
        let identity = Identity {
            id: IdentityId::generate(),
            handle: Handle::parse("a@x.com").unwrap(),
            username: "a".into(),
            display_name: "A".into(),
            role: Role::User,
            wallet: None,
            secret_hash: None,
            chain_pending: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_login: None,
        };

        assert!(!identity.is_loginable(0));
        assert!(identity.is_loginable(1));

        let with_wallet = Identity {
            wallet: Some(Address::parse("0x0000000000000000000000000000000000000001").unwrap()),
            ..identity.clone()
        };
        assert!(with_wallet.is_loginable(0));

        let with_secret = Identity {
            secret_hash: Some("hash".into()),
            ..identity
        };
        assert!(with_secret.is_loginable(0));
    }

    #[test]
    fn identity_patch_emptiness() {
        assert!(IdentityPatch::default().is_empty());
        let patch = IdentityPatch {
            username: Some("b".into()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }
}
