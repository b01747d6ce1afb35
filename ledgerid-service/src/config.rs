//! Service configuration.
//!
//! Loaded from environment variables with explicit overrides, in the same
//! shape as the rest of the deployment: the registry contract address comes
//! from `LEDGERID_REGISTRY_CONTRACT` or a deployment metadata file, and
//! failing to resolve one is fatal at startup.

use std::path::PathBuf;
use std::time::Duration;

use ledgerid_auth::PrivateKey;
use ledgerid_core::Address;
use ledgerid_registry::{resolve_contract_address, DeploymentError};
use zeroize::Zeroizing;

/// Errors from configuration loading.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The configured session key is not 32 hex-encoded bytes.
    #[error("invalid session key: expected 64 hex characters")]
    InvalidSessionKey,
}

/// Configuration for the identity service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Path of the SQLite credential store.
    pub db_path: PathBuf,
    /// JSON-RPC endpoint of the registry node.
    pub rpc_url: String,
    /// Explicit registry contract address (wins over metadata).
    pub contract_address: Option<String>,
    /// Deployment metadata JSON produced by the contract migration tooling.
    pub deployment_metadata: Option<PathBuf>,
    /// Bound on a single chain call.
    pub chain_timeout: Duration,
    /// Time-to-live for outstanding challenges.
    pub challenge_ttl: Duration,
    /// Hex-encoded 32-byte session signing key. When absent an ephemeral
    /// key is generated, invalidating all sessions on restart.
    pub session_key_hex: Option<String>,
    /// Relying-party identifier advertised to authenticators.
    pub relying_party_id: String,
    /// Human-readable relying-party name.
    pub relying_party_name: String,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `LEDGERID_DB_PATH`
    /// - `LEDGERID_RPC_URL`
    ///
    /// Optional:
    /// - `LEDGERID_REGISTRY_CONTRACT`
    /// - `LEDGERID_DEPLOYMENT_METADATA`
    /// - `LEDGERID_SESSION_KEY`
    /// - `LEDGERID_RP_ID`, `LEDGERID_RP_NAME`
    pub fn from_env() -> Option<Self> {
        Some(Self {
            db_path: PathBuf::from(std::env::var("LEDGERID_DB_PATH").ok()?),
            rpc_url: std::env::var("LEDGERID_RPC_URL").ok()?,
            contract_address: std::env::var("LEDGERID_REGISTRY_CONTRACT").ok(),
            deployment_metadata: std::env::var("LEDGERID_DEPLOYMENT_METADATA")
                .ok()
                .map(PathBuf::from),
            chain_timeout: crate::sync::DEFAULT_CHAIN_TIMEOUT,
            challenge_ttl: ledgerid_auth::challenge::DEFAULT_CHALLENGE_TTL,
            session_key_hex: std::env::var("LEDGERID_SESSION_KEY").ok(),
            relying_party_id: std::env::var("LEDGERID_RP_ID")
                .unwrap_or_else(|_| "localhost".to_string()),
            relying_party_name: std::env::var("LEDGERID_RP_NAME")
                .unwrap_or_else(|_| "LedgerID".to_string()),
        })
    }

    /// Resolve the registry contract address, fail-fast.
    ///
    /// # Errors
    ///
    /// Propagates [`DeploymentError`]; callers treat any error here as fatal
    /// at startup.
    pub fn resolve_contract(&self) -> Result<Address, DeploymentError> {
        resolve_contract_address(
            self.contract_address.as_deref(),
            self.deployment_metadata.as_deref(),
        )
    }

    /// Load or generate the process-wide session signing key.
    ///
    /// # Errors
    ///
    /// `InvalidSessionKey` when a configured key does not decode to exactly
    /// 32 bytes.
    pub fn session_key(&self) -> Result<PrivateKey, ConfigError> {
        match &self.session_key_hex {
            Some(encoded) => {
                let bytes = Zeroizing::new(
                    hex::decode(encoded.trim()).map_err(|_| ConfigError::InvalidSessionKey)?,
                );
                PrivateKey::from_bytes(&bytes).map_err(|_| ConfigError::InvalidSessionKey)
            }
            None => {
                tracing::warn!(
                    "no session key configured; using an ephemeral key (sessions will not survive restart)"
                );
                Ok(PrivateKey::generate())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ServiceConfig {
        ServiceConfig {
            db_path: PathBuf::from("/tmp/ledgerid-test.db"),
            rpc_url: "http://127.0.0.1:8545".to_string(),
            contract_address: None,
            deployment_metadata: None,
            chain_timeout: Duration::from_secs(1),
            challenge_ttl: Duration::from_secs(60),
            session_key_hex: None,
            relying_party_id: "localhost".to_string(),
            relying_party_name: "LedgerID".to_string(),
        }
    }

    #[test]
    fn unresolvable_contract_is_an_error() {
        let config = test_config();
        assert!(config.resolve_contract().is_err());
    }

    #[test]
    fn explicit_contract_resolves() {
        let config = ServiceConfig {
            contract_address: Some("0x00000000000000000000000000000000000000aa".to_string()),
            ..test_config()
        };
        let address = config.resolve_contract().unwrap();
        assert_eq!(address.as_str(), "0x00000000000000000000000000000000000000aa");
    }

    #[test]
    fn session_key_roundtrips_through_hex() {
        let key = PrivateKey::generate();
        let config = ServiceConfig {
            session_key_hex: Some(hex::encode(key.to_bytes())),
            ..test_config()
        };

        let loaded = config.session_key().unwrap();
        assert_eq!(loaded.public_key().to_bytes(), key.public_key().to_bytes());
    }

    #[test]
    fn malformed_session_key_rejected() {
        let config = ServiceConfig {
            session_key_hex: Some("zz".to_string()),
            ..test_config()
        };
        assert!(matches!(
            config.session_key(),
            Err(ConfigError::InvalidSessionKey)
        ));

        let short = ServiceConfig {
            session_key_hex: Some("abcd".to_string()),
            ..test_config()
        };
        assert!(matches!(
            short.session_key(),
            Err(ConfigError::InvalidSessionKey)
        ));
    }

    #[test]
    fn missing_session_key_generates_ephemeral() {
        let config = test_config();
        let key = config.session_key().unwrap();
        let other = config.session_key().unwrap();
        // Two loads without a configured key are independent keys.
        assert_ne!(key.public_key().to_bytes(), other.public_key().to_bytes());
    }
}
