//! LedgerID identity service.
//!
//! Wires the credential store, challenge manager, on-chain registry client,
//! and session issuer into the dual-ledger synchronizer and the
//! authentication engine, and exposes the transport-agnostic operation
//! surface in [`ops`].
//!
//! The local credential store is authoritative for every authentication
//! decision; the on-chain registry is an advisory mirror that may lag or be
//! unavailable without affecting logins.
//!
//! # Wiring
//!
//! ```ignore
//! use std::sync::Arc;
//! use ledgerid_auth::challenge::InMemoryChallengeStore;
//! use ledgerid_auth::SessionIssuer;
//! use ledgerid_registry::{HttpRegistryClient, RegistryConfig};
//! use ledgerid_service::*;
//!
//! let config = ServiceConfig::from_env().expect("LEDGERID_DB_PATH and LEDGERID_RPC_URL required");
//!
//! // Fatal at startup when no contract address resolves.
//! let contract = config.resolve_contract()?;
//! let registry = Arc::new(HttpRegistryClient::new(RegistryConfig::new(
//!     config.rpc_url.clone(),
//!     contract,
//! ))?);
//!
//! let store = CredentialStore::open(&config.db_path).await?;
//! let audit = Arc::new(LogAuditSink);
//! let synchronizer = Arc::new(IdentitySynchronizer::new(
//!     store.clone(), registry, audit.clone(), config.chain_timeout,
//! ));
//! let engine = AuthenticationEngine::new(
//!     store.clone(),
//!     Arc::new(InMemoryChallengeStore::new(config.challenge_ttl)),
//!     synchronizer.clone(),
//!     Arc::new(SessionIssuer::new(config.session_key()?)),
//!     Arc::new(DisabledSecretVerifier),
//!     EngineConfig::default(),
//! );
//! let ops = IdentityOps::new(engine, synchronizer, store, audit);
//! ```

pub mod audit;
pub mod authz;
pub mod config;
pub mod engine;
pub mod ops;
pub mod store;
pub mod sync;

pub use audit::LogAuditSink;
pub use authz::{AuthzError, RoleGate};
pub use config::{ConfigError, ServiceConfig};
pub use engine::{
    AuthenticationEngine, DisabledSecretVerifier, EngineConfig, EngineError, SecretVerifier,
};
pub use ops::{
    ChainUserView, CreateOrUpdateRequest, Envelope, IdentityOps, IdentityView, RequestMeta,
    SessionGrant,
};
pub use store::{CredentialStore, StoreError};
pub use sync::{IdentitySynchronizer, DEFAULT_CHAIN_TIMEOUT};
