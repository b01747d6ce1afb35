//! Test harness: in-memory service wiring, a scriptable mock registry, a
//! collecting audit sink, and a client-side test authenticator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ledgerid_auth::challenge::{Challenge, ChallengeStore, InMemoryChallengeStore};
use ledgerid_auth::{
    assertion, AuthenticationAssertion, PrivateKey, RegistrationAssertion, SessionClaims,
    SessionIssuer,
};
use ledgerid_core::{Address, AuditEvent, AuditSink, IdentityId, Role};
use ledgerid_registry::{OnChainRecord, Registry, RegistryError, RegistryProfile, TxReceipt};
use ledgerid_service::{
    AuthenticationEngine, CredentialStore, EngineConfig, IdentityOps, IdentitySynchronizer,
    SecretVerifier,
};

/// How the mock registry should behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryMode {
    /// Accept writes and remember records.
    Healthy,
    /// Every call fails with `Unavailable`.
    Unavailable,
    /// Every write fails with `Rejected` (reverted transaction).
    Rejecting,
}

/// Scriptable in-memory registry double.
pub struct MockRegistry {
    mode: RegistryMode,
    records: Mutex<HashMap<String, OnChainRecord>>,
    pub register_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
}

impl MockRegistry {
    pub fn new(mode: RegistryMode) -> Self {
        Self {
            mode,
            records: Mutex::new(HashMap::new()),
            register_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
        }
    }

    pub fn healthy() -> Self {
        Self::new(RegistryMode::Healthy)
    }

    pub fn unavailable() -> Self {
        Self::new(RegistryMode::Unavailable)
    }

    pub fn rejecting() -> Self {
        Self::new(RegistryMode::Rejecting)
    }

    fn gate(&self) -> Result<(), RegistryError> {
        match self.mode {
            RegistryMode::Healthy => Ok(()),
            RegistryMode::Unavailable => Err(RegistryError::Unavailable(
                "mock registry offline".to_string(),
            )),
            RegistryMode::Rejecting => {
                Err(RegistryError::Rejected("execution reverted".to_string()))
            }
        }
    }

    fn store_record(&self, wallet: &Address, profile: &RegistryProfile) {
        self.records.lock().unwrap().insert(
            wallet.as_str().to_string(),
            OnChainRecord {
                username: profile.username.clone(),
                email: profile.email.clone(),
                full_name: profile.full_name.clone(),
                role: profile.role.clone(),
            },
        );
    }
}

#[async_trait]
impl Registry for MockRegistry {
    async fn register(
        &self,
        wallet: &Address,
        profile: &RegistryProfile,
    ) -> Result<TxReceipt, RegistryError> {
        let call = self.register_calls.fetch_add(1, Ordering::SeqCst);
        self.gate()?;
        self.store_record(wallet, profile);
        Ok(TxReceipt {
            tx_hash: format!("0xmock{call}"),
            block_number: Some(call as u64 + 1),
        })
    }

    async fn update(
        &self,
        wallet: &Address,
        profile: &RegistryProfile,
    ) -> Result<TxReceipt, RegistryError> {
        let call = self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.gate()?;
        self.store_record(wallet, profile);
        Ok(TxReceipt {
            tx_hash: format!("0xmockupd{call}"),
            block_number: Some(call as u64 + 1),
        })
    }

    async fn fetch(&self, wallet: &Address) -> Result<Option<OnChainRecord>, RegistryError> {
        self.gate()?;
        Ok(self.records.lock().unwrap().get(wallet.as_str()).cloned())
    }

    async fn exists(&self, wallet: &Address) -> Result<bool, RegistryError> {
        self.gate()?;
        Ok(self.records.lock().unwrap().contains_key(wallet.as_str()))
    }
}

/// Audit sink that collects events for assertions.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Secret verifier for tests: the "hash" is the secret itself.
pub struct PlainSecretVerifier;

impl SecretVerifier for PlainSecretVerifier {
    fn verify(&self, candidate: &str, stored_hash: &str) -> bool {
        candidate == stored_hash
    }
}

/// Fully wired service over an in-memory store.
pub struct TestService {
    pub ops: IdentityOps,
    /// A second engine instance sharing the same stores, for direct
    /// state-machine assertions.
    pub engine: AuthenticationEngine,
    pub store: CredentialStore,
    pub challenges: Arc<InMemoryChallengeStore>,
    pub issuer: Arc<SessionIssuer>,
    pub registry: Arc<MockRegistry>,
    pub audit: Arc<MemoryAuditSink>,
}

/// Install a test subscriber once; `RUST_LOG` controls verbosity.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl TestService {
    pub async fn new() -> Self {
        Self::with_registry(Arc::new(MockRegistry::healthy())).await
    }

    pub async fn with_registry(registry: Arc<MockRegistry>) -> Self {
        init_tracing();
        let store = CredentialStore::connect_in_memory()
            .await
            .expect("failed to create in-memory store");
        let challenges = Arc::new(InMemoryChallengeStore::default());
        let issuer = Arc::new(SessionIssuer::new(PrivateKey::generate()));
        let audit = Arc::new(MemoryAuditSink::default());

        let synchronizer = Arc::new(IdentitySynchronizer::new(
            store.clone(),
            registry.clone() as Arc<dyn Registry>,
            audit.clone() as Arc<dyn AuditSink>,
            Duration::from_millis(500),
        ));

        let build_engine = || {
            AuthenticationEngine::new(
                store.clone(),
                challenges.clone() as Arc<dyn ChallengeStore>,
                synchronizer.clone(),
                issuer.clone(),
                Arc::new(PlainSecretVerifier),
                EngineConfig::default(),
            )
        };

        let ops = IdentityOps::new(
            build_engine(),
            synchronizer.clone(),
            store.clone(),
            audit.clone() as Arc<dyn AuditSink>,
        );

        Self {
            ops,
            engine: build_engine(),
            store,
            challenges,
            issuer,
            registry,
            audit,
        }
    }

    /// Session claims for an arbitrary principal, as the request layer would
    /// hand them over after verifying a token.
    pub fn claims(&self, identity_id: IdentityId, role: Role) -> SessionClaims {
        SessionClaims {
            identity_id,
            role,
            issued_at: 0,
            expires_at: i64::MAX,
        }
    }
}

/// Client-side authenticator double: holds the private key and produces
/// signed assertions the way a platform authenticator would.
pub struct TestAuthenticator {
    key: PrivateKey,
    pub credential_id: String,
}

impl TestAuthenticator {
    pub fn new(credential_id: &str) -> Self {
        Self {
            key: PrivateKey::generate(),
            credential_id: credential_id.to_string(),
        }
    }

    pub fn registration_assertion(
        &self,
        handle: &str,
        challenge_b64: &str,
    ) -> RegistrationAssertion {
        let challenge = Challenge::from_base64(challenge_b64).expect("bad challenge encoding");
        let signature =
            assertion::sign_registration(&self.key, handle, &challenge, &self.credential_id)
                .expect("failed to sign registration");
        RegistrationAssertion {
            credential_id: self.credential_id.clone(),
            public_key: self.key.public_key().to_bytes().to_vec(),
            signature: signature.to_bytes().to_vec(),
        }
    }

    pub fn login_assertion(
        &self,
        handle: &str,
        challenge_b64: &str,
        counter: u32,
    ) -> AuthenticationAssertion {
        let challenge = Challenge::from_base64(challenge_b64).expect("bad challenge encoding");
        let signature = assertion::sign_authentication(
            &self.key,
            handle,
            &challenge,
            &self.credential_id,
            counter,
        )
        .expect("failed to sign login");
        AuthenticationAssertion {
            credential_id: self.credential_id.clone(),
            counter,
            signature: signature.to_bytes().to_vec(),
        }
    }

    /// An assertion signed by a different key than the registered one.
    pub fn forged_login_assertion(
        &self,
        handle: &str,
        challenge_b64: &str,
        counter: u32,
    ) -> AuthenticationAssertion {
        let challenge = Challenge::from_base64(challenge_b64).expect("bad challenge encoding");
        let imposter = PrivateKey::generate();
        let signature = assertion::sign_authentication(
            &imposter,
            handle,
            &challenge,
            &self.credential_id,
            counter,
        )
        .expect("failed to sign forgery");
        AuthenticationAssertion {
            credential_id: self.credential_id.clone(),
            counter,
            signature: signature.to_bytes().to_vec(),
        }
    }
}
