//! Challenge-response authentication state machine.
//!
//! Flow states: Idle → ChallengeIssued → CredentialBound (registration) or
//! Verified (login) → SessionIssued. The engine owns no cross-request state
//! of its own: challenges live in the [`ChallengeStore`], credentials in the
//! [`CredentialStore`], and identity writes go through the synchronizer so
//! chain propagation stays uniform.

use std::sync::Arc;

use ledgerid_auth::challenge::{ChallengeError, ChallengeStore};
use ledgerid_auth::session::{
    SessionIssuer, SessionToken, AUTHENTICATION_TTL_SECONDS, REGISTRATION_TTL_SECONDS,
};
use ledgerid_auth::{
    assertion, AssertionError, AuthenticationAssertion, CreationOptions, RegistrationAssertion,
    RequestOptions,
};
use ledgerid_core::{Address, CredentialId, Handle, Identity, NewIdentity, Role};

use crate::store::{CredentialStore, StoreError};
use crate::sync::IdentitySynchronizer;

/// Errors surfaced by the authentication engine.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Malformed input; rejected before any side effect.
    #[error("invalid input: {0}")]
    Validation(String),

    /// No identity (or no bound authenticator) for this handle.
    #[error("unknown identity")]
    UnknownIdentity,

    /// The asserted credential id is not bound to this identity.
    #[error("credential not found")]
    CredentialNotFound,

    /// No outstanding challenge, or it expired. The caller must restart the
    /// flow.
    #[error("challenge missing or expired")]
    ChallengeMissingOrExpired,

    /// The credential id is already bound somewhere in the store.
    #[error("duplicate credential")]
    DuplicateCredential,

    /// A uniqueness invariant was violated.
    #[error("conflict on {0}")]
    Conflict(String),

    /// The assertion signature does not verify; no session is issued.
    #[error("invalid signature")]
    SignatureInvalid,

    /// The asserted counter did not strictly increase: a cloned
    /// authenticator condition.
    #[error("authenticator counter regression")]
    CounterRegression,

    /// Wrong handle/secret pair. Deliberately uniform: the caller cannot
    /// tell which part was wrong.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Local storage failure; always fatal to the enclosing operation.
    #[error("storage failure: {0}")]
    Storage(sqlx::Error),
}

fn store_err(err: StoreError) -> EngineError {
    match err {
        StoreError::NotFound => EngineError::UnknownIdentity,
        StoreError::Conflict(field) => EngineError::Conflict(field.to_string()),
        StoreError::CounterNotIncreasing => EngineError::CounterRegression,
        StoreError::Database(e) => EngineError::Storage(e),
    }
}

fn challenge_err(err: ChallengeError) -> EngineError {
    match err {
        ChallengeError::NotFound | ChallengeError::Expired => {
            EngineError::ChallengeMissingOrExpired
        }
        ChallengeError::Malformed => EngineError::Validation("malformed challenge".to_string()),
        _ => EngineError::Validation("unknown challenge error".to_string()),
    }
}

fn assertion_err(err: AssertionError) -> EngineError {
    match err {
        AssertionError::Malformed => EngineError::Validation("malformed assertion".to_string()),
        AssertionError::InvalidSignature => EngineError::SignatureInvalid,
        _ => EngineError::Validation("unknown assertion error".to_string()),
    }
}

/// Verifies a supplied secret against a stored hash.
///
/// The hashing primitive itself is an external collaborator (a standard
/// slow hash); the engine only consumes this interface.
pub trait SecretVerifier: Send + Sync {
    fn verify(&self, candidate: &str, stored_hash: &str) -> bool;
}

/// Verifier for deployments without password login: rejects everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledSecretVerifier;

impl SecretVerifier for DisabledSecretVerifier {
    fn verify(&self, _candidate: &str, _stored_hash: &str) -> bool {
        false
    }
}

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Relying-party identifier handed to authenticators (e.g. hostname).
    pub relying_party_id: String,
    /// Human-readable relying-party name.
    pub relying_party_name: String,
    /// Client-side timeout advertised in option descriptors.
    pub assertion_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            relying_party_id: "localhost".to_string(),
            relying_party_name: "LedgerID".to_string(),
            assertion_timeout_ms: 60_000,
        }
    }
}

/// The authentication state machine.
pub struct AuthenticationEngine {
    store: CredentialStore,
    challenges: Arc<dyn ChallengeStore>,
    synchronizer: Arc<IdentitySynchronizer>,
    sessions: Arc<SessionIssuer>,
    secrets: Arc<dyn SecretVerifier>,
    config: EngineConfig,
}

impl AuthenticationEngine {
    pub fn new(
        store: CredentialStore,
        challenges: Arc<dyn ChallengeStore>,
        synchronizer: Arc<IdentitySynchronizer>,
        sessions: Arc<SessionIssuer>,
        secrets: Arc<dyn SecretVerifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            challenges,
            synchronizer,
            sessions,
            secrets,
            config,
        }
    }

    /// Begin registration for a handle.
    ///
    /// Idempotent: repeated calls for an unregistered handle reuse the
    /// existing provisional identity rather than creating duplicates. The
    /// returned options are purely descriptive; the only server-side state
    /// is the outstanding challenge.
    pub async fn begin_registration(
        &self,
        handle_raw: &str,
    ) -> Result<(Identity, CreationOptions), EngineError> {
        let handle = parse_handle(handle_raw)?;
        let identity = self.find_or_provision_by_handle(&handle).await?;

        let challenge = self.challenges.issue(handle.as_str());
        tracing::debug!(handle = %handle, "registration challenge issued");

        let options = CreationOptions {
            challenge: challenge.to_base64(),
            relying_party_id: self.config.relying_party_id.clone(),
            relying_party_name: self.config.relying_party_name.clone(),
            user_handle: handle.to_string(),
            user_display_name: identity.display_name.clone(),
            algorithms: vec![-8],
            user_verification: "required".to_string(),
            timeout_ms: self.config.assertion_timeout_ms,
        };
        Ok((identity, options))
    }

    /// Complete registration: consume the challenge, verify the assertion
    /// signature over it, and bind the credential.
    ///
    /// The challenge is consumed before verification and regardless of its
    /// outcome; a failed attempt costs the challenge and restarts the flow.
    pub async fn complete_registration(
        &self,
        handle_raw: &str,
        assertion: &RegistrationAssertion,
    ) -> Result<(Identity, SessionToken), EngineError> {
        let handle = parse_handle(handle_raw)?;
        let identity = self
            .store
            .find_by_handle(&handle)
            .await
            .map_err(store_err)?
            .ok_or(EngineError::UnknownIdentity)?;

        let challenge = self
            .challenges
            .consume(handle.as_str())
            .map_err(challenge_err)?;

        let verified = assertion::verify_registration(handle.as_str(), &challenge, assertion)
            .map_err(assertion_err)?;

        let credential_id = CredentialId::new(verified.credential_id);
        self.store
            .add_authenticator(identity.id, &credential_id, &verified.public_key)
            .await
            .map_err(|err| match err {
                StoreError::Conflict("credential id") => EngineError::DuplicateCredential,
                other => store_err(other),
            })?;

        tracing::info!(handle = %handle, credential = %credential_id, "credential bound");

        let token = self
            .sessions
            .issue(identity.id, identity.role, REGISTRATION_TTL_SECONDS);
        Ok((identity, token))
    }

    /// Begin authentication for an existing handle.
    ///
    /// # Errors
    ///
    /// `UnknownIdentity` when no identity exists or it has no bound
    /// authenticator.
    pub async fn begin_authentication(
        &self,
        handle_raw: &str,
    ) -> Result<(Identity, RequestOptions), EngineError> {
        let handle = parse_handle(handle_raw)?;
        let identity = self
            .store
            .find_by_handle(&handle)
            .await
            .map_err(store_err)?
            .ok_or(EngineError::UnknownIdentity)?;

        let authenticators = self
            .store
            .authenticators_for(identity.id)
            .await
            .map_err(store_err)?;
        if authenticators.is_empty() {
            return Err(EngineError::UnknownIdentity);
        }

        let challenge = self.challenges.issue(handle.as_str());
        tracing::debug!(handle = %handle, "authentication challenge issued");

        let options = RequestOptions {
            challenge: challenge.to_base64(),
            relying_party_id: self.config.relying_party_id.clone(),
            allowed_credentials: authenticators
                .iter()
                .map(|a| a.credential_id.to_string())
                .collect(),
            user_verification: "required".to_string(),
            timeout_ms: self.config.assertion_timeout_ms,
        };
        Ok((identity, options))
    }

    /// Complete authentication: consume the challenge, verify the assertion
    /// against the stored credential, advance the counter, mint a session.
    pub async fn complete_authentication(
        &self,
        handle_raw: &str,
        assertion: &AuthenticationAssertion,
    ) -> Result<(Identity, SessionToken), EngineError> {
        let handle = parse_handle(handle_raw)?;
        let identity = self
            .store
            .find_by_handle(&handle)
            .await
            .map_err(store_err)?
            .ok_or(EngineError::UnknownIdentity)?;

        let challenge = self
            .challenges
            .consume(handle.as_str())
            .map_err(challenge_err)?;

        let credential_id = CredentialId::new(assertion.credential_id.clone());
        let authenticator = self
            .store
            .find_authenticator(&credential_id)
            .await
            .map_err(store_err)?
            .filter(|a| a.identity_id == identity.id)
            .ok_or(EngineError::CredentialNotFound)?;

        assertion::verify_authentication(
            handle.as_str(),
            &challenge,
            &authenticator.public_key,
            assertion,
        )
        .map_err(assertion_err)?;

        // Verified; now the counter must strictly increase or the assertion
        // is from a clone.
        self.store
            .bump_counter(identity.id, &credential_id, assertion.counter)
            .await
            .map_err(store_err)?;

        self.store
            .touch_last_login(identity.id)
            .await
            .map_err(store_err)?;

        tracing::info!(handle = %handle, credential = %credential_id, "authentication verified");

        let token = self
            .sessions
            .issue(identity.id, identity.role, AUTHENTICATION_TTL_SECONDS);
        Ok((identity, token))
    }

    /// Wallet-address login, auto-provisioning on first sight.
    ///
    /// Lower-assurance path: it proves knowledge of an address only, not
    /// possession of its key. Callers exposing this operation must present
    /// it as such.
    pub async fn wallet_login(
        &self,
        address_raw: &str,
    ) -> Result<(Identity, SessionToken), EngineError> {
        let wallet = Address::parse(address_raw)
            .map_err(|e| EngineError::Validation(e.to_string()))?;

        let identity = match self.store.find_by_wallet(&wallet).await.map_err(store_err)? {
            Some(identity) => identity,
            None => self.provision_for_wallet(&wallet).await?,
        };

        self.store
            .touch_last_login(identity.id)
            .await
            .map_err(store_err)?;

        tracing::info!(wallet = %wallet, identity = %identity.id, "wallet login");

        let token = self
            .sessions
            .issue(identity.id, identity.role, AUTHENTICATION_TTL_SECONDS);
        Ok((identity, token))
    }

    /// Password login through the injected secret verifier.
    ///
    /// Unknown handle, missing secret hash, and wrong secret all collapse
    /// into the same `InvalidCredentials` error.
    pub async fn password_login(
        &self,
        handle_raw: &str,
        secret: &str,
    ) -> Result<(Identity, SessionToken), EngineError> {
        let handle = parse_handle(handle_raw)?;
        let identity = self
            .store
            .find_by_handle(&handle)
            .await
            .map_err(store_err)?
            .ok_or(EngineError::InvalidCredentials)?;

        let stored_hash = identity
            .secret_hash
            .as_deref()
            .ok_or(EngineError::InvalidCredentials)?;
        if !self.secrets.verify(secret, stored_hash) {
            return Err(EngineError::InvalidCredentials);
        }

        self.store
            .touch_last_login(identity.id)
            .await
            .map_err(store_err)?;

        tracing::info!(handle = %handle, "password login");

        let token = self
            .sessions
            .issue(identity.id, identity.role, AUTHENTICATION_TTL_SECONDS);
        Ok((identity, token))
    }

    /// Find the identity for a handle, provisioning a minimal one when
    /// absent. A concurrent provision losing the insert race falls back to
    /// the winner's row, so the operation stays idempotent.
    async fn find_or_provision_by_handle(&self, handle: &Handle) -> Result<Identity, EngineError> {
        if let Some(identity) = self.store.find_by_handle(handle).await.map_err(store_err)? {
            return Ok(identity);
        }

        let new = NewIdentity {
            handle: handle.clone(),
            username: handle.to_string(),
            display_name: handle.to_string(),
            role: Role::User,
            wallet: None,
            secret_hash: None,
        };

        match self.synchronizer.create_identity(new).await {
            Ok(identity) => Ok(identity),
            Err(StoreError::Conflict(_)) => self
                .store
                .find_by_handle(handle)
                .await
                .map_err(store_err)?
                .ok_or(EngineError::UnknownIdentity),
            Err(other) => Err(store_err(other)),
        }
    }

    /// Provision an identity for a first-seen wallet. Goes through the
    /// synchronizer so the chain registration is attempted best-effort.
    async fn provision_for_wallet(&self, wallet: &Address) -> Result<Identity, EngineError> {
        let handle = Handle::parse(&format!("{}@wallet.local", wallet.as_str()))
            .map_err(|e| EngineError::Validation(e.to_string()))?;

        let new = NewIdentity {
            handle,
            username: wallet.as_str().to_string(),
            display_name: wallet.as_str().to_string(),
            role: Role::User,
            wallet: Some(wallet.clone()),
            secret_hash: None,
        };

        match self.synchronizer.create_identity(new).await {
            Ok(identity) => Ok(identity),
            // Lost a provisioning race; the winner's row is the identity.
            Err(StoreError::Conflict(_)) => self
                .store
                .find_by_wallet(wallet)
                .await
                .map_err(store_err)?
                .ok_or(EngineError::UnknownIdentity),
            Err(other) => Err(store_err(other)),
        }
    }
}

fn parse_handle(raw: &str) -> Result<Handle, EngineError> {
    Handle::parse(raw).map_err(|e| EngineError::Validation(e.to_string()))
}
