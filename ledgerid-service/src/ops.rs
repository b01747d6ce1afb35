//! The produced operation surface.
//!
//! Each operation returns a `{success, data|error}` envelope and records a
//! log-worthy audit action. This layer is transport-agnostic: the
//! surrounding request layer (out of scope here) maps it onto whatever wire
//! protocol it serves, verifies session tokens, and supplies client
//! metadata for the audit trail.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ledgerid_auth::{
    AuthenticationAssertion, CreationOptions, RegistrationAssertion, RequestOptions, SessionClaims,
};
use ledgerid_core::{
    Address, AuditAction, AuditEvent, AuditSink, Handle, Identity, IdentityId, IdentityPatch,
    NewIdentity, Role,
};
use ledgerid_registry::OnChainRecord;
use serde::{Deserialize, Serialize};

use crate::authz::RoleGate;
use crate::engine::AuthenticationEngine;
use crate::store::{CredentialStore, StoreError};
use crate::sync::IdentitySynchronizer;

/// Client metadata carried through from the request layer for auditing.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Uniform operation result envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.to_string()),
        }
    }
}

/// Public view of an identity. Never carries the secret hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityView {
    pub id: IdentityId,
    pub handle: Handle,
    pub username: String,
    pub display_name: String,
    pub role: Role,
    pub wallet: Option<Address>,
    pub chain_pending: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<Identity> for IdentityView {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id,
            handle: identity.handle,
            username: identity.username,
            display_name: identity.display_name,
            role: identity.role,
            wallet: identity.wallet,
            chain_pending: identity.chain_pending,
            created_at: identity.created_at,
            last_login: identity.last_login,
        }
    }
}

/// A minted session and the identity it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionGrant {
    pub token: String,
    pub identity: IdentityView,
}

/// Result of a chain lookup. `record: None` means the chain has no entry,
/// which is a legitimate state, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainUserView {
    pub wallet: Address,
    pub record: Option<OnChainRecord>,
}

/// Input for `create_or_update_identity`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrUpdateRequest {
    pub handle: String,
    pub username: String,
    pub display_name: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub wallet: Option<String>,
    /// Pre-hashed secret; hashing happens outside this service.
    #[serde(default)]
    pub secret_hash: Option<String>,
}

/// The identity service's operation surface.
pub struct IdentityOps {
    engine: AuthenticationEngine,
    synchronizer: Arc<IdentitySynchronizer>,
    store: CredentialStore,
    audit: Arc<dyn AuditSink>,
}

impl IdentityOps {
    pub fn new(
        engine: AuthenticationEngine,
        synchronizer: Arc<IdentitySynchronizer>,
        store: CredentialStore,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            engine,
            synchronizer,
            store,
            audit,
        }
    }

    fn record(
        &self,
        actor: Option<IdentityId>,
        action: AuditAction,
        description: String,
        meta: &RequestMeta,
    ) {
        self.audit.record(
            AuditEvent::new(actor, action, description)
                .with_client(meta.client_ip.clone(), meta.user_agent.clone()),
        );
    }

    /// Begin registration for a handle.
    pub async fn register_begin(
        &self,
        handle: &str,
        meta: &RequestMeta,
    ) -> Envelope<CreationOptions> {
        match self.engine.begin_registration(handle).await {
            Ok((identity, options)) => {
                self.record(
                    Some(identity.id),
                    AuditAction::RegisterBegin,
                    format!("{} began registration", identity.handle),
                    meta,
                );
                Envelope::ok(options)
            }
            Err(err) => Envelope::err(err),
        }
    }

    /// Complete registration, binding a verified credential.
    pub async fn register_complete(
        &self,
        handle: &str,
        assertion: &RegistrationAssertion,
        meta: &RequestMeta,
    ) -> Envelope<SessionGrant> {
        match self.engine.complete_registration(handle, assertion).await {
            Ok((identity, token)) => {
                self.record(
                    Some(identity.id),
                    AuditAction::RegisterComplete,
                    format!("{} completed registration", identity.handle),
                    meta,
                );
                Envelope::ok(SessionGrant {
                    token: token.to_base64(),
                    identity: identity.into(),
                })
            }
            Err(err) => Envelope::err(err),
        }
    }

    /// Begin authentication for an existing handle.
    pub async fn authenticate_begin(
        &self,
        handle: &str,
        meta: &RequestMeta,
    ) -> Envelope<RequestOptions> {
        match self.engine.begin_authentication(handle).await {
            Ok((identity, options)) => {
                self.record(
                    Some(identity.id),
                    AuditAction::AuthenticateBegin,
                    format!("{} began authentication", identity.handle),
                    meta,
                );
                Envelope::ok(options)
            }
            Err(err) => Envelope::err(err),
        }
    }

    /// Complete authentication with an assertion.
    pub async fn authenticate_complete(
        &self,
        handle: &str,
        assertion: &AuthenticationAssertion,
        meta: &RequestMeta,
    ) -> Envelope<SessionGrant> {
        match self.engine.complete_authentication(handle, assertion).await {
            Ok((identity, token)) => {
                self.record(
                    Some(identity.id),
                    AuditAction::AuthenticateComplete,
                    format!("{} logged in", identity.handle),
                    meta,
                );
                Envelope::ok(SessionGrant {
                    token: token.to_base64(),
                    identity: identity.into(),
                })
            }
            Err(err) => Envelope::err(err),
        }
    }

    /// Wallet-address login (lower-assurance; see the engine docs).
    pub async fn wallet_login(&self, address: &str, meta: &RequestMeta) -> Envelope<SessionGrant> {
        match self.engine.wallet_login(address).await {
            Ok((identity, token)) => {
                self.record(
                    Some(identity.id),
                    AuditAction::WalletLogin,
                    format!("wallet login for {}", identity.username),
                    meta,
                );
                Envelope::ok(SessionGrant {
                    token: token.to_base64(),
                    identity: identity.into(),
                })
            }
            Err(err) => Envelope::err(err),
        }
    }

    /// Password login through the injected secret verifier.
    pub async fn password_login(
        &self,
        handle: &str,
        secret: &str,
        meta: &RequestMeta,
    ) -> Envelope<SessionGrant> {
        match self.engine.password_login(handle, secret).await {
            Ok((identity, token)) => {
                self.record(
                    Some(identity.id),
                    AuditAction::UserLogin,
                    format!("{} logged in", identity.handle),
                    meta,
                );
                Envelope::ok(SessionGrant {
                    token: token.to_base64(),
                    identity: identity.into(),
                })
            }
            Err(err) => Envelope::err(err),
        }
    }

    /// Create or update an identity profile.
    ///
    /// The local write is authoritative; chain propagation is best-effort
    /// inside the synchronizer and never fails this operation.
    pub async fn create_or_update_identity(
        &self,
        request: CreateOrUpdateRequest,
        meta: &RequestMeta,
    ) -> Envelope<IdentityView> {
        let handle = match Handle::parse(&request.handle) {
            Ok(handle) => handle,
            Err(err) => return Envelope::err(format!("invalid input: {err}")),
        };
        let wallet = match request.wallet.as_deref().map(Address::parse).transpose() {
            Ok(wallet) => wallet,
            Err(err) => return Envelope::err(format!("invalid input: {err}")),
        };

        let existing = match self.store.find_by_handle(&handle).await {
            Ok(existing) => existing,
            Err(err) => return Envelope::err(err),
        };

        match existing {
            Some(identity) => {
                let patch = IdentityPatch {
                    username: Some(request.username),
                    display_name: Some(request.display_name),
                    role: request.role,
                    wallet,
                };
                match self.synchronizer.update_identity(identity.id, patch).await {
                    Ok(updated) => {
                        self.record(
                            Some(updated.id),
                            AuditAction::UserUpdate,
                            format!("{} updated profile", updated.handle),
                            meta,
                        );
                        Envelope::ok(updated.into())
                    }
                    Err(err) => Envelope::err(err),
                }
            }
            None => {
                let new = NewIdentity {
                    handle,
                    username: request.username,
                    display_name: request.display_name,
                    role: request.role.unwrap_or(Role::User),
                    wallet,
                    secret_hash: request.secret_hash,
                };
                match self.synchronizer.create_identity(new).await {
                    Ok(created) => {
                        self.record(
                            Some(created.id),
                            AuditAction::UserRegister,
                            format!("{} registered", created.handle),
                            meta,
                        );
                        Envelope::ok(created.into())
                    }
                    Err(err) => Envelope::err(err),
                }
            }
        }
    }

    /// Fetch the live on-chain record for a wallet.
    pub async fn get_chain_user(
        &self,
        claims: Option<&SessionClaims>,
        wallet: &str,
        meta: &RequestMeta,
    ) -> Envelope<ChainUserView> {
        let wallet = match Address::parse(wallet) {
            Ok(wallet) => wallet,
            Err(err) => return Envelope::err(format!("invalid input: {err}")),
        };

        match self.synchronizer.chain_user(&wallet).await {
            Ok(record) => {
                self.record(
                    claims.map(|c| c.identity_id),
                    AuditAction::GetChainUser,
                    format!("fetched on-chain record for {wallet}"),
                    meta,
                );
                Envelope::ok(ChainUserView { wallet, record })
            }
            Err(err) => Envelope::err(err),
        }
    }

    /// List all identities. Privileged: admin only.
    pub async fn list_identities(
        &self,
        claims: &SessionClaims,
        meta: &RequestMeta,
    ) -> Envelope<Vec<IdentityView>> {
        if let Err(err) = RoleGate::require_role(claims, Role::Admin) {
            self.record(
                Some(claims.identity_id),
                AuditAction::AuthzDenied,
                "identity listing denied".to_string(),
                meta,
            );
            return Envelope::err(err);
        }

        match self.store.list().await {
            Ok(identities) => {
                self.record(
                    Some(claims.identity_id),
                    AuditAction::GetUsers,
                    "fetched all identities".to_string(),
                    meta,
                );
                Envelope::ok(identities.into_iter().map(IdentityView::from).collect())
            }
            Err(err) => Envelope::err(err),
        }
    }

    /// Fetch one identity. Privileged: admin or self.
    pub async fn get_identity(
        &self,
        claims: &SessionClaims,
        id: IdentityId,
        meta: &RequestMeta,
    ) -> Envelope<IdentityView> {
        if let Err(err) = RoleGate::require_admin_or_self(claims, id) {
            self.record(
                Some(claims.identity_id),
                AuditAction::AuthzDenied,
                format!("access to identity {id} denied"),
                meta,
            );
            return Envelope::err(err);
        }

        match self.store.find_by_id(id).await {
            Ok(Some(identity)) => {
                self.record(
                    Some(claims.identity_id),
                    AuditAction::GetUser,
                    format!("fetched identity {id}"),
                    meta,
                );
                Envelope::ok(identity.into())
            }
            Ok(None) => Envelope::err(StoreError::NotFound),
            Err(err) => Envelope::err(err),
        }
    }

    /// Delete an identity locally. Privileged: admin only.
    ///
    /// Local-only: the registry interface has no delete operation, so an
    /// on-chain record referencing the identity is not retracted.
    pub async fn delete_identity(
        &self,
        claims: &SessionClaims,
        id: IdentityId,
        meta: &RequestMeta,
    ) -> Envelope<bool> {
        if let Err(err) = RoleGate::require_role(claims, Role::Admin) {
            self.record(
                Some(claims.identity_id),
                AuditAction::AuthzDenied,
                format!("deletion of identity {id} denied"),
                meta,
            );
            return Envelope::err(err);
        }

        match self.store.delete(id).await {
            Ok(true) => {
                self.record(
                    Some(claims.identity_id),
                    AuditAction::UserDelete,
                    format!("identity {id} deleted"),
                    meta,
                );
                Envelope::ok(true)
            }
            Ok(false) => Envelope::err(StoreError::NotFound),
            Err(err) => Envelope::err(err),
        }
    }
}
