//! Dual-ledger identity synchronizer.
//!
//! Every identity-affecting write commits to the credential store first; the
//! on-chain registry is a derived, advisory view. Chain propagation is one
//! best-effort attempt after the local commit is durable: a chain failure is
//! recorded as divergence (the identity is flagged chain-pending, a warning
//! is logged, an audit event is emitted) and the user-facing operation still
//! succeeds. A reconciliation job can replay pending identities out-of-band.
//!
//! The chain call never holds any store lock: it starts strictly after the
//! local write has returned, and it is bounded by a timeout so a hung
//! registry node cannot wedge an operation.

use std::sync::Arc;
use std::time::Duration;

use ledgerid_core::{
    Address, AuditAction, AuditEvent, AuditSink, Identity, IdentityId, IdentityPatch, NewIdentity,
};
use ledgerid_registry::{OnChainRecord, Registry, RegistryError, RegistryProfile};

use crate::store::{CredentialStore, StoreError};

/// Which contract operation a propagation should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainOp {
    Register,
    Update,
}

/// Default bound on a single chain call.
pub const DEFAULT_CHAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Orchestrates writes across the credential store and the on-chain
/// registry.
pub struct IdentitySynchronizer {
    store: CredentialStore,
    registry: Arc<dyn Registry>,
    audit: Arc<dyn AuditSink>,
    chain_timeout: Duration,
}

impl IdentitySynchronizer {
    pub fn new(
        store: CredentialStore,
        registry: Arc<dyn Registry>,
        audit: Arc<dyn AuditSink>,
        chain_timeout: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            audit,
            chain_timeout,
        }
    }

    /// Create an identity: local commit, then best-effort chain registration.
    ///
    /// # Errors
    ///
    /// Only local store failures propagate; if the local write fails no
    /// chain call is attempted. Chain failures are swallowed after being
    /// recorded as divergence.
    pub async fn create_identity(&self, new: NewIdentity) -> Result<Identity, StoreError> {
        let identity = self.store.create(new).await?;
        let diverged = self.propagate(&identity, ChainOp::Register).await;
        Ok(Identity {
            chain_pending: diverged,
            ..identity
        })
    }

    /// Update an identity: local commit, then best-effort chain update.
    ///
    /// # Errors
    ///
    /// Same contract as [`create_identity`](Self::create_identity).
    pub async fn update_identity(
        &self,
        id: IdentityId,
        patch: IdentityPatch,
    ) -> Result<Identity, StoreError> {
        let identity = self.store.update(id, patch).await?;
        let diverged = self.propagate(&identity, ChainOp::Update).await;
        Ok(Identity {
            chain_pending: diverged,
            ..identity
        })
    }

    /// Read-repair path: fetch the live chain record for a wallet.
    ///
    /// `Ok(None)` is a legitimate state (the chain has not caught up, or
    /// never will) and must not be treated as an error by callers.
    ///
    /// # Errors
    ///
    /// `Unavailable` when the registry cannot be reached within the timeout.
    pub async fn chain_user(
        &self,
        wallet: &Address,
    ) -> Result<Option<OnChainRecord>, RegistryError> {
        match tokio::time::timeout(self.chain_timeout, self.registry.fetch(wallet)).await {
            Ok(result) => result,
            Err(_) => Err(RegistryError::Unavailable(
                "registry fetch timed out".to_string(),
            )),
        }
    }

    /// Attempt the chain write for an identity. Returns whether the identity
    /// diverged (chain write failed).
    ///
    /// Identities without a wallet have no chain representation; propagation
    /// is a no-op for them. An update against a wallet the chain has never
    /// seen (first divergence happened at registration, or the wallet was
    /// attached by a later profile edit) is downgraded to a register, since
    /// the contract would revert the update.
    async fn propagate(&self, identity: &Identity, op: ChainOp) -> bool {
        let Some(wallet) = identity.wallet.clone() else {
            return false;
        };

        let op = match op {
            ChainOp::Register => ChainOp::Register,
            ChainOp::Update => {
                match tokio::time::timeout(self.chain_timeout, self.registry.exists(&wallet)).await
                {
                    Ok(Ok(true)) => ChainOp::Update,
                    Ok(Ok(false)) => ChainOp::Register,
                    Ok(Err(err)) => {
                        self.record_divergence(identity, &wallet, &err.to_string())
                            .await;
                        return true;
                    }
                    Err(_) => {
                        self.record_divergence(identity, &wallet, "chain call timed out")
                            .await;
                        return true;
                    }
                }
            }
        };

        let profile = RegistryProfile {
            username: identity.username.clone(),
            email: identity.handle.to_string(),
            full_name: identity.display_name.clone(),
            role: identity.role.as_str().to_string(),
        };

        let call = async {
            match op {
                ChainOp::Register => self.registry.register(&wallet, &profile).await,
                ChainOp::Update => self.registry.update(&wallet, &profile).await,
            }
        };

        match tokio::time::timeout(self.chain_timeout, call).await {
            Ok(Ok(receipt)) => {
                tracing::info!(
                    wallet = %wallet,
                    tx_hash = %receipt.tx_hash,
                    op = ?op,
                    "chain write confirmed"
                );
                self.clear_divergence(identity.id).await;
                false
            }
            Ok(Err(err)) => {
                self.record_divergence(identity, &wallet, &err.to_string())
                    .await;
                true
            }
            Err(_) => {
                self.record_divergence(identity, &wallet, "chain call timed out")
                    .await;
                true
            }
        }
    }

    async fn clear_divergence(&self, id: IdentityId) {
        if let Err(err) = self.store.set_chain_pending(id, false).await {
            tracing::warn!(identity = %id, error = %err, "failed to clear chain-pending flag");
        }
    }

    /// Record divergence without failing the enclosing operation. Every
    /// failure path in here is itself swallowed: divergence bookkeeping must
    /// never take down a write that already committed locally.
    async fn record_divergence(&self, identity: &Identity, wallet: &Address, reason: &str) {
        tracing::warn!(
            identity = %identity.id,
            wallet = %wallet,
            reason = %reason,
            "chain write failed; identity marked chain-pending"
        );

        if let Err(err) = self.store.set_chain_pending(identity.id, true).await {
            tracing::warn!(identity = %identity.id, error = %err, "failed to set chain-pending flag");
        }

        self.audit.record(AuditEvent::new(
            Some(identity.id),
            AuditAction::ChainDivergence,
            format!("chain write for {wallet} failed: {reason}"),
        ));
    }
}
