//! Audit event types and the one-way audit sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::IdentityId;

/// Action being audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    // Authentication flows
    /// Registration challenge issued.
    RegisterBegin,
    /// Credential bound after a verified registration assertion.
    RegisterComplete,
    /// Authentication challenge issued.
    AuthenticateBegin,
    /// Assertion verified and session issued.
    AuthenticateComplete,
    /// Wallet-address login (auto-provisioning path).
    WalletLogin,
    /// Password login.
    UserLogin,

    // Identity lifecycle
    /// Identity created or registered.
    UserRegister,
    /// Identity profile updated.
    UserUpdate,
    /// Identity deleted (local only).
    UserDelete,

    // Directory access
    /// Full identity listing fetched.
    GetUsers,
    /// Single identity fetched.
    GetUser,
    /// On-chain record fetched.
    GetChainUser,

    // Reconciliation and authorization
    /// Chain write failed after a successful local commit.
    ChainDivergence,
    /// A privileged operation was denied.
    AuthzDenied,
}

/// An audit event recording one action against the identity system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event occurred.
    pub ts: DateTime<Utc>,

    /// Identity that performed the action (None for anonymous or
    /// system-initiated actions).
    pub actor: Option<IdentityId>,

    /// What action was performed.
    pub action: AuditAction,

    /// Human-readable description.
    pub description: String,

    /// Client IP as reported by the request layer.
    pub client_ip: Option<String>,

    /// Client user agent as reported by the request layer.
    pub user_agent: Option<String>,
}

impl AuditEvent {
    /// Create a new audit event with the current timestamp.
    pub fn new(actor: Option<IdentityId>, action: AuditAction, description: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            actor,
            action,
            description: description.into(),
            client_ip: None,
            user_agent: None,
        }
    }

    /// Attach client metadata (builder pattern).
    pub fn with_client(mut self, ip: Option<String>, user_agent: Option<String>) -> Self {
        self.client_ip = ip;
        self.user_agent = user_agent;
        self
    }
}

/// One-way sink for audit events.
///
/// Recording is fire-and-forget: implementations must never fail, block on
/// slow IO in the caller's path, or otherwise affect the outcome of the
/// operation being audited.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _event: AuditEvent) {}
}
