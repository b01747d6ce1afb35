//! Core domain types for LedgerID.
//!
//! This crate holds the types shared by every other crate in the workspace:
//! identities, wallet addresses, bound authenticators, roles, and the audit
//! event model. It performs no IO and holds no state.

pub mod audit;
pub mod identity;

pub use audit::{AuditAction, AuditEvent, AuditSink, NullAuditSink};
pub use identity::{
    Address, AddressError, BoundAuthenticator, CredentialId, Handle, HandleError, Identity,
    IdentityId, IdentityPatch, NewIdentity, Role,
};
