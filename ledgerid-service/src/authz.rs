//! Centralized role authorization gate.
//!
//! Every privileged operation consults this gate with verified session
//! claims. Role comparisons never appear at call sites.

use ledgerid_auth::SessionClaims;
use ledgerid_core::{IdentityId, Role};

/// Authorization failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum AuthzError {
    #[error("forbidden: requires role {}", .required.as_str())]
    Forbidden { required: Role },
}

/// The single authorization gate.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoleGate;

impl RoleGate {
    /// Require the session's role to satisfy `required`.
    pub fn require_role(claims: &SessionClaims, required: Role) -> Result<(), AuthzError> {
        if claims.role.satisfies(required) {
            Ok(())
        } else {
            Err(AuthzError::Forbidden { required })
        }
    }

    /// Require admin, or that the session belongs to the target identity.
    pub fn require_admin_or_self(
        claims: &SessionClaims,
        target: IdentityId,
    ) -> Result<(), AuthzError> {
        if claims.identity_id == target {
            return Ok(());
        }
        Self::require_role(claims, Role::Admin)
    }
}
