//! Role gate.

use crate::db::UserRole;

use super::types::AuthenticatedUser;

/// Admin satisfies any requirement; otherwise the role must match exactly.
pub fn allows(role: UserRole, required: UserRole) -> bool {
    role == UserRole::Admin || role == required
}

/// Collaborator form of [`allows`] for domain handlers.
pub fn require_role(user: &AuthenticatedUser, required: UserRole) -> bool {
    allows(user.role, required)
}

/// Compile-time role requirement for the [`Auth`](super::Auth) extractor.
pub trait RoleConstraint {
    const REQUIRED: UserRole;
}

/// Any authenticated user.
pub struct AnyRole;

impl RoleConstraint for AnyRole {
    const REQUIRED: UserRole = UserRole::User;
}

/// Administrators only.
pub struct AdminOnly;

impl RoleConstraint for AdminOnly {
    const REQUIRED: UserRole = UserRole::Admin;
}
