//! Authentication user types.

use serde::Serialize;

use crate::db::{AuthProvider, User, UserRole};

/// The identity behind a validated request.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedUser {
    /// Public user UUID
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub provider: AuthProvider,
    pub created_at: i64,
    pub last_login_at: Option<i64>,
    /// Database user ID
    #[serde(skip)]
    pub user_id: i64,
    /// Session that authenticated this request
    #[serde(skip)]
    pub session_id: i64,
}

impl AuthenticatedUser {
    pub fn new(user: &User, session_id: i64) -> Self {
        Self {
            id: user.uuid.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            provider: user.provider,
            created_at: user.created_at,
            last_login_at: user.last_login_at,
            user_id: user.id,
            session_id,
        }
    }
}

/// Result of the refresh protocol.
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub token: String,
    pub expires_at: i64,
    /// False when the presented token was still valid and is returned unchanged.
    pub refreshed: bool,
    pub user: AuthenticatedUser,
}

/// A newly opened session: what login and OAuth completion hand back.
#[derive(Debug, Clone)]
pub struct SessionBundle {
    pub user: AuthenticatedUser,
    pub token: String,
    pub expires_at: i64,
}

/// Advisory device metadata recorded on new sessions.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}
