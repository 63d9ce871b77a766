//! Typed repository interfaces for the two entities the auth core persists.
//!
//! The validator, refresh coordinator and identity linker depend on these
//! traits only; the sqlx stores in this module tree are the production
//! implementations.

use async_trait::async_trait;
use thiserror::Error;

use super::session::{NewSession, ReplaceOutcome, Session};
use super::user::{AuthProvider, NewUser, User, UserRole, UserSummary};

/// Errors surfaced by repository implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a user with this email already exists")]
    DuplicateEmail,

    #[error("session token already exists")]
    DuplicateToken,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Map a unique-constraint violation to `conflict`, anything else to `Database`.
    pub(super) fn unique_or(e: sqlx::Error, conflict: StoreError) -> StoreError {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => conflict,
            _ => StoreError::Database(e),
        }
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;
    async fn get_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;
    async fn get_by_uuid(&self, uuid: &str) -> Result<Option<User>, StoreError>;
    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Find a user by email OR by `(provider, provider_id)`, preferring the provider match.
    async fn find_for_provider(
        &self,
        email: &str,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<Option<User>, StoreError>;

    /// Attach a provider identity to an account that has none yet. The password hash is kept.
    async fn link_provider(
        &self,
        id: i64,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<bool, StoreError>;

    async fn mark_email_verified(&self, id: i64) -> Result<(), StoreError>;
    async fn touch_last_login(&self, id: i64, at: i64) -> Result<(), StoreError>;
    async fn set_active(&self, id: i64, active: bool) -> Result<bool, StoreError>;
    async fn set_role(&self, id: i64, role: UserRole) -> Result<bool, StoreError>;
    async fn set_password_hash(&self, id: i64, hash: &str) -> Result<bool, StoreError>;
    async fn list(&self) -> Result<Vec<UserSummary>, StoreError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert a new active session. Only a duplicate token is rejected.
    async fn create(&self, session: NewSession) -> Result<i64, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<Session>, StoreError>;

    /// Session for `token` owned by `user_uuid`, only if active and not expired.
    async fn find_active(&self, token: &str, user_uuid: &str)
    -> Result<Option<Session>, StoreError>;

    /// Session for `token` owned by `user_uuid` regardless of expiry or active flag.
    async fn find_by_token(
        &self,
        token: &str,
        user_uuid: &str,
    ) -> Result<Option<Session>, StoreError>;

    /// Mark a session inactive. Idempotent.
    async fn revoke(&self, id: i64) -> Result<bool, StoreError>;

    /// Atomically swap the token of an active session, provided it still holds `expected_token`.
    async fn replace(
        &self,
        id: i64,
        expected_token: &str,
        new_token: &str,
        new_expires_at: i64,
    ) -> Result<ReplaceOutcome, StoreError>;

    async fn list_active_for_user(&self, user_id: i64) -> Result<Vec<Session>, StoreError>;

    /// Revoke every active session of a user, optionally sparing one.
    async fn revoke_all_for_user(
        &self,
        user_id: i64,
        except: Option<i64>,
    ) -> Result<u64, StoreError>;

    /// Delete expired sessions and sessions revoked before `revoked_before`.
    async fn delete_stale(&self, revoked_before: i64) -> Result<u64, StoreError>;
}
