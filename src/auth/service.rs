//! The authentication core: validation, refresh, login and session issuance.
//!
//! Every handler, extractor and the route guard go through [`AuthService`].
//! It owns the only code paths that mint tokens or touch session rows, and it
//! runs every store call under a deadline so that an outage surfaces as
//! [`AuthError::Unavailable`] instead of an auth denial.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use tracing::{debug, error, info, warn};

use crate::db::{
    Database, NewSession, NewUser, ReplaceOutcome, Session, SessionRepository, StoreError, User,
    UserRepository, UserRole, UserSummary, unix_now,
};
use crate::jwt::{JwtConfig, JwtError};
use crate::password::{
    PasswordError, hash_password_async, validate_new_password, verify_password_async,
};

use super::cookie::extract_token;
use super::errors::AuthError;
use super::types::{AuthenticatedUser, RefreshedToken, RequestMeta, SessionBundle};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// What happens to a user's other sessions when their password changes.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PasswordChangePolicy {
    /// Revoke every session except the one making the change.
    #[default]
    InvalidateOthers,
    LeaveOthersValid,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub store_timeout: Duration,
    pub password_change_policy: PasswordChangePolicy,
    /// Refuse password login (403) until the email is verified.
    pub require_verified_email: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            store_timeout: DEFAULT_STORE_TIMEOUT,
            password_change_policy: PasswordChangePolicy::default(),
            require_verified_email: false,
        }
    }
}

/// A registered account and, unless email verification is required, its first session.
#[derive(Debug, Clone)]
pub struct Registration {
    pub user: User,
    pub session: Option<SessionBundle>,
}

#[derive(Clone)]
pub struct AuthService {
    jwt: Arc<JwtConfig>,
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    settings: AuthSettings,
}

impl AuthService {
    pub fn new(
        jwt: Arc<JwtConfig>,
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        settings: AuthSettings,
    ) -> Self {
        Self {
            jwt,
            users,
            sessions,
            settings,
        }
    }

    /// Service backed by the sqlx stores of `db`.
    pub fn from_database(jwt: Arc<JwtConfig>, db: &Database, settings: AuthSettings) -> Self {
        Self::new(
            jwt,
            Arc::new(db.users()),
            Arc::new(db.sessions()),
            settings,
        )
    }

    /// Same service with a different store deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut service = self.clone();
        service.settings.store_timeout = timeout;
        service
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    pub(crate) fn users(&self) -> &dyn UserRepository {
        self.users.as_ref()
    }

    /// Run a store call under the deadline. Timeouts and database errors become `Unavailable`.
    pub(crate) async fn store<T, F>(&self, op: &'static str, fut: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.settings.store_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!(op, error = %e, "Store call failed");
                Err(AuthError::Unavailable)
            }
            Err(_) => {
                error!(op, timeout_ms = self.settings.store_timeout.as_millis() as u64, "Store call timed out");
                Err(AuthError::Unavailable)
            }
        }
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Validate a raw token against its signature, its session row and its owner.
    pub async fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let claims = self.jwt.verify(token).map_err(|e| {
            debug!(reason = %e, "Token rejected");
            AuthError::Unauthenticated
        })?;

        let session = self
            .store(
                "find_active_session",
                self.sessions.find_active(token, &claims.user_id),
            )
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        let user = self.load_owner(&session, &claims.user_id).await?;
        Ok(AuthenticatedUser::new(&user, session.id))
    }

    /// Collaborator call for domain handlers: the caller's identity, or None.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Option<AuthenticatedUser> {
        let token = extract_token(headers)?;
        match self.validate(token).await {
            Ok(user) => Some(user),
            Err(AuthError::Unavailable) => {
                warn!("Authentication unavailable, treating request as anonymous");
                None
            }
            Err(_) => None,
        }
    }

    /// Load the session owner. A missing or inactive owner revokes the session.
    async fn load_owner(&self, session: &Session, user_uuid: &str) -> Result<User, AuthError> {
        let user = self
            .store("get_user", self.users.get_by_uuid(user_uuid))
            .await?;

        match user {
            Some(user) if user.is_active => Ok(user),
            _ => {
                warn!(session_id = session.id, "Session owner missing or inactive, revoking session");
                self.store("revoke_session", self.sessions.revoke(session.id))
                    .await?;
                Err(AuthError::Unauthenticated)
            }
        }
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Exchange a token for a current one.
    ///
    /// A still-valid token is returned unchanged. An expired token whose
    /// session row is still active gets a new token, swapped into the same
    /// row. Failures before the swap leave the session untouched.
    pub async fn refresh(&self, token: &str) -> Result<RefreshedToken, AuthError> {
        match self.jwt.verify(token) {
            Ok(claims) => {
                let session = self
                    .store(
                        "find_active_session",
                        self.sessions.find_active(token, &claims.user_id),
                    )
                    .await?
                    .ok_or(AuthError::Unauthenticated)?;
                let user = self.load_owner(&session, &claims.user_id).await?;
                return Ok(RefreshedToken {
                    token: token.to_string(),
                    expires_at: claims.exp,
                    refreshed: false,
                    user: AuthenticatedUser::new(&user, session.id),
                });
            }
            Err(JwtError::Expired) => {}
            Err(e) => {
                debug!(reason = %e, "Refresh rejected");
                return Err(AuthError::Unauthenticated);
            }
        }

        let claims = self.jwt.decode_expired(token).map_err(|e| {
            debug!(reason = %e, "Refresh rejected");
            AuthError::Unauthenticated
        })?;

        let session = self
            .store(
                "find_session_by_token",
                self.sessions.find_by_token(token, &claims.user_id),
            )
            .await?
            .filter(|s| s.is_active)
            .ok_or(AuthError::Unauthenticated)?;

        let user = self.load_owner(&session, &claims.user_id).await?;

        let issued = self
            .jwt
            .issue(&user.uuid, &user.email, user.role)
            .map_err(|e| {
                error!(error = %e, "Failed to issue token");
                AuthError::Unavailable
            })?;

        let outcome = self
            .store(
                "replace_session_token",
                self.sessions
                    .replace(session.id, token, &issued.token, issued.expires_at),
            )
            .await?;

        match outcome {
            ReplaceOutcome::Replaced => {
                info!(session_id = session.id, "Session refreshed");
                Ok(RefreshedToken {
                    token: issued.token,
                    expires_at: issued.expires_at,
                    refreshed: true,
                    user: AuthenticatedUser::new(&user, session.id),
                })
            }
            // A concurrent refresh won the swap: hand out its token so both callers converge.
            ReplaceOutcome::Conflict {
                current: Some(current),
            } if current.is_active && !current.is_expired(unix_now()) => {
                debug!(session_id = session.id, "Concurrent refresh, returning current token");
                Ok(RefreshedToken {
                    token: current.token,
                    expires_at: current.expires_at,
                    refreshed: true,
                    user: AuthenticatedUser::new(&user, session.id),
                })
            }
            ReplaceOutcome::Conflict { .. } => Err(AuthError::Unauthenticated),
        }
    }

    // =========================================================================
    // Issuance
    // =========================================================================

    /// Mint a token and persist its session. The single issuance path for
    /// password login, registration and OAuth completion.
    pub async fn open_session(
        &self,
        user: &User,
        meta: &RequestMeta,
    ) -> Result<SessionBundle, AuthError> {
        let issued = self
            .jwt
            .issue(&user.uuid, &user.email, user.role)
            .map_err(|e| {
                error!(error = %e, "Failed to issue token");
                AuthError::Unavailable
            })?;

        let session_id = self
            .store(
                "create_session",
                self.sessions.create(NewSession {
                    user_id: user.id,
                    token: issued.token.clone(),
                    expires_at: issued.expires_at,
                    user_agent: meta.user_agent.clone(),
                    ip_address: meta.ip_address.clone(),
                }),
            )
            .await?;

        let now = unix_now();
        self.store("touch_last_login", self.users.touch_last_login(user.id, now))
            .await?;

        let mut user = user.clone();
        user.last_login_at = Some(now);

        info!(user_id = user.id, session_id, "Session opened");

        Ok(SessionBundle {
            user: AuthenticatedUser::new(&user, session_id),
            token: issued.token,
            expires_at: issued.expires_at,
        })
    }

    /// Password login.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        meta: &RequestMeta,
    ) -> Result<SessionBundle, AuthError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AuthError::BadRequest(
                "Email and password are required".to_string(),
            ));
        }

        let user = self
            .store("get_user_by_email", self.users.get_by_email(email))
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        // Provider-only accounts have no password to check against.
        let hash = user
            .password_hash
            .clone()
            .ok_or(AuthError::Unauthenticated)?;

        let matches = verify_password_async(password.to_string(), hash)
            .await
            .map_err(|e| match e {
                PasswordError::InvalidHashFormat => {
                    error!(user_id = user.id, "Stored password hash is malformed");
                    AuthError::Unauthenticated
                }
                other => {
                    error!(error = %other, "Password verification failed");
                    AuthError::Unavailable
                }
            })?;

        if !matches {
            debug!(user_id = user.id, "Wrong password");
            return Err(AuthError::Unauthenticated);
        }

        if !user.is_active {
            return Err(AuthError::Forbidden);
        }

        if self.settings.require_verified_email && !user.is_email_verified {
            return Err(AuthError::Forbidden);
        }

        self.open_session(&user, meta).await
    }

    /// Create a credentials account.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
        meta: &RequestMeta,
    ) -> Result<Registration, AuthError> {
        let email = email.trim();
        if !is_plausible_email(email) {
            return Err(AuthError::BadRequest("A valid email is required".to_string()));
        }
        validate_new_password(password).map_err(|msg| AuthError::BadRequest(msg.to_string()))?;

        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

        let hash = hash_password_async(password.to_string())
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to hash password");
                AuthError::Unavailable
            })?;

        let created = tokio::time::timeout(
            self.settings.store_timeout,
            self.users
                .create(NewUser::credentials(email, &name, &hash)),
        )
        .await;

        let user = match created {
            Ok(Ok(user)) => user,
            Ok(Err(StoreError::DuplicateEmail)) => {
                return Err(AuthError::Conflict(
                    "An account with this email already exists".to_string(),
                ));
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to create user");
                return Err(AuthError::Unavailable);
            }
            Err(_) => {
                error!("Timed out creating user");
                return Err(AuthError::Unavailable);
            }
        };

        info!(user_id = user.id, "User registered");

        let session = if self.settings.require_verified_email {
            None
        } else {
            Some(self.open_session(&user, meta).await?)
        };

        Ok(Registration { user, session })
    }

    /// Revoke the session behind a token. Expired tokens are accepted so a
    /// stale cookie can still end its session. Unknown tokens are a no-op.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        let claims = match self.jwt.verify(token) {
            Ok(claims) => claims,
            Err(JwtError::Expired) => match self.jwt.decode_expired(token) {
                Ok(claims) => claims,
                Err(_) => return Ok(()),
            },
            Err(_) => return Ok(()),
        };

        let session = self
            .store(
                "find_session_by_token",
                self.sessions.find_by_token(token, &claims.user_id),
            )
            .await?;

        if let Some(session) = session {
            self.store("revoke_session", self.sessions.revoke(session.id))
                .await?;
            info!(session_id = session.id, "Session revoked by logout");
        }
        Ok(())
    }

    /// Change the caller's password, then apply the password-change session policy.
    /// Returns the number of other sessions revoked.
    pub async fn change_password(
        &self,
        caller: &AuthenticatedUser,
        current_password: &str,
        new_password: &str,
    ) -> Result<u64, AuthError> {
        validate_new_password(new_password)
            .map_err(|msg| AuthError::BadRequest(msg.to_string()))?;

        let user = self
            .store("get_user", self.users.get_by_id(caller.user_id))
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        let hash = user.password_hash.clone().ok_or_else(|| {
            AuthError::BadRequest("This account signs in through a provider".to_string())
        })?;

        let matches = verify_password_async(current_password.to_string(), hash)
            .await
            .map_err(|e| {
                error!(error = %e, "Password verification failed");
                AuthError::Unavailable
            })?;
        if !matches {
            return Err(AuthError::Forbidden);
        }

        let new_hash = hash_password_async(new_password.to_string())
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to hash password");
                AuthError::Unavailable
            })?;
        self.store(
            "set_password_hash",
            self.users.set_password_hash(user.id, &new_hash),
        )
        .await?;

        let revoked = match self.settings.password_change_policy {
            PasswordChangePolicy::InvalidateOthers => {
                self.store(
                    "revoke_other_sessions",
                    self.sessions
                        .revoke_all_for_user(user.id, Some(caller.session_id)),
                )
                .await?
            }
            PasswordChangePolicy::LeaveOthersValid => 0,
        };

        info!(user_id = user.id, revoked, "Password changed");
        Ok(revoked)
    }

    // =========================================================================
    // Session management
    // =========================================================================

    pub async fn list_sessions(&self, caller: &AuthenticatedUser) -> Result<Vec<Session>, AuthError> {
        self.store(
            "list_sessions",
            self.sessions.list_active_for_user(caller.user_id),
        )
        .await
    }

    /// Revoke a session. Users may revoke their own; admins any.
    /// Sessions the caller may not see are reported as not found.
    pub async fn revoke_session(
        &self,
        caller: &AuthenticatedUser,
        session_id: i64,
    ) -> Result<(), AuthError> {
        let session = self
            .store("get_session", self.sessions.get(session_id))
            .await?
            .ok_or(AuthError::NotFound)?;

        if session.user_id != caller.user_id && caller.role != UserRole::Admin {
            return Err(AuthError::NotFound);
        }

        self.store("revoke_session", self.sessions.revoke(session_id))
            .await?;
        info!(session_id, by = caller.user_id, "Session revoked");
        Ok(())
    }

    // =========================================================================
    // Administration
    // =========================================================================

    pub async fn list_users(&self) -> Result<Vec<UserSummary>, AuthError> {
        self.store("list_users", self.users.list()).await
    }

    async fn user_by_uuid(&self, uuid: &str) -> Result<User, AuthError> {
        self.store("get_user", self.users.get_by_uuid(uuid))
            .await?
            .ok_or(AuthError::NotFound)
    }

    pub async fn set_user_role(
        &self,
        caller: &AuthenticatedUser,
        uuid: &str,
        role: UserRole,
    ) -> Result<UserSummary, AuthError> {
        let user = self.user_by_uuid(uuid).await?;
        if user.id == caller.user_id && role != UserRole::Admin {
            return Err(AuthError::BadRequest("Cannot demote yourself".to_string()));
        }

        self.store("set_role", self.users.set_role(user.id, role))
            .await?;
        info!(user_id = user.id, role = role.as_str(), "Role changed");

        let user = self.user_by_uuid(uuid).await?;
        Ok(UserSummary::from(user))
    }

    /// Activate or deactivate a user. Deactivation revokes all their sessions.
    pub async fn set_user_active(
        &self,
        caller: &AuthenticatedUser,
        uuid: &str,
        active: bool,
    ) -> Result<UserSummary, AuthError> {
        let user = self.user_by_uuid(uuid).await?;
        if user.id == caller.user_id && !active {
            return Err(AuthError::BadRequest(
                "Cannot deactivate yourself".to_string(),
            ));
        }

        self.store("set_active", self.users.set_active(user.id, active))
            .await?;

        if !active {
            let revoked = self
                .store(
                    "revoke_all_sessions",
                    self.sessions.revoke_all_for_user(user.id, None),
                )
                .await?;
            info!(user_id = user.id, revoked, "User deactivated");
        } else {
            info!(user_id = user.id, "User activated");
        }

        let user = self.user_by_uuid(uuid).await?;
        Ok(UserSummary::from(user))
    }
}

fn is_plausible_email(email: &str) -> bool {
    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}
