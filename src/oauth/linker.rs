//! Turns a completed provider login into a local account and session.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::auth::{AuthError, AuthService, RequestMeta, SessionBundle};
use crate::db::{AuthProvider, NewUser, OAuthStateStore, StoreError, User};

use super::{OAuthProviders, ProviderProfile};

/// Lifetime of a pending authorization (CSRF state + PKCE verifier).
pub const STATE_TTL_SECS: i64 = 10 * 60;

/// Upper bound on the code exchange plus profile fetch.
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct IdentityLinker {
    auth: AuthService,
    providers: OAuthProviders,
    states: OAuthStateStore,
}

impl IdentityLinker {
    pub fn new(auth: AuthService, providers: OAuthProviders, states: OAuthStateStore) -> Self {
        Self {
            auth,
            providers,
            states,
        }
    }

    pub fn providers(&self) -> &OAuthProviders {
        &self.providers
    }

    /// Begin a provider login. Returns the URL to send the browser to.
    pub async fn start(&self, kind: AuthProvider) -> Result<String, AuthError> {
        let provider = self.providers.get(kind).ok_or(AuthError::NotFound)?;
        let request = provider.authorize();

        self.auth
            .store("store_oauth_state", async {
                self.states
                    .store(
                        &request.csrf_state,
                        kind,
                        &request.pkce_verifier,
                        STATE_TTL_SECS,
                    )
                    .await
                    .map_err(StoreError::from)
            })
            .await?;

        Ok(request.url)
    }

    /// Finish a provider login: consume the state, fetch the profile, link or
    /// create the local user and open a session through the shared issuance path.
    pub async fn complete_oauth(
        &self,
        kind: AuthProvider,
        code: &str,
        state: &str,
        meta: &RequestMeta,
    ) -> Result<SessionBundle, AuthError> {
        let provider = self.providers.get(kind).ok_or(AuthError::NotFound)?;

        if code.is_empty() || state.is_empty() {
            return Err(AuthError::BadRequest(
                "Missing authorization code or state".to_string(),
            ));
        }

        let pending = self
            .auth
            .store("take_oauth_state", async {
                self.states
                    .take(state, kind)
                    .await
                    .map_err(StoreError::from)
            })
            .await?
            .ok_or_else(|| {
                warn!(provider = kind.as_str(), "Unknown or expired OAuth state");
                AuthError::BadRequest("Invalid or expired OAuth state".to_string())
            })?;

        let profile = tokio::time::timeout(
            PROVIDER_TIMEOUT,
            provider.fetch_profile(code, &pending.pkce_verifier),
        )
        .await
        .map_err(|_| {
            error!(provider = kind.as_str(), "OAuth provider timed out");
            AuthError::Unauthenticated
        })?
        .map_err(|e| {
            error!(provider = kind.as_str(), error = %e, "OAuth provider failure");
            AuthError::Unauthenticated
        })?;

        let user = self.link_account(kind, &profile).await?;
        self.auth.open_session(&user, meta).await
    }

    /// Find the local account for a provider identity, linking or creating as needed.
    pub async fn link_account(
        &self,
        kind: AuthProvider,
        profile: &ProviderProfile,
    ) -> Result<User, AuthError> {
        let users = self.auth.users();

        let existing = self
            .auth
            .store(
                "find_user_for_provider",
                users.find_for_provider(&profile.email, kind, &profile.provider_id),
            )
            .await?;

        let user = match existing {
            Some(user) => user,
            None => match self.create_from_profile(kind, profile).await? {
                Some(user) => return Ok(user),
                // A concurrent first sign-in created the account; use that row.
                None => self
                    .auth
                    .store(
                        "find_user_for_provider",
                        users.find_for_provider(&profile.email, kind, &profile.provider_id),
                    )
                    .await?
                    .ok_or(AuthError::Unavailable)?,
            },
        };

        let same_identity =
            user.provider == kind && user.provider_id.as_deref() == Some(profile.provider_id.as_str());

        // Matching on email alone is only trusted when the provider vouches for it.
        if !same_identity && !profile.email_verified {
            warn!(
                user_id = user.id,
                provider = kind.as_str(),
                "Refusing to link account through an unverified provider email"
            );
            return Err(AuthError::Unauthenticated);
        }

        if !user.is_active {
            warn!(user_id = user.id, "Provider login for deactivated account");
            return Err(AuthError::Forbidden);
        }

        if user.provider == AuthProvider::Credentials && user.provider_id.is_none() {
            let linked = self
                .auth
                .store(
                    "link_provider",
                    users.link_provider(user.id, kind, &profile.provider_id),
                )
                .await?;
            if linked {
                info!(user_id = user.id, provider = kind.as_str(), "Linked provider to existing account");
            }
        }

        if profile.email_verified && !user.is_email_verified {
            self.auth
                .store("mark_email_verified", users.mark_email_verified(user.id))
                .await?;
        }

        self.auth
            .store("get_user", users.get_by_id(user.id))
            .await?
            .ok_or(AuthError::Unavailable)
    }

    /// Create a local account from a provider profile. `None` means another
    /// request registered the email first.
    async fn create_from_profile(
        &self,
        kind: AuthProvider,
        profile: &ProviderProfile,
    ) -> Result<Option<User>, AuthError> {
        let name = profile
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| profile.email.split('@').next().unwrap_or_default().to_string());

        let created = tokio::time::timeout(
            self.auth.settings().store_timeout,
            self.auth.users().create(NewUser::from_provider(
                &profile.email,
                &name,
                profile.avatar_url.clone(),
                kind,
                &profile.provider_id,
                profile.email_verified,
            )),
        )
        .await;

        match created {
            Ok(Ok(user)) => {
                info!(user_id = user.id, provider = kind.as_str(), "User created from provider login");
                Ok(Some(user))
            }
            Ok(Err(StoreError::DuplicateEmail)) => {
                warn!(provider = kind.as_str(), "Provider account created concurrently");
                Ok(None)
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to create provider user");
                Err(AuthError::Unavailable)
            }
            Err(_) => {
                error!("Timed out creating provider user");
                Err(AuthError::Unavailable)
            }
        }
    }
}
