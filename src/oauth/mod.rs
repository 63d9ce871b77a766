//! Third-party sign-in (Google, GitHub) linked to local accounts.

mod client;
mod config;
mod github;
mod google;
mod linker;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::db::AuthProvider;

pub use config::{OAuthConfig, callback_url};
pub use github::GitHubProvider;
pub use google::GoogleProvider;
pub use linker::{IdentityLinker, STATE_TTL_SECS};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid provider configuration: {0}")]
    Config(String),

    #[error("code exchange failed: {0}")]
    Exchange(String),

    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned no usable email")]
    NoEmail,
}

/// Where to send the browser, plus what must be remembered until the callback.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub csrf_state: String,
    pub pkce_verifier: String,
}

/// Identity asserted by a provider.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    /// External subject ID
    pub provider_id: String,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    /// The provider vouches for the email address.
    pub email_verified: bool,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn kind(&self) -> AuthProvider;

    fn authorize(&self) -> AuthorizationRequest;

    /// Redeem the authorization code and fetch the account profile.
    async fn fetch_profile(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<ProviderProfile, ProviderError>;
}

/// Enabled providers by kind.
#[derive(Clone, Default)]
pub struct OAuthProviders {
    providers: HashMap<AuthProvider, Arc<dyn IdentityProvider>>,
}

impl OAuthProviders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn get(&self, kind: AuthProvider) -> Option<&Arc<dyn IdentityProvider>> {
        self.providers.get(&kind)
    }

    pub fn enabled(&self) -> Vec<AuthProvider> {
        let mut kinds: Vec<_> = self.providers.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    /// Providers whose client credentials are present in the environment.
    pub fn from_env(public_url: &Url) -> Result<Self, ProviderError> {
        let mut providers = Self::new();
        if let Some(config) = OAuthConfig::google(public_url)? {
            providers = providers.with(Arc::new(GoogleProvider::new(config)?));
        }
        if let Some(config) = OAuthConfig::github(public_url)? {
            providers = providers.with(Arc::new(GitHubProvider::new(config)?));
        }
        Ok(providers)
    }
}
