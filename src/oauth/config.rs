//! OAuth client configuration from environment variables.

use oauth2::{AuthUrl, ClientId, ClientSecret, RedirectUrl, TokenUrl};
use url::Url;

use crate::db::AuthProvider;

use super::ProviderError;

/// Client credentials and endpoints for one provider.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: ClientId,
    pub client_secret: ClientSecret,
    pub auth_url: AuthUrl,
    pub token_url: TokenUrl,
    pub redirect_url: RedirectUrl,
}

/// `{public_url}/api/auth/oauth/{provider}/callback`
pub fn callback_url(public_url: &Url, provider: AuthProvider) -> Result<RedirectUrl, ProviderError> {
    let base = public_url.as_str().trim_end_matches('/');
    RedirectUrl::new(format!(
        "{}/api/auth/oauth/{}/callback",
        base,
        provider.as_str()
    ))
    .map_err(|e| ProviderError::Config(e.to_string()))
}

fn credentials_from_env(prefix: &str) -> Option<(String, String)> {
    let id = std::env::var(format!("{}_CLIENT_ID", prefix)).ok()?;
    let secret = std::env::var(format!("{}_CLIENT_SECRET", prefix)).ok()?;
    if id.trim().is_empty() || secret.trim().is_empty() {
        return None;
    }
    Some((id, secret))
}

impl OAuthConfig {
    fn new(
        client_id: String,
        client_secret: String,
        auth_url: &str,
        token_url: &str,
        redirect_url: RedirectUrl,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client_id: ClientId::new(client_id),
            client_secret: ClientSecret::new(client_secret),
            auth_url: AuthUrl::new(auth_url.to_string())
                .map_err(|e| ProviderError::Config(e.to_string()))?,
            token_url: TokenUrl::new(token_url.to_string())
                .map_err(|e| ProviderError::Config(e.to_string()))?,
            redirect_url,
        })
    }

    /// GitHub config from `GITHUB_CLIENT_ID` / `GITHUB_CLIENT_SECRET`. None when unset.
    pub fn github(public_url: &Url) -> Result<Option<Self>, ProviderError> {
        let Some((id, secret)) = credentials_from_env("GITHUB") else {
            return Ok(None);
        };
        Self::new(
            id,
            secret,
            "https://github.com/login/oauth/authorize",
            "https://github.com/login/oauth/access_token",
            callback_url(public_url, AuthProvider::Github)?,
        )
        .map(Some)
    }

    /// Google config from `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET`. None when unset.
    pub fn google(public_url: &Url) -> Result<Option<Self>, ProviderError> {
        let Some((id, secret)) = credentials_from_env("GOOGLE") else {
            return Ok(None);
        };
        Self::new(
            id,
            secret,
            "https://accounts.google.com/o/oauth2/v2/auth",
            "https://oauth2.googleapis.com/token",
            callback_url(public_url, AuthProvider::Google)?,
        )
        .map(Some)
    }
}
