//! Google sign-in (authorization code + PKCE, v2 userinfo).

use async_trait::async_trait;
use serde::Deserialize;

use crate::db::AuthProvider;

use super::client::CodeFlow;
use super::config::OAuthConfig;
use super::{AuthorizationRequest, IdentityProvider, ProviderError, ProviderProfile};

const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Google user info from API.
#[derive(Debug, Deserialize)]
struct GoogleUser {
    id: String,
    email: Option<String>,
    #[serde(default)]
    verified_email: bool,
    name: Option<String>,
    picture: Option<String>,
}

impl GoogleUser {
    fn into_profile(self) -> Result<ProviderProfile, ProviderError> {
        let email = self
            .email
            .filter(|e| !e.trim().is_empty())
            .ok_or(ProviderError::NoEmail)?;
        Ok(ProviderProfile {
            provider_id: self.id,
            email,
            name: self.name,
            avatar_url: self.picture,
            email_verified: self.verified_email,
        })
    }
}

pub struct GoogleProvider {
    flow: CodeFlow,
    api: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(config: OAuthConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            flow: CodeFlow::new(config, &["openid", "email", "profile"])?,
            api: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn kind(&self) -> AuthProvider {
        AuthProvider::Google
    }

    fn authorize(&self) -> AuthorizationRequest {
        self.flow.authorize()
    }

    async fn fetch_profile(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<ProviderProfile, ProviderError> {
        let access_token = self.flow.exchange(code, pkce_verifier).await?;

        let user: GoogleUser = self
            .api
            .get(USERINFO_URL)
            .bearer_auth(&access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        user.into_profile()
    }
}
