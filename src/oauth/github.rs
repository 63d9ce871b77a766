//! GitHub sign-in (authorization code + PKCE).
//!
//! Profiles come from `/user`. The address is always checked against
//! `/user/emails`: only a primary verified entry counts as verified.

use async_trait::async_trait;
use serde::Deserialize;

use crate::db::AuthProvider;

use super::client::CodeFlow;
use super::config::OAuthConfig;
use super::{AuthorizationRequest, IdentityProvider, ProviderError, ProviderProfile};

const USER_URL: &str = "https://api.github.com/user";
const EMAILS_URL: &str = "https://api.github.com/user/emails";
const USER_AGENT: &str = "gatehouse";

/// GitHub user info from API.
#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: i64,
    login: String,
    email: Option<String>,
    name: Option<String>,
    avatar_url: Option<String>,
}

/// GitHub email info from API.
#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

fn primary_verified(emails: &[GitHubEmail]) -> Option<String> {
    emails
        .iter()
        .find(|e| e.primary && e.verified)
        .map(|e| e.email.clone())
}

/// Pick the sign-in address and whether GitHub vouches for it.
/// The public profile email is trusted only when it is the primary verified
/// address; otherwise that address is used, and an unconfirmed public email
/// is passed on as unverified.
fn resolve_email(public: Option<String>, emails: &[GitHubEmail]) -> Option<(String, bool)> {
    let public = public.filter(|e| !e.trim().is_empty());
    let confirmed = |email: &str| {
        emails
            .iter()
            .any(|e| e.primary && e.verified && e.email.eq_ignore_ascii_case(email))
    };

    match public {
        Some(email) if confirmed(&email) => Some((email, true)),
        other => primary_verified(emails)
            .map(|email| (email, true))
            .or_else(|| other.map(|email| (email, false))),
    }
}

pub struct GitHubProvider {
    flow: CodeFlow,
    api: reqwest::Client,
}

impl GitHubProvider {
    pub fn new(config: OAuthConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            flow: CodeFlow::new(config, &["user:email", "read:user"])?,
            api: reqwest::Client::new(),
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T, ProviderError> {
        Ok(self
            .api
            .get(url)
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }
}

#[async_trait]
impl IdentityProvider for GitHubProvider {
    fn kind(&self) -> AuthProvider {
        AuthProvider::Github
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

        let user: GitHubUser = self.get(USER_URL, &access_token).await?;

        let emails: Vec<GitHubEmail> = self.get(EMAILS_URL, &access_token).await?;
        let (email, email_verified) =
            resolve_email(user.email, &emails).ok_or(ProviderError::NoEmail)?;

        Ok(ProviderProfile {
            provider_id: user.id.to_string(),
            email,
            name: user.name.or(Some(user.login)),
            avatar_url: user.avatar_url,
            email_verified,
        })
    }
}
