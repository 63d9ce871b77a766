//! Axum extractors for authentication.

use std::marker::PhantomData;

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use super::cookie::extract_token;
use super::errors::{ApiAuthError, AuthError};
use super::ip::extract_client_ip;
use super::role::{AnyRole, RoleConstraint, allows};
use super::state::HasAuthBackend;
use super::types::{AuthenticatedUser, RequestMeta};

/// Authenticated caller satisfying role `R`.
///
/// Reuses the identity the route guard already resolved when present,
/// otherwise validates the presented token. Returns JSON errors.
pub struct Auth<R = AnyRole>(pub AuthenticatedUser, PhantomData<R>);

impl<R> Auth<R> {
    pub fn user(&self) -> &AuthenticatedUser {
        &self.0
    }
}

async fn resolve_user<S>(parts: &Parts, state: &S) -> Result<AuthenticatedUser, AuthError>
where
    S: HasAuthBackend + Send + Sync,
{
    if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
        return Ok(user.clone());
    }
    let token = extract_token(&parts.headers).ok_or(AuthError::Unauthenticated)?;
    state.auth().validate(token).await
}

impl<S, R> FromRequestParts<S> for Auth<R>
where
    S: HasAuthBackend + Send + Sync,
    R: RoleConstraint + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = resolve_user(parts, state)
            .await
            .map_err(|e| ApiAuthError::new(e, state.cookies()))?;

        if !allows(user.role, R::REQUIRED) {
            return Err(ApiAuthError::new(AuthError::Forbidden, state.cookies()));
        }

        Ok(Auth(user, PhantomData))
    }
}

/// Optional authentication extractor - never fails.
/// Store outages are treated as anonymous here.
pub struct OptionalAuth(pub Option<AuthenticatedUser>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(OptionalAuth(Some(user.clone())));
        }
        Ok(OptionalAuth(state.auth().authenticate(&parts.headers).await))
    }
}

/// Device metadata recorded on new sessions.
pub struct ClientMeta(pub RequestMeta);

impl<S> FromRequestParts<S> for ClientMeta
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|ua| ua.chars().take(512).collect());

        Ok(ClientMeta(RequestMeta {
            user_agent,
            ip_address: extract_client_ip(parts, state.ip_header()),
        }))
    }
}
