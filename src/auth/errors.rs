//! Authentication error types.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use super::cookie::CookieSettings;

/// Outcome of a failed auth operation. Returned, never panicked.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No, invalid, expired or revoked credential.
    #[error("not authenticated")]
    Unauthenticated,

    /// Valid identity without the required role.
    #[error("insufficient permissions")]
    Forbidden,

    /// Store outage or timeout. Never reported as an auth denial.
    #[error("authentication backend unavailable")]
    Unavailable,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found")]
    NotFound,
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AuthError::Conflict(_) => StatusCode::CONFLICT,
            AuthError::NotFound => StatusCode::NOT_FOUND,
        }
    }

    /// User-facing message. Never includes internal detail.
    pub fn message(&self) -> String {
        match self {
            AuthError::Unauthenticated => "Not authenticated".to_string(),
            AuthError::Forbidden => "Insufficient permissions".to_string(),
            AuthError::Unavailable => "Service temporarily unavailable".to_string(),
            AuthError::BadRequest(msg) | AuthError::Conflict(msg) => msg.clone(),
            AuthError::NotFound => "Not found".to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response()
    }
}

/// API authentication error: JSON body, and the auth cookie is cleared on 401.
#[derive(Debug)]
pub struct ApiAuthError {
    pub error: AuthError,
    cookies: CookieSettings,
}

impl ApiAuthError {
    pub fn new(error: AuthError, cookies: &CookieSettings) -> Self {
        Self {
            error,
            cookies: cookies.clone(),
        }
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        let clear = self.error == AuthError::Unauthenticated;
        let mut response = self.error.into_response();

        if clear {
            if let Ok(value) = HeaderValue::from_str(&self.cookies.clear_cookie()) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }

        response
    }
}
