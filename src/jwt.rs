//! JWT token issuance and verification.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::{UserRole, unix_now};

/// Token lifetime: 7 days. Also the cookie Max-Age.
pub const TOKEN_DURATION_SECS: i64 = 7 * 24 * 60 * 60;

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    /// Public user UUID
    pub user_id: String,
    pub email: String,
    pub role: UserRole,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Random per-issuance ID. Tokens are unique session keys, so two
    /// issuances within the same second must still differ.
    pub jti: String,
}

/// A freshly signed token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("JWT signing secret is missing or empty")]
    MissingSecret,

    #[error("token has expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(jsonwebtoken::errors::Error),

    #[error("failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtConfig {
    /// Create a JWT configuration. An empty secret is refused.
    pub fn new(secret: &[u8]) -> Result<Self, JwtError> {
        if secret.is_empty() {
            return Err(JwtError::MissingSecret);
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        })
    }

    /// Issue a token valid for [`TOKEN_DURATION_SECS`].
    pub fn issue(
        &self,
        user_uuid: &str,
        email: &str,
        role: UserRole,
    ) -> Result<IssuedToken, JwtError> {
        let now = unix_now();
        let claims = Claims {
            user_id: user_uuid.to_string(),
            email: email.to_string(),
            role,
            iat: now,
            exp: now + TOKEN_DURATION_SECS,
            jti: uuid::Uuid::new_v4().to_string(),
        };
        let token = self.sign(&claims)?;
        Ok(IssuedToken {
            token,
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }

    /// Sign arbitrary claims with HS256.
    pub fn sign(&self, claims: &Claims) -> Result<String, JwtError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(JwtError::Encoding)
    }

    /// Verify signature and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        self.decode(token, true)
    }

    /// Verify the signature but accept an expired token.
    ///
    /// Only the refresh path may use this: an expired token still proves
    /// which session it belonged to.
    pub fn decode_expired(&self, token: &str) -> Result<Claims, JwtError> {
        self.decode(token, false)
    }

    fn decode(&self, token: &str, validate_exp: bool) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = validate_exp;

        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::Invalid(e),
            })
    }
}
