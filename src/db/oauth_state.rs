use sqlx::sqlite::SqlitePool;

use super::unix_now;
use super::user::AuthProvider;

/// A pending OAuth authorization: the CSRF state handed to the provider
/// and the PKCE verifier needed to redeem the returned code.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub state: String,
    pub provider: AuthProvider,
    pub pkce_verifier: String,
    pub expires_at: i64,
}

/// Store for OAuth authorization state. Each state can be consumed once.
#[derive(Clone)]
pub struct OAuthStateStore {
    pool: SqlitePool,
}

impl OAuthStateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Remember a pending authorization for `ttl_secs`.
    pub async fn store(
        &self,
        state: &str,
        provider: AuthProvider,
        pkce_verifier: &str,
        ttl_secs: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR REPLACE INTO oauth_states (state, provider, pkce_verifier, expires_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(state)
        .bind(provider.as_str())
        .bind(pkce_verifier)
        .bind(unix_now() + ttl_secs)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Consume a pending authorization.
    ///
    /// The row is removed regardless of outcome. Returns None if the state is
    /// unknown, expired, or was issued for a different provider.
    pub async fn take(
        &self,
        state: &str,
        provider: AuthProvider,
    ) -> Result<Option<PendingAuthorization>, sqlx::Error> {
        let row: Option<(String, String, i64)> = sqlx::query_as(
            "DELETE FROM oauth_states WHERE state = ?
             RETURNING provider, pkce_verifier, expires_at",
        )
        .bind(state)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|(stored_provider, pkce_verifier, expires_at)| {
            if stored_provider != provider.as_str() || expires_at <= unix_now() {
                return None;
            }
            Some(PendingAuthorization {
                state: state.to_string(),
                provider,
                pkce_verifier,
                expires_at,
            })
        }))
    }

    /// Remove expired authorizations.
    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM oauth_states WHERE expires_at <= ?")
            .bind(unix_now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
