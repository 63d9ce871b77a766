//! Server-side session records.
//!
//! Every issued token is backed by exactly one row here. A session is usable
//! only while `is_active = 1` and `expires_at` lies in the future, and the
//! owning user's UUID must match the token's subject.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use super::repository::{SessionRepository, StoreError};
use super::unix_now;

#[derive(Debug, Clone)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub expires_at: i64,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub version: i64,
}

impl Session {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: i64,
    user_id: i64,
    token: String,
    expires_at: i64,
    user_agent: Option<String>,
    ip_address: Option<String>,
    is_active: i32,
    created_at: i64,
    updated_at: i64,
    version: i64,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            token: row.token,
            expires_at: row.expires_at,
            user_agent: row.user_agent,
            ip_address: row.ip_address,
            is_active: row.is_active != 0,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: i64,
    pub token: String,
    pub expires_at: i64,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Result of a compare-and-swap token replacement.
#[derive(Debug, Clone)]
pub enum ReplaceOutcome {
    Replaced,
    /// Another writer got there first (or the session was revoked).
    /// `current` is the row as it stands now, if it still exists.
    Conflict { current: Option<Session> },
}

#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for SessionStore {
    async fn create(&self, session: NewSession) -> Result<i64, StoreError> {
        let now = unix_now();
        let result = sqlx::query(
            "INSERT INTO sessions (user_id, token, expires_at, user_agent, ip_address, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session.user_id)
        .bind(&session.token)
        .bind(session.expires_at)
        .bind(&session.user_agent)
        .bind(&session.ip_address)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::unique_or(e, StoreError::DuplicateToken))?;

        Ok(result.last_insert_rowid())
    }

    async fn get(&self, id: i64) -> Result<Option<Session>, StoreError> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT id, user_id, token, expires_at, user_agent, ip_address, is_active, created_at, updated_at, version
             FROM sessions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Session::from))
    }

    async fn find_active(
        &self,
        token: &str,
        user_uuid: &str,
    ) -> Result<Option<Session>, StoreError> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT s.id, s.user_id, s.token, s.expires_at, s.user_agent, s.ip_address, s.is_active, s.created_at, s.updated_at, s.version
             FROM sessions s
             JOIN users u ON u.id = s.user_id
             WHERE s.token = ? AND u.uuid = ? AND s.is_active = 1 AND s.expires_at > ?",
        )
        .bind(token)
        .bind(user_uuid)
        .bind(unix_now())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Session::from))
    }

    async fn find_by_token(
        &self,
        token: &str,
        user_uuid: &str,
    ) -> Result<Option<Session>, StoreError> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT s.id, s.user_id, s.token, s.expires_at, s.user_agent, s.ip_address, s.is_active, s.created_at, s.updated_at, s.version
             FROM sessions s
             JOIN users u ON u.id = s.user_id
             WHERE s.token = ? AND u.uuid = ?",
        )
        .bind(token)
        .bind(user_uuid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Session::from))
    }

    async fn revoke(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE sessions SET is_active = 0, updated_at = ? WHERE id = ? AND is_active = 1",
        )
        .bind(unix_now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn replace(
        &self,
        id: i64,
        expected_token: &str,
        new_token: &str,
        new_expires_at: i64,
    ) -> Result<ReplaceOutcome, StoreError> {
        let result = sqlx::query(
            "UPDATE sessions
             SET token = ?, expires_at = ?, updated_at = ?, version = version + 1
             WHERE id = ? AND token = ? AND is_active = 1",
        )
        .bind(new_token)
        .bind(new_expires_at)
        .bind(unix_now())
        .bind(id)
        .bind(expected_token)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::unique_or(e, StoreError::DuplicateToken))?;

        if result.rows_affected() > 0 {
            return Ok(ReplaceOutcome::Replaced);
        }

        let current = self.get(id).await?;
        Ok(ReplaceOutcome::Conflict { current })
    }

    async fn list_active_for_user(&self, user_id: i64) -> Result<Vec<Session>, StoreError> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            "SELECT id, user_id, token, expires_at, user_agent, ip_address, is_active, created_at, updated_at, version
             FROM sessions
             WHERE user_id = ? AND is_active = 1 AND expires_at > ?
             ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .bind(unix_now())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Session::from).collect())
    }

    async fn revoke_all_for_user(
        &self,
        user_id: i64,
        except: Option<i64>,
    ) -> Result<u64, StoreError> {
        // -1 never matches an AUTOINCREMENT id
        let result = sqlx::query(
            "UPDATE sessions SET is_active = 0, updated_at = ?
             WHERE user_id = ? AND is_active = 1 AND id != ?",
        )
        .bind(unix_now())
        .bind(user_id)
        .bind(except.unwrap_or(-1))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_stale(&self, revoked_before: i64) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM sessions
             WHERE expires_at <= ? OR (is_active = 0 AND updated_at < ?)",
        )
        .bind(unix_now())
        .bind(revoked_before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
