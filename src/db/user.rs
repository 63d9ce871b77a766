use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use super::repository::{StoreError, UserRepository};
use super::unix_now;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// User role for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "admin" => UserRole::Admin,
            _ => UserRole::User,
        }
    }
}

/// Where an account's identity comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Credentials,
    Google,
    Github,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Credentials => "credentials",
            AuthProvider::Google => "google",
            AuthProvider::Github => "github",
        }
    }

    /// Parse a provider name as it appears in URLs and the database.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "credentials" => Some(AuthProvider::Credentials),
            "google" => Some(AuthProvider::Google),
            "github" => Some(AuthProvider::Github),
            _ => None,
        }
    }
}

/// Lower-case and trim an email address. Emails are unique case-insensitively.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub uuid: String,
    pub email: String,
    pub name: String,
    pub password_hash: Option<String>,
    pub avatar_url: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    pub is_email_verified: bool,
    pub provider: AuthProvider,
    pub provider_id: Option<String>,
    pub created_at: i64,
    pub last_login_at: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    uuid: String,
    email: String,
    name: String,
    password_hash: Option<String>,
    avatar_url: Option<String>,
    role: String,
    is_active: i32,
    is_email_verified: i32,
    provider: String,
    provider_id: Option<String>,
    created_at: i64,
    last_login_at: Option<i64>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            uuid: row.uuid,
            email: row.email,
            name: row.name,
            password_hash: row.password_hash,
            avatar_url: row.avatar_url,
            role: UserRole::from_str(&row.role),
            is_active: row.is_active != 0,
            is_email_verified: row.is_email_verified != 0,
            provider: AuthProvider::parse(&row.provider).unwrap_or(AuthProvider::Credentials),
            provider_id: row.provider_id,
            created_at: row.created_at,
            last_login_at: row.last_login_at,
        }
    }
}

/// Fields for a new account. Built through the constructors below.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: Option<String>,
    pub avatar_url: Option<String>,
    pub role: UserRole,
    pub is_email_verified: bool,
    pub provider: AuthProvider,
    pub provider_id: Option<String>,
}

impl NewUser {
    /// A local account created at registration.
    pub fn credentials(email: &str, name: &str, password_hash: &str) -> Self {
        Self {
            email: normalize_email(email),
            name: name.to_string(),
            password_hash: Some(password_hash.to_string()),
            avatar_url: None,
            role: UserRole::User,
            is_email_verified: false,
            provider: AuthProvider::Credentials,
            provider_id: None,
        }
    }

    /// A provider-only account created on first OAuth login. Has no password.
    pub fn from_provider(
        email: &str,
        name: &str,
        avatar_url: Option<String>,
        provider: AuthProvider,
        provider_id: &str,
        is_email_verified: bool,
    ) -> Self {
        Self {
            email: normalize_email(email),
            name: name.to_string(),
            password_hash: None,
            avatar_url,
            role: UserRole::User,
            is_email_verified,
            provider,
            provider_id: Some(provider_id.to_string()),
        }
    }
}

/// Public user summary for the admin API. Does not expose internal database IDs.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UserSummary {
    pub uuid: String,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub provider: AuthProvider,
    pub is_active: bool,
    pub is_email_verified: bool,
    pub created_at: i64,
    pub last_login_at: Option<i64>,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            uuid: user.uuid,
            email: user.email,
            name: user.name,
            role: user.role,
            provider: user.provider,
            is_active: user.is_active,
            is_email_verified: user.is_email_verified,
            created_at: user.created_at,
            last_login_at: user.last_login_at,
        }
    }
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for UserStore {
    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let uuid = uuid::Uuid::new_v4().to_string();
        let now = unix_now();

        let result = sqlx::query(
            "INSERT INTO users (uuid, email, name, password_hash, avatar_url, role, is_email_verified, provider, provider_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&uuid)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(&user.avatar_url)
        .bind(user.role.as_str())
        .bind(user.is_email_verified as i32)
        .bind(user.provider.as_str())
        .bind(&user.provider_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::unique_or(e, StoreError::DuplicateEmail))?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, uuid, email, name, password_hash, avatar_url, role, is_active, is_email_verified, provider, provider_id, created_at, last_login_at
             FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn get_by_uuid(&self, uuid: &str) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, uuid, email, name, password_hash, avatar_url, role, is_active, is_email_verified, provider, provider_id, created_at, last_login_at
             FROM users WHERE uuid = ?",
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, uuid, email, name, password_hash, avatar_url, role, is_active, is_email_verified, provider, provider_id, created_at, last_login_at
             FROM users WHERE email = ?",
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn find_for_provider(
        &self,
        email: &str,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, uuid, email, name, password_hash, avatar_url, role, is_active, is_email_verified, provider, provider_id, created_at, last_login_at
             FROM users
             WHERE email = ? OR (provider = ? AND provider_id = ?)
             ORDER BY (provider = ? AND provider_id = ?) DESC
             LIMIT 1",
        )
        .bind(normalize_email(email))
        .bind(provider.as_str())
        .bind(provider_id)
        .bind(provider.as_str())
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn link_provider(
        &self,
        id: i64,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE users SET provider = ?, provider_id = ?, updated_at = ?
             WHERE id = ? AND provider_id IS NULL",
        )
        .bind(provider.as_str())
        .bind(provider_id)
        .bind(unix_now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_email_verified(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET is_email_verified = 1, updated_at = ? WHERE id = ?")
            .bind(unix_now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn touch_last_login(&self, id: i64, at: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login_at = ?, updated_at = ? WHERE id = ?")
            .bind(at)
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE users SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active as i32)
            .bind(unix_now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_role(&self, id: i64, role: UserRole) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(unix_now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_password_hash(&self, id: i64, hash: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(hash)
            .bind(unix_now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<UserSummary>, StoreError> {
        let rows: Vec<UserRow> = sqlx::query_as(
            "SELECT id, uuid, email, name, password_hash, avatar_url, role, is_active, is_email_verified, provider, provider_id, created_at, last_login_at
             FROM users ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| UserSummary::from(User::from(row)))
            .collect())
    }
}
