//! CLI argument parsing, validation, and startup helpers.

use std::time::Duration;

use crate::auth::{AuthSettings, ClientIpHeader, CookieSettings, PasswordChangePolicy, RouteTable};
use crate::db::{Database, UserRepository, UserRole};
use crate::oauth::OAuthProviders;
use crate::{ConfigError, ServerConfig};
use clap::Parser;
use tracing::{error, info, warn};
use url::Url;

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    /// Cookies get the Secure flag
    Production,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Gatehouse",
    about = "Session-backed authentication for web applications"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "gatehouse.db")]
    pub database: String,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,

    /// Deployment environment
    #[arg(long, env = "APP_ENV", default_value = "development")]
    pub environment: Environment,

    /// Domain attribute for the auth cookie
    #[arg(long, env = "COOKIE_DOMAIN")]
    pub cookie_domain: Option<String>,

    /// Public base URL, used to build OAuth redirect URIs
    #[arg(long, env = "PUBLIC_URL", default_value = "http://localhost:8080")]
    pub public_url: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Refuse password login until the account's email is verified
    #[arg(long)]
    pub require_verified_email: bool,

    /// What happens to other sessions when a user changes their password
    #[arg(long, default_value = "invalidate-others")]
    pub password_change_policy: PasswordChangePolicy,

    /// Deadline for each session/user store call, in milliseconds
    #[arg(long, default_value = "5000")]
    pub store_timeout_ms: u64,

    /// Trusted header carrying the client IP (requires running behind a proxy)
    #[arg(long)]
    pub ip_header: Option<ClientIpHeader>,

    /// Grant the admin role to the account with this email on startup
    #[arg(long)]
    pub promote_admin: Option<String>,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Parse and validate the public URL.
/// Returns None and logs an error if validation fails.
pub fn validate_public_url(public_url: &str, environment: Environment) -> Option<Url> {
    let url = match Url::parse(public_url) {
        Ok(url) => url,
        Err(e) => {
            error!(url = %public_url, error = %e, "Invalid public URL");
            return None;
        }
    };

    if !matches!(url.scheme(), "http" | "https") {
        error!(url = %public_url, "Public URL must use http or https");
        return None;
    }

    if environment == Environment::Production && url.scheme() != "https" {
        warn!(url = %public_url, "Production deployment without HTTPS; Secure cookies will not be sent back over plain HTTP");
    }

    Some(url)
}

/// Grant the admin role to an existing account. Returns false if it failed.
pub async fn promote_admin(db: &Database, email: &str) -> bool {
    let users = db.users();
    match users.get_by_email(email).await {
        Ok(Some(user)) => match users.set_role(user.id, UserRole::Admin).await {
            Ok(_) => {
                info!(user_id = user.id, "Promoted user to admin");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to promote user");
                false
            }
        },
        Ok(None) => {
            error!(email = %email, "No account with this email to promote");
            false
        }
        Err(e) => {
            error!(error = %e, "Failed to look up user");
            false
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    public_url: Url,
    jwt_secret: String,
) -> Result<ServerConfig, ConfigError> {
    let providers = OAuthProviders::from_env(&public_url)?;
    for kind in providers.enabled() {
        info!(provider = kind.as_str(), "OAuth provider enabled");
    }

    Ok(ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        cookies: CookieSettings {
            secure: args.environment == Environment::Production,
            domain: args.cookie_domain.clone(),
        },
        auth: AuthSettings {
            store_timeout: Duration::from_millis(args.store_timeout_ms),
            password_change_policy: args.password_change_policy,
            require_verified_email: args.require_verified_email,
        },
        ip_header: args.ip_header,
        routes: RouteTable::default(),
        providers,
    })
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
