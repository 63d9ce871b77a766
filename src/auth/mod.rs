//! Session-backed JWT authentication with role-based access control.
//!
//! Tokens are signed (HS256, 7 days) and every one is backed by a row in the
//! `sessions` table, which is the only source of truth for revocation.
//! Expired tokens whose session is still active can be refreshed in place.

mod cookie;
mod errors;
mod extractors;
mod guard;
mod ip;
mod role;
mod service;
mod state;
mod types;

pub use cookie::{AUTH_COOKIE_NAME, CookieSettings, bearer_token, extract_token, get_cookie};
pub use errors::{ApiAuthError, AuthError};
pub use extractors::{Auth, ClientMeta, OptionalAuth};
pub use guard::{GuardDecision, GuardState, RouteCategory, RouteTable, decide, route_guard};
pub use ip::{ClientIpHeader, HasHeadersAndExtensions, extract_client_ip};
pub use role::{AdminOnly, AnyRole, RoleConstraint, allows, require_role};
pub use service::{
    AuthService, AuthSettings, DEFAULT_STORE_TIMEOUT, PasswordChangePolicy, Registration,
};
pub use state::HasAuthBackend;
pub use types::{AuthenticatedUser, RefreshedToken, RequestMeta, SessionBundle};
