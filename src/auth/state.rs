//! Authentication state trait and macro.

use super::cookie::CookieSettings;
use super::ip::ClientIpHeader;
use super::service::AuthService;

/// Trait for state types that give extractors access to the auth core.
pub trait HasAuthBackend {
    fn auth(&self) -> &AuthService;
    fn cookies(&self) -> &CookieSettings;
    fn ip_header(&self) -> Option<ClientIpHeader>;
}

/// Macro to implement `HasAuthBackend` for state structs with the standard fields.
///
/// The struct must have these fields:
/// - `auth: AuthService`
/// - `cookies: CookieSettings`
/// - `ip_header: Option<ClientIpHeader>`
///
/// # Example
/// ```ignore
/// use crate::impl_has_auth_backend;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub auth: AuthService,
///     pub cookies: CookieSettings,
///     pub ip_header: Option<ClientIpHeader>,
///     // ... other fields
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn auth(&self) -> &$crate::auth::AuthService {
                &self.auth
            }
            fn cookies(&self) -> &$crate::auth::CookieSettings {
                &self.cookies
            }
            fn ip_header(&self) -> Option<$crate::auth::ClientIpHeader> {
                self.ip_header
            }
        }
    };
}
