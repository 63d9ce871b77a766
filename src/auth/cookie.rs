//! Token transport: the `auth_token` cookie and the Bearer header.

use axum::http::{HeaderMap, header};

use crate::jwt::TOKEN_DURATION_SECS;

/// Cookie name for the session token.
pub const AUTH_COOKIE_NAME: &str = "auth_token";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// The presented token. The Authorization header wins over the cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<&str> {
    bearer_token(headers).or_else(|| get_cookie(headers, AUTH_COOKIE_NAME).filter(|t| !t.is_empty()))
}

/// Attributes for the session cookie, derived from the deployment environment.
#[derive(Debug, Clone, Default)]
pub struct CookieSettings {
    /// Add the Secure flag (production).
    pub secure: bool,
    pub domain: Option<String>,
}

impl CookieSettings {
    fn attributes(&self) -> String {
        let mut attrs = String::from("HttpOnly; SameSite=Lax; Path=/");
        if let Some(domain) = &self.domain {
            attrs.push_str("; Domain=");
            attrs.push_str(domain);
        }
        if self.secure {
            attrs.push_str("; Secure");
        }
        attrs
    }

    /// `Set-Cookie` value carrying a freshly issued token.
    pub fn session_cookie(&self, token: &str) -> String {
        format!(
            "{}={}; {}; Max-Age={}",
            AUTH_COOKIE_NAME,
            token,
            self.attributes(),
            TOKEN_DURATION_SECS
        )
    }

    /// `Set-Cookie` value that removes the token.
    pub fn clear_cookie(&self) -> String {
        format!("{}=; {}; Max-Age=0", AUTH_COOKIE_NAME, self.attributes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_get_cookie_multiple() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("foo=bar; auth_token=abc123; theme=dark"),
        );

        assert_eq!(get_cookie(&headers, "auth_token"), Some("abc123"));
        assert_eq!(get_cookie(&headers, "foo"), Some("bar"));
        assert_eq!(get_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_get_cookie_with_spaces() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("  auth_token = abc123  ; foo=bar"),
        );

        assert_eq!(get_cookie(&headers, "auth_token"), Some("abc123"));
    }

    #[test]
    fn test_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("auth_token=cookie"));
        assert_eq!(extract_token(&headers), Some("cookie"));

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer header"),
        );
        assert_eq!(extract_token(&headers), Some("header"));
    }

    #[test]
    fn test_non_bearer_scheme_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        );
        assert_eq!(extract_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_token(&headers), None);
    }

    #[test]
    fn test_empty_cookie_is_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("auth_token="));
        assert_eq!(extract_token(&headers), None);
    }

    #[test]
    fn test_cookie_attributes() {
        let dev = CookieSettings::default();
        let cookie = dev.session_cookie("tok");
        assert_eq!(
            cookie,
            "auth_token=tok; HttpOnly; SameSite=Lax; Path=/; Max-Age=604800"
        );

        let prod = CookieSettings {
            secure: true,
            domain: Some("example.com".to_string()),
        };
        let cookie = prod.session_cookie("tok");
        assert!(cookie.contains("; Secure"));
        assert!(cookie.contains("; Domain=example.com"));
        assert!(prod.clear_cookie().ends_with("Max-Age=0"));
    }
}
