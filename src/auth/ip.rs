//! Client IP extraction utilities.

use std::net::{IpAddr, SocketAddr};

use axum::{extract::ConnectInfo, http::request::Parts};

/// Trusted proxy header carrying the client IP.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientIpHeader {
    /// First entry of `X-Forwarded-For`
    XForwardedFor,
    XRealIp,
    CfConnectingIp,
}

impl ClientIpHeader {
    pub fn header_name(&self) -> &'static str {
        match self {
            ClientIpHeader::XForwardedFor => "x-forwarded-for",
            ClientIpHeader::XRealIp => "x-real-ip",
            ClientIpHeader::CfConnectingIp => "cf-connecting-ip",
        }
    }

    /// Parse the header value into a normalized IP string.
    pub fn parse(&self, value: &str) -> Option<String> {
        let candidate = match self {
            ClientIpHeader::XForwardedFor => value.split(',').next()?,
            _ => value,
        };
        candidate
            .trim()
            .parse::<IpAddr>()
            .ok()
            .map(|ip| ip.to_string())
    }
}

/// Trait for types that provide access to HTTP headers and extensions.
/// Implemented for both `Parts` and `Request` to allow flexible IP extraction.
pub trait HasHeadersAndExtensions {
    fn headers(&self) -> &axum::http::HeaderMap;
    fn extensions(&self) -> &axum::http::Extensions;
}

impl HasHeadersAndExtensions for Parts {
    fn headers(&self) -> &axum::http::HeaderMap {
        &self.headers
    }
    fn extensions(&self) -> &axum::http::Extensions {
        &self.extensions
    }
}

impl<B> HasHeadersAndExtensions for axum::extract::Request<B> {
    fn headers(&self) -> &axum::http::HeaderMap {
        axum::extract::Request::headers(self)
    }
    fn extensions(&self) -> &axum::http::Extensions {
        axum::extract::Request::extensions(self)
    }
}

/// Extract the client IP.
///
/// With a configured header, only that header is trusted (no fallback to the
/// socket address). Without one, the `ConnectInfo` peer address is used.
/// Returns None when neither is available, e.g. in router tests.
pub fn extract_client_ip<T: HasHeadersAndExtensions>(
    source: &T,
    ip_header: Option<ClientIpHeader>,
) -> Option<String> {
    match ip_header {
        Some(h) => {
            let value = source.headers().get(h.header_name())?.to_str().ok()?;
            h.parse(value)
        }
        None => source
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarded_for_takes_first_entry() {
        assert_eq!(
            ClientIpHeader::XForwardedFor.parse("203.0.113.7, 10.0.0.1"),
            Some("203.0.113.7".to_string())
        );
    }

    #[test]
    fn test_garbage_rejected() {
        assert_eq!(ClientIpHeader::XRealIp.parse("not-an-ip"), None);
        assert_eq!(
            ClientIpHeader::CfConnectingIp.parse(" ::1 "),
            Some("::1".to_string())
        );
    }

    #[test]
    fn test_extract_from_request() {
        let request = axum::http::Request::builder()
            .header("x-real-ip", "198.51.100.2")
            .body(())
            .unwrap();
        assert_eq!(
            extract_client_ip(&request, Some(ClientIpHeader::XRealIp)),
            Some("198.51.100.2".to_string())
        );
        assert_eq!(extract_client_ip(&request, None), None);
    }
}
