//! Client identity derivation from forwarding headers

use axum::http::HeaderMap;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Identity shared by every client without a usable address
pub const ANONYMOUS_IDENTITY: &str = "anonymous";

/// Headers consulted in order of trust
pub const IP_HEADER_SOURCES: &[&str] = &[
    "x-vercel-forwarded-for",
    "cf-connecting-ip",
    "x-forwarded-for",
    "x-real-ip",
    "x-client-ip",
];

/// Address shape of a header token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpKind {
    Ipv4,
    Ipv6,
    Invalid,
}

impl IpKind {
    pub fn classify(token: &str) -> Self {
        if token.parse::<Ipv4Addr>().is_ok() {
            IpKind::Ipv4
        } else if token.parse::<Ipv6Addr>().is_ok() {
            IpKind::Ipv6
        } else {
            IpKind::Invalid
        }
    }

    pub fn is_valid(self) -> bool {
        self != IpKind::Invalid
    }
}

/// First comma-separated token of a header value, trimmed
fn first_token(value: &str) -> Option<&str> {
    value.split(',').next().map(str::trim).filter(|t| !t.is_empty())
}

/// Client identity: first valid address from the recognized headers, else `anonymous`
pub fn client_identity(headers: &HeaderMap) -> String {
    for source in IP_HEADER_SOURCES {
        let Some(value) = headers.get(*source).and_then(|v| v.to_str().ok()) else {
            continue;
        };

        if let Some(token) = first_token(value) {
            if IpKind::classify(token).is_valid() {
                return token.to_string();
            }
        }
    }

    ANONYMOUS_IDENTITY.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_classify() {
        assert_eq!(IpKind::classify("192.168.1.1"), IpKind::Ipv4);
        assert_eq!(IpKind::classify("2001:db8::1"), IpKind::Ipv6);
        assert_eq!(IpKind::classify("invalid-ip"), IpKind::Invalid);
        assert_eq!(IpKind::classify("999.1.1.1"), IpKind::Invalid);
        assert_eq!(IpKind::classify(""), IpKind::Invalid);
    }

    #[test]
    fn test_vercel_header_wins() {
        let map = headers(&[
            ("x-vercel-forwarded-for", "192.168.1.1"),
            ("x-forwarded-for", "10.0.0.1"),
            ("x-real-ip", "172.16.0.1"),
        ]);
        assert_eq!(client_identity(&map), "192.168.1.1");
    }

    #[test]
    fn test_provider_header_only_uses_first_token() {
        let map = headers(&[("x-vercel-forwarded-for", " 203.0.113.7 , 10.0.0.1")]);
        assert_eq!(client_identity(&map), "203.0.113.7");
    }

    #[test]
    fn test_cloudflare_before_forwarded_for() {
        let map = headers(&[
            ("cf-connecting-ip", "203.0.113.1"),
            ("x-forwarded-for", "10.0.0.1"),
        ]);
        assert_eq!(client_identity(&map), "203.0.113.1");
    }

    #[test]
    fn test_comma_list_and_whitespace() {
        let map = headers(&[("x-forwarded-for", "  192.168.1.1  , 10.0.0.1  ")]);
        assert_eq!(client_identity(&map), "192.168.1.1");
    }

    #[test]
    fn test_skips_invalid_values() {
        let map = headers(&[("x-forwarded-for", "invalid-ip"), ("x-real-ip", "192.168.1.1")]);
        assert_eq!(client_identity(&map), "192.168.1.1");
    }

    #[test]
    fn test_ipv6_identity() {
        let map = headers(&[("x-forwarded-for", "2001:db8::1")]);
        assert_eq!(client_identity(&map), "2001:db8::1");
    }

    #[test]
    fn test_anonymous_fallback() {
        let map = headers(&[("x-forwarded-for", "invalid-ip"), ("x-real-ip", "also-invalid")]);
        assert_eq!(client_identity(&map), ANONYMOUS_IDENTITY);
        assert_eq!(client_identity(&HeaderMap::new()), ANONYMOUS_IDENTITY);
    }
}
