//! Gateway authentication — bearer token validation and identity extraction
//!
//! Token verification proper (signature checks, OAuth exchange) happens
//! upstream; this module validates the gateway's own admin token and lifts
//! the already-established caller identity out of request headers.

use axum::http::HeaderMap;
use tracing::warn;

use switchboard_core::IdentityContext;

/// Validate a bearer token against the configured gateway token.
///
/// Returns `true` if:
/// - No token is configured (auth disabled)
/// - The provided token matches the configured token
pub fn validate_token(configured_token: &str, provided_token: &str) -> bool {
    if configured_token.is_empty() {
        return true;
    }
    if provided_token.is_empty() {
        warn!("Gateway auth: no token provided");
        return false;
    }
    // Constant-time comparison to prevent timing attacks
    constant_time_eq(configured_token.as_bytes(), provided_token.as_bytes())
}

/// Extract bearer token from an Authorization header value.
///
/// Expects format: `Bearer <token>`
pub fn extract_bearer_token(header_value: &str) -> Option<&str> {
    let trimmed = header_value.trim();
    if let Some(token) = trimmed.strip_prefix("Bearer ") {
        let token = token.trim();
        if token.is_empty() {
            None
        } else {
            Some(token)
        }
    } else {
        None
    }
}

/// Check the gateway admin token carried in the Authorization header.
pub fn check_admin_auth(configured_token: &str, headers: &HeaderMap) -> bool {
    if configured_token.is_empty() {
        return true;
    }
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer_token)
        .is_some_and(|t| validate_token(configured_token, t))
}

/// Build the caller's identity context from out-of-band headers.
pub fn identity_from_headers(headers: &HeaderMap) -> IdentityContext {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let bearer_token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer_token)
        .map(str::to_string);

    IdentityContext {
        principal: header_str("x-principal").unwrap_or_else(|| "anonymous".to_string()),
        role: header_str("x-role"),
        bearer_token,
        api_key: header_str("x-api-key"),
    }
}

/// Constant-time byte comparison (prevents timing side-channels)
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_token_no_config() {
        assert!(validate_token("", "anything"));
        assert!(validate_token("", ""));
    }

    #[test]
    fn test_validate_token_match() {
        assert!(validate_token("secret123", "secret123"));
    }

    #[test]
    fn test_validate_token_mismatch() {
        assert!(!validate_token("secret123", "wrong"));
        assert!(!validate_token("secret123", ""));
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer_token("Bearer  spaced "), Some("spaced"));
        assert_eq!(extract_bearer_token("Bearer "), None);
        assert_eq!(extract_bearer_token("Basic abc123"), None);
        assert_eq!(extract_bearer_token(""), None);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }

    #[test]
    fn test_check_admin_auth() {
        let mut headers = HeaderMap::new();
        assert!(check_admin_auth("", &headers));
        assert!(!check_admin_auth("secret123", &headers));

        headers.insert("authorization", "Bearer secret123".parse().unwrap());
        assert!(check_admin_auth("secret123", &headers));

        headers.insert("authorization", "Bearer wrong".parse().unwrap());
        assert!(!check_admin_auth("secret123", &headers));
    }

    #[test]
    fn test_identity_from_headers_full() {
        let mut headers = HeaderMap::new();
        headers.insert("x-principal", "alice".parse().unwrap());
        headers.insert("x-role", "hr_admin".parse().unwrap());
        headers.insert("authorization", "Bearer tok-1".parse().unwrap());
        headers.insert("x-api-key", "key-1".parse().unwrap());

        let identity = identity_from_headers(&headers);
        assert_eq!(identity.principal, "alice");
        assert_eq!(identity.role.as_deref(), Some("hr_admin"));
        assert_eq!(identity.bearer_token.as_deref(), Some("tok-1"));
        assert_eq!(identity.api_key.as_deref(), Some("key-1"));
    }

    #[test]
    fn test_identity_from_headers_defaults() {
        let identity = identity_from_headers(&HeaderMap::new());
        assert_eq!(identity.principal, "anonymous");
        assert!(identity.role.is_none());
        assert!(identity.bearer_token.is_none());
        assert!(identity.api_key.is_none());
    }

    #[test]
    fn test_identity_ignores_blank_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-role", "  ".parse().unwrap());
        let identity = identity_from_headers(&headers);
        assert!(identity.role.is_none());
    }
}
