//! Shared-secret authentication.
//!
//! Every generation endpoint expects `Authorization: Bearer <secret>`. The
//! provided value is compared against the configured secret by SHA-256
//! digest, so the comparison cost does not depend on where the strings
//! diverge.

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

use crate::core::error::{AppError, Result};

/// Hash a secret for comparison.
pub fn hash_key(key: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.finalize().into()
}

/// Extract the Bearer token from the Authorization header.
fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
}

/// Verify the request against the configured shared secret.
pub fn verify_auth(headers: &HeaderMap, shared_secret: &str) -> Result<()> {
    let Some(provided) = extract_bearer(headers) else {
        tracing::debug!("Missing or malformed Authorization header");
        return Err(AppError::Unauthorized);
    };

    if hash_key(provided) != hash_key(shared_secret) {
        tracing::debug!("Shared secret mismatch");
        return Err(AppError::Unauthorized);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", value.parse().unwrap());
        headers
    }

    #[test]
    fn test_hash_key_is_deterministic() {
        assert_eq!(hash_key("secret"), hash_key("secret"));
        assert_ne!(hash_key("secret"), hash_key("other"));
    }

    #[test]
    fn test_valid_bearer_passes() {
        let headers = headers_with("Bearer my-password");
        assert!(verify_auth(&headers, "my-password").is_ok());
    }

    #[test]
    fn test_missing_header_fails() {
        let headers = HeaderMap::new();
        assert!(verify_auth(&headers, "my-password").is_err());
    }

    #[test]
    fn test_wrong_scheme_fails() {
        let headers = headers_with("Basic dXNlcjpwYXNz");
        assert!(verify_auth(&headers, "my-password").is_err());
    }

    #[test]
    fn test_wrong_secret_fails() {
        let headers = headers_with("Bearer not-the-password");
        assert!(verify_auth(&headers, "my-password").is_err());
    }

    #[test]
    fn test_secret_prefix_is_not_enough() {
        let headers = headers_with("Bearer my-password-and-more");
        assert!(verify_auth(&headers, "my-password").is_err());
    }
}
