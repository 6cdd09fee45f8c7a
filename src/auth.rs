//! Handshake credential extraction and token digests

use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};

/// Pull the bearer token out of the WebSocket handshake.
///
/// `Authorization: Bearer <token>` wins; browsers cannot set headers on a
/// WebSocket upgrade, so the `token` query parameter is accepted as a fallback.
pub fn extract_credential(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    let from_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty());

    from_header.or_else(|| {
        query_token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
    })
}

/// Hex-encoded SHA-256 of a token, the form tokens are stored in
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Constant-time byte comparison to prevent timing attacks
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
