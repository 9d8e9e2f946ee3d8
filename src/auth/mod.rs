//! Authentication primitives.
//!
//! Two credentials exist. Producers and the admin API present the
//! relay secret (or admin key) directly as a Bearer value; subscribers
//! present signed tokens minted from that secret (see `token`).
//! Secret comparison is constant-time throughout.

pub mod token;

pub use token::{issue, verify, TokenClaims, TokenError};

/// Constant-time comparison of a presented credential against the
/// expected one. An empty expected value never matches, so a relay
/// misconfigured with a blank secret fails closed.
pub fn verify_secret(expected: &str, presented: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    ring::constant_time::verify_slices_are_equal(expected.as_bytes(), presented.as_bytes())
        .is_ok()
}

/// Extract the credential from an `Authorization: Bearer ...` value.
pub fn parse_bearer(header: &str) -> Option<&str> {
    header.strip_prefix("Bearer ").map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_comparison() {
        assert!(verify_secret("0123456789abcdef", "0123456789abcdef"));
        assert!(!verify_secret("0123456789abcdef", "0123456789abcdeg"));
        assert!(!verify_secret("0123456789abcdef", ""));
    }

    #[test]
    fn blank_expected_fails_closed() {
        assert!(!verify_secret("", ""));
        assert!(!verify_secret("", "anything"));
    }

    #[test]
    fn bearer_extraction() {
        assert_eq!(parse_bearer("Bearer abc123"), Some("abc123"));
        assert_eq!(parse_bearer("Bearer  abc123 "), Some("abc123"));
        assert_eq!(parse_bearer("Basic abc123"), None);
        assert_eq!(parse_bearer("abc123"), None);
    }
}
