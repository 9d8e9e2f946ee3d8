//! Subscriber tokens.
//!
//! A token is `base64url(claims JSON) + "." + base64url(HMAC-SHA256)`,
//! signed with the relay secret. Producers hold the secret itself;
//! subscribers get a token scoping them to the topics an operator
//! granted. Verification is pure, so it costs nothing per connection
//! beyond one HMAC.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use ring::hmac;
use serde::{Deserialize, Serialize};

/// Claims carried inside a subscriber token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    /// Subject the token was issued to, used for ban checks and logs.
    pub sub: String,

    /// Topics this token may subscribe to. Requests can narrow this
    /// set but never widen it.
    pub topics: Vec<String>,

    /// Issued-at, unix seconds.
    pub iat: i64,

    /// Expiry, unix seconds.
    pub exp: i64,
}

impl TokenClaims {
    pub fn permits(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t == topic)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("bad signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
}

fn signing_key(secret: &str) -> hmac::Key {
    hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes())
}

/// Sign claims into a token string.
pub fn issue(secret: &str, claims: &TokenClaims) -> Result<String, serde_json::Error> {
    let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
    let tag = hmac::sign(&signing_key(secret), body.as_bytes());
    Ok(format!("{}.{}", body, URL_SAFE_NO_PAD.encode(tag.as_ref())))
}

/// Verify a token string and return its claims.
///
/// The signature is checked before the claims are even parsed, so a
/// forged body never reaches the JSON parser. `now` is passed in to
/// keep verification pure.
pub fn verify(secret: &str, token: &str, now: i64) -> Result<TokenClaims, TokenError> {
    let (body, tag) = token.split_once('.').ok_or(TokenError::Malformed)?;
    let tag = URL_SAFE_NO_PAD
        .decode(tag)
        .map_err(|_| TokenError::Malformed)?;

    hmac::verify(&signing_key(secret), body.as_bytes(), &tag)
        .map_err(|_| TokenError::BadSignature)?;

    let body = URL_SAFE_NO_PAD
        .decode(body)
        .map_err(|_| TokenError::Malformed)?;
    let claims: TokenClaims =
        serde_json::from_slice(&body).map_err(|_| TokenError::Malformed)?;

    if claims.exp <= now {
        return Err(TokenError::Expired);
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef";

    fn claims() -> TokenClaims {
        TokenClaims {
            sub: "account:93000001".into(),
            topics: vec!["waitlist".into(), "account:93000001".into()],
            iat: 1_700_000_000,
            exp: 1_700_003_600,
        }
    }

    #[test]
    fn round_trip() {
        let token = issue(SECRET, &claims()).unwrap();
        let verified = verify(SECRET, &token, 1_700_000_100).unwrap();
        assert_eq!(verified, claims());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = issue(SECRET, &claims()).unwrap();
        assert_eq!(
            verify(SECRET, &token, 1_700_003_600),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn tampered_body_is_rejected() {
        let token = issue(SECRET, &claims()).unwrap();
        let (_, tag) = token.split_once('.').unwrap();
        let mut forged = TokenClaims {
            topics: vec!["admin".into()],
            ..claims()
        };
        forged.sub = "attacker".into();
        let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        let doctored = format!("{}.{}", body, tag);
        assert_eq!(
            verify(SECRET, &doctored, 1_700_000_100),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue(SECRET, &claims()).unwrap();
        assert_eq!(
            verify("another-secret-value", &token, 1_700_000_100),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(verify(SECRET, "", 0), Err(TokenError::Malformed));
        assert_eq!(verify(SECRET, "nodot", 0), Err(TokenError::Malformed));
        assert_eq!(
            verify(SECRET, "body.!!notbase64!!", 0),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn permits_exact_topics_only() {
        let c = claims();
        assert!(c.permits("waitlist"));
        assert!(!c.permits("fleet"));
        assert!(!c.permits("waitlist2"));
    }
}
