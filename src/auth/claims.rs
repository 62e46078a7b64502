//! Unverified JWT payload decoding.
//!
//! The access token's claims seed the local user snapshot at login. They
//! are decoded without signature verification because the client holds no
//! signing key; nothing security-relevant hangs on them, and the server
//! re-checks the token on every request.

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

use crate::models::{SessionUser, UserRole};

/// Claims the backend embeds in access tokens. Standard claims the client
/// does not use (`iat`, `jti`) are ignored.
#[derive(Debug, Deserialize)]
pub struct AccessClaims {
    pub user_id: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "role")]
    pub user_type: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Decode the payload segment of a JWT without verifying the signature.
pub fn decode_claims(token: &str) -> Result<AccessClaims> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        bail!("Malformed JWT: expected 3 segments, got {}", parts.len());
    }
    let payload = URL_SAFE_NO_PAD
        .decode(parts[1])
        .context("JWT payload is not valid base64url")?;
    serde_json::from_slice(&payload).context("JWT payload is not a valid claims document")
}

/// Build the session user snapshot from an access token.
///
/// The email claim is optional; `fallback_email` (the address the user
/// signed in with) covers tokens that omit it. A missing or unrecognized
/// role claim is an error - the client never guesses an account role.
pub fn session_user_from_access(access: &str, fallback_email: &str) -> Result<SessionUser> {
    let claims = decode_claims(access)?;

    let role = match claims.user_type.as_deref() {
        Some(raw) => UserRole::parse(raw)
            .ok_or_else(|| anyhow!("Unrecognized account role in token: {raw:?}"))?,
        None => bail!("Access token carries no account role claim"),
    };

    let email = claims
        .email
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| fallback_email.to_string());

    Ok(SessionUser {
        id: claims.user_id,
        email,
        role,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token_with_payload(payload: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());
        format!("{header}.{body}.test-signature")
    }

    #[test]
    fn test_decode_full_claims() {
        let token = token_with_payload(json!({
            "token_type": "access",
            "user_id": 7,
            "email": "dana@example.com",
            "user_type": "doctor",
            "exp": 4102444800i64,
            "jti": "abc123"
        }));
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.email.as_deref(), Some("dana@example.com"));
        assert_eq!(claims.user_type.as_deref(), Some("doctor"));
        assert_eq!(claims.exp, Some(4102444800));
    }

    #[test]
    fn test_role_alias_is_accepted() {
        let token = token_with_payload(json!({"user_id": 1, "role": "patient"}));
        let user = session_user_from_access(&token, "pat@example.com").unwrap();
        assert_eq!(user.role, UserRole::Patient);
    }

    #[test]
    fn test_fallback_email_fills_missing_claim() {
        let token = token_with_payload(json!({"user_id": 3, "user_type": "patient"}));
        let user = session_user_from_access(&token, "login@example.com").unwrap();
        assert_eq!(user.email, "login@example.com");
        assert_eq!(user.id, 3);
    }

    #[test]
    fn test_missing_role_is_an_error() {
        let token = token_with_payload(json!({"user_id": 3}));
        assert!(session_user_from_access(&token, "a@b.c").is_err());
    }

    #[test]
    fn test_unknown_role_is_an_error() {
        let token = token_with_payload(json!({"user_id": 3, "user_type": "superuser"}));
        assert!(session_user_from_access(&token, "a@b.c").is_err());
    }

    #[test]
    fn test_malformed_tokens_are_rejected() {
        assert!(decode_claims("only-one-segment").is_err());
        assert!(decode_claims("two.segments").is_err());
        assert!(decode_claims("a.!!notbase64!!.c").is_err());

        let header = URL_SAFE_NO_PAD.encode(b"{}");
        let not_json = URL_SAFE_NO_PAD.encode(b"plain text");
        assert!(decode_claims(&format!("{header}.{not_json}.sig")).is_err());
    }
}
