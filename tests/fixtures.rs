//! Shared helpers for the integration suites: forged access tokens, a
//! service wired to a mock server, and direct session-file access.

#![allow(dead_code)]

use std::path::PathBuf;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::json;
use tempfile::TempDir;

use carebook::auth::{SessionService, TokenStore};
use carebook::config::Config;

/// Expiry far enough out that tests never race it (2100-01-01).
const FAR_FUTURE_EXP: i64 = 4_102_444_800;

/// Forge an access token whose payload carries the given identity. The
/// signature is junk; the client reads claims without verifying.
pub fn access_token(user_id: i64, email: &str, role: &str) -> String {
    access_token_with_exp(user_id, email, role, FAR_FUTURE_EXP)
}

/// Same as [`access_token`] with an explicit expiry, so two tokens for
/// the same user still differ as strings.
pub fn access_token_with_exp(user_id: i64, email: &str, role: &str, exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        json!({
            "user_id": user_id,
            "email": email,
            "user_type": role,
            "exp": exp,
        })
        .to_string(),
    );
    format!("{header}.{payload}.forged-signature")
}

/// Token endpoint body for a successful login.
pub fn token_body(access: &str, refresh: &str) -> serde_json::Value {
    json!({ "access": access, "refresh": refresh })
}

/// Profile body as `/accounts/me/` returns it.
pub fn profile_body(user_id: i64, email: &str) -> serde_json::Value {
    json!({
        "id": user_id,
        "email": email,
        "first_name": "Pat",
        "last_name": "Singh",
        "full_name": "Pat Singh",
        "user_type": "patient",
        "is_email_verified": true,
        "is_phone_verified": false,
    })
}

pub fn session_file(dir: &TempDir) -> PathBuf {
    dir.path().join("session.json")
}

/// Read the persisted session file back as JSON.
pub fn read_session_file(dir: &TempDir) -> serde_json::Value {
    let contents = std::fs::read_to_string(session_file(dir)).unwrap();
    serde_json::from_str(&contents).unwrap()
}

/// Build a service that talks to the given mock server and keeps its
/// session under `dir`.
pub fn service_at(base_url: &str, dir: &TempDir) -> SessionService {
    service_with_config(base_url, dir, false)
}

/// Same as [`service_at`] but with server-echoed debug OTP codes surfaced.
pub fn debug_otp_service_at(base_url: &str, dir: &TempDir) -> SessionService {
    service_with_config(base_url, dir, true)
}

fn service_with_config(base_url: &str, dir: &TempDir, expose_debug_otp: bool) -> SessionService {
    let config = Config {
        api_base_url: base_url.to_string(),
        expose_debug_otp,
        last_email: None,
    };
    SessionService::new(config, TokenStore::new(session_file(dir))).unwrap()
}

/// Seed a persisted session the way a previous run would have left it.
pub fn write_stored_session(dir: &TempDir, access: &str, refresh: &str) {
    let body = json!({
        "access": access,
        "refresh": refresh,
        "user": { "id": 7, "email": "saved@example.com", "role": "patient" },
        "saved_at": "2026-08-20T10:00:00Z",
    });
    std::fs::write(session_file(dir), body.to_string()).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forged_token_has_decodable_payload() {
        let token = access_token(42, "dr.lee@example.com", "doctor");
        let segments: Vec<&str> = token.split('.').collect();
        assert_eq!(segments.len(), 3);

        let payload = URL_SAFE_NO_PAD.decode(segments[1]).unwrap();
        let claims: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(claims["user_id"], 42);
        assert_eq!(claims["user_type"], "doctor");
    }

    #[test]
    fn test_tokens_for_same_user_differ_by_expiry() {
        let first = access_token(7, "pat@example.com", "patient");
        let second = access_token_with_exp(7, "pat@example.com", "patient", FAR_FUTURE_EXP + 3600);
        assert_ne!(first, second);
    }
}
