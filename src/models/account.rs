//! Wire types for the token and account endpoints.
//!
//! The backend speaks snake_case JSON with DRF conventions: per-field error
//! maps on 400, `detail` strings on auth failures, and optional fields
//! simply omitted.

use serde::{Deserialize, Serialize};

use crate::models::UserRole;

/// Delivery channel for one-time passcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpChannel {
    Email,
    Phone,
}

impl OtpChannel {
    /// Wire value for the `otp_type` field.
    pub fn otp_type(&self) -> &'static str {
        match self {
            OtpChannel::Email => "email",
            OtpChannel::Phone => "phone",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// The refresh endpoint always returns a fresh access token; deployments
/// with rotation enabled include a replacement refresh token as well.
#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendOtpRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub otp_type: &'static str,
}

impl SendOtpRequest {
    pub fn new(identifier: &str, channel: OtpChannel) -> Self {
        let (email, phone_number) = match channel {
            OtpChannel::Email => (Some(identifier.to_string()), None),
            OtpChannel::Phone => (None, Some(identifier.to_string())),
        };
        Self {
            email,
            phone_number,
            otp_type: channel.otp_type(),
        }
    }
}

/// `otp_code` and `debug_note` only appear on debug deployments of the
/// backend; production servers never echo the code.
#[derive(Debug, Deserialize)]
pub struct SendOtpResponse {
    pub message: String,
    #[serde(default)]
    pub expires_in_minutes: Option<u32>,
    #[serde(default)]
    pub otp_code: Option<String>,
    #[serde(default)]
    pub debug_note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyOtpRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub otp_type: &'static str,
    pub otp_code: String,
}

impl VerifyOtpRequest {
    pub fn new(identifier: &str, channel: OtpChannel, code: &str) -> Self {
        let (email, phone_number) = match channel {
            OtpChannel::Email => (Some(identifier.to_string()), None),
            OtpChannel::Phone => (None, Some(identifier.to_string())),
        };
        Self {
            email,
            phone_number,
            otp_type: channel.otp_type(),
            otp_code: code.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpResponse {
    #[serde(default)]
    pub verified: bool,
    pub message: String,
}

/// Registration payload for the two-phase OTP flow. The OTP must have been
/// requested for the same email beforehand.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub user_type: UserRole,
    pub otp_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_otp_request_picks_one_identifier() {
        let by_email = SendOtpRequest::new("amy@example.com", OtpChannel::Email);
        let json = serde_json::to_value(&by_email).unwrap();
        assert_eq!(json["email"], "amy@example.com");
        assert_eq!(json["otp_type"], "email");
        assert!(json.get("phone_number").is_none());

        let by_phone = SendOtpRequest::new("+8801712345678", OtpChannel::Phone);
        let json = serde_json::to_value(&by_phone).unwrap();
        assert_eq!(json["phone_number"], "+8801712345678");
        assert_eq!(json["otp_type"], "phone");
        assert!(json.get("email").is_none());
    }

    #[test]
    fn test_register_request_wire_shape() {
        let request = RegisterRequest {
            email: "amy@example.com".to_string(),
            password: "s3cret-pw".to_string(),
            user_type: UserRole::Patient,
            otp_code: "123456".to_string(),
            first_name: Some("Amy".to_string()),
            last_name: None,
            phone_number: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["user_type"], "patient");
        assert_eq!(json["otp_code"], "123456");
        assert!(json.get("last_name").is_none());
    }

    #[test]
    fn test_refresh_response_without_rotation() {
        let response: RefreshResponse = serde_json::from_str(r#"{"access": "new-token"}"#).unwrap();
        assert_eq!(response.access, "new-token");
        assert!(response.refresh.is_none());
    }
}
