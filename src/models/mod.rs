//! Data models for the CareBook API.
//!
//! This module contains the wire and domain types used across the client:
//!
//! - `SessionUser`, `UserRole`, `UserProfile`: identity and profile data
//! - Account types: token, OTP, and registration requests/responses
//! - `DoctorSummary`, `DoctorQuery`: the public doctor directory

pub mod account;
pub mod doctor;
pub mod user;

pub use account::{
    OtpChannel, RefreshRequest, RefreshResponse, RegisterRequest, SendOtpRequest, SendOtpResponse,
    TokenRequest, VerifyOtpRequest, VerifyOtpResponse,
};
pub use doctor::{DoctorQuery, DoctorSummary};
pub use user::{SessionUser, UserProfile, UserRole};
