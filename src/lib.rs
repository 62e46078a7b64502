//! CareBook client - account and session layer for the CareBook
//! appointment booking service.
//!
//! This crate implements credential login, OTP-verified registration,
//! token persistence with transparent refresh, and authenticated resource
//! fetches against the CareBook REST API. The `carebook` binary is a thin
//! command-line front end over `SessionService`.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthOutcome, OtpOutcome, SessionService, SessionState};
pub use config::Config;
