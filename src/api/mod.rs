//! REST API client module for the CareBook backend.
//!
//! This module provides the `ApiClient` for communicating with the
//! CareBook API: token issue and refresh, account endpoints, and
//! authenticated resource fetches.
//!
//! The API uses JWT bearer token authentication; the client attaches the
//! current access token and transparently refreshes it once when the
//! server rejects it.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
