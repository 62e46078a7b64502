//! Authentication module for managing tokens and the session lifecycle.
//!
//! This module provides:
//! - `TokenStore`: Atomic persistence of the token pair and signed-in user
//! - `TokenVault`: In-memory token state shared with the API client
//! - `SessionService`: The session state machine and its operations
//!
//! Tokens are stored on disk between launches and validated on startup.

pub mod claims;
pub mod session;
pub mod store;
pub mod vault;

pub use session::{user_message, AuthOutcome, OtpOutcome, SessionService, SessionState};
pub use store::{StoredSession, TokenPair, TokenStore};
pub use vault::{SessionEvent, TokenVault};
