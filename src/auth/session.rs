//! Session lifecycle management.
//!
//! `SessionService` owns the session state machine and the operations a
//! front end calls: startup validation, login, logout, OTP dispatch and
//! verification, and registration. Every operation resolves to a plain
//! outcome value; callers branch on `success` instead of catching errors,
//! and raw credentials never outlive the request that uses them.
//!
//! The service is shared by handle: operations take `&self`, and a
//! generation counter discards results that finish after a newer operation
//! (typically a logout) has already moved the state machine on.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::auth::claims;
use crate::auth::store::{StoredSession, TokenStore};
use crate::auth::vault::{SessionEvent, TokenVault};
use crate::config::Config;
use crate::models::{OtpChannel, RegisterRequest, SendOtpRequest, SessionUser, VerifyOtpRequest};

/// Where the session state machine currently stands.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Startup validation is still running.
    Initializing,
    Authenticated(SessionUser),
    Unauthenticated,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    pub fn user(&self) -> Option<&SessionUser> {
        match self {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }
}

/// Uniform result of a session operation.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl AuthOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}

/// Outcome of an OTP dispatch. `debug_code` is only populated when the
/// config opts into exposing server-echoed codes; production configs never
/// see one even if the server sent it.
#[derive(Debug, Clone, PartialEq)]
pub struct OtpOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub debug_code: Option<String>,
}

impl OtpOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            debug_code: None,
        }
    }
}

/// Map an API error to something a person can act on.
pub fn user_message(error: &ApiError) -> String {
    match error {
        ApiError::Unauthorized => "Your session has expired. Please log in again.".to_string(),
        ApiError::Validation(message) => message.clone(),
        ApiError::AccessDenied(_) => "You do not have access to this resource.".to_string(),
        ApiError::NotFound(message) => message.clone(),
        ApiError::RateLimited => "The server is busy. Please wait a moment and try again.".to_string(),
        ApiError::Network(inner) if inner.is_timeout() => {
            "Connection timed out. Please try again.".to_string()
        }
        ApiError::Network(_) => {
            "Unable to connect to the server. Check your internet connection.".to_string()
        }
        other => format!("Request failed: {other}"),
    }
}

/// Login-specific wording: a 401 on the token endpoint means bad
/// credentials, not an expired session.
fn login_error_message(error: &ApiError) -> String {
    match error {
        ApiError::Unauthorized => "Invalid email or password".to_string(),
        other => user_message(other),
    }
}

struct SessionCore {
    state: SessionState,
    generation: u64,
}

pub struct SessionService {
    config: Config,
    api: ApiClient,
    vault: Arc<TokenVault>,
    core: Mutex<SessionCore>,
    events: Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
}

impl SessionService {
    pub fn new(config: Config, store: TokenStore) -> Result<Self, ApiError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let vault = Arc::new(TokenVault::new(store, tx));
        let api = ApiClient::new(config.api_base_url.clone(), Arc::clone(&vault))?;
        Ok(Self {
            config,
            api,
            vault,
            core: Mutex::new(SessionCore {
                state: SessionState::Initializing,
                generation: 0,
            }),
            events: Mutex::new(Some(rx)),
        })
    }

    fn core(&self) -> MutexGuard<'_, SessionCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state snapshot.
    pub fn state(&self) -> SessionState {
        self.core().state.clone()
    }

    /// The signed-in user, when there is one.
    pub fn user(&self) -> Option<SessionUser> {
        self.state().user().cloned()
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn generation(&self) -> u64 {
        self.core().generation
    }

    /// Apply a state transition unless a newer operation got there first.
    fn commit(&self, observed: u64, next: SessionState) -> bool {
        let mut core = self.core();
        if core.generation != observed {
            debug!(?next, "Discarding a stale session transition");
            return false;
        }
        core.generation += 1;
        core.state = next;
        true
    }

    /// Startup validation.
    ///
    /// Restores the persisted session, probes the server with it, and
    /// falls back to a single refresh when the access token is stale. Ends
    /// in `Authenticated` or `Unauthenticated`; a server that cannot be
    /// reached leaves the stored tokens in place for the next launch.
    pub async fn init(&self) {
        let observed = self.generation();

        let Some(stored) = self.vault.restore() else {
            debug!("No saved session; starting signed out");
            self.commit(observed, SessionState::Unauthenticated);
            return;
        };

        info!(user_id = stored.user.id, "Validating saved session");
        match self.api.health_check().await {
            Ok(()) => {
                info!("Saved session is valid");
                self.commit(observed, SessionState::Authenticated(stored.user));
            }
            Err(ApiError::Unauthorized) => {
                debug!("Saved access token was rejected; attempting refresh");
                match self.api.refresh_after_unauthorized(self.vault.generation()).await {
                    Ok(_) => {
                        info!("Session refreshed at startup");
                        self.commit(observed, SessionState::Authenticated(stored.user));
                    }
                    Err(ApiError::Unauthorized) => {
                        // The vault already cleared the store and emitted
                        // LoginRequired.
                        info!("Saved session was revoked; starting signed out");
                        self.commit(observed, SessionState::Unauthenticated);
                    }
                    Err(e) => {
                        warn!(error = %e, "Could not refresh the saved session; starting signed out");
                        self.vault.suspend();
                        self.commit(observed, SessionState::Unauthenticated);
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not validate the saved session; starting signed out");
                self.vault.suspend();
                self.commit(observed, SessionState::Unauthenticated);
            }
        }
    }

    /// Sign in with email and password. The credentials are used for the
    /// token request and dropped; only the resulting tokens are kept.
    pub async fn login(&self, email: &str, password: &str) -> AuthOutcome {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return AuthOutcome::failed("Email and password are required");
        }

        let observed = self.generation();

        let tokens = match self.api.obtain_token(email, password).await {
            Ok(tokens) => tokens,
            Err(e) => {
                error!(error = %e, "Login failed");
                return AuthOutcome::failed(login_error_message(&e));
            }
        };

        let user = match claims::session_user_from_access(&tokens.access, email) {
            Ok(user) => user,
            Err(e) => {
                error!(error = %e, "Could not read the access token claims");
                return AuthOutcome::failed(
                    "Sign-in succeeded but the session could not be established. Please try again.",
                );
            }
        };

        let session = StoredSession::new(tokens, user.clone());

        // Install and transition under one lock so a concurrent logout
        // cannot slip between them.
        {
            let mut core = self.core();
            if core.generation != observed {
                debug!("Login finished after a newer session operation; discarding it");
                return AuthOutcome::failed("Sign-in was interrupted. Please try again.");
            }
            core.generation += 1;
            self.vault.install(session);
            core.state = SessionState::Authenticated(user.clone());
        }

        info!(user_id = user.id, role = %user.role, "Login successful");
        AuthOutcome::ok()
    }

    /// Sign out. Valid from any state, including mid-initialization, and
    /// never fails: the store and vault are cleared, the generation is
    /// bumped so in-flight operations get discarded, and no network calls
    /// are made.
    pub fn logout(&self) {
        let mut core = self.core();
        core.generation += 1;
        self.vault.clear();
        core.state = SessionState::Unauthenticated;
        info!("Signed out");
    }

    /// Request a one-time passcode for the given address or phone number.
    pub async fn send_otp(&self, identifier: &str, channel: OtpChannel) -> OtpOutcome {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return OtpOutcome::failed("An email address or phone number is required");
        }

        match self.api.send_otp(&SendOtpRequest::new(identifier, channel)).await {
            Ok(response) => {
                info!(channel = channel.otp_type(), "OTP dispatched");
                let debug_code = if self.config.expose_debug_otp {
                    response.otp_code
                } else {
                    None
                };
                OtpOutcome {
                    success: true,
                    error: None,
                    debug_code,
                }
            }
            Err(e) => {
                error!(error = %e, "OTP dispatch failed");
                OtpOutcome::failed(user_message(&e))
            }
        }
    }

    /// Check a passcode on its own. A successful check marks the code used
    /// server-side, so registration must submit a code that has not been
    /// through here.
    pub async fn verify_otp(&self, identifier: &str, channel: OtpChannel, code: &str) -> AuthOutcome {
        let request = VerifyOtpRequest::new(identifier.trim(), channel, code.trim());
        match self.api.verify_otp(&request).await {
            Ok(response) if response.verified => AuthOutcome::ok(),
            Ok(response) => AuthOutcome::failed(response.message),
            Err(e) => {
                error!(error = %e, "OTP verification failed");
                AuthOutcome::failed(user_message(&e))
            }
        }
    }

    /// Create the account (second phase of the OTP flow) and, on success,
    /// sign straight in with the same credentials. A rejected OTP leaves
    /// the state machine untouched.
    pub async fn register(&self, details: RegisterRequest) -> AuthOutcome {
        match self.api.register_with_otp(&details).await {
            Ok(()) => {
                info!("Registration accepted; signing in");
                self.login(&details.email, &details.password).await
            }
            Err(e) => {
                error!(error = %e, "Registration failed");
                AuthOutcome::failed(user_message(&e))
            }
        }
    }

    /// Drain session events emitted outside a request/response cycle and
    /// apply their transitions. Returns the drained events so the front
    /// end can react (a `LoginRequired` means: show the login screen).
    pub fn process_events(&self) -> Vec<SessionEvent> {
        let mut drained = Vec::new();
        let mut slot = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(rx) = slot.as_mut() else {
            return drained;
        };

        while let Ok(event) = rx.try_recv() {
            match &event {
                SessionEvent::LoginRequired { reason } => {
                    warn!(reason = %reason, "Session revoked; signing out");
                    let mut core = self.core();
                    if !matches!(core.state, SessionState::Unauthenticated) {
                        core.generation += 1;
                        core.state = SessionState::Unauthenticated;
                    }
                }
                SessionEvent::TokenRefreshed => {
                    debug!("Access token rotated");
                }
            }
            drained.push(event);
        }
        drained
    }

    /// Tear the service down: stop accepting session events. State reads
    /// keep working so a closing UI can still render.
    pub fn dispose(&self) {
        let mut slot = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        slot.take();
        debug!("Session service disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_constructors() {
        let ok = AuthOutcome::ok();
        assert!(ok.success);
        assert!(ok.error.is_none());

        let failed = AuthOutcome::failed("nope");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("nope"));

        let otp = OtpOutcome::failed("bad number");
        assert!(!otp.success);
        assert!(otp.debug_code.is_none());
    }

    #[test]
    fn test_state_accessors() {
        let user = SessionUser {
            id: 5,
            email: "kim@example.com".to_string(),
            role: crate::models::UserRole::Doctor,
        };
        let state = SessionState::Authenticated(user.clone());
        assert!(state.is_authenticated());
        assert_eq!(state.user(), Some(&user));

        assert!(!SessionState::Initializing.is_authenticated());
        assert!(SessionState::Unauthenticated.user().is_none());
    }

    #[test]
    fn test_login_wording_for_rejected_credentials() {
        assert_eq!(
            login_error_message(&ApiError::Unauthorized),
            "Invalid email or password"
        );
        // Everything else falls through to the shared wording.
        assert_eq!(
            login_error_message(&ApiError::RateLimited),
            user_message(&ApiError::RateLimited)
        );
    }

    #[test]
    fn test_user_message_passes_validation_text_through() {
        let error = ApiError::Validation("otp_code: Invalid OTP code.".to_string());
        assert_eq!(user_message(&error), "otp_code: Invalid OTP code.");
    }
}
