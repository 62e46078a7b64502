//! Shared token state behind the refresh protocol.
//!
//! `TokenVault` is the single in-memory holder of the current token pair
//! and user snapshot. The API client reads it to attach bearer auth and
//! rotates it after a refresh; the session service installs it on login and
//! clears it on logout. A generation counter orders those changes so that
//! concurrent 401 handlers can tell whether a refresh already happened
//! while they were waiting for the gate.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::MutexGuard as AsyncMutexGuard;
use tracing::{debug, warn};

use super::store::{StoredSession, TokenStore};
use crate::models::SessionUser;

/// Session-level notifications emitted outside a request/response cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The access token was rotated after a successful refresh.
    TokenRefreshed,
    /// The refresh token was rejected; the session was cleared and the
    /// user has to sign in again.
    LoginRequired { reason: String },
}

/// What a caller holding the refresh gate should do next.
#[derive(Debug)]
pub(crate) enum RefreshDisposition {
    /// A newer access token already exists; use it without refreshing.
    Reuse(String),
    /// The session was cleared in the meantime; fail as unauthorized.
    SessionGone,
    /// Perform the refresh with this refresh token.
    Refresh(String),
}

#[derive(Default)]
struct VaultInner {
    session: Option<StoredSession>,
    generation: u64,
}

pub struct TokenVault {
    inner: Mutex<VaultInner>,
    refresh_gate: AsyncMutex<()>,
    store: TokenStore,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl TokenVault {
    pub fn new(store: TokenStore, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            inner: Mutex::new(VaultInner::default()),
            refresh_gate: AsyncMutex::new(()),
            store,
            events,
        }
    }

    fn inner(&self) -> MutexGuard<'_, VaultInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the persisted session into memory, if a complete one exists.
    pub fn restore(&self) -> Option<StoredSession> {
        match self.store.load() {
            Ok(Some(session)) => {
                self.inner().session = Some(session.clone());
                Some(session)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Could not read the saved session");
                None
            }
        }
    }

    /// Install a freshly issued session: memory first, then persist.
    /// A failed write is logged, not fatal - the session still works until
    /// the process exits.
    pub fn install(&self, session: StoredSession) {
        {
            let mut inner = self.inner();
            inner.session = Some(session.clone());
            inner.generation += 1;
        }
        if let Err(e) = self.store.save(&session) {
            warn!(error = %e, "Failed to save session");
        }
    }

    /// Swap in a rotated access token (and refresh token, when the server
    /// rotates those too), bump the generation, and persist.
    pub(crate) fn rotate(&self, access: String, refresh: Option<String>) {
        let persisted = {
            let mut inner = self.inner();
            let Some(session) = inner.session.as_mut() else {
                return;
            };
            session.tokens.access = access;
            if let Some(refresh) = refresh {
                session.tokens.refresh = refresh;
            }
            let persisted = session.clone();
            inner.generation += 1;
            persisted
        };
        if let Err(e) = self.store.save(&persisted) {
            warn!(error = %e, "Failed to persist rotated tokens");
        }
        let _ = self.events.send(SessionEvent::TokenRefreshed);
        debug!("Access token rotated");
    }

    /// Drop both the in-memory session and the persisted copy.
    pub fn clear(&self) {
        {
            let mut inner = self.inner();
            inner.session = None;
            inner.generation += 1;
        }
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to remove the saved session");
        }
    }

    /// Clear everything and tell the front end to return to login.
    pub(crate) fn revoke(&self, reason: &str) {
        self.clear();
        let _ = self.events.send(SessionEvent::LoginRequired {
            reason: reason.to_string(),
        });
    }

    /// Drop the in-memory session without touching the persisted copy.
    /// Used when startup validation cannot reach the server: the tokens
    /// stay on disk for the next launch, but no authed calls go out now.
    pub fn suspend(&self) {
        let mut inner = self.inner();
        inner.session = None;
        inner.generation += 1;
    }

    /// Current access token and the generation it belongs to.
    pub fn bearer(&self) -> (Option<String>, u64) {
        let inner = self.inner();
        (
            inner.session.as_ref().map(|s| s.tokens.access.clone()),
            inner.generation,
        )
    }

    pub fn current_user(&self) -> Option<SessionUser> {
        self.inner().session.as_ref().map(|s| s.user.clone())
    }

    pub fn generation(&self) -> u64 {
        self.inner().generation
    }

    /// Serializes refreshes. Hold the guard for the whole refresh attempt.
    pub(crate) async fn lock_refresh(&self) -> AsyncMutexGuard<'_, ()> {
        self.refresh_gate.lock().await
    }

    /// Decide what a 401 handler should do, given the generation whose
    /// access token produced the 401. Call with the refresh gate held.
    pub(crate) fn disposition(&self, observed: u64) -> RefreshDisposition {
        let inner = self.inner();
        match inner.session {
            None => RefreshDisposition::SessionGone,
            Some(ref session) if inner.generation != observed => {
                RefreshDisposition::Reuse(session.tokens.access.clone())
            }
            Some(ref session) => RefreshDisposition::Refresh(session.tokens.refresh.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::TokenPair;
    use crate::models::UserRole;
    use tempfile::TempDir;

    fn vault_in(dir: &TempDir) -> (TokenVault, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = TokenStore::new(dir.path().join("session.json"));
        (TokenVault::new(store, tx), rx)
    }

    fn sample_session() -> StoredSession {
        StoredSession::new(
            TokenPair {
                access: "access-1".to_string(),
                refresh: "refresh-1".to_string(),
            },
            SessionUser {
                id: 9,
                email: "kim@example.com".to_string(),
                role: UserRole::Doctor,
            },
        )
    }

    #[test]
    fn test_disposition_tracks_generation() {
        let dir = TempDir::new().unwrap();
        let (vault, _rx) = vault_in(&dir);

        assert!(matches!(vault.disposition(0), RefreshDisposition::SessionGone));

        vault.install(sample_session());
        let (_, observed) = vault.bearer();

        // Same generation: this caller performs the refresh.
        match vault.disposition(observed) {
            RefreshDisposition::Refresh(refresh) => assert_eq!(refresh, "refresh-1"),
            other => panic!("expected Refresh, got {other:?}"),
        }

        // Someone rotated while we waited: reuse their token.
        vault.rotate("access-2".to_string(), None);
        match vault.disposition(observed) {
            RefreshDisposition::Reuse(access) => assert_eq!(access, "access-2"),
            other => panic!("expected Reuse, got {other:?}"),
        }

        // Session revoked while we waited: fail together.
        vault.clear();
        assert!(matches!(
            vault.disposition(observed),
            RefreshDisposition::SessionGone
        ));
    }

    #[test]
    fn test_rotate_persists_and_notifies() {
        let dir = TempDir::new().unwrap();
        let (vault, mut rx) = vault_in(&dir);

        vault.install(sample_session());
        vault.rotate("access-2".to_string(), Some("refresh-2".to_string()));

        let store = TokenStore::new(dir.path().join("session.json"));
        let saved = store.load().unwrap().expect("rotated session should persist");
        assert_eq!(saved.tokens.access, "access-2");
        assert_eq!(saved.tokens.refresh, "refresh-2");

        assert_eq!(rx.try_recv().ok(), Some(SessionEvent::TokenRefreshed));
    }

    #[test]
    fn test_revoke_clears_disk_and_emits_login_required() {
        let dir = TempDir::new().unwrap();
        let (vault, mut rx) = vault_in(&dir);

        vault.install(sample_session());
        assert!(dir.path().join("session.json").exists());

        vault.revoke("Session expired");
        assert!(!dir.path().join("session.json").exists());
        assert!(vault.current_user().is_none());

        match rx.try_recv() {
            Ok(SessionEvent::LoginRequired { reason }) => assert_eq!(reason, "Session expired"),
            other => panic!("expected LoginRequired, got {other:?}"),
        }
    }

    #[test]
    fn test_suspend_keeps_the_saved_copy() {
        let dir = TempDir::new().unwrap();
        let (vault, _rx) = vault_in(&dir);

        vault.install(sample_session());
        vault.suspend();

        assert!(vault.current_user().is_none());
        assert!(dir.path().join("session.json").exists());
    }
}
