//! Persisted session storage.
//!
//! The token pair and the user snapshot are written as one JSON document in
//! a single step, so the pair can never be observed half-present. A file
//! that is missing, incomplete, or unreadable loads as no session.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::SessionUser;

/// Access/refresh token pair issued by the token endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Everything the client persists for a signed-in session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: SessionUser,
    #[serde(default = "Utc::now")]
    pub saved_at: DateTime<Utc>,
}

impl StoredSession {
    pub fn new(tokens: TokenPair, user: SessionUser) -> Self {
        Self {
            tokens,
            user,
            saved_at: Utc::now(),
        }
    }
}

pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the saved session from disk.
    ///
    /// Anything short of a complete, parseable document with both tokens is
    /// reported as no session rather than an error.
    pub fn load(&self) -> Result<Option<StoredSession>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        match serde_json::from_str::<StoredSession>(&contents) {
            Ok(session) => {
                if session.tokens.access.is_empty() || session.tokens.refresh.is_empty() {
                    warn!("Saved session is missing a token; treating it as signed out");
                    Ok(None)
                } else {
                    Ok(Some(session))
                }
            }
            Err(e) => {
                warn!(error = %e, "Saved session is incomplete or corrupt; treating it as signed out");
                Ok(None)
            }
        }
    }

    /// Write the session in one step, owner-readable only.
    pub fn save(&self, session: &StoredSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(session)?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        file.write_all(contents.as_bytes())
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }

    /// Remove the saved session. A missing file is not an error.
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> TokenStore {
        TokenStore::new(dir.path().join("session.json"))
    }

    fn sample_session() -> StoredSession {
        StoredSession::new(
            TokenPair {
                access: "access-abc".to_string(),
                refresh: "refresh-xyz".to_string(),
            },
            SessionUser {
                id: 42,
                email: "pat@example.com".to_string(),
                role: UserRole::Patient,
            },
        )
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.save(&sample_session()).unwrap();
        let loaded = store.load().unwrap().expect("session should load");

        assert_eq!(loaded.tokens.access, "access-abc");
        assert_eq!(loaded.tokens.refresh, "refresh-xyz");
        assert_eq!(loaded.user.id, 42);
        assert_eq!(loaded.user.role, UserRole::Patient);
    }

    #[test]
    fn test_missing_file_loads_as_none() {
        let dir = TempDir::new().unwrap();
        assert!(store_in(&dir).load().unwrap().is_none());
    }

    #[test]
    fn test_partial_document_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        // Access token without a refresh token must never come back as a
        // half-authenticated session.
        std::fs::write(store.path(), r#"{"access": "access-abc"}"#).unwrap();
        assert!(store.load().unwrap().is_none());

        std::fs::write(
            store.path(),
            r#"{"access": "access-abc", "refresh": "", "user": {"id": 1, "email": "a@b.c", "role": "patient"}}"#,
        )
        .unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_document_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "not json at all {").unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_clear_removes_file_and_tolerates_missing() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.save(&sample_session()).unwrap();
        assert!(store.path().exists());

        store.clear().unwrap();
        assert!(!store.path().exists());

        // Clearing again is fine.
        store.clear().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_session_file_is_owner_only() {
        use std::os::unix::fs::MetadataExt;

        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&sample_session()).unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
