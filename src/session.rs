//! Durable session identity.
//!
//! A single file under the application data directory holds the signed-in
//! provider's identifier as a string. Its absence means unauthenticated.
//! This is the only state that survives a restart; drafts and error
//! messages never do.

use std::fs;
use std::io;
use std::path::PathBuf;

use crate::config;
use crate::models::ProviderId;

/// Errors from reading or writing the session file.
#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("Session storage error: {0}")]
    Io(#[from] io::Error),
}

/// File-backed store for the provider identifier.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Store backed by an explicit file path (tests point this at a tempdir).
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store at the standard location under the application data directory.
    pub fn open_default() -> Self {
        Self::new(config::session_file())
    }

    /// Load the stored provider id, `None` when no session was saved.
    ///
    /// A value that does not parse as an identifier is treated as absent
    /// and removed, so a bad write cannot wedge the client in a half-signed-in
    /// state.
    pub fn load(&self) -> Result<Option<ProviderId>, SessionStoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match raw.trim().parse::<ProviderId>() {
            Ok(id) => Ok(Some(id)),
            Err(_) => {
                tracing::warn!(
                    path = %self.path.display(),
                    "Discarding unparseable stored provider id"
                );
                self.clear()?;
                Ok(None)
            }
        }
    }

    /// Persist the provider id in its string form.
    pub fn save(&self, id: ProviderId) -> Result<(), SessionStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, id.to_string())?;
        Ok(())
    }

    /// Remove the stored id. Idempotent.
    pub fn clear(&self) -> Result<(), SessionStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_in(dir: &tempfile::TempDir) -> SessionStore {
        SessionStore::new(dir.path().join("provider_id"))
    }

    #[test]
    fn load_is_none_when_nothing_saved() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        store.save(7).unwrap();
        assert_eq!(store.load().unwrap(), Some(7));
    }

    #[test]
    fn save_writes_the_string_form() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        store.save(7).unwrap();
        let raw = fs::read_to_string(dir.path().join("provider_id")).unwrap();
        assert_eq!(raw, "7");
    }

    #[test]
    fn save_creates_missing_parent_directories() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("nested").join("provider_id"));
        store.save(3).unwrap();
        assert_eq!(store.load().unwrap(), Some(3));
    }

    #[test]
    fn clear_removes_the_stored_id() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        store.save(7).unwrap();
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        store.clear().unwrap();
        store.clear().unwrap();
    }

    #[test]
    fn unparseable_value_is_treated_as_absent_and_removed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("provider_id");
        fs::write(&path, "not-a-number").unwrap();

        let store = SessionStore::new(path.clone());
        assert_eq!(store.load().unwrap(), None);
        assert!(!path.exists());
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("provider_id");
        fs::write(&path, "  12\n").unwrap();

        let store = SessionStore::new(path);
        assert_eq!(store.load().unwrap(), Some(12));
    }
}
