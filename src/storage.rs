//! Persistence for the authenticated session.
//!
//! DESIGN
//! ======
//! The auth store is the only writer; storage is a dumb slot holding the
//! last `{token, user}` pair. A file on disk plays the role browser local
//! storage plays for a web client.

#[cfg(test)]
#[path = "storage_test.rs"]
mod storage_test;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::net::types::User;

/// The persisted part of an auth session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub token: String,
    #[serde(default)]
    pub user: Option<User>,
}

pub trait SessionStorage: Send + Sync {
    /// Load the stored session, if any.
    ///
    /// # Errors
    ///
    /// Returns an error when the backing store cannot be read at all.
    /// Unreadable contents are reported as `Ok(None)`.
    fn load(&self) -> Result<Option<PersistedSession>, ClientError>;

    /// Replace the stored session.
    ///
    /// # Errors
    ///
    /// Returns an error when the backing store cannot be written.
    fn save(&self, session: &PersistedSession) -> Result<(), ClientError>;

    /// Remove the stored session. Clearing an empty store succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error when the backing store cannot be modified.
    fn clear(&self) -> Result<(), ClientError>;
}

/// JSON file on disk.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStorage for FileStorage {
    fn load(&self) -> Result<Option<PersistedSession>, ClientError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<PersistedSession>(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "discarding unreadable session file");
                Ok(None)
            }
        }
    }

    fn save(&self, session: &PersistedSession) -> Result<(), ClientError> {
        write_json(&self.path, session)
    }

    fn clear(&self) -> Result<(), ClientError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Render before touching the disk so a value that cannot be encoded
/// leaves any previous file in place.
fn write_json(path: &Path, value: &impl Serialize) -> Result<(), ClientError> {
    let rendered = serde_json::to_string_pretty(value).map_err(ClientError::Json)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, rendered)?;
    Ok(())
}

/// Process-local storage for tests and embedders that manage persistence
/// themselves.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slot: Mutex<Option<PersistedSession>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn with_session(session: PersistedSession) -> Self {
        Self { slot: Mutex::new(Some(session)) }
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self) -> Result<Option<PersistedSession>, ClientError> {
        Ok(self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone())
    }

    fn save(&self, session: &PersistedSession) -> Result<(), ClientError> {
        *self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        *self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
        Ok(())
    }
}
