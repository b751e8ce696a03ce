//! Durable token persistence.
//!
//! Four string entries live under fixed keys in a key/value backend. The
//! authenticated flag is written last and removed first, so a reader that
//! finds the flag can trust the rest; without the flag everything else is
//! treated as absent.

use super::TokenSet;
use crate::error::StorageError;
use secrecy::{ExposeSecret, SecretString};
use std::{
    collections::{BTreeMap, HashMap},
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};
use tracing::{debug, instrument, warn};

pub const ACCESS_TOKEN_KEY: &str = "kc-access-token";
pub const REFRESH_TOKEN_KEY: &str = "kc-refresh-token";
pub const ID_TOKEN_KEY: &str = "kc-id-token";
pub const AUTHENTICATED_KEY: &str = "kc-authenticated";

const AUTHENTICATED_VALUE: &str = "true";

pub const PERSISTED_KEYS: [&str; 4] = [
    AUTHENTICATED_KEY,
    ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    ID_TOKEN_KEY,
];

/// Synchronous string key/value storage, shaped like browser `localStorage`.
pub trait Storage: Send + Sync {
    /// # Errors
    /// Returns an error if the backend cannot be read.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// # Errors
    /// Returns an error if the backend cannot be written.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// # Errors
    /// Returns an error if the backend cannot be written.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// JSON document on disk; survives process restarts the way `localStorage`
/// survives page reloads. Writes go to a sibling temp file and are renamed
/// into place.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(err.into()),
        };

        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        Ok(serde_json::from_str(&contents)?)
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        match fs::remove_file(&tmp) {
            Ok(()) => debug!("removed stale temp file {}", tmp.display()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let mut file = create_private(&tmp)?;
        file.write_all(&serde_json::to_vec_pretty(entries)?)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &self.path)?;

        Ok(())
    }

    fn update(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, String>) -> bool,
    ) -> Result<(), StorageError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_all()?;
        if apply(&mut entries) {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

/// Creates `path` readable by the owner only. The mode is set at creation, so
/// the contents are never exposed with umask permissions.
#[cfg(unix)]
fn create_private(path: &Path) -> Result<fs::File, StorageError> {
    use std::os::unix::fs::OpenOptionsExt;
    Ok(fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?)
}

#[cfg(not(unix))]
fn create_private(path: &Path) -> Result<fs::File, StorageError> {
    Ok(fs::OpenOptions::new().write(true).create_new(true).open(path)?)
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_all()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.update(|entries| entries.remove(key).is_some())
    }
}

/// Token persistence on top of a [`Storage`] backend.
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn Storage>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}

impl TokenStore {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Loads persisted tokens.
    ///
    /// Returns `None` unless the authenticated flag reads `"true"` and an
    /// access token is present.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be read.
    #[instrument(skip(self))]
    pub fn load(&self) -> Result<Option<TokenSet>, StorageError> {
        let authenticated = self.storage.get_item(AUTHENTICATED_KEY)?;
        if authenticated.as_deref() != Some(AUTHENTICATED_VALUE) {
            debug!("no persisted session");
            return Ok(None);
        }

        let Some(access_token) = non_empty(self.storage.get_item(ACCESS_TOKEN_KEY)?) else {
            warn!("persisted session flag without access token");
            return Ok(None);
        };

        Ok(Some(TokenSet {
            access_token: SecretString::from(access_token),
            refresh_token: non_empty(self.storage.get_item(REFRESH_TOKEN_KEY)?)
                .map(SecretString::from),
            id_token: non_empty(self.storage.get_item(ID_TOKEN_KEY)?).map(SecretString::from),
        }))
    }

    /// Persists tokens, writing the authenticated flag last.
    ///
    /// # Errors
    /// Returns an error if any entry cannot be written.
    #[instrument(skip_all)]
    pub fn save(&self, tokens: &TokenSet) -> Result<(), StorageError> {
        self.storage.remove_item(AUTHENTICATED_KEY)?;

        self.storage
            .set_item(ACCESS_TOKEN_KEY, tokens.access_token.expose_secret())?;
        self.put_optional(REFRESH_TOKEN_KEY, tokens.refresh_token.as_ref())?;
        self.put_optional(ID_TOKEN_KEY, tokens.id_token.as_ref())?;

        self.storage.set_item(AUTHENTICATED_KEY, AUTHENTICATED_VALUE)?;

        debug!("session persisted");
        Ok(())
    }

    /// Removes every persisted entry, flag first. All removals are attempted
    /// even if one fails; the first failure is returned.
    ///
    /// # Errors
    /// Returns the first backend error encountered.
    #[instrument(skip(self))]
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut first_error = None;
        for key in PERSISTED_KEYS {
            if let Err(err) = self.storage.remove_item(key) {
                warn!(key, "failed to remove persisted entry: {err}");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => {
                debug!("persisted session cleared");
                Ok(())
            }
        }
    }

    fn put_optional(&self, key: &str, value: Option<&SecretString>) -> Result<(), StorageError> {
        match value {
            Some(value) => self.storage.set_item(key, value.expose_secret()),
            None => self.storage.remove_item(key),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}
