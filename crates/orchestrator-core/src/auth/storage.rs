//! Persistence backends for the credential bundle.
//!
//! The bundle is always written as a single document so a reader never sees
//! an access token without its refresh token.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use keyring::Entry;

use super::session::CredentialBundle;

/// Session file name in the data directory
const SESSION_FILE: &str = "session.json";

/// Keychain service for persisted sessions
const KEYRING_SERVICE: &str = "ai-orchestrator-session";

/// Durable storage for the credential bundle.
pub trait SessionStorage: Send + Sync {
    /// Read the persisted bundle, if any.
    fn load(&self) -> Result<Option<CredentialBundle>>;

    /// Replace the persisted bundle.
    fn save(&self, bundle: &CredentialBundle) -> Result<()>;

    /// Remove the persisted bundle. Removing nothing is not an error.
    fn clear(&self) -> Result<()>;
}

/// Process-local storage; nothing survives a restart.
#[derive(Default)]
pub struct MemoryStorage {
    bundle: Mutex<Option<CredentialBundle>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a bundle already persisted, as if from a previous run.
    pub fn with_bundle(bundle: CredentialBundle) -> Self {
        Self {
            bundle: Mutex::new(Some(bundle)),
        }
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self) -> Result<Option<CredentialBundle>> {
        Ok(self
            .bundle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, bundle: &CredentialBundle) -> Result<()> {
        *self.bundle.lock().unwrap_or_else(PoisonError::into_inner) = Some(bundle.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.bundle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

/// JSON file in the per-user data directory.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join(format!("{}.tmp", SESSION_FILE))
    }

    #[cfg(unix)]
    fn restrict_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .context("Failed to restrict session file permissions")
    }

    #[cfg(not(unix))]
    fn restrict_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }
}

impl SessionStorage for FileStorage {
    fn load(&self) -> Result<Option<CredentialBundle>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let bundle = serde_json::from_str(&contents).context("Failed to parse session file")?;
        Ok(Some(bundle))
    }

    fn save(&self, bundle: &CredentialBundle) -> Result<()> {
        std::fs::create_dir_all(&self.dir).context("Failed to create session directory")?;
        let contents = serde_json::to_string_pretty(bundle)?;

        // Write then rename so the old file stays intact until the new one is complete.
        let tmp = self.temp_path();
        std::fs::write(&tmp, contents).context("Failed to write session file")?;
        Self::restrict_permissions(&tmp)?;
        std::fs::rename(&tmp, self.path()).context("Failed to replace session file")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let path = self.path();
        if path.exists() {
            std::fs::remove_file(path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}

/// Single OS keychain entry holding the serialized bundle.
pub struct KeyringStorage {
    account: String,
}

impl KeyringStorage {
    /// `account` scopes the entry, typically the backend URL.
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(KEYRING_SERVICE, &self.account).context("Failed to create keyring entry")
    }
}

impl SessionStorage for KeyringStorage {
    fn load(&self) -> Result<Option<CredentialBundle>> {
        match self.entry()?.get_password() {
            Ok(secret) => {
                let bundle = serde_json::from_str(&secret)
                    .context("Failed to parse session stored in keychain")?;
                Ok(Some(bundle))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to read session from keychain"),
        }
    }

    fn save(&self, bundle: &CredentialBundle) -> Result<()> {
        let secret = serde_json::to_string(bundle)?;
        self.entry()?
            .set_password(&secret)
            .context("Failed to store session in keychain")
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete session from keychain"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserProfile;

    fn bundle(access: &str) -> CredentialBundle {
        CredentialBundle {
            access_token: access.to_string(),
            refresh_token: "refresh-1".to_string(),
            user: Some(UserProfile {
                id: Some(1),
                username: "ana".to_string(),
                email: None,
                first_name: None,
                last_name: None,
                role: None,
            }),
        }
    }

    #[test]
    fn test_file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("session"));
        assert_eq!(storage.load().unwrap(), None);

        storage.save(&bundle("access-1")).unwrap();
        assert_eq!(storage.load().unwrap(), Some(bundle("access-1")));

        storage.save(&bundle("access-2")).unwrap();
        assert_eq!(storage.load().unwrap(), Some(bundle("access-2")));
        assert!(!storage.temp_path().exists());
    }

    #[test]
    fn test_file_storage_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        storage.save(&bundle("access-1")).unwrap();

        storage.clear().unwrap();
        storage.clear().unwrap();
        assert_eq!(storage.load().unwrap(), None);
        assert!(!storage.path().exists());
    }

    #[test]
    fn test_file_storage_reports_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        std::fs::write(storage.path(), r#"{"access_token": "only-half"}"#).unwrap();
        assert!(storage.load().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_storage_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        storage.save(&bundle("access-1")).unwrap();
        let mode = std::fs::metadata(storage.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_memory_storage() {
        let storage = MemoryStorage::with_bundle(bundle("a"));
        assert_eq!(storage.load().unwrap(), Some(bundle("a")));
        storage.clear().unwrap();
        assert_eq!(storage.load().unwrap(), None);
    }
}
