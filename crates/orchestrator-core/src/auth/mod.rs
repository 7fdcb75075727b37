//! Authentication module for managing sessions and credentials.
//!
//! This module provides:
//! - `SessionStore`: the credential bundle and the JWT access/refresh lifecycle
//! - `SessionStorage`: where the bundle is persisted (file, keychain, memory)
//! - `CredentialStore`: remembered login passwords in the OS keychain

pub mod credentials;
pub mod session;
pub mod storage;

pub use credentials::CredentialStore;
pub use session::{
    CredentialBundle, RefreshFailure, RefreshResult, SessionState, SessionStore, Verification,
};
pub use storage::{FileStorage, KeyringStorage, MemoryStorage, SessionStorage};

use anyhow::Result;

use crate::config::{Config, SessionBackend};

/// Build the storage backend selected in the configuration.
pub fn storage_for(config: &Config) -> Result<Box<dyn SessionStorage>> {
    Ok(match config.session_backend {
        SessionBackend::File => Box::new(FileStorage::new(config.data_dir()?)),
        SessionBackend::Keyring => Box::new(KeyringStorage::new(config.api_url.clone())),
        SessionBackend::Memory => Box::new(MemoryStorage::new()),
    })
}
