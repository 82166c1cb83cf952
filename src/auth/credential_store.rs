//! Persisted login credential storage
//!
//! The backend keeps the refresh credential in an HTTP-only cookie. A browser
//! persists that cookie on its own; this client has to do it explicitly so a
//! later process can restore the session. The cookie is kept in the OS
//! keychain (via the keyring crate) or, for tests and throwaway sessions, in
//! memory.

use std::collections::HashMap;
use std::sync::Mutex;

use keyring::Entry;
use thiserror::Error;

/// Errors that can occur during credential storage operations
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Keyring operation failed
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// Stored value is unusable
    #[error("Invalid credential format: {0}")]
    InvalidFormat(String),
}

/// Storage for persisted login credentials, keyed by name
pub trait CredentialStore: Send + Sync {
    /// Returns the stored value, `None` when absent
    fn load(&self, key: &str) -> Result<Option<String>, CredentialError>;

    /// Stores or replaces a value
    fn save(&self, key: &str, value: &str) -> Result<(), CredentialError>;

    /// Deletes a value
    ///
    /// `Ok(true)` if deleted, `Ok(false)` if nothing was stored
    fn delete(&self, key: &str) -> Result<bool, CredentialError>;
}

/// Credential store backed by the platform keychain
///
/// Entries are scoped by service name, so separate installs (or tests) can
/// use separate services.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    /// Creates a store under the default service name
    pub fn new() -> Self {
        Self::with_service("blogroll")
    }

    /// Creates a store under a custom service name
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringStore {
    fn load(&self, key: &str) -> Result<Option<String>, CredentialError> {
        let entry = Entry::new(&self.service, key)?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(CredentialError::Keyring(e)),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        if value.is_empty() {
            return Err(CredentialError::InvalidFormat("empty credential".into()));
        }
        let entry = Entry::new(&self.service, key)?;
        entry.set_password(value)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, CredentialError> {
        let entry = Entry::new(&self.service, key)?;
        match entry.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(CredentialError::Keyring(e)),
        }
    }
}

/// In-process credential store; nothing survives the process
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with one value
    pub fn with_value(key: &str, value: &str) -> Self {
        let store = Self::new();
        store
            .lock()
            .insert(key.to_string(), value.to_string());
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // Every mutation is a single map call, so a poisoned map is still whole.
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, CredentialError> {
        Ok(self.lock().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        if value.is_empty() {
            return Err(CredentialError::InvalidFormat("empty credential".into()));
        }
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, CredentialError> {
        Ok(self.lock().remove(key).is_some())
    }
}
