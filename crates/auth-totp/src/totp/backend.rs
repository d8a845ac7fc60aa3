//! Secure-secret backends.
//!
//! The store only relies on the [`SecretBackend`] contract; the concrete
//! backends here are thin adapters. Every call can fail independently of
//! the entry metadata.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("secret storage is unavailable")]
    Unavailable,
    #[error("secret storage rejected the request: {0}")]
    Rejected(String),
    #[error("secret storage I/O failure: {0}")]
    Io(String),
}

/// Named-secret storage that lives outside the entry database.
#[cfg_attr(test, mockall::automock)]
pub trait SecretBackend {
    /// Whether the backend can be used at all on this host.
    fn available(&self) -> bool;

    /// Store `secret` under `name`, replacing any previous value.
    fn store(&self, name: &str, secret: &str) -> Result<(), BackendError>;

    /// Fetch the secret stored under `name`; `Ok(None)` when absent.
    fn retrieve(&self, name: &str) -> Result<Option<String>, BackendError>;

    /// Delete the secret stored under `name`; `Ok(false)` when there was none.
    fn delete_by_name(&self, name: &str) -> Result<bool, BackendError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  No backend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Backend for hosts without secure storage. Never available.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSecretBackend;

impl SecretBackend for NoSecretBackend {
    fn available(&self) -> bool {
        false
    }

    fn store(&self, _name: &str, _secret: &str) -> Result<(), BackendError> {
        Err(BackendError::Unavailable)
    }

    fn retrieve(&self, _name: &str) -> Result<Option<String>, BackendError> {
        Err(BackendError::Unavailable)
    }

    fn delete_by_name(&self, _name: &str) -> Result<bool, BackendError> {
        Err(BackendError::Unavailable)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  In-memory backend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default)]
struct MemoryState {
    available: bool,
    secrets: HashMap<String, String>,
}

/// Process-local backend. Clones share the same secrets, so a test can keep
/// a handle after giving one to the store.
#[derive(Debug, Clone)]
pub struct MemorySecretBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemorySecretBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySecretBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                available: true,
                secrets: HashMap::new(),
            })),
        }
    }

    /// Toggle availability; while unavailable every call fails.
    pub fn set_available(&self, available: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.available = available;
        }
    }

    /// Names currently held, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .lock()
            .map(|s| s.secrets.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut MemoryState) -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| BackendError::Io(format!("lock poisoned: {}", e)))?;
        if !state.available {
            return Err(BackendError::Unavailable);
        }
        f(&mut state)
    }
}

impl SecretBackend for MemorySecretBackend {
    fn available(&self) -> bool {
        self.state.lock().map(|s| s.available).unwrap_or(false)
    }

    fn store(&self, name: &str, secret: &str) -> Result<(), BackendError> {
        self.with_state(|s| {
            s.secrets.insert(name.to_string(), secret.to_string());
            Ok(())
        })
    }

    fn retrieve(&self, name: &str) -> Result<Option<String>, BackendError> {
        self.with_state(|s| Ok(s.secrets.get(name).cloned()))
    }

    fn delete_by_name(&self, name: &str) -> Result<bool, BackendError> {
        self.with_state(|s| Ok(s.secrets.remove(name).is_some()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  OS keychain backend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Backend over the platform credential store (Keychain, Credential
/// Manager, kernel keyutils). Secrets are keyed by `(service, name)`.
#[cfg(feature = "keychain")]
#[derive(Debug, Clone)]
pub struct KeyringSecretBackend {
    service: String,
}

#[cfg(feature = "keychain")]
impl KeyringSecretBackend {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, name: &str) -> Result<keyring::Entry, BackendError> {
        keyring::Entry::new(&self.service, name).map_err(map_keyring_error)
    }
}

#[cfg(feature = "keychain")]
fn map_keyring_error(e: keyring::Error) -> BackendError {
    match e {
        keyring::Error::NoStorageAccess(_) => BackendError::Unavailable,
        keyring::Error::PlatformFailure(inner) => BackendError::Io(inner.to_string()),
        other => BackendError::Rejected(other.to_string()),
    }
}

#[cfg(feature = "keychain")]
impl SecretBackend for KeyringSecretBackend {
    fn available(&self) -> bool {
        // Probe with a lookup that is expected to miss.
        match self.entry("__auth_probe__") {
            Ok(entry) => matches!(entry.get_password(), Ok(_) | Err(keyring::Error::NoEntry)),
            Err(_) => false,
        }
    }

    fn store(&self, name: &str, secret: &str) -> Result<(), BackendError> {
        self.entry(name)?
            .set_password(secret)
            .map_err(map_keyring_error)
    }

    fn retrieve(&self, name: &str) -> Result<Option<String>, BackendError> {
        match self.entry(name)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(map_keyring_error(e)),
        }
    }

    fn delete_by_name(&self, name: &str) -> Result<bool, BackendError> {
        match self.entry(name)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(map_keyring_error(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_backend_is_never_available() {
        let backend = NoSecretBackend;
        assert!(!backend.available());
        assert_eq!(backend.store("a", "b"), Err(BackendError::Unavailable));
        assert_eq!(backend.retrieve("a"), Err(BackendError::Unavailable));
        assert_eq!(backend.delete_by_name("a"), Err(BackendError::Unavailable));
    }

    #[test]
    fn memory_backend_round_trip() {
        let backend = MemorySecretBackend::new();
        assert!(backend.available());
        backend.store("mail", "JBSWY3DPEHPK3PXP").unwrap();
        assert_eq!(backend.retrieve("mail").unwrap().as_deref(), Some("JBSWY3DPEHPK3PXP"));
        assert_eq!(backend.retrieve("other").unwrap(), None);
        assert!(backend.delete_by_name("mail").unwrap());
        assert!(!backend.delete_by_name("mail").unwrap());
    }

    #[test]
    fn memory_backend_clones_share_state() {
        let backend = MemorySecretBackend::new();
        let handle = backend.clone();
        backend.store("a", "AAAA").unwrap();
        assert_eq!(handle.names(), vec!["a".to_string()]);
    }

    #[test]
    fn memory_backend_can_go_offline() {
        let backend = MemorySecretBackend::new();
        backend.store("a", "AAAA").unwrap();
        backend.set_available(false);
        assert!(!backend.available());
        assert_eq!(backend.retrieve("a"), Err(BackendError::Unavailable));
        backend.set_available(true);
        assert_eq!(backend.retrieve("a").unwrap().as_deref(), Some("AAAA"));
    }

    #[test]
    fn backend_error_messages() {
        assert_eq!(BackendError::Unavailable.to_string(), "secret storage is unavailable");
        assert!(BackendError::Rejected("denied".into()).to_string().contains("denied"));
    }
}
