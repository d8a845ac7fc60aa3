//! TOTP crate: sub-modules.

pub mod types;
pub mod base32;
pub mod core;
pub mod validation;
pub mod resolver;
pub mod backend;
pub mod repository;
pub mod store;
pub mod transfer;
pub mod service;

// Re-export top-level items for convenience.
pub use types::*;
pub use backend::{BackendError, MemorySecretBackend, NoSecretBackend, SecretBackend};
#[cfg(feature = "keychain")]
pub use backend::KeyringSecretBackend;
pub use repository::{EntryRepository, JsonFileRepository, MemoryRepository};
pub use store::SecretBackedEntryStore;
pub use service::TotpService;
pub use transfer::FileFormat;
