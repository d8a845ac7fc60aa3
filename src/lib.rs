//! Application wiring for the authenticator: configuration, logging and
//! construction of a ready-to-use [`TotpService`].

pub mod config;
pub mod logging;

use std::fs;

pub use auth_totp::totp;
use auth_totp::totp::{
    JsonFileRepository, SecretBackedEntryStore, SecretBackend, TotpError, TotpErrorKind,
    TotpService,
};

pub use config::AppConfig;
pub use logging::init_logging;

/// Open the service described by `config` with the platform secret backend.
///
/// With the `keychain` feature the OS credential store is used; otherwise
/// secrets always stay inline.
pub fn open_service(config: &AppConfig) -> Result<TotpService, TotpError> {
    open_service_with(config, default_backend(config))
}

/// Open the service with an explicit secret backend.
pub fn open_service_with(
    config: &AppConfig,
    backend: Box<dyn SecretBackend>,
) -> Result<TotpService, TotpError> {
    if let Some(parent) = config.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                TotpError::new(
                    TotpErrorKind::StorageError,
                    format!("Failed to create database directory {}", parent.display()),
                )
                .with_detail(e.to_string())
            })?;
        }
    }

    let repository = JsonFileRepository::open(&config.database_path)?;
    let store = SecretBackedEntryStore::open(Box::new(repository), backend, config.secret_placement)?;
    tracing::info!(
        "opened {} ({} entries)",
        config.database_path.display(),
        store.entries().len()
    );
    Ok(TotpService::new(store))
}

#[cfg(feature = "keychain")]
fn default_backend(config: &AppConfig) -> Box<dyn SecretBackend> {
    Box::new(auth_totp::totp::KeyringSecretBackend::new(config.keychain_service.clone()))
}

#[cfg(not(feature = "keychain"))]
fn default_backend(_config: &AppConfig) -> Box<dyn SecretBackend> {
    Box::new(auth_totp::totp::NoSecretBackend)
}
