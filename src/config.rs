//! Runtime configuration resolved from the environment.
//!
//! Only the database location and secret placement are configurable. The
//! library crate never reads the environment itself; everything it needs
//! is passed in through [`AppConfig`].

use std::path::{Path, PathBuf};

use auth_totp::totp::SecretPlacement;

/// Overrides the directory that holds `auth.db`.
pub const DATABASE_DIR_ENV: &str = "AUTH_DATABASE_DIR";
/// `inline` or `backend`; selects where new secrets are written.
pub const SECRET_PLACEMENT_ENV: &str = "AUTH_SECRET_PLACEMENT";

pub const DATABASE_FILE_NAME: &str = "auth.db";
pub const DEFAULT_KEYCHAIN_SERVICE: &str = "auth";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub secret_placement: SecretPlacement,
    /// Service name the OS credential store files secrets under.
    pub keychain_service: String,
}

impl AppConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            secret_placement: SecretPlacement::default(),
            keychain_service: DEFAULT_KEYCHAIN_SERVICE.to_string(),
        }
    }

    /// Build from `AUTH_DATABASE_DIR`, `AUTH_SECRET_PLACEMENT` and the home
    /// directory.
    pub fn from_env() -> Self {
        let env_dir = std::env::var_os(DATABASE_DIR_ENV).map(PathBuf::from);
        let database_path = resolve_database_path(env_dir.as_deref(), dirs::home_dir().as_deref());
        let placement = std::env::var(SECRET_PLACEMENT_ENV)
            .ok()
            .map(|raw| parse_placement(&raw))
            .unwrap_or_default();
        Self::new(database_path).with_secret_placement(placement)
    }

    pub fn with_secret_placement(mut self, placement: SecretPlacement) -> Self {
        self.secret_placement = placement;
        self
    }

    pub fn with_keychain_service(mut self, service: impl Into<String>) -> Self {
        self.keychain_service = service.into();
        self
    }
}

/// `<env_dir>/auth.db` when set and non-empty, else
/// `<home>/.local/share/auth/auth.db`, else `./auth.db`.
pub fn resolve_database_path(env_dir: Option<&Path>, home: Option<&Path>) -> PathBuf {
    match (env_dir, home) {
        (Some(dir), _) if !dir.as_os_str().is_empty() => dir.join(DATABASE_FILE_NAME),
        (_, Some(home)) => home
            .join(".local")
            .join("share")
            .join("auth")
            .join(DATABASE_FILE_NAME),
        _ => PathBuf::from(DATABASE_FILE_NAME),
    }
}

fn parse_placement(raw: &str) -> SecretPlacement {
    match raw.trim().to_ascii_lowercase().as_str() {
        "backend" | "keychain" => SecretPlacement::PreferBackend,
        "inline" | "" => SecretPlacement::Inline,
        other => {
            tracing::warn!("unknown {} value '{}', using inline", SECRET_PLACEMENT_ENV, other);
            SecretPlacement::Inline
        }
    }
}
