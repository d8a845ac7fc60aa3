//! Core types for the TOTP credential engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::totp::backend::BackendError;

/// Legacy prefix marking a secret that lives in the secure backend.
pub const SECRET_STORAGE_PREFIX: &str = "SecretStorage:";

/// Legacy prefix marking a backend secret that could not be retrieved at load.
pub const SECRET_STORAGE_FAILED_PREFIX: &str = "$$SECRET_STORAGE_FAILED$$";

pub const DEFAULT_DIGITS: u32 = 6;
pub const DEFAULT_PERIOD: u32 = 30;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Secret source
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where the shared secret of an entry comes from.
///
/// On disk this is the legacy string form (`"SecretStorage:<name>"`,
/// `"$$SECRET_STORAGE_FAILED$$<name>"`, or the raw secret). Validated secrets
/// only contain alphanumerics, spaces and hyphens, so they never collide
/// with either prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SecretSource {
    /// Base32 secret text, as typed by the user.
    Inline(String),
    /// Secret held by the secure backend under this name.
    BackendRef(String),
    /// Backend secret under this name could not be retrieved when the store was opened.
    BackendFailed(String),
}

impl SecretSource {
    /// Parse the legacy string form.
    pub fn from_legacy(raw: &str) -> Self {
        if let Some(name) = raw.strip_prefix(SECRET_STORAGE_FAILED_PREFIX) {
            Self::BackendFailed(name.to_string())
        } else if let Some(name) = raw.strip_prefix(SECRET_STORAGE_PREFIX) {
            Self::BackendRef(name.to_string())
        } else {
            Self::Inline(raw.to_string())
        }
    }

    /// Render the legacy string form.
    pub fn to_legacy(&self) -> String {
        match self {
            Self::Inline(secret) => secret.clone(),
            Self::BackendRef(name) => format!("{}{}", SECRET_STORAGE_PREFIX, name),
            Self::BackendFailed(name) => format!("{}{}", SECRET_STORAGE_FAILED_PREFIX, name),
        }
    }

    /// Backend name for `BackendRef` / `BackendFailed`.
    pub fn backend_name(&self) -> Option<&str> {
        match self {
            Self::Inline(_) => None,
            Self::BackendRef(name) | Self::BackendFailed(name) => Some(name),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::BackendFailed(_))
    }
}

impl From<String> for SecretSource {
    fn from(raw: String) -> Self {
        Self::from_legacy(&raw)
    }
}

impl From<SecretSource> for String {
    fn from(source: SecretSource) -> String {
        source.to_legacy()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Entry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single credential entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Stable identifier, assigned by the repository on insert.
    pub id: u64,
    /// Display name (not unique).
    pub name: String,
    /// Shared secret or a reference to it.
    pub secret: SecretSource,
    /// Number of digits in the generated code (6–8).
    pub digits: u32,
    /// Time step in seconds.
    pub period: u32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Entry {
    /// Build an unsaved entry (id 0) from a draft with an already-placed secret.
    pub fn from_draft(draft: &EntryDraft, secret: SecretSource) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: draft.name.clone(),
            secret,
            digits: draft.digits,
            period: draft.period,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields for a new entry, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub name: String,
    pub secret: String,
    pub digits: u32,
    pub period: u32,
}

impl EntryDraft {
    /// Draft with default digits (6) and period (30 s).
    pub fn new(name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secret: secret.into(),
            digits: DEFAULT_DIGITS,
            period: DEFAULT_PERIOD,
        }
    }

    /// Builder: set digit count.
    pub fn with_digits(mut self, digits: u32) -> Self {
        self.digits = digits;
        self
    }

    /// Builder: set time period.
    pub fn with_period(mut self, period: u32) -> Self {
        self.period = period;
        self
    }
}

/// Partial edit of an entry. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryUpdate {
    pub name: Option<String>,
    pub secret: Option<String>,
    pub digits: Option<u32>,
    pub period: Option<u32>,
}

impl EntryUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.secret.is_none() && self.digits.is_none() && self.period.is_none()
    }
}

/// How the store places secrets of newly written entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretPlacement {
    /// Keep the secret inline in the entry metadata.
    #[default]
    Inline,
    /// Hand the secret to the backend when it is available.
    PreferBackend,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Generated code results
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A generated OTP code with associated timing info.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedCode {
    /// Zero-padded decimal code (e.g. "012345").
    pub code: String,
    /// Seconds remaining until the code expires.
    pub remaining_seconds: u32,
    /// Total period in seconds.
    pub period: u32,
    /// The time step used.
    pub counter: u64,
    /// Entry this code was generated for.
    pub entry_id: u64,
}

/// One row of a listing: ordinal position, entry, current code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedCode {
    /// 1-based position in the id-sorted listing.
    pub ordinal: usize,
    pub entry: Entry,
    pub code: GeneratedCode,
}

/// Detailed view of a single entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    pub ordinal: usize,
    pub entry: Entry,
    /// The usable Base32 secret (inline or fetched from the backend).
    pub secret: String,
    pub code: GeneratedCode,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Operation outcomes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Backend call that produced a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendOperation {
    Store,
    Delete,
}

impl fmt::Display for BackendOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store => write!(f, "store"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// A backend failure that did not block the metadata operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendWarning {
    /// Backend name the call was made for.
    pub name: String,
    pub operation: BackendOperation,
    pub error: BackendError,
}

impl BackendWarning {
    pub fn to_error(&self) -> TotpError {
        TotpError::new(
            TotpErrorKind::BackendFailure,
            format!("Secret storage {} failed for '{}'", self.operation, self.name),
        )
        .with_detail(self.error.to_string())
    }
}

/// Result of adding an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    pub entry: Entry,
    pub warnings: Vec<BackendWarning>,
}

/// Result of editing an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    /// Name before the edit.
    pub previous_name: String,
    pub entry: Entry,
    pub warnings: Vec<BackendWarning>,
}

/// Result of removing an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveOutcome {
    /// Whether the metadata row was deleted.
    pub removed: bool,
    pub entry: Entry,
    /// Best-effort backend cleanup failures.
    pub warnings: Vec<BackendWarning>,
}

/// Result of wiping the whole store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WipeOutcome {
    pub removed: usize,
    pub warnings: Vec<BackendWarning>,
}

/// Summary of an import operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportResult {
    pub total_found: usize,
    pub imported: Vec<Entry>,
    /// Per-entry rejections, as `(name, error)`.
    pub rejected: Vec<(String, TotpError)>,
    pub warnings: Vec<BackendWarning>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Error type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Error kind for this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TotpErrorKind {
    InvalidDigits,
    InvalidPeriod,
    InvalidSecret,
    InvalidInput,
    NotFound,
    /// Secret lives in the backend and cannot be produced right now.
    SecretUnavailable,
    /// An entry carries the load-time failure marker.
    SecretStorageFailed,
    BackendFailure,
    StorageError,
    ImportFailed,
    ExportFailed,
    ParseError,
    IoError,
}

/// Coarse taxonomy callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    SecretUnavailable,
    BackendFailure,
    Storage,
}

/// Crate-level error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotpError {
    pub kind: TotpErrorKind,
    pub message: String,
    pub detail: Option<String>,
}

impl fmt::Display for TotpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)?;
        if let Some(d) = &self.detail {
            write!(f, " ({})", d)?;
        }
        Ok(())
    }
}

impl std::error::Error for TotpError {}

impl TotpError {
    pub fn new(kind: TotpErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn not_found(token: &str) -> Self {
        Self::new(TotpErrorKind::NotFound, format!("Entry not found: {}", token))
    }

    pub fn category(&self) -> ErrorCategory {
        match self.kind {
            TotpErrorKind::InvalidDigits
            | TotpErrorKind::InvalidPeriod
            | TotpErrorKind::InvalidSecret
            | TotpErrorKind::InvalidInput => ErrorCategory::Validation,
            TotpErrorKind::NotFound => ErrorCategory::NotFound,
            TotpErrorKind::SecretUnavailable | TotpErrorKind::SecretStorageFailed => {
                ErrorCategory::SecretUnavailable
            }
            TotpErrorKind::BackendFailure => ErrorCategory::BackendFailure,
            TotpErrorKind::StorageError
            | TotpErrorKind::ImportFailed
            | TotpErrorKind::ExportFailed
            | TotpErrorKind::ParseError
            | TotpErrorKind::IoError => ErrorCategory::Storage,
        }
    }
}

impl From<TotpError> for String {
    fn from(e: TotpError) -> String {
        e.to_string()
    }
}

impl From<std::io::Error> for TotpError {
    fn from(e: std::io::Error) -> Self {
        TotpError::new(TotpErrorKind::IoError, e.to_string())
    }
}

impl From<serde_json::Error> for TotpError {
    fn from(e: serde_json::Error) -> Self {
        TotpError::new(TotpErrorKind::ParseError, format!("JSON: {}", e))
    }
}

impl From<toml::de::Error> for TotpError {
    fn from(e: toml::de::Error) -> Self {
        TotpError::new(TotpErrorKind::ParseError, format!("TOML: {}", e))
    }
}

impl From<toml::ser::Error> for TotpError {
    fn from(e: toml::ser::Error) -> Self {
        TotpError::new(TotpErrorKind::ExportFailed, format!("TOML: {}", e))
    }
}
