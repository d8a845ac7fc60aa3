//! Import / export documents in TOML or JSON.
//!
//! Exported entries carry the usable secret, never a backend reference, so
//! a document can be imported on a host with a different secret backend.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::totp::types::*;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    #[default]
    Toml,
    Json,
}

impl FileFormat {
    /// Parse a case-insensitive format name (`toml` or `json`).
    pub fn from_str_loose(name: &str) -> Result<Self, TotpError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            other => Err(TotpError::new(
                TotpErrorKind::InvalidInput,
                format!("Unsupported format: {}", other),
            )
            .with_detail("Supported formats: toml, json")),
        }
    }

    /// Format name, or the default when none was given.
    pub fn from_option(name: Option<&str>) -> Result<Self, TotpError> {
        name.map_or(Ok(Self::default()), Self::from_str_loose)
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Toml => write!(f, "toml"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// One entry as it appears in an import/export document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedEntry {
    pub name: String,
    pub secret: String,
    #[serde(default = "default_digits")]
    pub digits: u32,
    #[serde(default = "default_period")]
    pub period: u32,
}

fn default_digits() -> u32 {
    DEFAULT_DIGITS
}

fn default_period() -> u32 {
    DEFAULT_PERIOD
}

impl ExportedEntry {
    pub fn new(entry: &Entry, secret: impl Into<String>) -> Self {
        Self {
            name: entry.name.clone(),
            secret: secret.into(),
            digits: entry.digits,
            period: entry.period,
        }
    }

    pub fn to_draft(&self) -> EntryDraft {
        EntryDraft::new(self.name.clone(), self.secret.clone())
            .with_digits(self.digits)
            .with_period(self.period)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportDocument {
    #[serde(default)]
    pub entries: Vec<ExportedEntry>,
}

/// Serialise a document.
pub fn render(doc: &ExportDocument, format: FileFormat) -> Result<String, TotpError> {
    match format {
        FileFormat::Toml => Ok(toml::to_string_pretty(doc)?),
        FileFormat::Json => serde_json::to_string_pretty(doc).map_err(|e| {
            TotpError::new(TotpErrorKind::ExportFailed, format!("JSON serialise: {}", e))
        }),
    }
}

/// Parse a document.
pub fn parse(text: &str, format: FileFormat) -> Result<ExportDocument, TotpError> {
    let parsed: Result<ExportDocument, TotpError> = match format {
        FileFormat::Toml => toml::from_str(text).map_err(TotpError::from),
        FileFormat::Json => serde_json::from_str(text).map_err(TotpError::from),
    };
    parsed.map_err(|e| {
        TotpError::new(TotpErrorKind::ImportFailed, format!("Invalid {} document", format))
            .with_detail(e.message)
    })
}

/// Write a document to `path`, replacing any existing file.
pub fn write_file(path: &Path, doc: &ExportDocument, format: FileFormat) -> Result<(), TotpError> {
    let text = render(doc, format)?;
    fs::write(path, text).map_err(|e| {
        TotpError::new(
            TotpErrorKind::ExportFailed,
            format!("Failed to export entries to {}", path.display()),
        )
        .with_detail(e.to_string())
    })
}

/// Read and parse a document from `path`.
pub fn read_file(path: &Path, format: FileFormat) -> Result<ExportDocument, TotpError> {
    let text = fs::read_to_string(path).map_err(|e| {
        TotpError::new(
            TotpErrorKind::ImportFailed,
            format!("Failed to import entries from {}", path.display()),
        )
        .with_detail(e.to_string())
    })?;
    parse(&text, format)
}
