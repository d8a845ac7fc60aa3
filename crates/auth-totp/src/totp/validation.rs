//! Field gatekeepers run by every mutation path before anything is written.

use crate::totp::base32;
use crate::totp::types::*;

pub const MIN_DIGITS: u32 = 6;
pub const MAX_DIGITS: u32 = 8;

/// Digits must lie in `6..=8`.
pub fn validate_digits(digits: u32) -> Result<(), TotpError> {
    if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits) {
        return Err(TotpError::new(
            TotpErrorKind::InvalidDigits,
            "Digits must be between 6 and 8",
        ));
    }
    Ok(())
}

/// Period must be non-zero.
pub fn validate_period(period: u32) -> Result<(), TotpError> {
    if period == 0 {
        return Err(TotpError::new(TotpErrorKind::InvalidPeriod, "Period cannot be 0"));
    }
    Ok(())
}

/// Secret may contain only ASCII alphanumerics, spaces and hyphens, and must
/// carry at least one character once separators are stripped.
pub fn validate_secret(secret: &str) -> Result<(), TotpError> {
    if secret
        .chars()
        .any(|c| c != ' ' && c != '-' && !c.is_ascii_alphanumeric())
    {
        return Err(TotpError::new(
            TotpErrorKind::InvalidSecret,
            "Secret contains invalid characters",
        ));
    }
    if base32::clean(secret).is_empty() {
        return Err(TotpError::new(TotpErrorKind::InvalidSecret, "Secret cannot be empty"));
    }
    Ok(())
}

/// Validate every field of a new entry (digits, then period, then secret).
pub fn validate_draft(draft: &EntryDraft) -> Result<(), TotpError> {
    validate_digits(draft.digits)?;
    validate_period(draft.period)?;
    validate_secret(&draft.secret)
}

/// Validate only the fields an edit supplies.
pub fn validate_update(update: &EntryUpdate) -> Result<(), TotpError> {
    if let Some(digits) = update.digits {
        validate_digits(digits)?;
    }
    if let Some(period) = update.period {
        validate_period(period)?;
    }
    if let Some(secret) = &update.secret {
        validate_secret(secret)?;
    }
    Ok(())
}
