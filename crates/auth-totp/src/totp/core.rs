//! Core OTP generation: RFC 4226 (HOTP) and RFC 6238 (TOTP).
//!
//! HMAC-SHA1 only. Secrets are Base32 text and go through the permissive
//! decoder, so generation is a pure function of (secret, digits, period,
//! time).

use crate::totp::base32;
use crate::totp::types::*;
use crate::totp::validation;
use hmac::{Hmac, Mac};
use sha1::Sha1;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Raw HMAC-OTP (RFC 4226 §5.3)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compute an HOTP code for the given raw key bytes and counter.
pub fn hotp_raw(key: &[u8], counter: u64, digits: u32) -> String {
    let digest = compute_hmac(key, &counter.to_be_bytes());
    truncate(&digest, digits)
}

/// HMAC-SHA1(key, message). An empty key is valid HMAC input.
fn compute_hmac(key: &[u8], data: &[u8]) -> [u8; 20] {
    let mut mac = Hmac::<Sha1>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    let mut out = [0u8; 20];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// Dynamic truncation per RFC 4226 §5.3.
fn truncate(digest: &[u8; 20], digits: u32) -> String {
    let offset = (digest[19] & 0x0f) as usize;
    let binary = u32::from_be_bytes([
        digest[offset],
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]) & 0x7fff_ffff;
    let modulus = 10u64.pow(digits);
    let code = binary as u64 % modulus;
    format!("{:0>width$}", code, width = digits as usize)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  HOTP (counter-based, RFC 4226)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Generate an HOTP code from a Base32 secret.
pub fn generate_hotp(secret_b32: &str, counter: u64, digits: u32) -> Result<String, TotpError> {
    validation::validate_digits(digits)?;
    let key = base32::decode(secret_b32);
    Ok(hotp_raw(&key, counter, digits))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  TOTP (time-based, RFC 6238)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Time-step counter for a unix timestamp. `period` must be non-zero.
pub fn time_step_at(unix_seconds: u64, period: u32) -> u64 {
    unix_seconds / period as u64
}

/// Seconds remaining in the window containing `unix_seconds`.
pub fn seconds_remaining_at(unix_seconds: u64, period: u32) -> u32 {
    let p = period as u64;
    (p - (unix_seconds % p)) as u32
}

/// Seconds remaining in the current window.
pub fn seconds_remaining(period: u32) -> u32 {
    seconds_remaining_at(current_unix_time(), period)
}

/// Generate a TOTP code at the current time.
pub fn generate_totp(secret_b32: &str, digits: u32, period: u32) -> Result<String, TotpError> {
    generate_totp_at(secret_b32, digits, period, current_unix_time())
}

/// Generate a TOTP code at an explicit unix timestamp.
pub fn generate_totp_at(
    secret_b32: &str,
    digits: u32,
    period: u32,
    unix_seconds: u64,
) -> Result<String, TotpError> {
    validation::validate_period(period)?;
    generate_hotp(secret_b32, time_step_at(unix_seconds, period), digits)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  High-level: generate from entry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build a `GeneratedCode` from an already-usable secret.
pub fn code_for_secret_at(
    entry_id: u64,
    secret_b32: &str,
    digits: u32,
    period: u32,
    unix_seconds: u64,
) -> Result<GeneratedCode, TotpError> {
    let code = generate_totp_at(secret_b32, digits, period, unix_seconds)?;
    Ok(GeneratedCode {
        code,
        remaining_seconds: seconds_remaining_at(unix_seconds, period),
        period,
        counter: time_step_at(unix_seconds, period),
        entry_id,
    })
}

/// Generate a code for an entry using only its metadata.
///
/// Backend-held secrets cannot be produced here: `BackendRef` fails with
/// `SecretUnavailable`, `BackendFailed` with `SecretStorageFailed`.
pub fn generate_code_at(entry: &Entry, unix_seconds: u64) -> Result<GeneratedCode, TotpError> {
    match &entry.secret {
        SecretSource::Inline(secret) => {
            code_for_secret_at(entry.id, secret, entry.digits, entry.period, unix_seconds)
        }
        SecretSource::BackendRef(name) => Err(secret_unavailable(name)),
        SecretSource::BackendFailed(name) => Err(secret_storage_failed(name)),
    }
}

/// Generate a code for an entry at the current time.
pub fn generate_code(entry: &Entry) -> Result<GeneratedCode, TotpError> {
    generate_code_at(entry, current_unix_time())
}

pub(crate) fn secret_unavailable(name: &str) -> TotpError {
    TotpError::new(
        TotpErrorKind::SecretUnavailable,
        "Failed to retrieve secret for this entry",
    )
    .with_detail(format!("secret is held by secret storage under '{}'", name))
}

pub(crate) fn secret_storage_failed(name: &str) -> TotpError {
    TotpError::new(
        TotpErrorKind::SecretStorageFailed,
        "Secret storage failed to provide a secret",
    )
    .with_detail(format!("entry '{}'", name))
}

/// Current unix timestamp in seconds.
pub fn current_unix_time() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
