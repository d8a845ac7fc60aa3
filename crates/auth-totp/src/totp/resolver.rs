//! Token → entry resolution.
//!
//! A token is tried as a stable id, then as a 1-based position in the
//! id-sorted listing, then as an exact name. Ordinals are never stored; they
//! are recomputed from the slice on every call.

use crate::totp::types::*;

/// Entries ordered ascending by id (the listing order).
pub fn sorted_by_id(entries: &[Entry]) -> Vec<&Entry> {
    let mut sorted: Vec<&Entry> = entries.iter().collect();
    sorted.sort_by_key(|e| e.id);
    sorted
}

/// 1-based listing position of the entry with `id`.
pub fn ordinal_of(entries: &[Entry], id: u64) -> Option<usize> {
    sorted_by_id(entries)
        .iter()
        .position(|e| e.id == id)
        .map(|p| p + 1)
}

/// Resolve a user token to a single entry.
///
/// Precedence is id, then ordinal, then case-sensitive name.
pub fn resolve<'a>(entries: &'a [Entry], token: &str) -> Result<&'a Entry, TotpError> {
    if let Some(n) = parse_number(token) {
        if let Some(entry) = entries.iter().find(|e| e.id == n) {
            log::debug!("token '{}' matched id {}", token, n);
            return Ok(entry);
        }
        let ordinal = usize::try_from(n)
            .ok()
            .filter(|n| (1..=entries.len()).contains(n));
        if let Some(ordinal) = ordinal {
            let sorted = sorted_by_id(entries);
            let entry = sorted[ordinal - 1];
            log::debug!("token '{}' matched ordinal -> id {}", token, entry.id);
            return Ok(entry);
        }
    }

    match entries.iter().find(|e| e.name == token) {
        Some(entry) => {
            log::debug!("token '{}' matched name -> id {}", token, entry.id);
            Ok(entry)
        }
        None => Err(TotpError::not_found(token)),
    }
}

/// Plain decimal digits only; `u64::from_str` would also take a leading `+`.
fn parse_number(token: &str) -> Option<u64> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}
