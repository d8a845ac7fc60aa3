//! Permissive RFC 4648 Base32 decoding for human-typed secrets.
//!
//! Secrets are pasted with spaces, dashes, lowercase letters and stray
//! padding. Rather than rejecting them, decoding skips anything outside the
//! alphabet and keeps every complete byte it can assemble.

const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Strip spaces and hyphens and uppercase the rest.
pub fn clean(input: &str) -> String {
    input
        .chars()
        .filter(|c| *c != ' ' && *c != '-')
        .flat_map(char::to_uppercase)
        .collect()
}

/// Decode a Base32 secret. Never fails; unknown characters are skipped and
/// trailing bits that do not fill a byte are dropped.
pub fn decode(input: &str) -> Vec<u8> {
    let filtered: String = clean(input)
        .chars()
        .filter(|c| c.is_ascii() && ALPHABET.contains(&(*c as u8)))
        .collect();
    ::base32::decode(::base32::Alphabet::Rfc4648 { padding: false }, &filtered).unwrap_or_default()
}
