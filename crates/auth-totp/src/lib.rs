//! # Auth – TOTP credential engine
//!
//! Time-based one-time passwords over a small collection of named entries:
//!
//! - **RFC 4226 / 6238** – HOTP & TOTP generation with HMAC-SHA1
//! - **Base32** – Permissive decoding of human-typed secrets
//! - **Resolution** – Address entries by id, listing ordinal, or name
//! - **Validation** – Digit, period and secret gatekeepers
//! - **Secret backends** – Optional secure storage for raw secrets, with
//!   explicit failure markers when the backend cannot deliver
//! - **Persistence** – JSON file repository with atomic replace
//! - **Transfer** – TOML / JSON import and export

pub mod totp;
