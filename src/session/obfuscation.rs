// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Reversible encoding of the persisted session key.
//!
//! ## Security Note
//!
//! This is base64, NOT encryption. It keeps the password from sitting in the
//! store as plain text and nothing more: anyone who can read the store can
//! recover the key. The key has to be recoverable for the cached-key
//! equality check, so this is a known limitation rather than a bug.

use base64ct::{Base64, Encoding};
use zeroize::Zeroizing;

#[derive(Debug, thiserror::Error)]
pub enum ObfuscationError {
    #[error("invalid base64")]
    Encoding,

    #[error("decoded key is not valid UTF-8")]
    Utf8,
}

/// Encode `key` for storage.
pub fn obfuscate(key: &str) -> String {
    Base64::encode_string(key.as_bytes())
}

/// Recover a key produced by [`obfuscate`].
pub fn deobfuscate(encoded: &str) -> Result<Zeroizing<String>, ObfuscationError> {
    let bytes = Zeroizing::new(Base64::decode_vec(encoded).map_err(|_| ObfuscationError::Encoding)?);
    let key = std::str::from_utf8(&bytes).map_err(|_| ObfuscationError::Utf8)?;
    Ok(Zeroizing::new(key.to_string()))
}
