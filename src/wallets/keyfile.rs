// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Password verification against a wallet keyfile.
//!
//! ## Security Note
//!
//! The wallet cipher is owned by the wallet layer; this module only needs a
//! yes/no answer and must not keep anything it decrypts. [`DecryptedWallet`]
//! zeroizes its buffer on drop, so every exit path (success, early return,
//! panic unwinding) releases the material.
//!
//! [`SealedKeyfileVerifier`] understands a minimal envelope whose payload is
//! authenticated with HMAC-SHA256 keyed by the password:
//!
//! ```text
//! { "version": 1, "salt": b64, "payload": b64, "tag": b64(HMAC(pw, salt || payload)) }
//! ```

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

type HmacSha256 = Hmac<Sha256>;

const KEYFILE_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum DecryptError {
    #[error("wrong password")]
    WrongPassword,

    #[error("malformed keyfile: {0}")]
    Malformed(String),
}

/// Decrypted wallet material, wiped when dropped.
pub struct DecryptedWallet {
    material: Zeroizing<Vec<u8>>,
}

impl DecryptedWallet {
    pub fn new(material: Vec<u8>) -> Self {
        Self {
            material: Zeroizing::new(material),
        }
    }

    pub fn expose(&self) -> &[u8] {
        &self.material
    }

    /// Explicitly release the material.
    pub fn free(mut self) {
        self.material.zeroize();
    }
}

impl std::fmt::Debug for DecryptedWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptedWallet")
            .field("material", &"[REDACTED]")
            .finish()
    }
}

/// Wallet decryption collaborator.
#[async_trait]
pub trait PasswordVerifier: Send + Sync {
    /// Decrypt `keyfile` with `password`.
    async fn decrypt_wallet(
        &self,
        keyfile: &str,
        password: &str,
    ) -> Result<DecryptedWallet, DecryptError>;
}

#[derive(Serialize, Deserialize)]
struct SealedKeyfile {
    version: u32,
    salt: String,
    payload: String,
    tag: String,
}

/// Verifier for HMAC-sealed keyfiles.
#[derive(Debug, Clone, Copy, Default)]
pub struct SealedKeyfileVerifier;

impl SealedKeyfileVerifier {
    /// Build a keyfile sealing `payload` under `password`.
    pub fn seal(payload: &[u8], password: &str, salt: &[u8]) -> Result<String, DecryptError> {
        let mut mac = new_mac(password)?;
        mac.update(salt);
        mac.update(payload);
        let tag = mac.finalize().into_bytes();

        let keyfile = SealedKeyfile {
            version: KEYFILE_VERSION,
            salt: Base64::encode_string(salt),
            payload: Base64::encode_string(payload),
            tag: Base64::encode_string(&tag),
        };
        serde_json::to_string(&keyfile).map_err(|e| DecryptError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl PasswordVerifier for SealedKeyfileVerifier {
    async fn decrypt_wallet(
        &self,
        keyfile: &str,
        password: &str,
    ) -> Result<DecryptedWallet, DecryptError> {
        let sealed: SealedKeyfile =
            serde_json::from_str(keyfile).map_err(|e| DecryptError::Malformed(e.to_string()))?;
        if sealed.version != KEYFILE_VERSION {
            return Err(DecryptError::Malformed(format!(
                "unsupported keyfile version {}",
                sealed.version
            )));
        }

        let salt = decode_field("salt", &sealed.salt)?;
        let payload = DecryptedWallet::new(decode_field("payload", &sealed.payload)?);
        let tag = decode_field("tag", &sealed.tag)?;

        let mut mac = new_mac(password)?;
        mac.update(&salt);
        mac.update(payload.expose());
        mac.verify_slice(&tag)
            .map_err(|_| DecryptError::WrongPassword)?;

        Ok(payload)
    }
}

fn new_mac(password: &str) -> Result<HmacSha256, DecryptError> {
    HmacSha256::new_from_slice(password.as_bytes())
        .map_err(|e| DecryptError::Malformed(e.to_string()))
}

fn decode_field(field: &str, value: &str) -> Result<Vec<u8>, DecryptError> {
    Base64::decode_vec(value).map_err(|e| DecryptError::Malformed(format!("{field}: {e}")))
}
