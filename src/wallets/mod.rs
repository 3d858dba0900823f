// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Wallet Store
//!
//! Read-only view of the wallets saved by the extension. Only `local`
//! wallets carry an encrypted keyfile, and only the first one is used to
//! validate a password when no session key is cached.
//!
//! ## Storage Layout
//!
//! ```text
//! local/
//!   wallets   # [{ "type": "local", "address": "...", "keyfile": "..." }, ...]
//! ```

pub mod keyfile;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::storage::{get_json, KeyValueStore, StorageResult};

pub use keyfile::{DecryptError, DecryptedWallet, PasswordVerifier, SealedKeyfileVerifier};

/// Storage key of the wallet list.
pub const WALLETS_STORAGE: &str = "wallets";

/// A wallet known to the extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Wallet {
    /// Software wallet with an encrypted keyfile stored locally
    Local {
        address: String,
        keyfile: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nickname: Option<String>,
    },
    /// Hardware wallet; no key material is stored locally
    Hardware {
        address: String,
        api: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nickname: Option<String>,
    },
    /// Any wallet type this service does not handle; ignored by the session
    #[serde(other)]
    Other,
}

impl Wallet {
    pub fn address(&self) -> Option<&str> {
        match self {
            Wallet::Local { address, .. } | Wallet::Hardware { address, .. } => Some(address),
            Wallet::Other => None,
        }
    }

    /// Encrypted keyfile, present only for local wallets.
    pub fn keyfile(&self) -> Option<&str> {
        match self {
            Wallet::Local { keyfile, .. } => Some(keyfile),
            Wallet::Hardware { .. } | Wallet::Other => None,
        }
    }
}

/// Source of the saved wallet list.
#[async_trait]
pub trait WalletSource: Send + Sync {
    async fn list_wallets(&self) -> StorageResult<Vec<Wallet>>;
}

/// Wallet list read from the shared [`KeyValueStore`].
pub struct StoredWallets {
    store: Arc<dyn KeyValueStore>,
}

impl StoredWallets {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl WalletSource for StoredWallets {
    async fn list_wallets(&self) -> StorageResult<Vec<Wallet>> {
        Ok(get_json(self.store.as_ref(), WALLETS_STORAGE)
            .await?
            .unwrap_or_default())
    }
}
