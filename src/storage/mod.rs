// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Scoped Persistent Store
//!
//! Async key-value contract for the extension's "local" storage area.
//! Values are JSON documents stored as text, mirroring how extension storage
//! serializes everything it persists.
//!
//! ## Storage Layout
//!
//! ```text
//! local/
//!   decryption_key     # base64 session secret (obfuscated, NOT encrypted)
//!   password_expires   # epoch-ms session expiration
//!   gateways           # processed gateway directory (JSON list)
//!   wallets            # wallet list (read-only here)
//!   alarm_registry     # durable alarm table
//! ```
//!
//! ## Backends
//!
//! - [`MemoryStore`] - process-local, used by tests and ephemeral hosts
//! - [`RedbStore`] - durable, single redb table

pub mod memory;
pub mod redb_store;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

pub use memory::MemoryStore;
pub use redb_store::RedbStore;

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// Store Contract
// =============================================================================

/// Durable async key-value store.
///
/// Every call is a suspension point; implementations give no ordering
/// guarantee across concurrent callers beyond last-writer-wins per key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Raw JSON text stored under `key`.
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Replace the value stored under `key`.
    async fn set(&self, key: &str, value: String) -> StorageResult<()>;

    /// Delete `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> StorageResult<()>;
}

/// Read and deserialize the JSON value under `key`.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> StorageResult<Option<T>> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serialize `value` as JSON and store it under `key`.
pub async fn set_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, raw).await
}
