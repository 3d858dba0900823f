// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Durable key-value store backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `local`: storage key → JSON text
//!
//! Each `set`/`remove` is its own write transaction, so a crash never leaves
//! a half-written value behind.

use std::path::Path;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, TableDefinition};

use super::{KeyValueStore, StorageResult};

/// The extension's "local" storage area.
const LOCAL_AREA: TableDefinition<&str, &str> = TableDefinition::new("local");

/// redb-backed [`KeyValueStore`].
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open (or create) the store at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create the table so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(LOCAL_AREA)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }
}

#[async_trait]
impl KeyValueStore for RedbStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LOCAL_AREA)?;
        match table.get(key)? {
            Some(v) => Ok(Some(v.value().to_string())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(LOCAL_AREA)?;
            table.insert(key, value.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(LOCAL_AREA)?;
            table.remove(key)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
