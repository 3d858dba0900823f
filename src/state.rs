// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::gateways::GatewayDirectoryCache;
use crate::session::SessionKeyManager;

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SessionKeyManager>,
    pub gateways: Arc<GatewayDirectoryCache>,
}

impl AppState {
    pub fn new(session: Arc<SessionKeyManager>, gateways: Arc<GatewayDirectoryCache>) -> Self {
        Self { session, gateways }
    }
}

#[cfg(test)]
impl AppState {
    /// State over an in-memory store with no wallets, a fixed clock, and a
    /// directory that serves `directory` after `failures` failed fetches.
    pub async fn for_tests(failures: usize, directory: serde_json::Value) -> Self {
        use crate::alarms::DurableAlarmScheduler;
        use crate::clock::ManualClock;
        use crate::storage::MemoryStore;
        use crate::testing::{FakeVerifier, FakeWallets, ScriptedDirectory, StaticProbe};

        let store = Arc::new(MemoryStore::new());
        // 2026-01-15T00:00:00Z
        let clock = Arc::new(ManualClock::new(1_768_435_200_000));
        let scheduler = Arc::new(
            DurableAlarmScheduler::restore(store.clone(), clock.clone())
                .await
                .unwrap(),
        );

        let session = SessionKeyManager::new(
            store.clone(),
            scheduler.clone(),
            Arc::new(FakeWallets::new(vec![])),
            Arc::new(FakeVerifier::accepting("correct")),
            clock.clone(),
        );
        let gateways = GatewayDirectoryCache::new(
            store,
            scheduler,
            Arc::new(ScriptedDirectory::new(failures, directory)),
            Arc::new(StaticProbe::new(clock.clone())),
            clock,
        );

        Self::new(Arc::new(session), Arc::new(gateways))
    }
}
