// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Test doubles shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, Semaphore};

use crate::alarms::{Alarm, AlarmHandler};
use crate::clock::Clock;
use crate::gateways::{
    DirectorySource, GarItem, HealthProbe, ProbeError, ProcessedGateway, RefreshError,
};
use crate::storage::{KeyValueStore, MemoryStore, StorageError, StorageResult};
use crate::wallets::{DecryptError, DecryptedWallet, PasswordVerifier, Wallet, WalletSource};

// =============================================================================
// Storage
// =============================================================================

/// [`MemoryStore`] whose reads or writes can be switched to fail.
#[derive(Default)]
pub struct FailingStore {
    inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool) -> StorageResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Self::check(&self.fail_reads)?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String) -> StorageResult<()> {
        Self::check(&self.fail_writes)?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        Self::check(&self.fail_writes)?;
        self.inner.remove(key).await
    }
}

// =============================================================================
// Alarms
// =============================================================================

/// Handler that records the name of every alarm it sees.
#[derive(Default)]
pub struct RecordingHandler {
    seen: Mutex<Vec<String>>,
    notify: Notify,
}

impl RecordingHandler {
    pub async fn names(&self) -> Vec<String> {
        self.seen.lock().await.clone()
    }

    /// Wait until at least `count` alarms were recorded.
    pub async fn wait_for(&self, count: usize) {
        loop {
            if self.seen.lock().await.len() >= count {
                return;
            }
            self.notify.notified().await;
        }
    }
}

#[async_trait]
impl AlarmHandler for RecordingHandler {
    async fn on_alarm(&self, alarm: &Alarm) {
        self.seen.lock().await.push(alarm.name.clone());
        self.notify.notify_one();
    }
}

/// Handler that blocks on one alarm name until released.
pub struct GatedHandler {
    name: String,
    entered: Notify,
    gate: Semaphore,
}

impl GatedHandler {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entered: Notify::new(),
            gate: Semaphore::new(0),
        }
    }

    /// Wait until the handler is blocked inside `on_alarm`.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl AlarmHandler for GatedHandler {
    async fn on_alarm(&self, alarm: &Alarm) {
        if alarm.name != self.name {
            return;
        }
        self.entered.notify_one();
        let _permit = self.gate.acquire().await;
    }
}

// =============================================================================
// Wallets
// =============================================================================

pub struct FakeWallets {
    wallets: Vec<Wallet>,
}

impl FakeWallets {
    pub fn new(wallets: Vec<Wallet>) -> Self {
        Self { wallets }
    }
}

#[async_trait]
impl WalletSource for FakeWallets {
    async fn list_wallets(&self) -> StorageResult<Vec<Wallet>> {
        Ok(self.wallets.clone())
    }
}

/// Verifier that accepts a single password for any keyfile.
pub struct FakeVerifier {
    password: String,
    malformed: AtomicBool,
    calls: AtomicUsize,
    last_keyfile: StdMutex<Option<String>>,
}

impl FakeVerifier {
    pub fn accepting(password: &str) -> Self {
        Self {
            password: password.to_string(),
            malformed: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            last_keyfile: StdMutex::new(None),
        }
    }

    /// Make every keyfile look corrupted.
    pub fn set_malformed(&self, malformed: bool) {
        self.malformed.store(malformed, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_keyfile(&self) -> Option<String> {
        self.last_keyfile.lock().unwrap().clone()
    }
}

#[async_trait]
impl PasswordVerifier for FakeVerifier {
    async fn decrypt_wallet(
        &self,
        keyfile: &str,
        password: &str,
    ) -> Result<DecryptedWallet, DecryptError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_keyfile.lock().unwrap() = Some(keyfile.to_string());

        if self.malformed.load(Ordering::SeqCst) {
            return Err(DecryptError::Malformed("corrupted".to_string()));
        }
        if password != self.password {
            return Err(DecryptError::WrongPassword);
        }
        Ok(DecryptedWallet::new(b"wallet-material".to_vec()))
    }
}

// =============================================================================
// Gateways
// =============================================================================

/// Directory source that fails a fixed number of times, then serves
/// `document`.
pub struct ScriptedDirectory {
    failures: usize,
    document: serde_json::Value,
    calls: AtomicUsize,
}

impl ScriptedDirectory {
    pub fn new(failures: usize, document: serde_json::Value) -> Self {
        Self {
            failures,
            document,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectorySource for ScriptedDirectory {
    async fn fetch_directory(&self) -> Result<serde_json::Value, RefreshError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(RefreshError::Network("connection refused".to_string()));
        }
        Ok(self.document.clone())
    }
}

/// Probe that reports every gateway healthy.
pub struct StaticProbe {
    clock: Arc<dyn Clock>,
}

impl StaticProbe {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl HealthProbe for StaticProbe {
    async fn probe(
        &self,
        items: Vec<GarItem>,
        on_result: &mut (dyn FnMut(ProcessedGateway) + Send),
    ) -> Result<(), ProbeError> {
        for item in items {
            on_result(ProcessedGateway {
                gateway: item,
                latency_ms: 1,
                checked_at: self.clock.now(),
            });
        }
        Ok(())
    }
}

/// Health checker that reports the first gateway and then breaks down.
pub struct PartialHealthCheck {
    clock: Arc<dyn Clock>,
}

impl PartialHealthCheck {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl HealthProbe for PartialHealthCheck {
    async fn probe(
        &self,
        items: Vec<GarItem>,
        on_result: &mut (dyn FnMut(ProcessedGateway) + Send),
    ) -> Result<(), ProbeError> {
        if let Some(item) = items.into_iter().next() {
            on_result(ProcessedGateway {
                gateway: item,
                latency_ms: 1,
                checked_at: self.clock.now(),
            });
        }
        Err(ProbeError::Task("health check task panicked".to_string()))
    }
}
