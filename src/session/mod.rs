// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Session Key Manager
//!
//! Owns the lifecycle of the wallet decryption key: validating a password,
//! caching it for the session, expiring it and removing it.
//!
//! ## States
//!
//! ```text
//!   NoKey ──unlock──► Unlocked(expires_at) ──time passes──► Expired
//!     ▲                     │                                  │
//!     └──── removal alarm / last window closed / lock ◄────────┘
//! ```
//!
//! `Unlocked` is only ever entered through [`SessionKeyManager::unlock`].
//! `Expired` means the expiration record has passed while the key row may
//! still exist; callers must check [`SessionKeyManager::is_expired`] before
//! trusting a cached key.
//!
//! ## Removal Paths
//!
//! - `remove_decryption_key_scheduled` alarm (periodic 24h safety net, and a
//!   one-shot at the expiration timestamp on first unlock)
//! - open window count reaching zero
//! - explicit [`SessionKeyManager::lock`]
//!
//! All of them are idempotent. Writers race with last-writer-wins on the
//! single key slot: an unlock interleaved with a window-close can end with
//! the fresh key removed.

pub mod obfuscation;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Months, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use zeroize::Zeroizing;

use crate::alarms::{Alarm, AlarmError, AlarmHandler, AlarmScheduler, AlarmSpec};
use crate::clock::Clock;
use crate::storage::{get_json, set_json, KeyValueStore, StorageError};
use crate::wallets::{PasswordVerifier, WalletSource};

use obfuscation::{deobfuscate, obfuscate};

/// Storage key of the obfuscated session key.
pub const DECRYPTION_KEY_STORAGE: &str = "decryption_key";

/// Storage key of the session expiration timestamp (epoch ms).
pub const EXPIRATION_STORAGE: &str = "password_expires";

/// Alarm that removes the cached key.
pub const KEY_REMOVAL_ALARM: &str = "remove_decryption_key_scheduled";

/// Period of the removal safety-net alarm (one day).
pub const KEY_REMOVAL_PERIOD_MINUTES: u32 = 60 * 24;

/// Session lifetime measured from the first unlock.
pub const SESSION_LIFETIME_MONTHS: u32 = 6;

/// Cached session key, wiped from memory on drop.
pub type SessionKey = Zeroizing<String>;

/// Observable session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// No key cached
    NoKey,
    /// Key cached and the session has not expired
    Unlocked { expires_at: DateTime<Utc> },
    /// Key still cached but the expiration record has passed (or is missing)
    Expired,
}

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("alarm error: {0}")]
    Alarm(#[from] AlarmError),

    #[error("stored decryption key is corrupted")]
    CorruptedKey,
}

pub type SessionResult<T> = Result<T, SessionError>;

// =============================================================================
// SessionKeyManager
// =============================================================================

/// Decryption-key lifecycle manager.
pub struct SessionKeyManager {
    store: Arc<dyn KeyValueStore>,
    scheduler: Arc<dyn AlarmScheduler>,
    wallets: Arc<dyn WalletSource>,
    verifier: Arc<dyn PasswordVerifier>,
    clock: Arc<dyn Clock>,
}

impl SessionKeyManager {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        scheduler: Arc<dyn AlarmScheduler>,
        wallets: Arc<dyn WalletSource>,
        verifier: Arc<dyn PasswordVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            scheduler,
            wallets,
            verifier,
            clock,
        }
    }

    /// Validate a candidate password.
    ///
    /// With a cached key this is a plain equality check against it. Without
    /// one, the first local wallet's keyfile is decrypted; if there are no
    /// local wallets any password is accepted (a new password is being set).
    /// A wrong password or a malformed keyfile both yield `Ok(false)`.
    pub async fn check_password(&self, candidate: &str) -> SessionResult<bool> {
        if let Some(key) = self.get_decryption_key().await? {
            return Ok(key.as_str() == candidate);
        }

        let wallets = self.wallets.list_wallets().await?;
        let Some(keyfile) = wallets.iter().find_map(|wallet| wallet.keyfile()) else {
            debug!("No local wallets, accepting new password");
            return Ok(true);
        };

        match self.verifier.decrypt_wallet(keyfile, candidate).await {
            Ok(decrypted) => {
                decrypted.free();
                Ok(true)
            }
            Err(e) => {
                debug!(error = %e, "Password verification failed");
                Ok(false)
            }
        }
    }

    /// Validate `password` and start a session with it.
    ///
    /// Returns `Ok(false)` without touching any state if the password is
    /// wrong.
    pub async fn unlock(&self, password: &str) -> SessionResult<bool> {
        if !self.check_password(password).await? {
            return Ok(false);
        }

        self.set_decryption_key(password).await?;
        self.schedule_key_removal().await?;
        self.add_expiration().await?;

        info!("Session unlocked");
        Ok(true)
    }

    /// Whether the session must be treated as expired.
    ///
    /// True when no expiration record exists or it lies in the past.
    pub async fn is_expired(&self) -> SessionResult<bool> {
        match self.expiration().await? {
            Some(expires) => Ok(self.clock.now_ms() > expires),
            None => Ok(true),
        }
    }

    /// The cached key, if any.
    ///
    /// `None` means the key row is absent; an empty password is still a
    /// cached key. `None` does not distinguish "never unlocked" from
    /// "removed"; combine with [`Self::is_expired`] for that.
    pub async fn get_decryption_key(&self) -> SessionResult<Option<SessionKey>> {
        let encoded: Option<String> = get_json(self.store.as_ref(), DECRYPTION_KEY_STORAGE).await?;
        match encoded {
            Some(encoded) => deobfuscate(&encoded)
                .map(Some)
                .map_err(|_| SessionError::CorruptedKey),
            None => Ok(None),
        }
    }

    /// Delete the cached key. Idempotent.
    pub async fn remove_decryption_key(&self) -> SessionResult<()> {
        self.store.remove(DECRYPTION_KEY_STORAGE).await?;
        Ok(())
    }

    /// Cancel the pending removal alarm. Returns whether one was pending.
    pub async fn cancel_scheduled_removal(&self) -> SessionResult<bool> {
        Ok(self.scheduler.clear(KEY_REMOVAL_ALARM).await?)
    }

    /// End the session explicitly: remove the key and its removal alarm.
    ///
    /// The expiration record is kept so the session horizon is not extended
    /// by locking and unlocking again.
    pub async fn lock(&self) -> SessionResult<()> {
        self.remove_decryption_key().await?;
        self.cancel_scheduled_removal().await?;
        info!("Session locked");
        Ok(())
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> SessionResult<SessionState> {
        if self.store.get(DECRYPTION_KEY_STORAGE).await?.is_none() {
            return Ok(SessionState::NoKey);
        }

        match self.expiration().await? {
            Some(expires) if self.clock.now_ms() <= expires => Ok(SessionState::Unlocked {
                expires_at: epoch_ms_to_datetime(expires),
            }),
            _ => Ok(SessionState::Expired),
        }
    }

    /// Handle the key removal alarm: remove the key if one is cached.
    ///
    /// Returns whether a key was removed.
    pub async fn handle_removal_alarm(&self) -> SessionResult<bool> {
        // Presence check on the raw slot so a corrupted value is still removed
        if self.store.get(DECRYPTION_KEY_STORAGE).await?.is_none() {
            debug!("Key removal alarm fired with no cached key");
            return Ok(false);
        }

        self.remove_decryption_key().await?;
        info!("Decryption key removed by scheduled alarm");
        Ok(true)
    }

    /// React to the number of open top-level browser windows changing.
    ///
    /// When no window is left the session ends, regardless of expiration.
    /// Returns whether the key was removed.
    pub async fn on_window_count_changed(&self, open_windows: usize) -> SessionResult<bool> {
        if open_windows > 0 {
            return Ok(false);
        }

        self.remove_decryption_key().await?;
        info!("Last browser window closed, decryption key removed");
        Ok(true)
    }

    async fn set_decryption_key(&self, key: &str) -> SessionResult<()> {
        set_json(self.store.as_ref(), DECRYPTION_KEY_STORAGE, &obfuscate(key)).await?;
        Ok(())
    }

    async fn expiration(&self) -> SessionResult<Option<i64>> {
        let expires: Option<i64> = get_json(self.store.as_ref(), EXPIRATION_STORAGE).await?;
        Ok(expires.filter(|expires| *expires != 0))
    }

    async fn schedule_key_removal(&self) -> SessionResult<()> {
        self.scheduler
            .create(
                KEY_REMOVAL_ALARM,
                AlarmSpec::Periodic {
                    period_minutes: KEY_REMOVAL_PERIOD_MINUTES,
                },
            )
            .await?;
        Ok(())
    }

    /// Create the expiration record if missing, and schedule the session
    /// reset at that instant.
    async fn add_expiration(&self) -> SessionResult<()> {
        if self.expiration().await?.is_some() {
            return Ok(());
        }

        let expires = session_expiry(self.clock.now()).timestamp_millis();
        set_json(self.store.as_ref(), EXPIRATION_STORAGE, &expires).await?;

        // Replaces the periodic alarm of the same name until the next unlock
        self.scheduler
            .create(KEY_REMOVAL_ALARM, AlarmSpec::At { when_ms: expires })
            .await?;

        info!(expires_at = expires, "Session expiration recorded");
        Ok(())
    }
}

#[async_trait]
impl AlarmHandler for SessionKeyManager {
    async fn on_alarm(&self, alarm: &Alarm) {
        if alarm.name != KEY_REMOVAL_ALARM {
            return;
        }

        if let Err(e) = self.handle_removal_alarm().await {
            warn!(error = %e, "Failed to remove decryption key on alarm");
        }
    }
}

/// Expiration instant for a session starting at `start`.
pub fn session_expiry(start: DateTime<Utc>) -> DateTime<Utc> {
    start
        .checked_add_months(Months::new(SESSION_LIFETIME_MONTHS))
        .unwrap_or_else(|| start + ChronoDuration::days(183))
}

fn epoch_ms_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarms::DurableAlarmScheduler;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use crate::testing::{FailingStore, FakeVerifier, FakeWallets};
    use crate::wallets::{StoredWallets, Wallet, WALLETS_STORAGE};
    use std::time::Duration;

    /// 2026-01-15T00:00:00Z
    const START_MS: i64 = 1_768_435_200_000;
    const DAY: Duration = Duration::from_secs(24 * 3600);

    struct Harness {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        scheduler: Arc<DurableAlarmScheduler>,
        verifier: Arc<FakeVerifier>,
        manager: SessionKeyManager,
    }

    async fn harness(wallets: Vec<Wallet>) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(START_MS));
        let scheduler = Arc::new(
            DurableAlarmScheduler::restore(store.clone(), clock.clone())
                .await
                .unwrap(),
        );
        let verifier = Arc::new(FakeVerifier::accepting("correct"));
        let manager = SessionKeyManager::new(
            store.clone(),
            scheduler.clone(),
            Arc::new(FakeWallets::new(wallets)),
            verifier.clone(),
            clock.clone(),
        );
        Harness {
            store,
            clock,
            scheduler,
            verifier,
            manager,
        }
    }

    fn local_wallet() -> Wallet {
        Wallet::Local {
            address: "addr-1".to_string(),
            keyfile: "keyfile-1".to_string(),
            nickname: None,
        }
    }

    fn key_string(key: Option<SessionKey>) -> Option<String> {
        key.map(|k| k.as_str().to_string())
    }

    #[tokio::test]
    async fn bootstrap_accepts_any_password() {
        let h = harness(vec![]).await;
        assert!(h.manager.check_password("anything").await.unwrap());
        assert!(h.manager.check_password("").await.unwrap());
        assert_eq!(h.verifier.calls(), 0);
    }

    #[tokio::test]
    async fn hardware_only_wallets_count_as_bootstrap() {
        let h = harness(vec![Wallet::Hardware {
            address: "hw".to_string(),
            api: "keystone".to_string(),
            nickname: None,
        }])
        .await;
        assert!(h.manager.check_password("anything").await.unwrap());
    }

    #[tokio::test]
    async fn unlock_then_get_returns_password() {
        let h = harness(vec![]).await;
        assert!(h.manager.unlock("abc").await.unwrap());
        assert_eq!(key_string(h.manager.get_decryption_key().await.unwrap()).as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn empty_password_unlock_is_consistent() {
        let h = harness(vec![]).await;
        assert!(h.manager.unlock("").await.unwrap());

        assert_eq!(key_string(h.manager.get_decryption_key().await.unwrap()).as_deref(), Some(""));
        assert!(matches!(
            h.manager.state().await.unwrap(),
            SessionState::Unlocked { .. }
        ));
        assert!(h.manager.check_password("").await.unwrap());
        assert!(!h.manager.check_password("abc").await.unwrap());

        h.manager.lock().await.unwrap();
        assert!(h.manager.get_decryption_key().await.unwrap().is_none());
        assert_eq!(h.manager.state().await.unwrap(), SessionState::NoKey);
    }

    #[tokio::test]
    async fn key_is_stored_obfuscated() {
        let h = harness(vec![]).await;
        h.manager.unlock("abc").await.unwrap();
        let raw = h.store.get(DECRYPTION_KEY_STORAGE).await.unwrap().unwrap();
        assert_eq!(raw, "\"YWJj\"");
    }

    #[tokio::test]
    async fn wrong_password_against_wallet_fails_without_state_change() {
        let h = harness(vec![local_wallet()]).await;
        assert!(!h.manager.check_password("wrong").await.unwrap());
        assert!(!h.manager.unlock("wrong").await.unwrap());

        assert!(h.manager.get_decryption_key().await.unwrap().is_none());
        assert!(!h.store.contains(EXPIRATION_STORAGE).await);
        assert!(h.scheduler.get(KEY_REMOVAL_ALARM).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn correct_password_decrypts_first_local_wallet_and_frees_it() {
        let h = harness(vec![local_wallet()]).await;
        assert!(h.manager.check_password("correct").await.unwrap());
        assert_eq!(h.verifier.calls(), 1);
        assert_eq!(h.verifier.last_keyfile().as_deref(), Some("keyfile-1"));
    }

    #[tokio::test]
    async fn stored_list_with_unknown_wallet_type_still_unlocks() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(START_MS));
        let scheduler = Arc::new(
            DurableAlarmScheduler::restore(store.clone(), clock.clone())
                .await
                .unwrap(),
        );
        set_json(
            store.as_ref(),
            WALLETS_STORAGE,
            &serde_json::json!([
                { "type": "ledger", "address": "ledger-1" },
                { "type": "local", "address": "addr-1", "keyfile": "k" }
            ]),
        )
        .await
        .unwrap();
        let verifier = Arc::new(FakeVerifier::accepting("correct"));
        let manager = SessionKeyManager::new(
            store.clone(),
            scheduler,
            Arc::new(StoredWallets::new(store)),
            verifier.clone(),
            clock,
        );

        assert!(manager.check_password("correct").await.unwrap());
        assert_eq!(verifier.last_keyfile().as_deref(), Some("k"));
        assert!(!manager.check_password("wrong").await.unwrap());
        assert!(manager.unlock("correct").await.unwrap());
    }

    #[tokio::test]
    async fn malformed_keyfile_fails_closed() {
        let h = harness(vec![local_wallet()]).await;
        h.verifier.set_malformed(true);
        assert!(!h.manager.check_password("correct").await.unwrap());
    }

    #[tokio::test]
    async fn cached_key_is_compared_without_decrypting() {
        let h = harness(vec![local_wallet()]).await;
        assert!(h.manager.unlock("correct").await.unwrap());
        let calls = h.verifier.calls();

        assert!(h.manager.check_password("correct").await.unwrap());
        assert!(!h.manager.check_password("other").await.unwrap());
        assert_eq!(h.verifier.calls(), calls);
    }

    #[tokio::test]
    async fn first_unlock_sets_six_month_expiration() {
        let h = harness(vec![]).await;
        assert!(h.manager.is_expired().await.unwrap());

        h.manager.unlock("abc").await.unwrap();
        assert!(!h.manager.is_expired().await.unwrap());

        let expires: i64 = get_json(h.store.as_ref(), EXPIRATION_STORAGE)
            .await
            .unwrap()
            .unwrap();
        // 2026-07-15T00:00:00Z
        assert_eq!(expires, 1_784_073_600_000);

        h.clock.set_ms(expires);
        assert!(!h.manager.is_expired().await.unwrap());
        h.clock.set_ms(expires + 1);
        assert!(h.manager.is_expired().await.unwrap());
    }

    #[tokio::test]
    async fn first_unlock_schedules_one_shot_at_expiration() {
        let h = harness(vec![]).await;
        h.manager.unlock("abc").await.unwrap();

        let alarm = h.scheduler.get(KEY_REMOVAL_ALARM).await.unwrap().unwrap();
        assert!(!alarm.is_periodic());
        assert_eq!(alarm.scheduled_time, session_expiry(h.clock.now()).timestamp_millis());
    }

    #[tokio::test]
    async fn later_unlock_keeps_expiration_and_schedules_periodic_removal() {
        let h = harness(vec![]).await;
        h.manager.unlock("abc").await.unwrap();
        let first: Option<i64> = get_json(h.store.as_ref(), EXPIRATION_STORAGE).await.unwrap();

        h.clock.advance(DAY * 3);
        h.manager.unlock("abc").await.unwrap();
        let second: Option<i64> = get_json(h.store.as_ref(), EXPIRATION_STORAGE).await.unwrap();
        assert_eq!(first, second);

        let alarm = h.scheduler.get(KEY_REMOVAL_ALARM).await.unwrap().unwrap();
        assert_eq!(alarm.period_in_minutes, Some(KEY_REMOVAL_PERIOD_MINUTES));
        assert_eq!(alarm.scheduled_time, h.clock.now_ms() + DAY.as_millis() as i64);
    }

    #[tokio::test]
    async fn state_transitions() {
        let h = harness(vec![]).await;
        assert_eq!(h.manager.state().await.unwrap(), SessionState::NoKey);

        h.manager.unlock("abc").await.unwrap();
        let expires = session_expiry(h.clock.now());
        assert_eq!(
            h.manager.state().await.unwrap(),
            SessionState::Unlocked { expires_at: expires }
        );

        h.clock.set_ms(expires.timestamp_millis() + 1);
        assert_eq!(h.manager.state().await.unwrap(), SessionState::Expired);
        // Key is still physically present until an alarm removes it
        assert!(h.manager.get_decryption_key().await.unwrap().is_some());

        h.manager.remove_decryption_key().await.unwrap();
        assert_eq!(h.manager.state().await.unwrap(), SessionState::NoKey);
    }

    #[tokio::test]
    async fn removal_alarm_removes_key() {
        let h = harness(vec![]).await;
        h.manager.unlock("abc").await.unwrap();

        let alarm = h.scheduler.get(KEY_REMOVAL_ALARM).await.unwrap().unwrap();
        h.manager.on_alarm(&alarm).await;
        assert!(h.manager.get_decryption_key().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn removal_alarm_without_key_is_noop() {
        let h = harness(vec![]).await;
        assert!(!h.manager.handle_removal_alarm().await.unwrap());
        assert!(!h.manager.handle_removal_alarm().await.unwrap());
        assert_eq!(h.manager.state().await.unwrap(), SessionState::NoKey);
    }

    #[tokio::test]
    async fn unrelated_alarm_is_ignored() {
        let h = harness(vec![]).await;
        h.manager.unlock("abc").await.unwrap();

        let alarm = Alarm {
            name: "update_gateway".to_string(),
            scheduled_time: 0,
            period_in_minutes: Some(720),
        };
        h.manager.on_alarm(&alarm).await;
        assert!(h.manager.get_decryption_key().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn removal_alarm_clears_corrupted_key() {
        let h = harness(vec![]).await;
        h.store
            .set(DECRYPTION_KEY_STORAGE, "\"%%%\"".to_string())
            .await
            .unwrap();
        assert!(matches!(
            h.manager.get_decryption_key().await,
            Err(SessionError::CorruptedKey)
        ));

        assert!(h.manager.handle_removal_alarm().await.unwrap());
        assert!(h.manager.get_decryption_key().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn last_window_closing_removes_key_even_before_expiry() {
        let h = harness(vec![]).await;
        h.manager.unlock("abc").await.unwrap();

        assert!(!h.manager.on_window_count_changed(2).await.unwrap());
        assert!(h.manager.get_decryption_key().await.unwrap().is_some());

        assert!(h.manager.on_window_count_changed(0).await.unwrap());
        assert!(h.manager.get_decryption_key().await.unwrap().is_none());
        assert!(!h.manager.is_expired().await.unwrap());
    }

    #[tokio::test]
    async fn last_window_closing_after_expiry_removes_key() {
        let h = harness(vec![]).await;
        h.manager.unlock("abc").await.unwrap();
        h.clock.advance(DAY * 400);

        h.manager.on_window_count_changed(0).await.unwrap();
        assert!(h.manager.get_decryption_key().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lock_removes_key_and_cancels_alarm() {
        let h = harness(vec![]).await;
        h.manager.unlock("abc").await.unwrap();

        h.manager.lock().await.unwrap();
        assert!(h.manager.get_decryption_key().await.unwrap().is_none());
        assert!(h.scheduler.get(KEY_REMOVAL_ALARM).await.unwrap().is_none());
        assert!(!h.manager.cancel_scheduled_removal().await.unwrap());
        assert!(h.store.contains(EXPIRATION_STORAGE).await);
    }

    #[tokio::test]
    async fn storage_failure_is_distinct_from_wrong_password() {
        let store = Arc::new(FailingStore::new());
        let clock = Arc::new(ManualClock::new(START_MS));
        let scheduler = Arc::new(
            DurableAlarmScheduler::restore(store.clone(), clock.clone())
                .await
                .unwrap(),
        );
        let manager = SessionKeyManager::new(
            store.clone(),
            scheduler,
            Arc::new(FakeWallets::new(vec![])),
            Arc::new(FakeVerifier::accepting("correct")),
            clock,
        );

        store.fail_reads(true);
        assert!(matches!(
            manager.check_password("abc").await,
            Err(SessionError::Storage(_))
        ));
        assert!(matches!(manager.unlock("abc").await, Err(SessionError::Storage(_))));
    }

    #[test]
    fn session_expiry_clamps_month_end() {
        let start = Utc.with_ymd_and_hms(2026, 8, 31, 12, 0, 0).unwrap();
        assert_eq!(
            session_expiry(start),
            Utc.with_ymd_and_hms(2027, 2, 28, 12, 0, 0).unwrap()
        );
    }
}
