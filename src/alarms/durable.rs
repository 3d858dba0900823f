// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Durable Alarm Scheduler
//!
//! Tokio-driven implementation of [`AlarmScheduler`] whose alarm table lives
//! in the [`KeyValueStore`], so alarms survive process restarts.
//!
//! ## Strategy
//!
//! 1. On start the registry is restored from `alarm_registry`.
//! 2. The run loop hands every due alarm to the [`AlarmDispatcher`] on its
//!    own task, then sleeps until the next fire time, capped at
//!    `max_idle_wait` so a wall-clock jump is noticed within a minute.
//! 3. Once a delivery finished, the firing is acknowledged: one-shot alarms
//!    are removed and periodic ones rescheduled, and the table is persisted.
//!    A crash before that point redelivers the alarm after restart.
//! 4. `create`/`clear` wake the loop early so a sooner alarm is not missed.
//!
//! Alarms that came due while the process was down fire once on the first
//! tick after restore (periodic alarms coalesce missed periods).
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken`, the same pattern as the other
//! background tasks.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Alarm, AlarmDispatcher, AlarmError, AlarmRegistry, AlarmScheduler, AlarmSpec};
use crate::clock::Clock;
use crate::storage::{get_json, set_json, KeyValueStore};

/// Storage key holding the persisted alarm table.
pub const ALARM_REGISTRY_STORAGE: &str = "alarm_registry";

/// Longest the run loop sleeps without re-reading the clock.
const DEFAULT_MAX_IDLE_WAIT: Duration = Duration::from_secs(60);

/// Back-off after the registry could not be persisted.
const PERSIST_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Store-backed alarm scheduler.
pub struct DurableAlarmScheduler {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    registry: Mutex<AlarmRegistry>,
    wake: Notify,
    max_idle_wait: Duration,
}

impl DurableAlarmScheduler {
    /// Load the persisted alarm table (empty if none) and build a scheduler.
    pub async fn restore(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AlarmError> {
        let registry: AlarmRegistry = get_json(store.as_ref(), ALARM_REGISTRY_STORAGE)
            .await?
            .unwrap_or_default();

        info!(alarms = registry.len(), "Restored alarm registry");

        Ok(Self {
            store,
            clock,
            registry: Mutex::new(registry),
            wake: Notify::new(),
            max_idle_wait: DEFAULT_MAX_IDLE_WAIT,
        })
    }

    /// Override the idle wait cap.
    pub fn with_max_idle_wait(mut self, wait: Duration) -> Self {
        self.max_idle_wait = wait;
        self
    }

    /// Snapshot of all pending alarms.
    pub async fn alarms(&self) -> Vec<Alarm> {
        self.registry.lock().await.iter().cloned().collect()
    }

    /// Every alarm due now, oldest first. Nothing is consumed until
    /// [`Self::acknowledge`].
    pub async fn due(&self) -> Vec<Alarm> {
        self.registry.lock().await.due(self.clock.now_ms())
    }

    /// Consume a delivered firing and persist the updated table.
    ///
    /// The in-memory table only changes once the new state is stored, so a
    /// storage failure leaves the alarm in place to be acknowledged again.
    pub async fn acknowledge(&self, fired: &Alarm, fired_at_ms: i64) -> Result<(), AlarmError> {
        let mut registry = self.registry.lock().await;
        let mut next = registry.clone();
        if !next.acknowledge(fired, fired_at_ms) {
            return Ok(());
        }

        set_json(self.store.as_ref(), ALARM_REGISTRY_STORAGE, &next).await?;
        *registry = next;
        Ok(())
    }

    /// Run the scheduler loop until the cancellation token is triggered.
    ///
    /// Deliveries still running at shutdown are dropped unacknowledged and
    /// fire again after the next restore.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(scheduler.clone().run(dispatcher, shutdown.clone()));
    /// ```
    pub async fn run(self: Arc<Self>, dispatcher: Arc<AlarmDispatcher>, shutdown: CancellationToken) {
        info!(
            handlers = dispatcher.handler_count(),
            max_idle_secs = self.max_idle_wait.as_secs(),
            "Alarm scheduler starting"
        );

        let mut deliveries: JoinSet<Delivery> = JoinSet::new();
        let mut in_flight: HashSet<DeliveryKey> = HashSet::new();
        let mut unacknowledged: Vec<Delivery> = Vec::new();

        loop {
            if shutdown.is_cancelled() {
                info!("Alarm scheduler shutting down");
                return;
            }

            let mut pending = Vec::new();
            for delivery in unacknowledged.drain(..) {
                match self.acknowledge(&delivery.alarm, delivery.fired_at_ms).await {
                    Ok(()) => {
                        in_flight.remove(&delivery.key());
                    }
                    Err(e) => {
                        warn!(alarm = %delivery.alarm.name, error = %e, "Failed to persist fired alarm, will retry");
                        pending.push(delivery);
                    }
                }
            }
            unacknowledged = pending;

            let fired_at_ms = self.clock.now_ms();
            for alarm in self.due().await {
                if !in_flight.insert(delivery_key(&alarm)) {
                    continue;
                }
                debug!(
                    alarm = %alarm.name,
                    scheduled_time = alarm.scheduled_time,
                    "Alarm fired"
                );
                let dispatcher = dispatcher.clone();
                deliveries.spawn(async move {
                    dispatcher.dispatch(&alarm).await;
                    Delivery { alarm, fired_at_ms }
                });
            }

            let mut wait = self.next_wait(&in_flight).await;
            if !unacknowledged.is_empty() {
                wait = wait.min(PERSIST_RETRY_DELAY);
            }

            tokio::select! {
                _ = tokio::time::sleep(wait) => {},
                _ = self.wake.notified() => {},
                Some(joined) = deliveries.join_next(), if !deliveries.is_empty() => match joined {
                    Ok(delivery) => unacknowledged.push(delivery),
                    Err(e) => warn!(error = %e, "Alarm delivery task failed"),
                },
                _ = shutdown.cancelled() => {
                    info!("Alarm scheduler shutting down");
                    return;
                }
            }
        }
    }

    /// Time until the earliest alarm not already being delivered, capped at
    /// `max_idle_wait`.
    async fn next_wait(&self, in_flight: &HashSet<DeliveryKey>) -> Duration {
        let registry = self.registry.lock().await;
        let next = registry
            .iter()
            .filter(|alarm| !in_flight.contains(&delivery_key(alarm)))
            .map(|alarm| alarm.scheduled_time)
            .min();
        match next {
            Some(next) => {
                let delta = next.saturating_sub(self.clock.now_ms());
                u64::try_from(delta)
                    .map(Duration::from_millis)
                    .unwrap_or(Duration::ZERO)
                    .min(self.max_idle_wait)
            }
            None => self.max_idle_wait,
        }
    }
}

/// Identity of one firing: the same alarm rescheduled is a new firing.
type DeliveryKey = (String, i64);

fn delivery_key(alarm: &Alarm) -> DeliveryKey {
    (alarm.name.clone(), alarm.scheduled_time)
}

/// A firing whose handlers have all returned.
struct Delivery {
    alarm: Alarm,
    fired_at_ms: i64,
}

impl Delivery {
    fn key(&self) -> DeliveryKey {
        delivery_key(&self.alarm)
    }
}

#[async_trait]
impl AlarmScheduler for DurableAlarmScheduler {
    async fn create(&self, name: &str, spec: AlarmSpec) -> Result<(), AlarmError> {
        let mut registry = self.registry.lock().await;
        let mut next = registry.clone();
        let alarm = next.insert(name, spec, self.clock.now_ms())?;
        set_json(self.store.as_ref(), ALARM_REGISTRY_STORAGE, &next).await?;
        *registry = next;
        drop(registry);

        debug!(
            alarm = %alarm.name,
            scheduled_time = alarm.scheduled_time,
            period_in_minutes = ?alarm.period_in_minutes,
            "Alarm scheduled"
        );
        self.wake.notify_one();
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<Alarm>, AlarmError> {
        Ok(self.registry.lock().await.get(name).cloned())
    }

    async fn clear(&self, name: &str) -> Result<bool, AlarmError> {
        let mut registry = self.registry.lock().await;
        if registry.get(name).is_none() {
            return Ok(false);
        }

        let mut next = registry.clone();
        next.remove(name);
        set_json(self.store.as_ref(), ALARM_REGISTRY_STORAGE, &next).await?;
        *registry = next;
        drop(registry);

        debug!(alarm = %name, "Alarm cleared");
        self.wake.notify_one();
        Ok(true)
    }
}
