// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Alarm Scheduler
//!
//! Named, durable timers. An alarm either repeats every `period_in_minutes`
//! or fires once at an absolute epoch-ms timestamp.
//!
//! ## Semantics
//!
//! - Creating an alarm under an existing name replaces it (and resets its
//!   phase). Callers that want "schedule only if missing" check
//!   [`AlarmScheduler::get`] first.
//! - One-shot alarms are consumed when they fire; periodic alarms persist
//!   until cleared.
//! - Every fired alarm is delivered to every registered [`AlarmHandler`];
//!   handlers filter on the exact alarm name.
//! - Delivery is at-least-once. A firing is only consumed after every handler
//!   returned, so a crash mid-dispatch redelivers it after restart. Missed
//!   periodic firings are coalesced into a single fire, and a cleared alarm
//!   may still be observed once if it was already due. Handlers must be
//!   idempotent.
//! - Handlers run concurrently, and each fired alarm is delivered on its own
//!   task: a slow handler never holds back another alarm.

pub mod durable;
pub mod registry;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use crate::storage::StorageError;

pub use durable::DurableAlarmScheduler;
pub use registry::AlarmRegistry;

/// Activation rule for a new alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmSpec {
    /// Fire every `period_minutes`, first fire one period from now.
    Periodic { period_minutes: u32 },
    /// Fire once at the given epoch-ms timestamp.
    At { when_ms: i64 },
}

/// A registered alarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    /// Unique name within the alarm namespace
    pub name: String,
    /// Next fire time (epoch ms)
    pub scheduled_time: i64,
    /// Repeat period; `None` for one-shot alarms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_in_minutes: Option<u32>,
}

impl Alarm {
    pub fn is_periodic(&self) -> bool {
        self.period_in_minutes.is_some()
    }
}

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AlarmError {
    #[error("alarm registry storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid alarm {name}: {reason}")]
    Invalid { name: String, reason: String },
}

// =============================================================================
// Scheduler Contract
// =============================================================================

/// Platform timer facility.
#[async_trait]
pub trait AlarmScheduler: Send + Sync {
    /// Register (or replace) the alarm named `name`.
    async fn create(&self, name: &str, spec: AlarmSpec) -> Result<(), AlarmError>;

    /// Look up a pending alarm.
    async fn get(&self, name: &str) -> Result<Option<Alarm>, AlarmError>;

    /// Cancel a pending alarm. Returns whether one was removed.
    async fn clear(&self, name: &str) -> Result<bool, AlarmError>;
}

/// Receiver of fired alarms.
#[async_trait]
pub trait AlarmHandler: Send + Sync {
    /// Called for every fired alarm, regardless of name.
    async fn on_alarm(&self, alarm: &Alarm);
}

/// Process-wide fan-out of fired alarms to all handlers.
#[derive(Default, Clone)]
pub struct AlarmDispatcher {
    handlers: Vec<Arc<dyn AlarmHandler>>,
}

impl AlarmDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler; it will receive every subsequent alarm.
    pub fn register(&mut self, handler: Arc<dyn AlarmHandler>) {
        self.handlers.push(handler);
    }

    pub fn with_handler(mut self, handler: Arc<dyn AlarmHandler>) -> Self {
        self.register(handler);
        self
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Deliver `alarm` to every handler concurrently and wait for all of
    /// them. A panicking handler is logged and does not affect the others.
    pub async fn dispatch(&self, alarm: &Alarm) {
        tracing::debug!(
            alarm = %alarm.name,
            handlers = self.handlers.len(),
            "Dispatching alarm"
        );
        let mut calls = JoinSet::new();
        for handler in &self.handlers {
            let handler = handler.clone();
            let alarm = alarm.clone();
            calls.spawn(async move { handler.on_alarm(&alarm).await });
        }
        while let Some(joined) = calls.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(alarm = %alarm.name, error = %e, "Alarm handler failed");
            }
        }
    }
}
