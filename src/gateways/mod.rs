// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Gateway Directory Cache
//!
//! Keeps a health-checked list of network gateways in the store under
//! `gateways`.
//!
//! ## Refresh Flow
//!
//! 1. `update_gateway` (every 12h) or `update_gateway_retry` fires.
//! 2. The directory document is fetched and normalized into [`GarItem`]s.
//! 3. Every item is probed; healthy gateways are collected as each probe
//!    completes.
//! 4. On success the cache is replaced in a single write.
//!
//! Any failure leaves the previous cache in place and schedules a one-shot
//! retry an hour later. Retries are unbounded.

pub mod probe;
pub mod source;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::alarms::{Alarm, AlarmError, AlarmHandler, AlarmScheduler, AlarmSpec};
use crate::clock::Clock;
use crate::storage::{get_json, set_json, KeyValueStore, StorageError};

pub use probe::{HealthProbe, HttpHealthProbe, ProbeError};
pub use source::{DirectorySource, HttpDirectorySource};
pub use types::{extract_gar_items, GarItem, ProcessedGateway};

/// Storage key of the processed gateway list.
pub const GATEWAY_CACHE_STORAGE: &str = "gateways";

/// Periodic refresh alarm.
pub const GATEWAY_UPDATE_ALARM: &str = "update_gateway";

/// One-shot retry alarm after a failed refresh.
pub const GATEWAY_RETRY_ALARM: &str = "update_gateway_retry";

/// Period of the refresh alarm (12 hours).
pub const GATEWAY_UPDATE_PERIOD_MINUTES: u32 = 12 * 60;

/// Delay before a failed refresh is retried.
pub const GATEWAY_RETRY_DELAY_MINUTES: i64 = 60;

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("network error: {0}")]
    Network(String),

    #[error("directory returned HTTP {0}")]
    Status(u16),

    #[error("invalid directory document: {0}")]
    Parse(String),

    #[error("directory contains no usable gateways")]
    EmptyDirectory,

    #[error("probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("no gateway passed the health probe")]
    NoHealthyGateways,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result of a [`GatewayDirectoryCache::refresh`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// The alarm was not a gateway refresh alarm
    Ignored,
    /// Cache replaced with `gateways` entries
    Updated { gateways: usize },
    /// Refresh failed, retry alarm scheduled
    RetryScheduled,
    /// Refresh failed and the retry alarm could not be scheduled either
    RetryFailed,
}

// =============================================================================
// GatewayDirectoryCache
// =============================================================================

/// Alarm-driven gateway directory refresher.
pub struct GatewayDirectoryCache {
    store: Arc<dyn KeyValueStore>,
    scheduler: Arc<dyn AlarmScheduler>,
    source: Arc<dyn DirectorySource>,
    probe: Arc<dyn HealthProbe>,
    clock: Arc<dyn Clock>,
}

impl GatewayDirectoryCache {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        scheduler: Arc<dyn AlarmScheduler>,
        source: Arc<dyn DirectorySource>,
        probe: Arc<dyn HealthProbe>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            scheduler,
            source,
            probe,
            clock,
        }
    }

    /// Cached gateways; empty if no refresh has succeeded yet.
    pub async fn get_cache(&self) -> Result<Vec<ProcessedGateway>, StorageError> {
        Ok(get_json(self.store.as_ref(), GATEWAY_CACHE_STORAGE)
            .await?
            .unwrap_or_default())
    }

    /// Schedule the next refresh.
    ///
    /// Without `retry` this installs the periodic alarm unless it already
    /// exists, keeping its phase. With `retry` a one-shot alarm is set an
    /// hour out; it does not touch the periodic alarm.
    pub async fn schedule_refresh(&self, retry: bool) -> Result<(), AlarmError> {
        if retry {
            let when_ms = self.clock.now_ms() + GATEWAY_RETRY_DELAY_MINUTES * 60 * 1000;
            self.scheduler
                .create(GATEWAY_RETRY_ALARM, AlarmSpec::At { when_ms })
                .await?;
            debug!(when_ms, "Gateway refresh retry scheduled");
            return Ok(());
        }

        if self.scheduler.get(GATEWAY_UPDATE_ALARM).await?.is_some() {
            return Ok(());
        }

        self.scheduler
            .create(
                GATEWAY_UPDATE_ALARM,
                AlarmSpec::Periodic {
                    period_minutes: GATEWAY_UPDATE_PERIOD_MINUTES,
                },
            )
            .await?;
        info!(
            period_minutes = GATEWAY_UPDATE_PERIOD_MINUTES,
            "Gateway refresh scheduled"
        );
        Ok(())
    }

    /// Refresh the cache.
    ///
    /// `alarm` is the fired alarm, or `None` for a direct call (startup or
    /// manual refresh). Alarms with other names are ignored.
    pub async fn refresh(&self, alarm: Option<&Alarm>) -> RefreshOutcome {
        if let Some(alarm) = alarm {
            if alarm.name != GATEWAY_UPDATE_ALARM && alarm.name != GATEWAY_RETRY_ALARM {
                return RefreshOutcome::Ignored;
            }
        }

        match self.fetch_and_probe().await {
            Ok(count) => {
                info!(gateways = count, "Gateway cache updated");
                RefreshOutcome::Updated { gateways: count }
            }
            Err(e) => {
                warn!(error = %e, "Gateway refresh failed, scheduling retry");
                match self.schedule_refresh(true).await {
                    Ok(()) => RefreshOutcome::RetryScheduled,
                    Err(e) => {
                        warn!(error = %e, "Failed to schedule gateway refresh retry");
                        RefreshOutcome::RetryFailed
                    }
                }
            }
        }
    }

    async fn fetch_and_probe(&self) -> Result<usize, RefreshError> {
        let document = self.source.fetch_directory().await?;
        let gateways = document
            .get("gateways")
            .ok_or_else(|| RefreshError::Parse("missing `gateways` field".to_string()))?;

        let items = extract_gar_items(gateways)?;
        if items.is_empty() {
            return Err(RefreshError::EmptyDirectory);
        }
        debug!(candidates = items.len(), "Probing gateways");

        let mut processed = Vec::with_capacity(items.len());
        self.probe
            .probe(items, &mut |gateway: ProcessedGateway| processed.push(gateway))
            .await?;

        if processed.is_empty() {
            return Err(RefreshError::NoHealthyGateways);
        }

        set_json(self.store.as_ref(), GATEWAY_CACHE_STORAGE, &processed).await?;
        Ok(processed.len())
    }
}

#[async_trait]
impl AlarmHandler for GatewayDirectoryCache {
    async fn on_alarm(&self, alarm: &Alarm) {
        // Outcome is already logged by refresh
        let _ = self.refresh(Some(alarm)).await;
    }
}
