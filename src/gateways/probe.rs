// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Gateway health probing.
//!
//! Every candidate is probed concurrently with `GET <base>/info`. A gateway
//! is healthy when it answers with a success status before the timeout.
//! Results are handed to the caller as each probe completes, so the order
//! follows response time rather than input order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::debug;

use super::types::{GarItem, ProcessedGateway};
use crate::clock::Clock;

/// Path probed on each gateway.
const PROBE_PATH: &str = "info";

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("probe task failed: {0}")]
    Task(String),

    #[error("probe client error: {0}")]
    Client(String),
}

/// Health check collaborator.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe `items`, calling `on_result` once per healthy gateway.
    ///
    /// Unhealthy gateways are dropped silently; an `Err` means the probe
    /// run itself broke down.
    async fn probe(
        &self,
        items: Vec<GarItem>,
        on_result: &mut (dyn FnMut(ProcessedGateway) + Send),
    ) -> Result<(), ProbeError>;
}

/// Concurrent HTTP probe.
pub struct HttpHealthProbe {
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
}

impl HttpHealthProbe {
    /// `timeout` bounds each individual probe.
    pub fn new(timeout: Duration, clock: Arc<dyn Clock>) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))?;
        Ok(Self { client, clock })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(
        &self,
        items: Vec<GarItem>,
        on_result: &mut (dyn FnMut(ProcessedGateway) + Send),
    ) -> Result<(), ProbeError> {
        let mut tasks = JoinSet::new();
        for item in items {
            let client = self.client.clone();
            let clock = self.clock.clone();
            tasks.spawn(async move { probe_one(client, clock, item).await });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(gateway)) => on_result(gateway),
                Ok(None) => {}
                Err(e) => {
                    tasks.abort_all();
                    return Err(ProbeError::Task(e.to_string()));
                }
            }
        }

        Ok(())
    }
}

async fn probe_one(
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
    item: GarItem,
) -> Option<ProcessedGateway> {
    let url = item.base_url().ok()?.join(PROBE_PATH).ok()?;

    let started = Instant::now();
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            debug!(gateway = %item.id, error = %e, "Gateway probe failed");
            return None;
        }
    };

    if !response.status().is_success() {
        debug!(gateway = %item.id, status = %response.status(), "Gateway unhealthy");
        return None;
    }

    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    Some(ProcessedGateway {
        gateway: item,
        latency_ms,
        checked_at: clock.now(),
    })
}
