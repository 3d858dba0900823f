// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Background Wiring
//!
//! Connects the alarm scheduler to its handlers and starts the maintenance
//! work that runs without a caller:
//!
//! 1. Both the session manager and the gateway cache are registered on one
//!    [`AlarmDispatcher`]; each ignores alarms that are not its own.
//! 2. The periodic gateway refresh alarm is installed if missing.
//! 3. An initial gateway refresh runs immediately, so a fresh install has a
//!    directory before the first 12h tick.
//! 4. The scheduler loop is spawned until the shutdown token fires.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::alarms::{AlarmDispatcher, AlarmError, DurableAlarmScheduler};
use crate::gateways::{GatewayDirectoryCache, RefreshOutcome};
use crate::session::SessionKeyManager;

/// Handles of the spawned background tasks.
pub struct BackgroundTasks {
    pub scheduler: JoinHandle<()>,
    pub initial_refresh: JoinHandle<RefreshOutcome>,
}

/// Register alarm handlers and spawn the background tasks.
pub async fn start(
    scheduler: Arc<DurableAlarmScheduler>,
    session: Arc<SessionKeyManager>,
    gateways: Arc<GatewayDirectoryCache>,
    shutdown: CancellationToken,
) -> Result<BackgroundTasks, AlarmError> {
    let dispatcher = Arc::new(
        AlarmDispatcher::new()
            .with_handler(session)
            .with_handler(gateways.clone()),
    );

    gateways.schedule_refresh(false).await?;

    let initial_refresh = tokio::spawn(async move {
        info!("Running initial gateway refresh");
        gateways.refresh(None).await
    });
    let scheduler = tokio::spawn(scheduler.run(dispatcher, shutdown));

    Ok(BackgroundTasks {
        scheduler,
        initial_refresh,
    })
}
