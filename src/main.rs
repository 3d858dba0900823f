// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use session_keeper::{
    alarms::DurableAlarmScheduler,
    api::router,
    background,
    clock::{Clock, SystemClock},
    config::{Config, LogFormat, DEFAULT_LOG_FILTER},
    gateways::{GatewayDirectoryCache, HttpDirectorySource, HttpHealthProbe},
    session::SessionKeyManager,
    state::AppState,
    storage::{KeyValueStore, RedbStore},
    wallets::{SealedKeyfileVerifier, StoredWallets},
};

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    init_tracing(config.log_format);

    let store: Arc<dyn KeyValueStore> = Arc::new(
        RedbStore::open(&config.store_path()).expect("Failed to open session store"),
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let scheduler = Arc::new(
        DurableAlarmScheduler::restore(store.clone(), clock.clone())
            .await
            .expect("Failed to restore alarm registry"),
    );

    let session = Arc::new(SessionKeyManager::new(
        store.clone(),
        scheduler.clone(),
        Arc::new(StoredWallets::new(store.clone())),
        Arc::new(SealedKeyfileVerifier),
        clock.clone(),
    ));

    let source = HttpDirectorySource::new(config.gateway_directory_url.clone(), config.http_timeout)
        .expect("Failed to build directory client");
    let probe =
        HttpHealthProbe::new(config.probe_timeout, clock.clone()).expect("Failed to build probe client");
    let gateways = Arc::new(GatewayDirectoryCache::new(
        store.clone(),
        scheduler.clone(),
        Arc::new(source),
        Arc::new(probe),
        clock,
    ));

    let shutdown = CancellationToken::new();
    let tasks = background::start(scheduler, session.clone(), gateways.clone(), shutdown.clone())
        .await
        .expect("Failed to schedule gateway refresh");

    let app = router(AppState::new(session, gateways));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Failed to parse bind address");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind control API");

    info!(
        %addr,
        store = %config.store_path().display(),
        directory = %config.gateway_directory_url,
        "Session keeper listening (OpenAPI at /api-doc/openapi.json)"
    );

    let server_shutdown = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
                _ = server_shutdown.cancelled() => {},
            }
        })
        .await;
    if let Err(e) = served {
        error!(error = %e, "Control API server failed");
    }

    shutdown.cancel();
    let _ = tasks.scheduler.await;
    info!("Session keeper stopped");
}
