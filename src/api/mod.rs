// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;

use crate::{
    gateways::{GarItem, ProcessedGateway, RefreshOutcome},
    session::SessionState,
    state::AppState,
};

pub mod gateways;
pub mod health;
pub mod session;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route(
            "/session",
            get(session::get_session).delete(session::lock),
        )
        .route("/session/check", post(session::check_password))
        .route("/session/unlock", post(session::unlock))
        .route("/lifecycle/windows", post(session::window_count_changed))
        .route("/gateways", get(gateways::list_gateways))
        .route("/gateways/refresh", post(gateways::refresh_gateways));

    Router::new()
        .nest("/v1", v1_routes)
        .route("/health", get(health::health))
        .route("/api-doc/openapi.json", get(openapi_json))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        session::check_password,
        session::unlock,
        session::get_session,
        session::lock,
        session::window_count_changed,
        gateways::list_gateways,
        gateways::refresh_gateways,
        health::health
    ),
    components(
        schemas(
            SessionState,
            GarItem,
            ProcessedGateway,
            RefreshOutcome,
            session::PasswordRequest,
            session::CheckPasswordResponse,
            session::UnlockResponse,
            session::WindowCountRequest,
            session::WindowCountResponse,
            health::HealthResponse,
            health::HealthChecks
        )
    ),
    tags(
        (name = "Session", description = "Wallet decryption key lifecycle"),
        (name = "Lifecycle", description = "Browser host triggers"),
        (name = "Gateways", description = "Gateway directory cache"),
        (name = "Health", description = "Service health")
    )
)]
pub struct ApiDoc;
