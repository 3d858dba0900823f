// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};

use crate::{
    error::ApiError,
    gateways::{ProcessedGateway, RefreshOutcome},
    state::AppState,
};

#[utoipa::path(
    get,
    path = "/v1/gateways",
    tag = "Gateways",
    responses(
        (status = 200, body = [ProcessedGateway]),
        (status = 503, description = "Store unavailable")
    )
)]
pub async fn list_gateways(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProcessedGateway>>, ApiError> {
    Ok(Json(state.gateways.get_cache().await?))
}

/// Run a refresh now. Failures schedule the usual retry alarm.
#[utoipa::path(
    post,
    path = "/v1/gateways/refresh",
    tag = "Gateways",
    responses((status = 200, body = RefreshOutcome))
)]
pub async fn refresh_gateways(State(state): State<AppState>) -> Json<RefreshOutcome> {
    Json(state.gateways.refresh(None).await)
}
