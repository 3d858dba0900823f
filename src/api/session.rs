// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session key endpoints. The key itself is never returned.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{error::ApiError, session::SessionState, state::AppState};

/// Password submitted by the host; wiped when the request is dropped.
#[derive(Deserialize, ToSchema, Zeroize, ZeroizeOnDrop)]
pub struct PasswordRequest {
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckPasswordResponse {
    pub valid: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnlockResponse {
    pub state: SessionState,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WindowCountRequest {
    /// Number of top-level browser windows still open
    pub open_windows: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WindowCountResponse {
    pub key_removed: bool,
}

#[utoipa::path(
    post,
    path = "/v1/session/check",
    request_body = PasswordRequest,
    tag = "Session",
    responses(
        (status = 200, body = CheckPasswordResponse),
        (status = 503, description = "Store unavailable")
    )
)]
pub async fn check_password(
    State(state): State<AppState>,
    Json(request): Json<PasswordRequest>,
) -> Result<Json<CheckPasswordResponse>, ApiError> {
    let valid = state.session.check_password(&request.password).await?;
    Ok(Json(CheckPasswordResponse { valid }))
}

#[utoipa::path(
    post,
    path = "/v1/session/unlock",
    request_body = PasswordRequest,
    tag = "Session",
    responses(
        (status = 200, body = UnlockResponse),
        (status = 401, description = "Wrong password"),
        (status = 503, description = "Store unavailable")
    )
)]
pub async fn unlock(
    State(state): State<AppState>,
    Json(request): Json<PasswordRequest>,
) -> Result<Json<UnlockResponse>, ApiError> {
    if !state.session.unlock(&request.password).await? {
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, "invalid password"));
    }
    let session = state.session.state().await?;
    Ok(Json(UnlockResponse { state: session }))
}

#[utoipa::path(
    get,
    path = "/v1/session",
    tag = "Session",
    responses((status = 200, body = SessionState))
)]
pub async fn get_session(State(state): State<AppState>) -> Result<Json<SessionState>, ApiError> {
    Ok(Json(state.session.state().await?))
}

#[utoipa::path(
    delete,
    path = "/v1/session",
    tag = "Session",
    responses((status = 204))
)]
pub async fn lock(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.session.lock().await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/lifecycle/windows",
    request_body = WindowCountRequest,
    tag = "Lifecycle",
    responses((status = 200, body = WindowCountResponse))
)]
pub async fn window_count_changed(
    State(state): State<AppState>,
    Json(request): Json<WindowCountRequest>,
) -> Result<Json<WindowCountResponse>, ApiError> {
    let key_removed = state
        .session
        .on_window_count_changed(request.open_windows)
        .await?;
    Ok(Json(WindowCountResponse { key_removed }))
}
