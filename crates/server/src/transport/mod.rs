// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport: router, agent authentication, and the check-in handler.

pub mod auth;
pub mod checkin;
pub mod encode;

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::state::ServerState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub checkpoint: i64,
}

/// `GET /api/v1/health` — liveness plus the store's current checkpoint.
pub async fn health(State(s): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse { status: "running".to_owned(), checkpoint: s.checkpoint.checkpoint() })
}

/// Build the axum `Router` with all check-in routes.
pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/agents/{id}/checkin", post(checkin::checkin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
