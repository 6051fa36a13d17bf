//! Ops surface: liveness, a read-only status snapshot, and `/metrics`.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

use crate::curator::{Curator, DashboardStats};
use crate::metrics::Metrics;
use crate::publish::PlatformStatus;

#[derive(Clone)]
pub struct AppState {
    pub curator: Arc<Curator>,
}

#[derive(Debug, Serialize)]
struct StatusOut {
    stats: DashboardStats,
    platforms: Vec<PlatformStatus>,
}

pub fn create_router(state: AppState, metrics: Option<&Metrics>) -> Router {
    let router = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(status))
        .with_state(state);

    match metrics {
        Some(m) => router.merge(m.router()),
        None => router,
    }
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusOut>, (StatusCode, String)> {
    let stats = state.curator.stats().map_err(|e| {
        tracing::error!(error = %e, "status snapshot failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    Ok(Json(StatusOut {
        stats,
        platforms: state.curator.platform_status(),
    }))
}
