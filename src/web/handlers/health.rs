//! Health check handler
//!
//! Reports liveness plus cache, render, limiter and admission gate counters.

use axum::{Json, extract::State, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::services::ServiceStats;
use crate::web::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub stats: ServiceStats,
    pub rate_limiting: bool,
    pub gate: GateStatus,
}

#[derive(Debug, Serialize)]
pub struct GateStatus {
    pub capacity: usize,
    pub available: usize,
    pub peak_in_flight: usize,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
        stats: state.thumbnails.stats(),
        rate_limiting: state.thumbnails.limiter().policy().enabled,
        gate: GateStatus {
            capacity: state.gate.capacity(),
            available: state.gate.available(),
            peak_in_flight: state.gate.peak_in_flight(),
        },
    })
}
