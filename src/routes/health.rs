use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::response::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
        .route("/database", get(database_health))
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "uptimeSecs": state.uptime_secs(),
        "store": {
            "backend": state.repo().backend(),
        }
    }))
}

pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// 存储可读（首次调用会完成初始化）即视为就绪
pub async fn readiness(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    match state.repo().list_preset_domains() {
        Ok(_) => Ok(StatusCode::OK),
        Err(e) => {
            tracing::error!(error = %e, "Readiness probe failed");
            Err(AppError::service_unavailable("STORE_UNAVAILABLE", &e.to_string()))
        }
    }
}

pub async fn database_health(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();
    let result = state.repo().stats();
    let latency_us = start.elapsed().as_micros() as u64;

    let (status, body) = match result {
        Ok(stats) => (
            StatusCode::OK,
            serde_json::json!({
                "healthy": true,
                "backend": state.repo().backend(),
                "latencyUs": latency_us,
                "totalCards": stats.total_cards,
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Database health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({
                    "healthy": false,
                    "backend": state.repo().backend(),
                    "latencyUs": latency_us,
                }),
            )
        }
    };
    (status, Json(body))
}
