pub mod backup;
pub mod cards;
pub mod domains;
pub mod health;
pub mod words;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, Router};

use crate::middleware::request_id;
use crate::response::{AppError, ErrorBody};
use crate::state::AppState;

/// 请求体上限 10 MiB，整库导入需要较大的请求体
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .nest("/cards", cards::router())
        .nest("/domains", domains::router())
        .nest("/words", words::router())
        .nest("/backup", backup::router())
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE));

    Router::new()
        .nest("/api", api_routes)
        .nest("/health", health::router())
        .fallback(fallback_404)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .with_state(state)
}

async fn fallback_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            success: false,
            code: "NOT_FOUND".to_string(),
            message: "Not found".to_string(),
            trace_id: None,
        }),
    )
}

/// 路径中的数字 id；非数字返回 400
pub(crate) fn parse_id(raw: &str, entity: &str) -> Result<u64, AppError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| AppError::bad_request("INVALID_ID", &format!("Invalid {entity} ID")))
}
