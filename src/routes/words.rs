use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::extractors::JsonBody;
use crate::response::{ok, AppError};
use crate::srs::word_splitter::{split_sentence, SplitOptions};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/split", post(split))
}

#[derive(Debug, Deserialize)]
struct SplitRequest {
    #[serde(default)]
    sentence: String,
    #[serde(default)]
    options: SplitOptions,
}

#[derive(Debug, Serialize)]
struct SplitResponse {
    words: Vec<String>,
}

/// 从例句中提取候选生词
async fn split(JsonBody(req): JsonBody<SplitRequest>) -> Result<impl IntoResponse, AppError> {
    if req.options.min_length > req.options.max_length {
        return Err(AppError::bad_request(
            "VALIDATION_ERROR",
            "minLength must not exceed maxLength",
        ));
    }
    let words = split_sentence(&req.sentence, &req.options);
    Ok(ok(SplitResponse { words }))
}
