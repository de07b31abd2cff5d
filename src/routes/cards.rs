use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_DAILY_LIMIT, EXPORT_FILE_NAME, MAX_DAILY_LIMIT};
use crate::extractors::{JsonBody, QueryParams};
use crate::response::{created, ok, AppError};
use crate::routes::parse_id;
use crate::services::transfer::{self, ImportMode, ImportPayload};
use crate::services::cards as card_service;
use crate::srs::{CreateFlashcard, Flashcard, FlashcardPatch};
use crate::state::AppState;
use crate::store::timestamp_now;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_cards).post(create_card))
        .route("/daily-random", get(daily_random))
        .route("/stats/overview", get(stats_overview))
        .route("/clear", delete(clear_cards))
        .route("/import", post(import_cards))
        .route("/export/json", get(export_json))
        .route("/:id", get(get_card).put(update_card).delete(delete_card))
        .route("/:id/review", post(submit_review))
}

async fn list_cards(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.repo().list()?))
}

async fn create_card(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateFlashcard>,
) -> Result<impl IntoResponse, AppError> {
    let card = card_service::create_card(state.repo(), req)?;
    Ok(created(card))
}

async fn get_card(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id, "card")?;
    let card = state
        .repo()
        .get(id)?
        .ok_or_else(|| AppError::not_found("Flashcard not found"))?;
    Ok(ok(card))
}

async fn update_card(
    Path(id): Path<String>,
    State(state): State<AppState>,
    JsonBody(patch): JsonBody<FlashcardPatch>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id, "card")?;
    let card = card_service::update_card(state.repo(), id, patch)?
        .ok_or_else(|| AppError::not_found("Flashcard not found"))?;
    Ok(ok(card))
}

#[derive(Debug, Serialize)]
struct DeletedResponse {
    message: &'static str,
    id: u64,
}

async fn delete_card(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id, "card")?;
    if !state.repo().delete(id)? {
        return Err(AppError::not_found("Flashcard not found"));
    }
    tracing::info!(id, "Flashcard deleted");
    Ok(ok(DeletedResponse {
        message: "Flashcard deleted successfully",
        id,
    }))
}

#[derive(Debug, Deserialize)]
struct ReviewRequest {
    mastery: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ReviewResponse {
    message: &'static str,
    updated_card: Flashcard,
}

async fn submit_review(
    Path(id): Path<String>,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ReviewRequest>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id, "card")?;
    let level = req
        .mastery
        .ok_or_else(|| AppError::bad_request("VALIDATION_ERROR", "Missing required field: mastery"))?;
    let updated_card = card_service::submit_review(state.repo(), id, level, timestamp_now())?
        .ok_or_else(|| AppError::not_found("Flashcard not found"))?;
    Ok(ok(ReviewResponse {
        message: "Review submitted successfully",
        updated_card,
    }))
}

#[derive(Debug, Deserialize)]
struct DailyRandomQuery {
    limit: Option<String>,
}

/// 无法解析的 limit 使用默认值，其余夹到 1..=100
fn daily_limit(raw: Option<&str>) -> usize {
    let parsed = raw
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_DAILY_LIMIT as i64);
    parsed.clamp(1, MAX_DAILY_LIMIT as i64) as usize
}

async fn daily_random(
    State(state): State<AppState>,
    QueryParams(q): QueryParams<DailyRandomQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = daily_limit(q.limit.as_deref());
    let cards = state.repo().daily_random(limit)?;
    tracing::debug!(limit, returned = cards.len(), "Daily batch selected");
    Ok(ok(cards))
}

async fn stats_overview(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.repo().stats()?))
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: &'static str,
}

async fn clear_cards(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    state.repo().clear()?;
    tracing::info!("All flashcards cleared");
    Ok(ok(MessageResponse {
        message: "All flashcards cleared successfully",
    }))
}

#[derive(Debug, Deserialize)]
struct ImportQuery {
    mode: Option<String>,
}

async fn import_cards(
    State(state): State<AppState>,
    QueryParams(q): QueryParams<ImportQuery>,
    JsonBody(payload): JsonBody<ImportPayload>,
) -> Result<impl IntoResponse, AppError> {
    let mode = match q.mode.as_deref() {
        None => ImportMode::default(),
        Some(raw) => raw
            .parse::<ImportMode>()
            .map_err(|e| AppError::bad_request("INVALID_IMPORT_MODE", &e))?,
    };
    let clear_domains = state.config().storage.import_overwrite_clears_domains;
    let report = transfer::import(state.repo(), payload, mode, clear_domains)?;
    Ok(ok(report))
}

async fn export_json(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let cards = transfer::export_cards(state.repo())?;
    Ok((
        [(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{EXPORT_FILE_NAME}\""),
        )],
        Json(cards),
    ))
}
