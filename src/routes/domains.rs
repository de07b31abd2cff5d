use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::extractors::JsonBody;
use crate::response::{created, ok, AppError};
use crate::routes::parse_id;
use crate::services::cards as card_service;
use crate::state::AppState;
use crate::validation::normalize_domain_name;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_domains).post(create_domain))
        .route("/:id", put(rename_domain).delete(delete_domain))
}

#[derive(Debug, Deserialize)]
struct DomainRequest {
    #[serde(default)]
    name: String,
}

async fn list_domains(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.repo().list_preset_domains()?))
}

async fn create_domain(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<DomainRequest>,
) -> Result<impl IntoResponse, AppError> {
    let name = normalize_domain_name(&req.name)?;
    let domain = state.repo().create_preset_domain(&name)?;
    tracing::info!(id = domain.id, name = %domain.name, "Preset domain created");
    Ok(created(domain))
}

async fn rename_domain(
    Path(id): Path<String>,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<DomainRequest>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id, "domain")?;
    let name = normalize_domain_name(&req.name)?;
    let domain = state
        .repo()
        .update_preset_domain(id, &name)?
        .ok_or_else(|| AppError::not_found("Preset domain not found"))?;
    Ok(ok(domain))
}

#[derive(Debug, Serialize)]
struct DeletedResponse {
    message: &'static str,
    id: u64,
}

/// 删除领域，引用它的卡片改写为默认领域
async fn delete_domain(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id, "domain")?;
    if !card_service::delete_preset_domain_by_id(state.repo(), id)? {
        return Err(AppError::not_found("Preset domain not found"));
    }
    Ok(ok(DeletedResponse {
        message: "Preset domain deleted successfully",
        id,
    }))
}
