use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::constants::BACKUP_FILE_NAME;
use crate::response::AppError;
use crate::services::transfer;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(download_backup))
}

/// 整库备份：卡片与预设领域，可原样回传给导入接口
async fn download_backup(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let document = transfer::backup(state.repo())?;
    tracing::info!(
        flashcards = document.flashcards.len(),
        preset_domains = document.preset_domains.len(),
        "Backup exported"
    );
    Ok((
        [(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{BACKUP_FILE_NAME}\""),
        )],
        Json(document),
    ))
}
