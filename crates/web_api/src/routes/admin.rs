use axum::Json;
use axum::extract::State;
use config::paths::{self, DataDirUsage, DbInfo};
use serde_json::{Value, json};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::session::RequireSession;
use crate::state::AppState;

/// POST /api/admin/rag-reset
pub async fn rag_reset(
    State(state): State<AppState>,
    RequireSession(session): RequireSession,
) -> ApiResult<Json<Value>> {
    let storage = state.require_storage()?;
    let reset = storage.reset_all_message_feedback().await?;
    info!(user_id = %session.user.id, reset, "message feedback reset");
    Ok(Json(json!({ "ok": true, "reset": reset })))
}

/// GET /api/admin/data-info
pub async fn data_info(
    State(state): State<AppState>,
    RequireSession(_): RequireSession,
) -> ApiResult<Json<DataDirUsage>> {
    let data_dir = state
        .data_dir()?
        .ok_or_else(|| ApiError::NotConfigured("data directory is not configured".into()))?;
    let usage = tokio::task::spawn_blocking(move || paths::data_dir_usage(&data_dir))
        .await
        .map_err(anyhow::Error::new)??;
    Ok(Json(usage))
}

/// GET /api/admin/db-info
pub async fn db_info(
    State(state): State<AppState>,
    RequireSession(_): RequireSession,
) -> ApiResult<Json<DbInfo>> {
    let data_dir = state.data_dir()?;
    Ok(Json(paths::db_info(
        state.env.database_url.as_deref(),
        data_dir.as_deref(),
    )))
}
