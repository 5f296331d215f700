use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use serde_json::Value;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// POST /api/ipc/{channel}
///
/// The body is the argument list as a JSON array; an empty body means no
/// arguments. Only mounted meaningfully in the desktop build.
pub async fn invoke(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let bridge = state
        .bridge
        .clone()
        .filter(|_| state.is_desktop())
        .ok_or(ApiError::NotFound("ipc bridge"))?;
    let args: Vec<Value> = if body.is_empty() {
        Vec::new()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| ApiError::BadRequest(format!("ipc args must be a json array: {err}")))?
    };

    let result = bridge.invoke(&channel, &args)?;
    if desktop_bridge::changes_data_dir(&channel) && result.get("ok") == Some(&Value::Bool(true)) {
        info!(%channel, "data directory changed, reopening storage");
        state.reload_storage().await?;
    }
    Ok(Json(result))
}
