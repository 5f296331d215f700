use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use core_types::{LocalModelConfig, ValidationReport};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{ApiError, ApiResult};
use crate::session::RequireSession;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConsentRequest {
    accepted: bool,
}

#[derive(Debug, Serialize)]
struct ValidateResponse {
    config: LocalModelConfig,
    #[serde(flatten)]
    report: ValidationReport,
}

/// GET /api/model/privacy-consent
pub async fn get_consent(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let storage = state.require_storage()?;
    let accepted = storage.has_privacy_consent_for_remote_api().await?;
    Ok(Json(json!({ "accepted": accepted })))
}

/// POST /api/model/privacy-consent
pub async fn set_consent(
    State(state): State<AppState>,
    RequireSession(_): RequireSession,
    Json(req): Json<ConsentRequest>,
) -> ApiResult<Json<Value>> {
    let storage = state.require_storage()?;
    storage
        .set_privacy_consent_for_remote_api(req.accepted)
        .await?;
    Ok(Json(json!({ "ok": true, "accepted": req.accepted })))
}

/// GET /api/model/validate
///
/// A missing database or missing settings answer 400 with `config: null`
/// so the UI can route the user to the setup screen.
pub async fn validate(State(state): State<AppState>) -> Response {
    match read_local_model_config(&state).await {
        Ok(config) => {
            let report = state.models.validate_local(&config).await;
            Json(ValidateResponse { config, report }).into_response()
        }
        Err(err @ ApiError::NotConfigured(_)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "ok": false,
                "error": err.code(),
                "message": err.public_message(),
                "config": Value::Null,
            })),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

/// GET /api/model/config
pub async fn get_config(
    State(state): State<AppState>,
    RequireSession(_): RequireSession,
) -> ApiResult<Json<Value>> {
    let storage = state.require_storage()?;
    let config = storage.local_model_config().await?;
    Ok(Json(json!({ "config": config })))
}

/// POST /api/model/config
pub async fn save_config(
    State(state): State<AppState>,
    RequireSession(_): RequireSession,
    Json(mut config): Json<LocalModelConfig>,
) -> ApiResult<Json<Value>> {
    model_client::check_base_url(&config.base_url)
        .map_err(|err| ApiError::BadRequest(format!("{err:#}")))?;
    config.base_url = config.base_url.trim().trim_end_matches('/').to_string();
    config.model = config.model.trim().to_string();

    let storage = state.require_storage()?;
    storage.save_local_model_config(&config).await?;
    Ok(Json(json!({ "ok": true, "config": config })))
}

pub(crate) async fn read_local_model_config(state: &AppState) -> ApiResult<LocalModelConfig> {
    let storage = state.require_storage()?;
    storage
        .local_model_config()
        .await?
        .ok_or_else(|| ApiError::NotConfigured("local model is not configured".into()))
}
