use std::str::FromStr;

use axum::Json;
use axum::extract::{Path, State};
use core_types::{GenerationRequest, PromptMode, PromptTarget, RemoteModelConfig};
use model_client::DEFAULT_GEMINI_BASE_URL;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::routes::model::read_local_model_config;
use crate::session::RequireSession;
use crate::state::AppState;

pub const DEFAULT_BUILD_PROMPT: &str = "You are an expert prompt engineer. Turn the user's \
rough idea into a complete, well-structured prompt for a large language model. State the role, \
the task, the relevant context, constraints, and the expected output format. Reply with the \
prompt only.";

pub const DEFAULT_ENHANCE_PROMPT: &str = "You are an expert prompt engineer. Improve the \
user's existing prompt: make it clearer, more specific and unambiguous while keeping its intent. \
Reply with the improved prompt only.";

#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    input: String,
    #[serde(default = "default_target")]
    target: PromptTarget,
}

fn default_target() -> PromptTarget {
    PromptTarget::Local
}

pub fn system_prompt(state: &AppState, mode: PromptMode) -> String {
    let configured = match mode {
        PromptMode::Build => state.env.system_prompt_build.as_deref(),
        PromptMode::Enhance => state.env.system_prompt_enhance.as_deref(),
    };
    configured
        .unwrap_or(match mode {
            PromptMode::Build => DEFAULT_BUILD_PROMPT,
            PromptMode::Enhance => DEFAULT_ENHANCE_PROMPT,
        })
        .to_string()
}

/// POST /api/prompt/{mode}
pub async fn craft(
    State(state): State<AppState>,
    Path(mode): Path<String>,
    RequireSession(session): RequireSession,
    Json(req): Json<PromptRequest>,
) -> ApiResult<Json<Value>> {
    let mode = PromptMode::from_str(&mode).map_err(|_| ApiError::NotFound("prompt mode"))?;
    let input = req.input.trim();
    if input.is_empty() {
        return Err(ApiError::BadRequest("input must not be empty".into()));
    }
    let request = GenerationRequest {
        system_prompt: system_prompt(&state, mode),
        input: input.to_string(),
    };

    let output = match req.target {
        PromptTarget::Local => {
            let config = read_local_model_config(&state).await?;
            state.models.generate_local(&config, &request).await?
        }
        PromptTarget::Remote => {
            let storage = state.require_storage()?;
            if !storage.has_privacy_consent_for_remote_api().await? {
                return Err(ApiError::ConsentRequired);
            }
            let api_key = state
                .env
                .google_api_key
                .clone()
                .ok_or_else(|| ApiError::NotConfigured("GOOGLE_API_KEY is not set".into()))?;
            let remote = RemoteModelConfig {
                base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
                model: state.env.google_model.clone(),
                api_key,
            };
            state.models.generate_remote(&remote, &request).await?
        }
    };

    info!(
        user_id = %session.user.id,
        mode = mode.as_str(),
        target = ?req.target,
        "prompt generated"
    );
    Ok(Json(json!({
        "mode": mode.as_str(),
        "target": req.target,
        "output": output,
    })))
}
