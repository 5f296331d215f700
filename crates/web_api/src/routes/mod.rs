pub mod account;
pub mod admin;
pub mod chats;
pub mod ipc;
pub mod model;
pub mod prompt;
pub mod rpc;

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::state::AppState;

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "runtimeMode": state.env.runtime_mode,
        "databaseOpen": state.storage().is_some(),
    }))
}
