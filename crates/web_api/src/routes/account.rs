use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_sessions::Session as CookieSession;

use crate::error::ApiResult;
use crate::session::MaybeSession;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    name: String,
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    email: String,
    password: String,
}

/// GET /api/auth/session
pub async fn session(MaybeSession(session): MaybeSession) -> Json<Value> {
    match session {
        Some(session) => Json(json!(session)),
        None => Json(json!({})),
    }
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<Value>> {
    if state.is_desktop() {
        return Err(auth::AuthError::DesktopMode.into());
    }
    let storage = state.require_storage()?;
    let user = state
        .auth
        .register(&storage, &req.name, &req.email, &req.password)
        .await?;
    Ok(Json(json!({ "user": user })))
}

/// POST /api/auth/signin
pub async fn sign_in(
    State(state): State<AppState>,
    cookie: CookieSession,
    Json(req): Json<SignInRequest>,
) -> ApiResult<Json<Value>> {
    if state.is_desktop() {
        return Err(auth::AuthError::DesktopMode.into());
    }
    let storage = state.require_storage()?;
    let session = state
        .auth
        .sign_in(&storage, &cookie, &req.email, &req.password)
        .await?;
    Ok(Json(json!(session)))
}

/// POST /api/auth/signout
pub async fn sign_out(
    State(state): State<AppState>,
    cookie: CookieSession,
) -> ApiResult<Json<Value>> {
    state.auth.sign_out(&cookie).await?;
    Ok(Json(json!({ "ok": true })))
}
