//! HTTP surface of the app: admin introspection, local model settings,
//! auth, typed RPC, prompt crafting, chats, and the desktop IPC bridge.
//!
//! ```text
//! GET|POST /api/model/privacy-consent
//! GET      /api/model/validate
//! GET|POST /api/model/config
//! POST     /api/admin/rag-reset
//! GET      /api/admin/data-info
//! GET      /api/admin/db-info
//! GET      /api/auth/session
//! POST     /api/auth/{register,signin,signout}
//! GET|POST /api/rpc/{procedure}
//! POST     /api/prompt/{mode}
//! GET|POST /api/chats
//! GET|POST /api/chats/{id}/messages
//! POST     /api/messages/{id}/feedback
//! POST     /api/ipc/{channel}
//! GET      /api/health
//! ```
//!
//! Everything is nested under `NEXT_PUBLIC_BASE_PATH` when it is set.

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tracing::info;

pub mod error;
pub mod routes;
pub mod session;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use routes::{account, admin, chats, ipc, model, prompt, rpc};

pub fn build_router(state: AppState) -> Router {
    let base_path = state.env.base_path.clone();
    let sessions = session::session_layer(&state);
    let api = Router::new()
        .route("/api/health", get(routes::health))
        .route(
            "/api/model/privacy-consent",
            get(model::get_consent).post(model::set_consent),
        )
        .route("/api/model/validate", get(model::validate))
        .route(
            "/api/model/config",
            get(model::get_config).post(model::save_config),
        )
        .route("/api/admin/rag-reset", post(admin::rag_reset))
        .route("/api/admin/data-info", get(admin::data_info))
        .route("/api/admin/db-info", get(admin::db_info))
        .route("/api/auth/session", get(account::session))
        .route("/api/auth/register", post(account::register))
        .route("/api/auth/signin", post(account::sign_in))
        .route("/api/auth/signout", post(account::sign_out))
        .route("/api/rpc/{procedure}", get(rpc::query).post(rpc::mutation))
        .route("/api/prompt/{mode}", post(prompt::craft))
        .route(
            "/api/chats",
            get(chats::list_chats).post(chats::create_chat),
        )
        .route(
            "/api/chats/{id}/messages",
            get(chats::list_messages).post(chats::append_message),
        )
        .route("/api/messages/{id}/feedback", post(chats::set_feedback))
        .route("/api/ipc/{channel}", post(ipc::invoke))
        .with_state(state)
        .layer(sessions);

    if base_path.is_empty() {
        api
    } else {
        Router::new().nest(&base_path, api)
    }
}

/// Serves `router` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = listener.local_addr().context("listener has no local address")?;
    info!(%addr, "http server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server error")?;
    info!("http server shut down");
    Ok(())
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use auth::AuthService;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use config::{ConfigStore, EnvConfig};
    use core_types::{
        ChatRole, GenerationRequest, LocalModelConfig, MessageFeedback, ModelBackend,
        RemoteModelConfig, RuntimeMode, ValidationReport,
    };
    use desktop_bridge::{DesktopBridge, HeadlessHost};
    use serde_json::{Value, json};
    use storage_sqlite::SqliteStorage;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;

    struct StubModels;

    #[async_trait]
    impl ModelBackend for StubModels {
        async fn validate_local(&self, config: &LocalModelConfig) -> ValidationReport {
            ValidationReport {
                ok: true,
                reachable: true,
                model_available: true,
                available_models: vec![config.model.clone()],
                latency_ms: 1,
                error: None,
            }
        }

        async fn generate_local(
            &self,
            _config: &LocalModelConfig,
            request: &GenerationRequest,
        ) -> anyhow::Result<String> {
            Ok(format!("local: {}", request.input))
        }

        async fn generate_remote(
            &self,
            _remote: &RemoteModelConfig,
            request: &GenerationRequest,
        ) -> anyhow::Result<String> {
            Ok(format!("remote: {}", request.input))
        }
    }

    fn desktop_env() -> EnvConfig {
        EnvConfig {
            runtime_mode: RuntimeMode::Desktop,
            ..EnvConfig::default()
        }
    }

    fn app_state(dir: &TempDir, env: EnvConfig) -> AppState {
        let auth = AuthService::new(env.runtime_mode, chrono::Duration::minutes(30));
        app_state_with_auth(dir, env, auth)
    }

    fn app_state_with_auth(dir: &TempDir, env: EnvConfig, auth: AuthService) -> AppState {
        AppState::new(
            Arc::new(env),
            ConfigStore::from_dir(dir.path().join("config")),
            auth,
            Arc::new(StubModels),
        )
    }

    async fn web_state(dir: &TempDir) -> AppState {
        let storage = SqliteStorage::in_memory().await.expect("storage");
        app_state(dir, EnvConfig::default()).with_storage(storage)
    }

    async fn desktop_state(dir: &TempDir) -> AppState {
        let storage = SqliteStorage::in_memory().await.expect("storage");
        app_state(dir, desktop_env()).with_storage(storage)
    }

    fn request(
        method: Method,
        uri: &str,
        body: Option<Value>,
        cookie: Option<&str>,
    ) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        }
    }

    fn fetch(uri: &str, cookie: Option<&str>) -> Request<Body> {
        request(Method::GET, uri, None, cookie)
    }

    fn submit(uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
        request(Method::POST, uri, Some(body), cookie)
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    /// Registers through the API and returns the `Cookie` header value of the
    /// signed-in session together with the user id.
    async fn signed_in(app: &Router, email: &str) -> (String, String) {
        let credentials = json!({ "name": "User", "email": email, "password": "password123" });
        let (status, _) = send(app, submit("/api/auth/register", credentials.clone(), None)).await;
        assert_eq!(status, StatusCode::OK);

        let response = app
            .clone()
            .oneshot(submit("/api/auth/signin", credentials, None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .expect("session cookie")
            .to_string();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body: Value = serde_json::from_slice(&bytes).expect("json");
        let user_id = body["user"]["id"].as_str().expect("user id").to_string();
        (cookie, user_id)
    }

    #[tokio::test]
    async fn privacy_consent_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = build_router(desktop_state(&dir).await);

        let (status, body) = send(&app, fetch("/api/model/privacy-consent", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "accepted": false }));

        let accept = json!({ "accepted": true });
        let (status, _) = send(&app, submit("/api/model/privacy-consent", accept, None)).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, fetch("/api/model/privacy-consent", None)).await;
        assert_eq!(body, json!({ "accepted": true }));
    }

    #[tokio::test]
    async fn rag_reset_requires_session_outside_desktop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = web_state(&dir).await;
        let storage = state.storage().expect("storage");
        let chat = storage
            .create_chat(core_types::DESKTOP_USER_ID, "chat")
            .await
            .expect("chat");
        let message = storage
            .append_message(chat.id, ChatRole::Assistant, "answer")
            .await
            .expect("message");
        storage
            .set_message_feedback(message.id, Some(MessageFeedback::Up))
            .await
            .expect("feedback");
        let app = build_router(state);

        let (status, body) = send(&app, submit("/api/admin/rag-reset", json!({}), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
        assert_eq!(storage.count_messages_with_feedback().await.expect("count"), 1);

        let (cookie, _) = signed_in(&app, "admin@example.com").await;
        let (status, body) =
            send(&app, submit("/api/admin/rag-reset", json!({}), Some(&cookie))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reset"], 1);
        assert_eq!(storage.count_messages_with_feedback().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn rag_reset_is_allowed_in_desktop_mode() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = build_router(desktop_state(&dir).await);
        let (status, body) = send(&app, submit("/api/admin/rag-reset", json!({}), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reset"], 0);
    }

    #[tokio::test]
    async fn admin_info_routes_require_session_on_the_web() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = build_router(web_state(&dir).await);

        for uri in ["/api/admin/data-info", "/api/admin/db-info"] {
            let (status, body) = send(&app, fetch(uri, None)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(body["error"], "unauthorized", "{uri}");
        }

        let (cookie, _) = signed_in(&app, "admin@example.com").await;
        let (status, _) = send(&app, fetch("/api/admin/db-info", Some(&cookie))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn data_info_without_data_dir_is_not_configured() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = build_router(desktop_state(&dir).await);

        let (status, body) = send(&app, fetch("/api/admin/data-info", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "not_configured");
    }

    #[tokio::test]
    async fn validate_without_data_dir_reports_null_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = app_state(&dir, desktop_env());
        state.reload_storage().await.expect("reload");
        assert!(state.storage().is_none());
        let app = build_router(state);

        let (status, body) = send(&app, fetch("/api/model/validate", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["config"], Value::Null);
        assert!(body.as_object().expect("object").contains_key("config"));
        assert_eq!(body["error"], "not_configured");
    }

    #[tokio::test]
    async fn validate_reports_saved_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = build_router(desktop_state(&dir).await);

        let bad = json!({ "provider": "ollama", "baseUrl": "nope", "model": "llama3.2" });
        let (status, _) = send(&app, submit("/api/model/config", bad, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let good = json!({
            "provider": "ollama",
            "baseUrl": "http://127.0.0.1:11434/",
            "model": "llama3.2",
        });
        let (status, body) = send(&app, submit("/api/model/config", good, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["config"]["baseUrl"], "http://127.0.0.1:11434");

        let (status, body) = send(&app, fetch("/api/model/validate", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["config"]["model"], "llama3.2");
        assert_eq!(body["availableModels"], json!(["llama3.2"]));
    }

    #[tokio::test]
    async fn get_latest_only_returns_own_posts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = build_router(web_state(&dir).await);
        let (alice, _) = signed_in(&app, "alice@example.com").await;
        let (bob, _) = signed_in(&app, "bob@example.com").await;

        let create = "/api/rpc/post.create";
        let latest = "/api/rpc/post.getLatest";
        let alice_post = json!({ "name": "alice post" });
        let (status, body) = send(&app, submit(create, alice_post, Some(&alice))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["data"]["name"], "alice post");

        let (_, body) = send(&app, fetch(latest, Some(&bob))).await;
        assert_eq!(body, json!({ "result": { "data": null } }));

        send(&app, submit(create, json!({ "name": "bob post" }), Some(&bob))).await;
        let (_, body) = send(&app, fetch(latest, Some(&alice))).await;
        assert_eq!(body["result"]["data"]["name"], "alice post");

        let (status, body) = send(&app, fetch(latest, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn rpc_hello_and_input_checks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = build_router(desktop_state(&dir).await);

        let hello = "/api/rpc/post.hello?input=%7B%22text%22%3A%22world%22%7D";
        let (status, body) = send(&app, fetch(hello, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "result": { "data": { "greeting": "Hello world" } } }));

        let blank = json!({ "name": "   " });
        let (status, body) = send(&app, submit("/api/rpc/post.create", blank, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");

        let (status, _) = send(&app, fetch("/api/rpc/post.create", None)).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        let (status, _) = send(&app, fetch("/api/rpc/post.delete", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn session_endpoint_reflects_runtime_mode() {
        let dir = tempfile::tempdir().expect("tempdir");
        let desktop = build_router(desktop_state(&dir).await);
        let (_, body) = send(&desktop, fetch("/api/auth/session", None)).await;
        assert_eq!(body["user"]["email"], "local@localhost");

        let dir = tempfile::tempdir().expect("tempdir");
        let app = build_router(web_state(&dir).await);
        let (_, body) = send(&app, fetch("/api/auth/session", None)).await;
        assert_eq!(body, json!({}));

        let (cookie, user_id) = signed_in(&app, "ada@example.com").await;
        let (_, body) = send(&app, fetch("/api/auth/session", Some(&cookie))).await;
        assert_eq!(body["user"]["id"], user_id);

        let (status, _) = send(&app, submit("/api/auth/signout", json!({}), Some(&cookie))).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = send(&app, fetch("/api/auth/session", Some(&cookie))).await;
        assert_eq!(body, json!({}));
    }

    #[tokio::test]
    async fn idle_web_sessions_are_dropped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = SqliteStorage::in_memory().await.expect("storage");
        let auth = AuthService::new(RuntimeMode::Web, chrono::Duration::zero());
        let state = app_state_with_auth(&dir, EnvConfig::default(), auth).with_storage(storage);
        let app = build_router(state);

        let (cookie, _) = signed_in(&app, "ada@example.com").await;
        let (_, body) = send(&app, fetch("/api/auth/session", Some(&cookie))).await;
        assert_eq!(body, json!({}));
    }

    #[tokio::test]
    async fn sign_in_sets_cookie_and_desktop_rejects_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = build_router(web_state(&dir).await);
        let (cookie, _) = signed_in(&app, "ada@example.com").await;
        assert!(cookie.starts_with(auth::SESSION_COOKIE));

        let wrong = json!({ "email": "ada@example.com", "password": "wrong-password" });
        let (status, _) = send(&app, submit("/api/auth/signin", wrong, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let dir = tempfile::tempdir().expect("tempdir");
        let desktop = build_router(desktop_state(&dir).await);
        let right = json!({ "email": "ada@example.com", "password": "password123" });
        let (status, _) = send(&desktop, submit("/api/auth/signin", right, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn session_cookie_is_http_only_and_lax() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = build_router(web_state(&dir).await);
        let credentials =
            json!({ "name": "Ada", "email": "ada@example.com", "password": "password123" });
        send(&app, submit("/api/auth/register", credentials.clone(), None)).await;

        let response = app
            .clone()
            .oneshot(submit("/api/auth/signin", credentials, None))
            .await
            .expect("response");
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .expect("cookie");
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(!cookie.contains("Secure"));
    }

    #[tokio::test]
    async fn remote_prompt_requires_consent_and_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let env = EnvConfig {
            google_api_key: Some("test-key".to_string()),
            ..desktop_env()
        };
        let storage = SqliteStorage::in_memory().await.expect("storage");
        let app = build_router(app_state(&dir, env).with_storage(storage.clone()));
        let body = json!({ "input": "write a haiku", "target": "remote" });

        let (status, reply) = send(&app, submit("/api/prompt/build", body.clone(), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(reply["error"], "consent_required");

        storage
            .set_privacy_consent_for_remote_api(true)
            .await
            .expect("consent");
        let (status, reply) = send(&app, submit("/api/prompt/build", body, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["output"], "remote: write a haiku");

        let unknown = submit("/api/prompt/rewrite", json!({ "input": "x" }), None);
        let (status, _) = send(&app, unknown).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn local_prompt_needs_saved_model_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = build_router(desktop_state(&dir).await);
        let body = json!({ "input": "write a haiku", "target": "local" });

        let (status, reply) = send(&app, submit("/api/prompt/build", body.clone(), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(reply["error"], "not_configured");

        let config = json!({
            "provider": "ollama",
            "baseUrl": "http://127.0.0.1:11434",
            "model": "llama3.2",
        });
        send(&app, submit("/api/model/config", config, None)).await;
        let (status, reply) = send(&app, submit("/api/prompt/build", body, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["output"], "local: write a haiku");
    }

    #[tokio::test]
    async fn chats_are_private_to_their_owner() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = build_router(web_state(&dir).await);
        let (alice, _) = signed_in(&app, "alice@example.com").await;
        let (bob, _) = signed_in(&app, "bob@example.com").await;

        let ideas = json!({ "title": "ideas" });
        let (_, chat) = send(&app, submit("/api/chats", ideas, Some(&alice))).await;
        let messages_uri = format!("/api/chats/{}/messages", chat["id"].as_str().expect("id"));
        let hello = json!({ "role": "user", "content": "hi" });
        let (status, message) = send(&app, submit(&messages_uri, hello, Some(&alice))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, fetch(&messages_uri, Some(&bob))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let message_id = message["id"].as_str().expect("id");
        let feedback_uri = format!("/api/messages/{message_id}/feedback");
        let up = json!({ "feedback": "up" });
        let (status, _) = send(&app, submit(&feedback_uri, up.clone(), Some(&bob))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, submit(&feedback_uri, up, Some(&alice))).await;
        assert_eq!(status, StatusCode::OK);
        let (_, listed) = send(&app, fetch(&messages_uri, Some(&alice))).await;
        assert_eq!(listed[0]["feedback"], "up");
    }

    #[tokio::test]
    async fn ipc_route_is_desktop_only_and_reopens_storage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let web = build_router(web_state(&dir).await);
        let (status, _) = send(&web, submit("/api/ipc/getConfig", json!([]), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let env = Arc::new(desktop_env());
        let store = ConfigStore::from_dir(dir.path().join("config"));
        let (host, _exit_rx) = HeadlessHost::new();
        let bridge = DesktopBridge::new(Arc::new(host), store.clone(), env.clone());
        let state = AppState::new(
            env,
            store,
            AuthService::new(RuntimeMode::Desktop, chrono::Duration::minutes(30)),
            Arc::new(StubModels),
        )
        .with_bridge(Arc::new(bridge));
        let app = build_router(state.clone());
        assert!(state.storage().is_none());

        let data_dir = dir.path().join("data");
        let args = json!([data_dir.to_string_lossy()]);
        let (status, body) = send(&app, submit("/api/ipc/chooseDataDir", args, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert!(state.storage().is_some());
        assert!(data_dir.join(config::paths::DEFAULT_DB_FILE).exists());

        let (status, body) = send(&app, submit("/api/ipc/file:delete", json!([]), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Not implemented IPC channel: file:delete");

        let (status, body) = send(&app, fetch("/api/admin/data-info", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["jsonFiles"], 0);

        send(&app, submit("/api/ipc/resetDataDir", json!([]), None)).await;
        assert!(state.storage().is_none());
    }

    #[tokio::test]
    async fn routes_nest_under_base_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let env = EnvConfig {
            base_path: "/promptcraft".to_string(),
            ..EnvConfig::default()
        };
        let app = build_router(app_state(&dir, env));

        let (status, body) = send(&app, fetch("/promptcraft/api/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["databaseOpen"], false);

        let (status, _) = send(&app, fetch("/api/health", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
