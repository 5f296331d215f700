use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use config::NodeEnv;
use core_types::Session;
use parking_lot::RwLock;
use storage_sqlite::SqliteStorage;
use tower_sessions::cookie::SameSite;
use tower_sessions::cookie::time;
use tower_sessions::session::{Id, Record};
use tower_sessions::{
    Expiry, Session as CookieSession, SessionManagerLayer, SessionStore, session_store,
};
use tower_sessions_sqlx_store::SqliteStore;

use crate::error::ApiError;
use crate::state::AppState;

/// Session records go to whichever database is open right now. The desktop
/// shell can swap the database at runtime, so the store cannot hold a pool.
#[derive(Debug, Clone)]
pub struct StorageSessionStore {
    slot: Arc<RwLock<Option<SqliteStorage>>>,
}

impl StorageSessionStore {
    pub(crate) fn new(slot: Arc<RwLock<Option<SqliteStorage>>>) -> Self {
        Self { slot }
    }

    fn current(&self) -> Option<SqliteStore> {
        self.slot.read().as_ref().map(SqliteStorage::session_store)
    }

    fn require(&self) -> session_store::Result<SqliteStore> {
        self.current().ok_or_else(|| {
            session_store::Error::Backend("database location is not configured".to_string())
        })
    }
}

#[async_trait]
impl SessionStore for StorageSessionStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        self.require()?.create(record).await
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        self.require()?.save(record).await
    }

    async fn load(&self, id: &Id) -> session_store::Result<Option<Record>> {
        match self.current() {
            Some(store) => store.load(id).await,
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &Id) -> session_store::Result<()> {
        match self.current() {
            Some(store) => store.delete(id).await,
            None => Ok(()),
        }
    }
}

/// Cookie sessions that lapse after the configured inactivity window.
pub fn session_layer(state: &AppState) -> SessionManagerLayer<StorageSessionStore> {
    let idle = time::Duration::seconds(state.auth.idle_timeout().num_seconds());
    SessionManagerLayer::new(state.session_store())
        .with_name(auth::SESSION_COOKIE)
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_secure(state.env.node_env == NodeEnv::Production)
        .with_expiry(Expiry::OnInactivity(idle))
}

/// The caller's session, or `None` when anonymous.
pub struct MaybeSession(pub Option<Session>);

impl FromRequestParts<AppState> for MaybeSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let cookie = parts.extensions.get::<CookieSession>();
        let storage = state.storage();
        let session = state.auth.resolve(storage.as_ref(), cookie).await?;
        Ok(Self(session))
    }
}

/// Rejects anonymous callers with 401. The desktop build always passes.
pub struct RequireSession(pub Session);

impl FromRequestParts<AppState> for RequireSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let MaybeSession(session) = MaybeSession::from_request_parts(parts, state).await?;
        session.map(Self).ok_or_else(ApiError::unauthorized)
    }
}
