use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use auth::AuthService;
use config::{ConfigStore, EnvConfig, paths};
use core_types::ModelBackend;
use desktop_bridge::DesktopBridge;
use parking_lot::RwLock;
use storage_sqlite::SqliteStorage;
use tracing::{info, warn};

use crate::error::ApiError;

/// Router state injected into every handler.
///
/// Cheap to clone; all fields are reference-counted.
#[derive(Clone)]
pub struct AppState {
    pub env: Arc<EnvConfig>,
    pub config_store: ConfigStore,
    pub auth: AuthService,
    pub models: Arc<dyn ModelBackend>,
    pub bridge: Option<Arc<DesktopBridge>>,
    storage: Arc<RwLock<Option<SqliteStorage>>>,
}

impl AppState {
    pub fn new(
        env: Arc<EnvConfig>,
        config_store: ConfigStore,
        auth: AuthService,
        models: Arc<dyn ModelBackend>,
    ) -> Self {
        Self {
            env,
            config_store,
            auth,
            models,
            bridge: None,
            storage: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_bridge(mut self, bridge: Arc<DesktopBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn with_storage(self, storage: SqliteStorage) -> Self {
        *self.storage.write() = Some(storage);
        self
    }

    pub fn is_desktop(&self) -> bool {
        self.env.runtime_mode.is_desktop()
    }

    /// Snapshot of the open database, if any.
    pub fn storage(&self) -> Option<SqliteStorage> {
        self.storage.read().clone()
    }

    pub(crate) fn session_store(&self) -> crate::session::StorageSessionStore {
        crate::session::StorageSessionStore::new(self.storage.clone())
    }

    pub fn require_storage(&self) -> Result<SqliteStorage, ApiError> {
        self.storage()
            .ok_or_else(|| ApiError::NotConfigured("database location is not configured".into()))
    }

    pub fn data_dir(&self) -> Result<Option<PathBuf>> {
        Ok(self.config_store.load_or_init()?.data_dir)
    }

    pub fn database_path(&self) -> Result<Option<PathBuf>> {
        let data_dir = self.data_dir()?;
        Ok(paths::resolve_database_path(
            self.env.database_url.as_deref(),
            data_dir.as_deref(),
        ))
    }

    /// Opens the database at the currently resolved location, replacing
    /// whatever was open before.
    pub async fn reload_storage(&self) -> Result<()> {
        let next = match self.database_path()? {
            Some(path) => Some(SqliteStorage::connect(&path).await?),
            None => {
                warn!("database location is not configured; storage disabled");
                None
            }
        };
        let previous = std::mem::replace(&mut *self.storage.write(), next);
        if let Some(previous) = previous {
            previous.close().await;
            info!("previous database closed");
        }
        Ok(())
    }
}
