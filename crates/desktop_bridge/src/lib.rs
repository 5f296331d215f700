use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use config::{ConfigStore, EnvConfig, paths};
use parking_lot::Mutex;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info};

mod host;
mod idle;

pub use host::{HeadlessHost, ShellExit, ShellHost, WindowState};
pub use idle::IdleTimer;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

impl From<BridgeError> for String {
    fn from(value: BridgeError) -> Self {
        value.to_string()
    }
}

/// Channels whose success changes where the database lives.
pub fn changes_data_dir(channel: &str) -> bool {
    matches!(channel, "chooseDataDir" | "resetDataDir")
}

fn arg<T: serde::de::DeserializeOwned>(args: &[Value], idx: usize) -> Result<T> {
    let value = args
        .get(idx)
        .ok_or_else(|| BridgeError::Message(format!("Missing arg at index {idx}")))?
        .clone();
    serde_json::from_value(value)
        .map_err(|e| BridgeError::Message(format!("Invalid arg at index {idx}: {e}")))
}

fn optional_arg<T: serde::de::DeserializeOwned>(args: &[Value], idx: usize) -> Result<Option<T>> {
    match args.get(idx) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => arg(args, idx).map(Some),
    }
}

/// Dispatches renderer requests to the shell by channel name.
pub struct DesktopBridge {
    host: Arc<dyn ShellHost>,
    config_store: ConfigStore,
    env: Arc<EnvConfig>,
    idle: Mutex<Option<IdleTimer>>,
}

impl DesktopBridge {
    pub fn new(host: Arc<dyn ShellHost>, config_store: ConfigStore, env: Arc<EnvConfig>) -> Self {
        Self {
            host,
            config_store,
            env,
            idle: Mutex::new(None),
        }
    }

    pub fn data_dir(&self) -> Result<Option<PathBuf>> {
        Ok(self.config_store.load_or_init()?.data_dir)
    }

    /// Sends the renderer to the logout page after `timeout` without activity.
    /// Must be called from within a tokio runtime.
    pub fn arm_idle_logout(&self, timeout: Duration) {
        let host = self.host.clone();
        let target = format!("{}/logout", self.env.base_path);
        let timer = IdleTimer::spawn(timeout, move || {
            info!("idle timeout reached, logging out");
            let _ = host.navigate(&target);
        });
        *self.idle.lock() = Some(timer);
    }

    pub fn invoke(&self, channel: &str, args: &[Value]) -> Result<Value> {
        debug!(%channel, "ipc invoke");
        match channel {
            "getConfig" => self.get_config(),
            "isDbConfigured" => Ok(Value::Bool(self.database_path()?.is_some())),
            "chooseDataDir" => self.choose_data_dir(optional_arg::<String>(args, 0)?),
            "getDbInfo" => {
                let data_dir = self.data_dir()?;
                let info = paths::db_info(self.env.database_url.as_deref(), data_dir.as_deref());
                Ok(serde_json::to_value(info)?)
            }
            "resetDataDir" => {
                self.config_store.clear_data_dir()?;
                Ok(json!({ "ok": true }))
            }
            "getEnvSafety" => {
                let data_dir = self.data_dir()?;
                Ok(serde_json::to_value(paths::env_safety(
                    &self.env,
                    data_dir.as_deref(),
                ))?)
            }
            "restartApp" => {
                self.host.restart()?;
                Ok(json!({ "ok": true }))
            }
            "activity" => {
                if let Some(timer) = self.idle.lock().as_ref() {
                    timer.touch();
                }
                Ok(Value::Null)
            }

            // Window controls
            "window:minimize" => {
                self.host.minimize()?;
                Ok(Value::Null)
            }
            "window:maximize-toggle" => {
                let maximized = if self.host.is_maximized()? {
                    self.host.unmaximize()?;
                    false
                } else {
                    self.host.maximize()?;
                    true
                };
                Ok(json!({ "maximized": maximized }))
            }
            "window:close" => {
                self.host.close()?;
                Ok(Value::Null)
            }

            _ => Err(BridgeError::Message(format!(
                "Not implemented IPC channel: {channel}"
            ))),
        }
    }

    fn database_path(&self) -> Result<Option<PathBuf>> {
        let data_dir = self.data_dir()?;
        Ok(paths::resolve_database_path(
            self.env.database_url.as_deref(),
            data_dir.as_deref(),
        ))
    }

    fn get_config(&self) -> Result<Value> {
        let config = self.config_store.load_or_init()?;
        let db_configured = paths::resolve_database_path(
            self.env.database_url.as_deref(),
            config.data_dir.as_deref(),
        )
        .is_some();
        Ok(json!({
            "dataDir": config.data_dir.map(|dir| dir.to_string_lossy().to_string()),
            "configPath": self.config_store.path().to_string_lossy(),
            "runtimeMode": self.env.runtime_mode,
            "basePath": self.env.base_path,
            "dbConfigured": db_configured,
        }))
    }

    fn choose_data_dir(&self, suggested: Option<String>) -> Result<Value> {
        let Some(dir) = self.host.pick_folder(suggested.map(PathBuf::from))? else {
            return Ok(json!({ "ok": false, "canceled": true }));
        };
        if dir.as_os_str().is_empty() {
            return Err(BridgeError::Message("data directory path is empty".to_string()));
        }
        let config = self.config_store.set_data_dir(&dir)?;
        Ok(json!({
            "ok": true,
            "dataDir": config.data_dir.map(|dir| dir.to_string_lossy().to_string()),
        }))
    }
}
