use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

mod env;
pub mod paths;

pub use env::{ConfigError, EnvConfig, NodeEnv};

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Settings the desktop shell persists between launches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShellConfig {
    pub schema_version: u32,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            data_dir: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: dir.into().join("config.json"),
        }
    }

    pub fn from_default_location() -> Result<Self> {
        let mut dir = dirs::config_dir().context("failed to resolve config_dir")?;
        dir.push("promptcraft");
        Ok(Self::from_dir(dir))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_or_init(&self) -> Result<ShellConfig> {
        if !self.path.exists() {
            let config = ShellConfig::default();
            self.save(&config)?;
            return Ok(config);
        }

        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let mut config: ShellConfig =
            serde_json::from_str(&raw).context("failed to parse shell config json")?;
        if self.migrate(&mut config) {
            self.save(&config)?;
        }
        Ok(config)
    }

    pub fn save(&self, config: &ShellConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        // Write-then-rename so a crash never leaves a truncated config behind.
        let staged = self.path.with_extension("json.tmp");
        let text = serde_json::to_vec_pretty(config).context("failed to encode shell config")?;
        fs::write(&staged, text).with_context(|| format!("failed to write {}", staged.display()))?;
        fs::rename(&staged, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }

    /// Persists `dir` as the data directory, creating it when missing.
    pub fn set_data_dir(&self, dir: impl Into<PathBuf>) -> Result<ShellConfig> {
        let dir = dir.into();
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let mut config = self.load_or_init()?;
        config.data_dir = Some(dir);
        self.save(&config)?;
        info!(data_dir = ?config.data_dir, "data directory updated");
        Ok(config)
    }

    /// Forgets the data directory. Files inside it are left alone.
    pub fn clear_data_dir(&self) -> Result<ShellConfig> {
        let mut config = self.load_or_init()?;
        config.data_dir = None;
        self.save(&config)?;
        info!("data directory cleared");
        Ok(config)
    }

    fn migrate(&self, config: &mut ShellConfig) -> bool {
        if config.schema_version >= CURRENT_SCHEMA_VERSION {
            return false;
        }

        warn!(
            from = config.schema_version,
            to = CURRENT_SCHEMA_VERSION,
            "migrating shell config schema"
        );
        config.schema_version = CURRENT_SCHEMA_VERSION;
        true
    }
}
