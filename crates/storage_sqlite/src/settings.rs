use anyhow::{Context, Result};
use chrono::Utc;
use core_types::LocalModelConfig;
use sqlx::Row;
use tracing::info;

use crate::{SqliteStorage, timestamp};

pub const PRIVACY_CONSENT_KEY: &str = "privacy_consent_remote_api";
pub const LOCAL_MODEL_CONFIG_KEY: &str = "local_model_config";

impl SqliteStorage {
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.get::<String, _>("value")))
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings(key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remote model calls stay disabled until consent has been stored.
    pub async fn has_privacy_consent_for_remote_api(&self) -> Result<bool> {
        Ok(self
            .get_setting(PRIVACY_CONSENT_KEY)
            .await?
            .is_some_and(|value| value == "true"))
    }

    pub async fn set_privacy_consent_for_remote_api(&self, accepted: bool) -> Result<()> {
        self.set_setting(PRIVACY_CONSENT_KEY, if accepted { "true" } else { "false" })
            .await?;
        info!(accepted, "privacy consent for remote api updated");
        Ok(())
    }

    pub async fn local_model_config(&self) -> Result<Option<LocalModelConfig>> {
        let Some(raw) = self.get_setting(LOCAL_MODEL_CONFIG_KEY).await? else {
            return Ok(None);
        };
        let config = serde_json::from_str(&raw).context("invalid local model config in database")?;
        Ok(Some(config))
    }

    pub async fn save_local_model_config(&self, config: &LocalModelConfig) -> Result<()> {
        let raw = serde_json::to_string(config)?;
        self.set_setting(LOCAL_MODEL_CONFIG_KEY, &raw).await
    }
}

#[cfg(test)]
mod tests {
    use core_types::LocalModelProvider;

    use super::*;

    #[tokio::test]
    async fn privacy_consent_round_trips() {
        let storage = SqliteStorage::in_memory().await.expect("storage");
        assert!(!storage.has_privacy_consent_for_remote_api().await.expect("read"));

        storage
            .set_privacy_consent_for_remote_api(true)
            .await
            .expect("accept");
        assert!(storage.has_privacy_consent_for_remote_api().await.expect("read"));

        storage
            .set_privacy_consent_for_remote_api(false)
            .await
            .expect("revoke");
        assert!(!storage.has_privacy_consent_for_remote_api().await.expect("read"));
    }

    #[tokio::test]
    async fn local_model_config_is_absent_until_saved() {
        let storage = SqliteStorage::in_memory().await.expect("storage");
        assert!(storage.local_model_config().await.expect("read").is_none());

        let config = LocalModelConfig {
            provider: LocalModelProvider::Ollama,
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "llama3.2".to_string(),
            extra_headers: Vec::new(),
        };
        storage.save_local_model_config(&config).await.expect("save");
        assert_eq!(
            storage.local_model_config().await.expect("read"),
            Some(config)
        );
    }
}
