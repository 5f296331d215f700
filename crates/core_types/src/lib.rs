use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;
pub type ChatId = Uuid;
pub type MessageId = Uuid;

/// Fixed identity of the stub user served by the desktop build.
pub const DESKTOP_USER_ID: UserId = Uuid::from_u128(1);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    Web,
    Desktop,
}

impl RuntimeMode {
    pub fn is_desktop(self) -> bool {
        matches!(self, Self::Desktop)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct SessionUser {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

impl SessionUser {
    pub fn desktop_stub() -> Self {
        Self {
            id: DESKTOP_USER_ID,
            name: "Local User".to_string(),
            email: "local@localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub user: SessionUser,
    pub expires: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LocalModelProvider {
    Ollama,
    OpenAiCompatible,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalModelConfig {
    pub provider: LocalModelProvider,
    pub base_url: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub extra_headers: Vec<(String, String)>,
}

impl LocalModelConfig {
    pub fn model_name(&self) -> Option<&str> {
        let model = self.model.trim();
        (!model.is_empty()).then_some(model)
    }
}

/// Outcome of a local model reachability check.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub ok: bool,
    pub reachable: bool,
    pub model_available: bool,
    #[serde(default)]
    pub available_models: Vec<String>,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationReport {
    pub fn unreachable(error: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            ok: false,
            reachable: false,
            model_available: false,
            available_models: Vec::new(),
            latency_ms,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PromptMode {
    Build,
    Enhance,
}

impl PromptMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Enhance => "enhance",
        }
    }
}

impl FromStr for PromptMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "build" => Ok(Self::Build),
            "enhance" => Ok(Self::Enhance),
            other => bail!("unknown prompt mode `{other}`"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PromptTarget {
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl FromStr for ChatRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => bail!("unknown chat role `{other}`"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageFeedback {
    Up,
    Down,
}

impl MessageFeedback {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl FromStr for MessageFeedback {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            other => bail!("unknown message feedback `{other}`"),
        }
    }
}

impl fmt::Display for MessageFeedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub input: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteModelConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
}

/// Connectivity checks and text generation against local and remote models.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn validate_local(&self, config: &LocalModelConfig) -> ValidationReport;

    async fn generate_local(
        &self,
        config: &LocalModelConfig,
        request: &GenerationRequest,
    ) -> Result<String>;

    async fn generate_remote(
        &self,
        remote: &RemoteModelConfig,
        request: &GenerationRequest,
    ) -> Result<String>;
}
