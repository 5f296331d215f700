use core_types::RuntimeMode;
use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_GOOGLE_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_SESSION_IDLE_MINUTES: u64 = 30;
/// One year.
pub const MAX_SESSION_IDLE_MINUTES: u64 = 525_600;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable `{0}`")]
    Missing(&'static str),

    #[error("invalid value for `{name}`: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeEnv {
    Development,
    Test,
    Production,
}

impl NodeEnv {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "development" => Some(Self::Development),
            "test" => Some(Self::Test),
            "production" => Some(Self::Production),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Production => "production",
        }
    }
}

/// Process-wide settings read once at startup.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub database_url: Option<String>,
    pub node_env: NodeEnv,
    pub system_prompt_build: Option<String>,
    pub system_prompt_enhance: Option<String>,
    pub base_path: String,
    pub skip_env_validation: bool,
    pub bind_addr: String,
    pub runtime_mode: RuntimeMode,
    pub google_api_key: Option<String>,
    pub google_model: String,
    pub session_idle_minutes: u64,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            node_env: NodeEnv::Development,
            system_prompt_build: None,
            system_prompt_enhance: None,
            base_path: String::new(),
            skip_env_validation: false,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            runtime_mode: RuntimeMode::Web,
            google_api_key: None,
            google_model: DEFAULT_GOOGLE_MODEL.to_string(),
            session_idle_minutes: DEFAULT_SESSION_IDLE_MINUTES,
        }
    }
}

impl EnvConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let skip_env_validation = get("SKIP_ENV_VALIDATION").is_some_and(|v| parse_flag(&v));

        let node_env = match get("NODE_ENV") {
            None => NodeEnv::Development,
            Some(raw) => match NodeEnv::parse(&raw) {
                Some(env) => env,
                None if skip_env_validation => NodeEnv::Development,
                None => {
                    return Err(ConfigError::Invalid {
                        name: "NODE_ENV",
                        reason: format!("expected development, test or production, got `{raw}`"),
                    });
                }
            },
        };

        let session_idle_minutes = match get("SESSION_IDLE_MINUTES") {
            None => DEFAULT_SESSION_IDLE_MINUTES,
            Some(raw) => {
                let minutes = raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                    name: "SESSION_IDLE_MINUTES",
                    reason: e.to_string(),
                })?;
                if !(1..=MAX_SESSION_IDLE_MINUTES).contains(&minutes) {
                    return Err(ConfigError::Invalid {
                        name: "SESSION_IDLE_MINUTES",
                        reason: format!("must be between 1 and {MAX_SESSION_IDLE_MINUTES}"),
                    });
                }
                minutes
            }
        };

        let runtime_mode = if get("PROMPTCRAFT_DESKTOP").is_some_and(|v| parse_flag(&v)) {
            RuntimeMode::Desktop
        } else {
            RuntimeMode::Web
        };

        Ok(Self {
            database_url: get("DATABASE_URL"),
            node_env,
            system_prompt_build: get("GOOGLE_SYSTEM_PROMPT_BUILD"),
            system_prompt_enhance: get("GOOGLE_SYSTEM_PROMPT_ENHANCE"),
            base_path: get("NEXT_PUBLIC_BASE_PATH").unwrap_or_default(),
            skip_env_validation,
            bind_addr: get("PROMPTCRAFT_BIND").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            runtime_mode,
            google_api_key: get("GOOGLE_API_KEY"),
            google_model: get("GOOGLE_MODEL").unwrap_or_else(|| DEFAULT_GOOGLE_MODEL.to_string()),
            session_idle_minutes,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.skip_env_validation {
            return Ok(());
        }

        if self.node_env == NodeEnv::Production
            && !self.runtime_mode.is_desktop()
            && self.database_url.is_none()
        {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        if let Some(url) = &self.database_url {
            if crate::paths::sqlite_path_from_url(url).is_none() {
                return Err(ConfigError::Invalid {
                    name: "DATABASE_URL",
                    reason: "only `file:` SQLite urls are supported".to_string(),
                });
            }
        }

        if !self.base_path.is_empty()
            && (!self.base_path.starts_with('/') || self.base_path.ends_with('/'))
        {
            return Err(ConfigError::Invalid {
                name: "NEXT_PUBLIC_BASE_PATH",
                reason: "must start with `/` and must not end with `/`".to_string(),
            });
        }

        Ok(())
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
