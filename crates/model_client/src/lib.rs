use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use core_types::{
    GenerationRequest, LocalModelConfig, LocalModelProvider, ModelBackend, RemoteModelConfig,
    ValidationReport,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Value, json};
use tracing::{debug, warn};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const VALIDATE_TIMEOUT: Duration = Duration::from_secs(5);
const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);
const GEMINI_KEY_HEADER: &str = "x-goog-api-key";

pub struct HttpModelBackend {
    client: reqwest::Client,
    validate_timeout: Duration,
}

impl Default for HttpModelBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpModelBackend {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            validate_timeout: VALIDATE_TIMEOUT,
        }
    }

    pub fn with_validate_timeout(mut self, timeout: Duration) -> Self {
        self.validate_timeout = timeout;
        self
    }

    async fn list_local_models(&self, config: &LocalModelConfig) -> Result<Vec<String>> {
        let url = models_url(config);
        let mut headers = HeaderMap::new();
        apply_extra_headers(&mut headers, &config.extra_headers)?;
        let response = self
            .client
            .get(&url)
            .headers(headers)
            .timeout(self.validate_timeout)
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("local model endpoint answered {status}");
        }
        let payload: Value = response
            .json()
            .await
            .context("local model endpoint returned invalid json")?;
        Ok(parse_model_list(config.provider, &payload))
    }

    async fn post_json(
        &self,
        url: &str,
        extra_headers: &[(String, String)],
        body: Value,
    ) -> Result<Value> {
        let mut headers = HeaderMap::new();
        apply_extra_headers(&mut headers, extra_headers)?;
        let response = self
            .client
            .post(url)
            .headers(headers)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .timeout(GENERATE_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        let status = response.status();
        let text = response.text().await.map_err(reqwest::Error::without_url)?;
        if !status.is_success() {
            bail!("model request failed: {status} {text}");
        }
        serde_json::from_str(&text).context("model returned invalid json")
    }
}

#[async_trait]
impl ModelBackend for HttpModelBackend {
    async fn validate_local(&self, config: &LocalModelConfig) -> ValidationReport {
        let started = Instant::now();
        let listed = self.list_local_models(config).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match listed {
            Ok(available_models) => {
                let model_available = match config.model_name() {
                    Some(model) => available_models
                        .iter()
                        .any(|candidate| model_matches(candidate, model)),
                    None => true,
                };
                let error = (!model_available).then(|| {
                    format!(
                        "model `{}` is not available on the local endpoint",
                        config.model.trim()
                    )
                });
                debug!(
                    base_url = %config.base_url,
                    latency_ms,
                    model_available,
                    "local model reachable"
                );
                ValidationReport {
                    ok: model_available,
                    reachable: true,
                    model_available,
                    available_models,
                    latency_ms,
                    error,
                }
            }
            Err(err) => {
                warn!(base_url = %config.base_url, "local model validation failed: {err:#}");
                ValidationReport::unreachable(format!("{err:#}"), latency_ms)
            }
        }
    }

    async fn generate_local(
        &self,
        config: &LocalModelConfig,
        request: &GenerationRequest,
    ) -> Result<String> {
        let model = config
            .model_name()
            .ok_or_else(|| anyhow!("local model name is not configured"))?;
        let body = json!({
            "model": model,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.input },
            ],
            "stream": false,
        });
        let url = format!(
            "{}/v1/chat/completions",
            config.base_url.trim_end_matches('/')
        );
        let payload = self.post_json(&url, &config.extra_headers, body).await?;
        extract_chat_completion_text(&payload)
    }

    async fn generate_remote(
        &self,
        remote: &RemoteModelConfig,
        request: &GenerationRequest,
    ) -> Result<String> {
        let model = remote.model.trim();
        if model.is_empty() {
            bail!("gemini model is required");
        }
        let body = json!({
            "systemInstruction": { "parts": [{ "text": request.system_prompt }] },
            "contents": [{ "role": "user", "parts": [{ "text": request.input }] }],
        });
        let url = format!(
            "{}/v1beta/models/{model}:generateContent",
            remote.base_url.trim_end_matches('/'),
        );
        let auth = [(GEMINI_KEY_HEADER.to_string(), remote.api_key.trim().to_string())];
        let payload = self.post_json(&url, &auth, body).await?;
        extract_gemini_text(&payload)
    }
}

/// Local endpoints must be plain `http` or `https` urls with a host.
pub fn check_base_url(base_url: &str) -> Result<()> {
    let url = reqwest::Url::parse(base_url.trim())
        .with_context(|| format!("invalid base url `{base_url}`"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("base url must use http or https, got `{}`", url.scheme());
    }
    if url.host_str().is_none() {
        bail!("base url `{base_url}` has no host");
    }
    Ok(())
}

fn models_url(config: &LocalModelConfig) -> String {
    let base = config.base_url.trim_end_matches('/');
    match config.provider {
        LocalModelProvider::Ollama => format!("{base}/api/tags"),
        LocalModelProvider::OpenAiCompatible => format!("{base}/v1/models"),
    }
}

fn apply_extra_headers(headers: &mut HeaderMap, extra_headers: &[(String, String)]) -> Result<()> {
    for (key, value) in extra_headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| anyhow!("invalid header name: {key}"))?;
        let value =
            HeaderValue::from_str(value).map_err(|_| anyhow!("invalid header value for {key}"))?;
        headers.insert(name, value);
    }
    Ok(())
}

fn parse_model_list(provider: LocalModelProvider, payload: &Value) -> Vec<String> {
    let (list_key, name_key) = match provider {
        LocalModelProvider::Ollama => ("models", "name"),
        LocalModelProvider::OpenAiCompatible => ("data", "id"),
    };
    payload
        .get(list_key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(name_key).and_then(Value::as_str))
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Ollama lists `llama3.2:latest` for a model configured as `llama3.2`.
fn model_matches(candidate: &str, wanted: &str) -> bool {
    candidate == wanted
        || (!wanted.contains(':')
            && candidate
                .strip_suffix(":latest")
                .is_some_and(|base| base == wanted))
}

fn extract_chat_completion_text(payload: &Value) -> Result<String> {
    payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.pointer("/message/content"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| anyhow!("chat completion response has no message content"))
}

fn extract_gemini_text(payload: &Value) -> Result<String> {
    let parts = payload
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("gemini response has no candidates"))?;
    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        bail!("gemini response has no text");
    }
    Ok(text)
}
