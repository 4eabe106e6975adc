use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use ridematch_core::config::{LlmConfig, LlmProvider};
use ridematch_core::errors::ApplicationError;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com";
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("request timed out after {after_secs}s")]
    Timeout { after_secs: u64 },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("response could not be decoded: {0}")]
    Decode(String),
}

impl CompletionError {
    pub fn into_application(self, upstream: &str) -> ApplicationError {
        ApplicationError::transient(upstream, self.to_string())
    }
}

/// A text completion service. Any returned text may be malformed; callers
/// never assume structure.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

pub fn client_from_config(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, ApplicationError> {
    match config.provider {
        LlmProvider::Ollama => {
            let base_url = config.base_url.clone().ok_or_else(|| {
                ApplicationError::Configuration("llm.base_url is required for ollama".to_string())
            })?;
            Ok(Arc::new(OllamaClient::new(base_url, config.model.clone(), config.timeout_secs)?))
        }
        LlmProvider::OpenAi => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                ApplicationError::Configuration(
                    "llm.api_key is required for the openai provider".to_string(),
                )
            })?;
            let base_url =
                config.base_url.clone().unwrap_or_else(|| OPENAI_DEFAULT_BASE_URL.to_string());
            Ok(Arc::new(OpenAiClient::new(
                base_url,
                config.model.clone(),
                api_key,
                config.timeout_secs,
            )?))
        }
    }
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<Client, ApplicationError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|error| ApplicationError::Configuration(format!("http client: {error}")))
}

pub(crate) fn transport_error(error: reqwest::Error, timeout_secs: u64) -> CompletionError {
    if error.is_timeout() {
        CompletionError::Timeout { after_secs: timeout_secs }
    } else if error.is_decode() {
        CompletionError::Decode(error.to_string())
    } else {
        CompletionError::Transport(error.to_string())
    }
}

pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, CompletionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CompletionError::Status {
        status: status.as_u16(),
        body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
    })
}

pub(crate) fn trim_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(
        base_url: impl AsRef<str>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, ApplicationError> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            base_url: trim_base_url(base_url.as_ref()),
            model: model.into(),
            timeout_secs,
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = OllamaGenerateRequest { model: &self.model, prompt, stream: false };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|error| transport_error(error, self.timeout_secs))?;
        let body: OllamaGenerateResponse = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|error| CompletionError::Decode(error.to_string()))?;

        Ok(body.response)
    }
}

pub struct OpenAiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: SecretString,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(
        base_url: impl AsRef<str>,
        model: impl Into<String>,
        api_key: SecretString,
        timeout_secs: u64,
    ) -> Result<Self, ApplicationError> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            base_url: trim_base_url(base_url.as_ref()),
            model: model.into(),
            api_key,
            timeout_secs,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            temperature: 0.2,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|error| transport_error(error, self.timeout_secs))?;
        let body: ChatCompletionResponse = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|error| CompletionError::Decode(error.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| CompletionError::Decode("response contained no choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use ridematch_core::config::{LlmConfig, LlmProvider};
    use ridematch_core::errors::ApplicationError;

    use super::{client_from_config, trim_base_url, CompletionError};

    fn llm_config(provider: LlmProvider) -> LlmConfig {
        LlmConfig {
            provider,
            api_key: None,
            base_url: Some("http://localhost:11434/".to_string()),
            model: "llama3.1".to_string(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn ollama_client_builds_from_config() {
        let client = client_from_config(&llm_config(LlmProvider::Ollama));
        assert!(matches!(client, Ok(ref client) if client.name() == "ollama"));
    }

    #[test]
    fn openai_without_key_is_configuration_error() {
        let result = client_from_config(&llm_config(LlmProvider::OpenAi));
        assert!(matches!(result, Err(ApplicationError::Configuration(_))));
    }

    #[test]
    fn completion_errors_become_transient_upstream() {
        let error = CompletionError::Timeout { after_secs: 30 }.into_application("completion");
        assert!(error.is_transient());
        assert_eq!(error.to_string(), "completion unavailable: request timed out after 30s");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        assert_eq!(trim_base_url(" http://localhost:11434/ "), "http://localhost:11434");
    }
}
