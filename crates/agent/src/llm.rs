use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use flowmaster_core::config::{LlmConfig, LlmProviderConfig};
use flowmaster_core::domain::conversation::{ChatRole, ChatTurn};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("chat provider `{0}` has no api key configured")]
    NotConfigured(String),
    #[error("chat provider `{provider}` request failed: {message}")]
    Transport { provider: String, message: String },
    #[error("chat provider `{0}` timed out")]
    Timeout(String),
    #[error("chat provider `{provider}` returned http status {status}")]
    HttpStatus { provider: String, status: u16 },
    #[error("chat provider `{0}` returned no content")]
    EmptyResponse(String),
}

/// A chat-completion backend. Implementations must bound their own latency.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, messages: &[ChatTurn], temperature: f32) -> Result<String, LlmError>;
}

/// Client for any endpoint speaking the OpenAI `chat/completions` protocol.
#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    name: String,
    api_key: Option<SecretString>,
    endpoint: String,
    model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompatibleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleClient")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

impl OpenAiCompatibleClient {
    pub fn new(provider: &LlmProviderConfig, timeout: Duration) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder().timeout(timeout).build().map_err(|error| {
            LlmError::Transport { provider: provider.name.clone(), message: error.to_string() }
        })?;

        Ok(Self {
            name: provider.name.clone(),
            api_key: provider.api_key.clone(),
            endpoint: format!("{}/chat/completions", provider.base_url.trim_end_matches('/')),
            model: provider.model.clone(),
            client,
        })
    }

    /// Primary and secondary clients in fallback order. Unconfigured providers are skipped.
    pub fn from_config(config: &LlmConfig) -> Result<Vec<Self>, LlmError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        [&config.primary, &config.secondary]
            .into_iter()
            .filter(|provider| provider.is_configured())
            .map(|provider| Self::new(provider, timeout))
            .collect()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn wire_role(role: ChatRole) -> &'static str {
    match role {
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::System => "system",
    }
}

#[async_trait]
impl ChatCompletion for OpenAiCompatibleClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, messages: &[ChatTurn], temperature: f32) -> Result<String, LlmError> {
        let api_key = self
            .api_key
            .as_ref()
            .filter(|key| !key.expose_secret().trim().is_empty())
            .ok_or_else(|| LlmError::NotConfigured(self.name.clone()))?;

        let body = CompletionRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|turn| WireMessage { role: wire_role(turn.role), content: &turn.content })
                .collect(),
            temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| self.transport_error(error))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::HttpStatus { provider: self.name.clone(), status: status.as_u16() });
        }

        let parsed: CompletionResponse =
            response.json().await.map_err(|error| self.transport_error(error))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| LlmError::EmptyResponse(self.name.clone()))
    }
}

impl OpenAiCompatibleClient {
    fn transport_error(&self, error: reqwest::Error) -> LlmError {
        if error.is_timeout() {
            LlmError::Timeout(self.name.clone())
        } else {
            LlmError::Transport { provider: self.name.clone(), message: error.to_string() }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use flowmaster_core::config::{LlmConfig, LlmProviderConfig};
    use flowmaster_core::domain::conversation::ChatTurn;

    use super::{ChatCompletion, LlmError, OpenAiCompatibleClient};

    fn provider(name: &str, api_key: Option<&str>) -> LlmProviderConfig {
        LlmProviderConfig {
            name: name.to_string(),
            api_key: api_key.map(|key| key.to_string().into()),
            base_url: "https://llm.example.test/v1/".to_string(),
            model: "test-model".to_string(),
        }
    }

    #[test]
    fn endpoint_joins_base_url_without_double_slash() {
        let client = OpenAiCompatibleClient::new(&provider("primary", Some("k")), Duration::from_secs(5))
            .expect("client");
        assert_eq!(client.endpoint(), "https://llm.example.test/v1/chat/completions");
    }

    #[test]
    fn from_config_skips_unconfigured_providers_and_keeps_order() {
        let config = LlmConfig {
            timeout_secs: 5,
            temperature: 0.7,
            primary: provider("deepseek", None),
            secondary: provider("qianwen", Some("secret")),
        };
        let clients = OpenAiCompatibleClient::from_config(&config).expect("clients");
        let names: Vec<&str> = clients.iter().map(|client| client.name()).collect();
        assert_eq!(names, vec!["qianwen"]);
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let client =
            OpenAiCompatibleClient::new(&provider("deepseek", Some("sk-very-secret")), Duration::from_secs(5))
                .expect("client");
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("sk-very-secret"));
        assert!(rendered.contains("[redacted]"));
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let client = OpenAiCompatibleClient::new(&provider("deepseek", None), Duration::from_secs(5))
            .expect("client");
        let error = client.complete(&[ChatTurn::user("hi")], 0.7).await.expect_err("not configured");
        assert!(matches!(error, LlmError::NotConfigured(name) if name == "deepseek"));
    }
}
