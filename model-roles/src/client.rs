use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ResolvedConfig;
use crate::error::{ChatError, ModelConfigError};
use crate::role::Role;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Builds a client from resolved settings. Construction is local only;
/// nothing is sent over the network until the client is used.
pub trait ClientFactory: Send + Sync {
    type Client: Send + Sync;

    fn build(&self, config: &ResolvedConfig) -> Result<Self::Client, ModelConfigError>;
}

/// Factory for [`ChatClient`], an OpenAI-compatible chat-completions client.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiCompatibleFactory;

impl ClientFactory for OpenAiCompatibleFactory {
    type Client = ChatClient;

    fn build(&self, config: &ResolvedConfig) -> Result<ChatClient, ModelConfigError> {
        ChatClient::from_config(config)
    }
}

pub struct ChatClient {
    http: reqwest::Client,
    role: Role,
    model: String,
    base_url: String,
    api_key: SecretString,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

impl ChatClient {
    pub fn from_config(config: &ResolvedConfig) -> Result<Self, ModelConfigError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.default_headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ModelConfigError::ClientBuild(format!("invalid header name '{name}': {e}"))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                ModelConfigError::ClientBuild(format!("invalid value for header '{name}': {e}"))
            })?;
            headers.insert(header_name, header_value);
        }

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(secs) = parse_extra::<u64>(config, "timeout_secs") {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .map_err(|e| ModelConfigError::ClientBuild(e.to_string()))?;

        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_OPENAI_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        tracing::debug!(
            role = %config.role,
            model = %config.model,
            base_url = %base_url,
            "Constructed chat client"
        );

        Ok(Self {
            http,
            role: config.role,
            model: config.model.clone(),
            base_url,
            api_key: SecretString::from(config.api_key.expose_secret()),
            temperature: parse_extra(config, "temperature"),
            max_tokens: parse_extra(config, "max_tokens"),
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    /// Send a single user message and return the first choice's text.
    pub async fn complete(&self, prompt: &str) -> Result<String, ChatError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let body: ChatCompletionResponse = response.json().await?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(ChatError::EmptyResponse)
    }

    /// List model ids visible to this credential.
    pub async fn list_models(&self) -> Result<Vec<String>, ChatError> {
        let response = self
            .http
            .get(format!("{}/models", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let body: ModelList = response.json().await?;
        Ok(body.data.into_iter().map(|entry| entry.id).collect())
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("role", &self.role)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ChatError::Status { status, body })
}

fn parse_extra<T: std::str::FromStr>(config: &ResolvedConfig, key: &str) -> Option<T> {
    let raw = config.extra.get(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(
                role = %config.role,
                setting = %key,
                value = %raw,
                "Ignoring unparseable model setting"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve_with, StaticConfig, GATEWAY_BASE_URL};
    use std::collections::BTreeMap;

    fn resolved(pairs: &[(&str, &str)]) -> ResolvedConfig {
        let overrides: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        resolve_with(Role::Basic, &StaticConfig::new(), &overrides, None).expect("resolve")
    }

    #[test]
    fn test_build_gateway_client() {
        let config = resolved(&[
            ("api_key", "sk-or-v1-test"),
            ("model", "google/gemini-2.5-pro-preview"),
            ("base_url", "https://openrouter.ai/api/v1/"),
            ("temperature", "0.5"),
            ("max_tokens", "2048"),
        ]);
        let client = OpenAiCompatibleFactory.build(&config).expect("build client");

        assert_eq!(client.role(), Role::Basic);
        assert_eq!(client.model(), "google/gemini-2.5-pro-preview");
        assert_eq!(client.base_url(), GATEWAY_BASE_URL);
        assert_eq!(client.temperature(), Some(0.5));
        assert_eq!(client.max_tokens(), Some(2048));
    }

    #[test]
    fn test_default_base_url_when_unset() {
        let client = ChatClient::from_config(&resolved(&[("api_key", "sk-test"), ("model", "gpt-4o")]))
            .expect("build client");
        assert_eq!(client.base_url(), DEFAULT_OPENAI_BASE_URL);
    }

    #[test]
    fn test_unparseable_extras_are_ignored() {
        let client = ChatClient::from_config(&resolved(&[
            ("api_key", "sk-test"),
            ("model", "gpt-4o"),
            ("temperature", "warm"),
            ("timeout_secs", "soon"),
        ]))
        .expect("build client");
        assert_eq!(client.temperature(), None);
    }

    #[test]
    fn test_invalid_header_is_client_build_error() {
        let mut config = resolved(&[("api_key", "sk-test"), ("model", "gpt-4o")]);
        config
            .default_headers
            .insert("Bad Header".to_string(), "x".to_string());
        let err = ChatClient::from_config(&config).unwrap_err();
        assert!(matches!(err, ModelConfigError::ClientBuild(_)));

        let mut config = resolved(&[("api_key", "sk-test"), ("model", "gpt-4o")]);
        config
            .default_headers
            .insert("X-Title".to_string(), "line\nbreak".to_string());
        assert!(matches!(
            ChatClient::from_config(&config),
            Err(ModelConfigError::ClientBuild(_))
        ));
    }

    #[test]
    fn test_debug_omits_api_key() {
        let client = ChatClient::from_config(&resolved(&[
            ("api_key", "sk-should-not-appear"),
            ("model", "gpt-4o"),
        ]))
        .expect("build client");
        assert!(!format!("{client:?}").contains("should-not-appear"));
    }
}
