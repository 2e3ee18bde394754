//! OpenAI-compatible chat completions generator.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{GenerationError, GenerationPrompt, Generator};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// HTTP-level timeout. The pipeline applies its own timeout on top.
    pub timeout: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(60),
        }
    }
}

// Hand-written so the API key never reaches logs.
impl std::fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Chat completions client.
pub struct OpenAiGenerator {
    name: String,
    model: String,
    api_key: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
    http: Client,
}

impl OpenAiGenerator {
    /// Build a client. Fails when no API key is configured.
    pub fn from_config(config: &GeneratorConfig) -> Result<Self, GenerationError> {
        debug!(?config, "OpenAiGenerator::from_config");
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(GenerationError::MissingApiKey)?;

        let http = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            name: format!("openai:{}", config.model),
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            http,
        })
    }

    fn build_request_body(&self, prompt: &GenerationPrompt) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user },
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &GenerationPrompt) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(%url, model = %self.model, "sending chat completion request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.build_request_body(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        extract_content(&body)
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Pull the first choice's text out of a chat completions response body.
fn extract_content(body: &str) -> Result<String, GenerationError> {
    let parsed: ChatResponse = serde_json::from_str(body)?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or(GenerationError::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key() -> GeneratorConfig {
        GeneratorConfig {
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn defaults() {
        let config = GeneratorConfig::default();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.max_tokens, 1000);
        assert!((config.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn missing_key_is_rejected() {
        let result = OpenAiGenerator::from_config(&GeneratorConfig::default());
        assert!(matches!(result, Err(GenerationError::MissingApiKey)));

        let blank = GeneratorConfig {
            api_key: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            OpenAiGenerator::from_config(&blank),
            Err(GenerationError::MissingApiKey)
        ));
    }

    #[test]
    fn debug_redacts_key() {
        let rendered = format!("{:?}", config_with_key());
        assert!(!rendered.contains("sk-test"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn name_includes_model() {
        let generator = OpenAiGenerator::from_config(&config_with_key()).unwrap();
        assert_eq!(generator.name(), "openai:gpt-4o");
    }

    #[test]
    fn request_body_shape() {
        let generator = OpenAiGenerator::from_config(&config_with_key()).unwrap();
        let body = generator.build_request_body(&GenerationPrompt {
            system: "be brief".to_string(),
            user: "plan my day".to_string(),
        });
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "be brief");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "plan my day");
    }

    #[test]
    fn extract_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"09:00 - 10:00 - A"}}]}"#;
        assert_eq!(extract_content(body).unwrap(), "09:00 - 10:00 - A");
    }

    #[test]
    fn extract_empty_reply() {
        assert!(matches!(
            extract_content(r#"{"choices":[]}"#),
            Err(GenerationError::Empty)
        ));
        assert!(matches!(
            extract_content(r#"{"choices":[{"message":{"content":null}}]}"#),
            Err(GenerationError::Empty)
        ));
        assert!(matches!(
            extract_content("not json"),
            Err(GenerationError::Decode(_))
        ));
    }
}
