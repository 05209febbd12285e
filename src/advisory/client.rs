//! Chat-completions client for the language-model API.

use crate::advisory::{AdvisoryBackend, CallError};
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Configuration for the language-model client.
#[derive(Debug, Clone)]
pub struct AdvisoryConfig {
    pub base_url: String,
    pub api_key: String,
    pub model_name: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
    /// Retries after a rate-limit response before giving up on a candidate.
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: String::new(),
            model_name: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            timeout_seconds: 120,
            max_retries: 3,
            retry_backoff: Duration::from_secs(5),
        }
    }
}

/// Message in the chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Sends one prompt per call to an OpenAI-compatible endpoint.
pub struct ChatClient {
    config: AdvisoryConfig,
    http_client: reqwest::Client,
}

impl ChatClient {
    pub fn new(config: AdvisoryConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(PipelineError::Advisory(
                "no API key configured (set OPENAI_API_KEY)".to_string(),
            ));
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| PipelineError::Advisory(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.config.model_name
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// One request, no retries.
    async fn send_prompt(&self, prompt: &str) -> std::result::Result<String, CallError> {
        let request = ChatRequest {
            model: &self.config.model_name,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.config.temperature,
        };

        let response = self
            .http_client
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let msg = if e.is_timeout() {
                    format!("request timed out after {}s", self.config.timeout_seconds)
                } else if e.is_connect() {
                    format!("cannot connect to {}", self.config.base_url)
                } else {
                    format!("failed to send request: {}", e)
                };
                CallError::Failed(PipelineError::Advisory(msg))
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CallError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallError::Failed(PipelineError::Advisory(format!(
                "API error {}: {}",
                status, body
            ))));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            CallError::Failed(PipelineError::Advisory(format!(
                "failed to parse response: {}",
                e
            )))
        })?;

        extract_text(chat).map_err(CallError::Failed)
    }
}

impl AdvisoryBackend for ChatClient {
    async fn advise(&self, prompt: &str) -> Result<String> {
        debug!("Sending {} byte prompt to {}", prompt.len(), self.config.model_name);
        crate::advisory::retry_rate_limited(
            self.config.max_retries,
            self.config.retry_backoff,
            || self.send_prompt(prompt),
        )
        .await
    }
}

/// First choice's text, trimmed. Empty answers count as failures.
fn extract_text(response: ChatResponse) -> Result<String> {
    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    if text.is_empty() {
        Err(PipelineError::Advisory("empty response from model".to_string()))
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AdvisoryConfig {
        AdvisoryConfig {
            api_key: "sk-test".to_string(),
            base_url: "https://llm.example.com/".to_string(),
            ..AdvisoryConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = AdvisoryConfig::default();
        assert_eq!(config.model_name, "gpt-4o-mini");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_backoff, Duration::from_secs(5));
    }

    #[test]
    fn test_requires_api_key() {
        assert!(ChatClient::new(AdvisoryConfig::default()).is_err());
        let client = ChatClient::new(config()).unwrap();
        assert_eq!(
            client.completions_url(),
            "https://llm.example.com/v1/chat/completions"
        );
        assert_eq!(client.model_name(), "gpt-4o-mini");
    }

    #[test]
    fn test_request_serialization() {
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "Site 1".to_string(),
            }],
            temperature: 0.2,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "Site 1");
    }

    #[test]
    fn test_extract_text() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "  Rating: 6/10 \n"}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "Rating: 6/10");

        let empty: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(extract_text(empty).is_err());

        let null_content: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": null}}]}"#).unwrap();
        assert!(extract_text(null_content).is_err());
    }
}
