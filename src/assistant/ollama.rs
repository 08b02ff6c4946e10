/// Ollama chat model
///
/// Calls the Ollama /api/chat endpoint with structured JSON output (`format` field set
/// to the reply schema). No API key required; designed for a self-hosted Ollama.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{reply_schema, AssistantError, ChatModel};
use crate::config::AssistantConfig;

// --- HTTP request/response structs ---

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    keep_alive: String,
    options: OllamaOptions,
    format: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    /// Maximum tokens to generate
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

/// Ollama-backed chat model.
pub struct OllamaChatModel {
    client: reqwest::Client,
    base_url: String,
    model: String,
    keep_alive: String,
    temperature: f32,
    max_tokens: u32,
}

impl OllamaChatModel {
    /// Create a new OllamaChatModel from the assistant configuration.
    pub fn new(config: &AssistantConfig) -> Result<Self, AssistantError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AssistantError::Request(format!("Failed to build HTTP client: {}", e)))?;

        Ok(OllamaChatModel {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            keep_alive: config.keep_alive.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn build_request(&self, system: &str, user: &str) -> OllamaChatRequest {
        OllamaChatRequest {
            model: self.model.clone(),
            messages: vec![
                OllamaMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                OllamaMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            stream: false,
            keep_alive: self.keep_alive.clone(),
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
            format: reply_schema(),
        }
    }
}

#[async_trait]
impl ChatModel for OllamaChatModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String, AssistantError> {
        let request = self.build_request(system, user);
        let url = format!("{}/api/chat", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AssistantError::Request(format!("HTTP request failed: {}", e)))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(AssistantError::Api { status, message: body });
        }

        let chat_response: OllamaChatResponse = response.json().await.map_err(|e| {
            AssistantError::Request(format!("Failed to parse Ollama response: {}", e))
        })?;

        Ok(chat_response.message.content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let model = OllamaChatModel::new(&AssistantConfig {
            base_url: "http://localhost:11434/".to_string(),
            ..AssistantConfig::default()
        })
        .unwrap();
        assert_eq!(model.base_url, "http://localhost:11434");

        let body = serde_json::to_value(model.build_request("be helpful", "red dress?")).unwrap();
        assert_eq!(body["model"], "gemma2:2b");
        assert_eq!(body["stream"], false);
        assert_eq!(body["keep_alive"], "3h");
        assert_eq!(body["options"]["num_predict"], 512);
        assert_eq!(body["options"]["temperature"], 0.0);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "red dress?");
        assert_eq!(body["format"]["required"][0], "sku");
    }

    #[test]
    fn test_response_content_extraction() {
        let raw = r#"{"model":"gemma2:2b","message":{"role":"assistant","content":"{\"sku\":[],\"message\":\"hi\"}"},"done":true}"#;
        let parsed: OllamaChatResponse = serde_json::from_str(raw).unwrap();
        let reply = super::super::parse_reply(&parsed.message.content).unwrap();
        assert_eq!(reply.message, "hi");
    }
}
