/// Sales assistant: turns retrieved catalog items plus chat history into a typed reply
///
/// The chat model is asked for JSON of the form {"sku": [...], "message": "..."}.
/// Model output is parsed defensively; anything unusable (transport failure, HTTP
/// error, malformed JSON) degrades to a fixed apology reply instead of an error.

pub mod ollama;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use thiserror::Error;

use crate::catalog::CatalogItem;

pub const GREETING: &str = "Hello! I'm your Zalando sales assistant. How can I help you today?";

pub const FALLBACK_MESSAGE: &str =
    "Apologies, but I'm unable to respond to your queries at the moment. Please try again later.";

/// Errors that can occur while talking to the chat model.
#[derive(Debug, Error)]
pub enum AssistantError {
    /// Transport failure (connect, timeout, body read)
    #[error("Chat request failed: {0}")]
    Request(String),

    /// Chat model API returned an HTTP error
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Model output was not a valid reply object
    #[error("Malformed model reply: {0}")]
    MalformedReply(String),
}

/// Structured assistant answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantReply {
    /// Catalog identifiers the answer refers to (may be empty)
    #[serde(default)]
    pub sku: Vec<String>,
    pub message: String,
}

impl AssistantReply {
    pub fn fallback() -> Self {
        AssistantReply {
            sku: Vec::new(),
            message: FALLBACK_MESSAGE.to_string(),
        }
    }
}

/// Parse model output into a reply.
///
/// Accepts a bare JSON object, a ```json fenced block, or an object embedded in
/// surrounding prose.
pub fn parse_reply(raw: &str) -> Result<AssistantReply, AssistantError> {
    let trimmed = raw.trim();
    if let Ok(reply) = serde_json::from_str::<AssistantReply>(trimmed) {
        return Ok(reply);
    }

    let candidate = fenced_json(trimmed)
        .or_else(|| outer_object(trimmed))
        .ok_or_else(|| AssistantError::MalformedReply(format!("no JSON object in: {}", trimmed)))?;

    serde_json::from_str::<AssistantReply>(candidate).map_err(|e| {
        AssistantError::MalformedReply(format!("{} (content: {})", e, trimmed))
    })
}

static FENCED_JSON: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").ok());

fn fenced_json(text: &str) -> Option<&str> {
    FENCED_JSON
        .as_ref()?
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn outer_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// JSON schema passed to the chat model to constrain its output.
pub fn reply_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "sku": {
                "type": "array",
                "items": { "type": "string" }
            },
            "message": { "type": "string" }
        },
        "required": ["sku", "message"]
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// Conversation so far, opened by the assistant greeting.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    turns: Vec<Turn>,
}

impl Default for ChatHistory {
    fn default() -> Self {
        ChatHistory::new()
    }
}

impl ChatHistory {
    pub fn new() -> Self {
        ChatHistory {
            turns: vec![Turn {
                role: Role::Assistant,
                content: GREETING.to_string(),
            }],
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn {
            role: Role::User,
            content: content.into(),
        });
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(Turn {
            role: Role::Assistant,
            content: content.into(),
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// One "User: ..." / "Assistant: ..." line per turn.
    pub fn format_for_prompt(&self) -> String {
        self.turns
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                };
                format!("{}: {}\n", role, turn.content)
            })
            .collect()
    }
}

#[derive(Serialize)]
struct ContextRecord<'a> {
    sku: &'a str,
    description: &'a str,
}

/// Serialize retrieved items as JSON records of sku and description.
pub fn context_json(items: &[CatalogItem]) -> String {
    let records: Vec<ContextRecord<'_>> = items
        .iter()
        .map(|item| ContextRecord {
            sku: &item.sku,
            description: &item.description,
        })
        .collect();
    serde_json::to_string(&records).unwrap_or_else(|_| "[]".to_string())
}

/// Build the system prompt for one turn.
pub fn build_system_prompt(context: &str, history: &str) -> String {
    format!(
        "You are a helpful sales assistant for Zalando, a clothing e-commerce platform. \
         You help customers with questions about products, FAQs and general information.\n\n\
         Instructions:\n\
         1. Product questions: look for suitable products in the Context below. \
            If you find matches, return their SKU codes, e.g. \
            {{\"sku\": [\"sku1\", \"sku2\"], \"message\": \"We found these products that match your search!\"}}. \
            If nothing matches, return \
            {{\"sku\": [], \"message\": \"We couldn't find any matching products. Please try rephrasing your query.\"}}.\n\
         2. FAQ questions (shipping, returns, etc.): answer helpfully and accurately with an empty sku list. \
            Ask for clarification politely if needed.\n\
         3. Use the chat history to resolve follow-up questions.\n\
         4. Always answer with exactly one JSON object of the form {{\"sku\": [], \"message\": \"\"}} \
            and nothing else.\n\n\
         Context: {context}\n\
         Chat history:\n{history}"
    )
}

/// Core trait for chat completion backends.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send a system prompt and a user message, returning the raw model text.
    async fn complete(&self, system: &str, user: &str) -> Result<String, AssistantError>;

    fn model_name(&self) -> &str;
}

/// Conversation orchestrator on top of a chat model.
pub struct SalesAssistant {
    model: Arc<dyn ChatModel>,
}

impl SalesAssistant {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        SalesAssistant { model }
    }

    /// Answer `question` using retrieved `items` and prior `history`.
    ///
    /// Never fails: any model or parse error yields [`AssistantReply::fallback`].
    pub async fn respond(
        &self,
        question: &str,
        items: &[CatalogItem],
        history: &ChatHistory,
    ) -> AssistantReply {
        let system = build_system_prompt(&context_json(items), &history.format_for_prompt());

        let result = match self.model.complete(&system, question).await {
            Ok(raw) => parse_reply(&raw),
            Err(e) => Err(e),
        };

        match result {
            Ok(reply) => {
                tracing::debug!(
                    model = self.model.model_name(),
                    skus = reply.sku.len(),
                    "Assistant replied"
                );
                reply
            }
            Err(e) => {
                tracing::warn!(
                    model = self.model.model_name(),
                    error = %e,
                    "Assistant failed, using fallback reply"
                );
                AssistantReply::fallback()
            }
        }
    }
}
