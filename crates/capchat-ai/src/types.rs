//! Core types for chat-completions requests

use serde::{Deserialize, Serialize};

/// Default endpoint for the chat-completions API
pub const DEFAULT_BASE_URL: &str = "https://api.siliconflow.cn/v1";

/// Default model identifier
pub const DEFAULT_MODEL: &str = "deepseek-ai/DeepSeek-V3";

/// Default sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Default maximum output length in tokens
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

/// Message roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Get the role as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single `{role, content}` entry of the outgoing message list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl WireMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Fixed generation parameters sent with every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Model identifier (e.g., "deepseek-ai/DeepSeek-V3")
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum output tokens
    pub max_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Outgoing streaming chat request body
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

impl ChatRequest {
    /// Build a streaming request from settings and an ordered message list
    pub fn streaming(settings: &GenerationSettings, messages: Vec<WireMessage>) -> Self {
        Self {
            model: settings.model.clone(),
            messages,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            stream: true,
        }
    }
}

// Streaming response types

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StreamChoice {
    #[serde(default)]
    pub delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StreamDelta {
    #[serde(default)]
    pub content: Option<String>,
}

impl StreamChunk {
    /// Incremental text of the first choice, if any
    pub fn into_delta_text(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|text| !text.is_empty())
    }
}

/// Model info returned from the `/models` endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub owned_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModelList {
    pub data: Vec<ModelInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let settings = GenerationSettings::default();
        let request = ChatRequest::streaming(
            &settings,
            vec![WireMessage::system("be brief"), WireMessage::user("ping")],
        );
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["model"], "deepseek-ai/DeepSeek-V3");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 2000);
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "ping");
    }

    #[test]
    fn test_role_only_delta_has_no_text() {
        let chunk: StreamChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap();
        assert_eq!(chunk.into_delta_text(), None);
    }

    #[test]
    fn test_empty_content_is_skipped() {
        let chunk: StreamChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":""}}]}"#).unwrap();
        assert_eq!(chunk.into_delta_text(), None);
    }

    #[test]
    fn test_missing_choices_is_not_an_error() {
        let chunk: StreamChunk = serde_json::from_str(r#"{"id":"x","object":"chunk"}"#).unwrap();
        assert_eq!(chunk.into_delta_text(), None);
    }
}
