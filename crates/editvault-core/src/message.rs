//! Chat request and reply types exchanged with the upstream assistant.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// Optional generation parameters passed through to the assistant untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// A request to the upstream assistant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Free-form editor context (open file, selection, diagnostics).
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub params: GenerationParams,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>, context: impl Into<String>) -> Self {
        Self {
            messages,
            context: context.into(),
            params: GenerationParams::default(),
        }
    }

    /// Text of the most recent user message, used for intent classification.
    pub fn last_user_text(&self) -> Option<&str> {
        last_user_text(&self.messages)
    }
}

/// Text of the most recent user message in `messages`.
pub fn last_user_text(messages: &[ChatMessage]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
}

/// Which path produced an assistant reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    Production,
    Mock,
    Fallback,
}

impl std::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OperatingMode::Production => "production",
            OperatingMode::Mock => "mock",
            OperatingMode::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantReply {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
    pub mode: OperatingMode,
}

const CODE_FENCE: &str = r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)```";

fn code_fence() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| match Regex::new(CODE_FENCE) {
            Ok(regex) => Some(regex),
            Err(e) => {
                log::warn!("Invalid code fence pattern, code extraction disabled: {}", e);
                None
            }
        })
        .as_ref()
}

/// Extract the body of the first fenced code block in `text`.
pub fn extract_code_block(text: &str) -> Option<String> {
    code_fence()?
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end().to_string())
        .filter(|code| !code.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_fence_compiles() {
        assert!(code_fence().is_some());
    }

    #[test]
    fn test_extract_code_block_with_language() {
        let text = "Try this:\n```rust\nfn main() {}\n```\nDone.";
        assert_eq!(extract_code_block(text), Some("fn main() {}".to_string()));
    }

    #[test]
    fn test_extract_code_block_takes_first() {
        let text = "```\nfirst\n```\n```\nsecond\n```";
        assert_eq!(extract_code_block(text), Some("first".to_string()));
    }

    #[test]
    fn test_extract_code_block_none() {
        assert_eq!(extract_code_block("no code here"), None);
        assert_eq!(extract_code_block("```\n```"), None);
    }

    #[test]
    fn test_last_user_text() {
        let request = ChatRequest::new(
            vec![
                ChatMessage::system("be terse"),
                ChatMessage::user("first question"),
                ChatMessage::assistant("answer"),
                ChatMessage::user("second question"),
            ],
            "",
        );
        assert_eq!(request.last_user_text(), Some("second question"));
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&ChatMessage::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }
}
