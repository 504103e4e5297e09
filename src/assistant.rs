//! The upstream assistant collaborator.
//!
//! The assistant is opaque: requests and replies pass through unchanged.
//! A network failure hands back the exact request that was attempted so
//! the caller can queue it for replay.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use editvault_core::{AssistantReply, ChatRequest, OperatingMode, RequestDescriptor};
use editvault_queue::{Transport, TransportError, TransportResponse};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Assistant unreachable: {reason}")]
    Network {
        request: Box<RequestDescriptor>,
        reason: String,
    },

    #[error("Assistant returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Could not decode assistant reply: {0}")]
    Decode(String),
}

#[async_trait]
pub trait Assistant: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<AssistantReply, AssistantError>;

    fn mode(&self) -> OperatingMode;
}

/// Sends [`RequestDescriptor`]s with reqwest. Used both for live chat and
/// for replaying queued requests.
///
/// The bearer token is attached at send time and never stored in a
/// descriptor, so queued requests on disk carry no credentials.
pub struct HttpTransport {
    client: Client,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(timeout: Duration, api_key: Option<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, api_key })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<TransportResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| TransportError::Network(format!("invalid method {}", request.method)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(TransportError::Status { status, body });
        }
        Ok(TransportResponse { status, body })
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(flatten)]
    request: &'a ChatRequest,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireReply {
    Direct {
        content: String,
        #[serde(default)]
        tokens: Option<u64>,
    },
    Choices {
        choices: Vec<WireChoice>,
        #[serde(default)]
        usage: Option<WireUsage>,
    },
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    content: String,
}

#[derive(Deserialize)]
struct WireUsage {
    total_tokens: u64,
}

/// JSON-over-HTTP assistant.
pub struct HttpAssistant {
    endpoint: String,
    model: Option<String>,
    transport: HttpTransport,
}

impl HttpAssistant {
    pub fn new(endpoint: impl Into<String>, model: Option<String>, transport: HttpTransport) -> Self {
        Self {
            endpoint: endpoint.into(),
            model,
            transport,
        }
    }

    /// The descriptor that will be sent for `request`.
    pub fn describe(&self, request: &ChatRequest) -> Result<RequestDescriptor, AssistantError> {
        let body = serde_json::to_value(WireRequest {
            model: self.model.as_deref(),
            request,
        })
        .map_err(|e| AssistantError::Decode(e.to_string()))?;
        Ok(RequestDescriptor::post_json(self.endpoint.clone(), &body)
            .with_header("accept", "application/json"))
    }
}

fn decode_reply(body: &str) -> Result<AssistantReply, AssistantError> {
    let reply: WireReply =
        serde_json::from_str(body).map_err(|e| AssistantError::Decode(e.to_string()))?;
    match reply {
        WireReply::Direct { content, tokens } => Ok(AssistantReply {
            content,
            tokens,
            mode: OperatingMode::Production,
        }),
        WireReply::Choices { choices, usage } => {
            let choice = choices
                .into_iter()
                .next()
                .ok_or_else(|| AssistantError::Decode("No choices in response".to_string()))?;
            Ok(AssistantReply {
                content: choice.message.content,
                tokens: usage.map(|u| u.total_tokens),
                mode: OperatingMode::Production,
            })
        }
    }
}

#[async_trait]
impl Assistant for HttpAssistant {
    async fn send(&self, request: &ChatRequest) -> Result<AssistantReply, AssistantError> {
        let descriptor = self.describe(request)?;
        match self.transport.send(&descriptor).await {
            Ok(response) => decode_reply(&response.body),
            Err(TransportError::Network(reason)) => Err(AssistantError::Network {
                request: Box::new(descriptor),
                reason,
            }),
            Err(TransportError::Status { status, body }) => {
                Err(AssistantError::Upstream { status, body })
            }
        }
    }

    fn mode(&self) -> OperatingMode {
        OperatingMode::Production
    }
}

/// Canned assistant for offline use and tests.
///
/// Replies echo the last user message. When switched offline every send
/// fails with a network error, as a real assistant would without
/// connectivity.
pub struct MockAssistant {
    mode: OperatingMode,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl MockAssistant {
    pub const ENDPOINT: &'static str = "mock://assistant/chat";

    pub fn new() -> Self {
        Self::with_mode(OperatingMode::Mock)
    }

    /// Stand-in used when no endpoint is configured.
    pub fn fallback() -> Self {
        Self::with_mode(OperatingMode::Fallback)
    }

    fn with_mode(mode: OperatingMode) -> Self {
        Self {
            mode,
            offline: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of sends attempted, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockAssistant {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Assistant for MockAssistant {
    async fn send(&self, request: &ChatRequest) -> Result<AssistantReply, AssistantError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.offline.load(Ordering::SeqCst) {
            let body = serde_json::to_value(request)
                .map_err(|e| AssistantError::Decode(e.to_string()))?;
            return Err(AssistantError::Network {
                request: Box::new(RequestDescriptor::post_json(Self::ENDPOINT, &body)),
                reason: "mock assistant is offline".to_string(),
            });
        }

        let question = request.last_user_text().unwrap_or_default().trim();
        let content = format!(
            "[{}] You asked: {}\n```text\n{}\n```",
            self.mode, question, question
        );
        Ok(AssistantReply {
            tokens: Some(question.split_whitespace().count() as u64),
            content,
            mode: self.mode,
        })
    }

    fn mode(&self) -> OperatingMode {
        self.mode
    }
}
