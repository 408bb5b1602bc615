//! Wire types exchanged with the ReadBuddy backend

use serde::{Deserialize, Serialize};

/// Inbound event envelope on the streaming channel
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Envelope {
    pub event_type: String,
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default, rename = "final", skip_serializing_if = "Option::is_none")]
    pub terminator: Option<bool>,
}

/// Event types the client knows how to route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    ImageProcess,
    RetrieverEnd,
    ChatModelStream,
    Error,
}

impl Envelope {
    /// Parse a raw text frame into an envelope
    pub fn parse(text: &str) -> Result<Self, RemoteError> {
        serde_json::from_str(text)
            .map_err(|e| RemoteError::ParseError(format!("Failed to parse envelope: {}", e)))
    }

    /// Classify the envelope by its event type
    pub fn kind(&self) -> Option<EventKind> {
        match self.event_type.as_str() {
            "on_image_process" => Some(EventKind::ImageProcess),
            "on_retriever_end" => Some(EventKind::RetrieverEnd),
            "on_chat_model_stream" => Some(EventKind::ChatModelStream),
            "error" => Some(EventKind::Error),
            _ => None,
        }
    }

    /// Whether the peer marked this as the last event
    pub fn is_final(&self) -> bool {
        self.terminator.unwrap_or(false)
    }
}

/// Retrieved document as sent by the backend
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RawDocument {
    pub page_content: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DocumentMetadata {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub page: Option<u32>,
}

/// Content of an `on_image_process` event.
///
/// The backend sends the model output as a bare string; richer deployments
/// send an object that also carries the processed image URL.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ImageContent {
    Text(String),
    Structured {
        text: String,
        #[serde(default)]
        image_url: Option<String>,
    },
}

/// Events surfaced by a duplex channel, in delivery order
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Opened,
    Message(String),
    Closed,
    Error(String),
}

/// Commands issued to a duplex channel by its owner
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelCommand {
    Send(String),
    Close,
}

/// Request body shared by the JSON endpoints
#[derive(Debug, Serialize)]
pub struct MessageRequest<'a> {
    pub message: &'a str,
}

/// Reply of the indexing endpoints
#[derive(Debug, Deserialize)]
pub struct IndexResponse {
    #[serde(default)]
    pub response: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Reply of the image upload endpoint
#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Reply of the non-streaming chat endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatResponse {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub documents: Vec<RawDocument>,
}

/// Error types for channel operations
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Channel connection error: {0}")]
    ConnectionError(String),
    #[error("Channel closed")]
    ChannelClosed,
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Error types for REST API operations
#[derive(Debug, thiserror::Error)]
pub enum RestApiError {
    #[error("HTTP request error: {0}")]
    HttpRequestError(String),
    #[error("HTTP status error: {0} - {1}")]
    HttpStatusError(u16, String),
    #[error("Server rejected request: {0}")]
    ServerError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
