//! Session data model

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::remote::types::{Envelope, EventKind, ImageContent, RawDocument};

/// Opaque identifier, unique per session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Interaction mode, fixed for a session's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionMode {
    /// Single-shot read of a text or image URL
    QuietReading,
    /// Streamed answer with reference documents
    InteractiveChat,
}

impl SessionMode {
    pub fn label(&self) -> &'static str {
        match self {
            SessionMode::QuietReading => "read",
            SessionMode::InteractiveChat => "chat",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    Idle,
    Connecting,
    /// Channel open, request sent, nothing received yet
    Awaiting,
    /// At least one event received
    Streaming,
    Completed,
    Cancelled,
    Failed,
    TimedOut,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed
                | SessionState::Cancelled
                | SessionState::Failed
                | SessionState::TimedOut
        )
    }

    /// Whether the session occupies the controller's active slot
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting | SessionState::Awaiting | SessionState::Streaming
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Reference document attached to a chat answer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub content: String,
    pub source: String,
    pub page: Option<u32>,
}

impl From<RawDocument> for Document {
    fn from(raw: RawDocument) -> Self {
        Self {
            content: raw.page_content,
            source: raw.metadata.source,
            page: raw.metadata.page,
        }
    }
}

/// Result of a quiet reading
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReadingPayload {
    pub text: String,
    pub image_url: Option<String>,
}

impl From<ImageContent> for ReadingPayload {
    fn from(content: ImageContent) -> Self {
        match content {
            ImageContent::Text(text) => Self {
                text,
                image_url: None,
            },
            ImageContent::Structured { text, image_url } => Self { text, image_url },
        }
    }
}

/// Incremental change published to handle subscribers, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    StateChanged(SessionState),
    PayloadReplaced(ReadingPayload),
    AnswerDelta(String),
    DocumentsReplaced(Vec<Document>),
}

/// Last-write-wins accumulation for quiet readings
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReadingAccumulator {
    pub payload: Option<ReadingPayload>,
}

impl ReadingAccumulator {
    fn apply(&mut self, envelope: Envelope) -> Result<Option<SessionUpdate>, SessionError> {
        match envelope.kind() {
            Some(EventKind::ImageProcess) => {
                let content: ImageContent =
                    serde_json::from_value(envelope.content).map_err(|e| {
                        SessionError::MalformedEvent(format!("on_image_process content: {}", e))
                    })?;
                let payload = ReadingPayload::from(content);
                self.payload = Some(payload.clone());
                Ok(Some(SessionUpdate::PayloadReplaced(payload)))
            }
            _ => Ok(None),
        }
    }
}

/// Appending answer plus wholesale-replaced documents for chats
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatAccumulator {
    pub answer: String,
    pub documents: Vec<Document>,
}

impl ChatAccumulator {
    fn apply(&mut self, envelope: Envelope) -> Result<Option<SessionUpdate>, SessionError> {
        match envelope.kind() {
            Some(EventKind::RetrieverEnd) => {
                let raw: Vec<RawDocument> =
                    serde_json::from_value(envelope.content).map_err(|e| {
                        SessionError::MalformedEvent(format!("on_retriever_end content: {}", e))
                    })?;
                self.documents = raw.into_iter().map(Document::from).collect();
                Ok(Some(SessionUpdate::DocumentsReplaced(self.documents.clone())))
            }
            Some(EventKind::ChatModelStream) => match envelope.content {
                serde_json::Value::String(fragment) => {
                    self.answer.push_str(&fragment);
                    Ok(Some(SessionUpdate::AnswerDelta(fragment)))
                }
                serde_json::Value::Null => Ok(None),
                other => Err(SessionError::MalformedEvent(format!(
                    "on_chat_model_stream content must be text, got {}",
                    other
                ))),
            },
            _ => Ok(None),
        }
    }
}

/// Mode-specific result of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Accumulator {
    QuietReading(ReadingAccumulator),
    InteractiveChat(ChatAccumulator),
}

impl Accumulator {
    pub fn for_mode(mode: SessionMode) -> Self {
        match mode {
            SessionMode::QuietReading => Accumulator::QuietReading(ReadingAccumulator::default()),
            SessionMode::InteractiveChat => {
                Accumulator::InteractiveChat(ChatAccumulator::default())
            }
        }
    }

    /// Route an envelope to the variant's accumulation rule.
    ///
    /// Unrecognized event types leave the accumulator untouched.
    pub fn apply(&mut self, envelope: Envelope) -> Result<Option<SessionUpdate>, SessionError> {
        match self {
            Accumulator::QuietReading(reading) => reading.apply(envelope),
            Accumulator::InteractiveChat(chat) => chat.apply(envelope),
        }
    }

    pub fn payload(&self) -> Option<&ReadingPayload> {
        match self {
            Accumulator::QuietReading(reading) => reading.payload.as_ref(),
            Accumulator::InteractiveChat(_) => None,
        }
    }

    pub fn answer(&self) -> Option<&str> {
        match self {
            Accumulator::InteractiveChat(chat) => Some(&chat.answer),
            Accumulator::QuietReading(_) => None,
        }
    }

    pub fn documents(&self) -> &[Document] {
        match self {
            Accumulator::InteractiveChat(chat) => &chat.documents,
            Accumulator::QuietReading(_) => &[],
        }
    }
}

/// Read-only view of a session at one point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub mode: SessionMode,
    pub state: SessionState,
    pub request: String,
    pub accumulator: Accumulator,
    pub events_received: u64,
    #[serde(skip)]
    pub error: Option<SessionError>,
    pub started_at: DateTime<Utc>,
    pub first_event_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Error types for session operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Malformed event: {0}")]
    MalformedEvent(String),
    #[error("Remote service error: {0}")]
    Remote(String),
    #[error("No terminal signal within {0:?}")]
    Timeout(Duration),
    #[error("Cancelled by user")]
    UserCancelled,
    #[error("Request must not be empty")]
    EmptyRequest,
}
