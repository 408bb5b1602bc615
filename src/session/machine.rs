//! Session state machine
//!
//! Every input (channel open, message, close, error, deadline, cancel) goes
//! through [`SessionMachine`], which owns the only terminal-state guard: once a
//! session is `Completed`, `Cancelled`, `Failed` or `TimedOut`, no input
//! mutates it again. Each input may ask the channel owner to act.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::types::{
    Accumulator, SessionError, SessionId, SessionMode, SessionSnapshot, SessionState,
    SessionUpdate,
};
use crate::remote::types::{Envelope, EventKind};

/// Channel action requested by a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Send(String),
    Close,
}

pub struct SessionMachine {
    snapshot: SessionSnapshot,
    timeout: Option<Duration>,
    request_sent: bool,
    pending: Vec<SessionUpdate>,
}

impl SessionMachine {
    pub fn new(
        id: SessionId,
        mode: SessionMode,
        request: String,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            snapshot: SessionSnapshot {
                id,
                mode,
                state: SessionState::Idle,
                request,
                accumulator: Accumulator::for_mode(mode),
                events_received: 0,
                error: None,
                started_at: Utc::now(),
                first_event_at: None,
                finished_at: None,
            },
            timeout,
            request_sent: false,
            pending: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.snapshot.state
    }

    pub fn snapshot(&self) -> &SessionSnapshot {
        &self.snapshot
    }

    /// Updates produced since the last drain, in order
    pub fn drain_updates(&mut self) -> Vec<SessionUpdate> {
        std::mem::take(&mut self.pending)
    }

    /// Idle -> Connecting
    pub fn start(&mut self) {
        if self.snapshot.state == SessionState::Idle {
            self.set_state(SessionState::Connecting);
        }
    }

    /// Channel is ready: send the request, exactly once
    pub fn on_open(&mut self) -> Option<Action> {
        match self.snapshot.state {
            SessionState::Connecting if !self.request_sent => {
                self.request_sent = true;
                self.set_state(SessionState::Awaiting);
                Some(Action::Send(self.snapshot.request.clone()))
            }
            state if state.is_terminal() => {
                // channel opened after we gave up on it
                Some(Action::Close)
            }
            state => {
                warn!("Session {} ignoring duplicate open in {}", self.snapshot.id, state);
                None
            }
        }
    }

    pub fn on_message(&mut self, text: &str) -> Option<Action> {
        if self.snapshot.state.is_terminal() {
            debug!(
                "Session {} dropping message received after {}",
                self.snapshot.id, self.snapshot.state
            );
            return None;
        }

        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => return self.fail(SessionError::MalformedEvent(e.to_string())),
        };

        self.snapshot.events_received += 1;
        if self.snapshot.first_event_at.is_none() {
            self.snapshot.first_event_at = Some(Utc::now());
        }
        if matches!(
            self.snapshot.state,
            SessionState::Connecting | SessionState::Awaiting
        ) {
            self.set_state(SessionState::Streaming);
        }

        if envelope.kind() == Some(EventKind::Error) {
            let message = envelope
                .content
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| envelope.content.to_string());
            return self.fail(SessionError::Remote(message));
        }

        if envelope.kind().is_none() {
            debug!(
                "Session {} ignoring unrecognized event {}",
                self.snapshot.id, envelope.event_type
            );
        }

        // only chats honour the explicit terminator
        let terminator =
            self.snapshot.mode == SessionMode::InteractiveChat && envelope.is_final();

        match self.snapshot.accumulator.apply(envelope) {
            Ok(Some(update)) => self.pending.push(update),
            Ok(None) => {}
            Err(e) => return self.fail(e),
        }

        if terminator {
            info!("Session {} received terminator", self.snapshot.id);
            self.finish(SessionState::Completed, None);
            return Some(Action::Close);
        }

        None
    }

    /// Channel closed by either side
    pub fn on_close(&mut self) -> Option<Action> {
        match self.snapshot.state {
            state if state.is_terminal() => None,
            SessionState::Idle | SessionState::Connecting => {
                self.fail(SessionError::Connection(
                    "Channel closed before it opened".to_string(),
                ));
                None
            }
            _ => {
                self.finish(SessionState::Completed, None);
                None
            }
        }
    }

    pub fn on_error(&mut self, message: &str) -> Option<Action> {
        if self.snapshot.state.is_terminal() {
            return None;
        }
        self.fail(SessionError::Connection(message.to_string()))
    }

    /// Deadline elapsed without a terminal signal
    pub fn on_deadline(&mut self) -> Option<Action> {
        if self.snapshot.state.is_terminal() {
            return None;
        }
        let window = self.timeout.unwrap_or_default();
        warn!("Session {} timed out after {:?}", self.snapshot.id, window);
        self.finish(SessionState::TimedOut, Some(SessionError::Timeout(window)));
        Some(Action::Close)
    }

    /// Returns `None` when already terminal, making cancel idempotent
    pub fn cancel(&mut self) -> Option<Action> {
        if self.snapshot.state.is_terminal() {
            return None;
        }
        info!("Session {} cancelled", self.snapshot.id);
        self.finish(SessionState::Cancelled, Some(SessionError::UserCancelled));
        Some(Action::Close)
    }

    fn fail(&mut self, error: SessionError) -> Option<Action> {
        warn!("Session {} failed: {}", self.snapshot.id, error);
        self.finish(SessionState::Failed, Some(error));
        Some(Action::Close)
    }

    fn finish(&mut self, state: SessionState, error: Option<SessionError>) {
        self.snapshot.error = error;
        self.snapshot.finished_at = Some(Utc::now());
        self.set_state(state);
    }

    fn set_state(&mut self, state: SessionState) {
        debug!(
            "Session {} {} -> {}",
            self.snapshot.id, self.snapshot.state, state
        );
        self.snapshot.state = state;
        self.pending.push(SessionUpdate::StateChanged(state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(mode: SessionMode) -> SessionMachine {
        let mut machine = SessionMachine::new(
            SessionId::new(),
            mode,
            "what is RAG".to_string(),
            Some(Duration::from_secs(15)),
        );
        machine.start();
        machine
    }

    fn chunk(text: &str) -> String {
        serde_json::json!({ "event_type": "on_chat_model_stream", "content": text }).to_string()
    }

    #[test]
    fn test_request_sent_once() {
        let mut m = machine(SessionMode::InteractiveChat);
        assert_eq!(m.state(), SessionState::Connecting);
        assert_eq!(m.on_open(), Some(Action::Send("what is RAG".to_string())));
        assert_eq!(m.state(), SessionState::Awaiting);
        assert_eq!(m.on_open(), None);
    }

    #[test]
    fn test_first_event_moves_to_streaming() {
        let mut m = machine(SessionMode::InteractiveChat);
        m.on_open();
        assert_eq!(m.on_message(&chunk("Hel")), None);
        assert_eq!(m.state(), SessionState::Streaming);
        assert!(m.snapshot().first_event_at.is_some());
        m.on_message(&chunk("lo"));
        m.on_close();
        assert_eq!(m.state(), SessionState::Completed);
        assert_eq!(m.snapshot().accumulator.answer(), Some("Hello"));
        assert_eq!(m.snapshot().events_received, 2);
    }

    #[test]
    fn test_terminal_state_is_monotonic() {
        let mut m = machine(SessionMode::InteractiveChat);
        m.on_open();
        m.on_message(&chunk("kept"));
        assert_eq!(m.cancel(), Some(Action::Close));

        assert_eq!(m.on_message(&chunk(" dropped")), None);
        assert_eq!(m.on_close(), None);
        assert_eq!(m.on_error("late"), None);
        assert_eq!(m.on_deadline(), None);
        assert_eq!(m.cancel(), None);

        assert_eq!(m.state(), SessionState::Cancelled);
        assert_eq!(m.snapshot().accumulator.answer(), Some("kept"));
        assert_eq!(m.snapshot().error, Some(SessionError::UserCancelled));
    }

    #[test]
    fn test_chat_terminator_closes_channel() {
        let mut m = machine(SessionMode::InteractiveChat);
        m.on_open();
        let action = m.on_message(
            &serde_json::json!({
                "event_type": "on_chat_model_stream",
                "content": "done.",
                "final": true
            })
            .to_string(),
        );
        assert_eq!(action, Some(Action::Close));
        assert_eq!(m.state(), SessionState::Completed);
        assert_eq!(m.snapshot().accumulator.answer(), Some("done."));
    }

    #[test]
    fn test_reading_ignores_terminator() {
        let mut m = machine(SessionMode::QuietReading);
        m.on_open();
        let action = m.on_message(
            &serde_json::json!({
                "event_type": "on_image_process",
                "content": "a",
                "final": true
            })
            .to_string(),
        );
        assert_eq!(action, None);
        assert_eq!(m.state(), SessionState::Streaming);
        m.on_close();
        assert_eq!(m.state(), SessionState::Completed);
    }

    #[test]
    fn test_malformed_envelope_fails() {
        let mut m = machine(SessionMode::QuietReading);
        m.on_open();
        assert_eq!(m.on_message("{not json"), Some(Action::Close));
        assert_eq!(m.state(), SessionState::Failed);
        assert!(matches!(
            m.snapshot().error,
            Some(SessionError::MalformedEvent(_))
        ));
    }

    #[test]
    fn test_remote_error_event_fails() {
        let mut m = machine(SessionMode::QuietReading);
        m.on_open();
        let action = m.on_message(
            &serde_json::json!({ "event_type": "error", "content": "Failed to fetch image" })
                .to_string(),
        );
        assert_eq!(action, Some(Action::Close));
        assert_eq!(
            m.snapshot().error,
            Some(SessionError::Remote("Failed to fetch image".to_string()))
        );
    }

    #[test]
    fn test_close_before_open_is_connection_error() {
        let mut m = machine(SessionMode::InteractiveChat);
        m.on_close();
        assert_eq!(m.state(), SessionState::Failed);
        assert!(matches!(m.snapshot().error, Some(SessionError::Connection(_))));
    }

    #[test]
    fn test_deadline_times_out() {
        let mut m = machine(SessionMode::QuietReading);
        m.on_open();
        assert_eq!(m.on_deadline(), Some(Action::Close));
        assert_eq!(m.state(), SessionState::TimedOut);
        assert_eq!(
            m.snapshot().error,
            Some(SessionError::Timeout(Duration::from_secs(15)))
        );
    }

    #[test]
    fn test_late_open_after_cancel_closes() {
        let mut m = machine(SessionMode::InteractiveChat);
        m.cancel();
        assert_eq!(m.on_open(), Some(Action::Close));
        assert_eq!(m.state(), SessionState::Cancelled);
    }

    #[test]
    fn test_updates_in_order() {
        let mut m = machine(SessionMode::InteractiveChat);
        m.on_open();
        m.on_message(&chunk("a"));
        m.on_close();

        assert_eq!(
            m.drain_updates(),
            vec![
                SessionUpdate::StateChanged(SessionState::Connecting),
                SessionUpdate::StateChanged(SessionState::Awaiting),
                SessionUpdate::StateChanged(SessionState::Streaming),
                SessionUpdate::AnswerDelta("a".to_string()),
                SessionUpdate::StateChanged(SessionState::Completed),
            ]
        );
        assert!(m.drain_updates().is_empty());
    }
}
