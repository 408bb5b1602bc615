//! Application wiring
//!
//! Binds the session controller, the REST collaborators and the terminal
//! output together for one-shot commands and the interactive console.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Config;
use crate::metrics::{SessionMetrics, SessionStats};
use crate::remote::{Connector, RestClient, WebSocketConnector};
use crate::remote::types::ChatResponse;
use crate::session::{
    ControllerConfig, SessionController, SessionHandle, SessionMode, SessionSnapshot,
    SessionState, SessionUpdate,
};
use crate::ui;

pub struct App {
    config: Config,
    rest: RestClient,
    controller: SessionController,
    metrics: SessionMetrics,
}

impl App {
    /// Create the application with the WebSocket transport
    pub fn new(config: Config) -> Self {
        let connector = Arc::new(WebSocketConnector::new(Duration::from_secs(
            config.server.connect_timeout_secs,
        )));
        Self::with_connector(config, connector)
    }

    /// Create the application with a custom transport
    pub fn with_connector(config: Config, connector: Arc<dyn Connector>) -> Self {
        let rest = RestClient::new(
            config.server.http_url.clone(),
            Duration::from_secs(config.server.request_timeout_secs),
        );
        let controller = SessionController::new(ControllerConfig::from_config(&config), connector);

        Self {
            config,
            rest,
            controller,
            metrics: SessionMetrics::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    /// Start a session, cancelling any in-flight one.
    ///
    /// `timeout` overrides the mode's configured deadline when given.
    pub fn start_session(
        &mut self,
        request: &str,
        mode: SessionMode,
        timeout: Option<Duration>,
    ) -> Result<SessionHandle> {
        let handle = match timeout {
            Some(window) => self.controller.submit_with_timeout(request, mode, Some(window)),
            None => self.controller.submit(request, mode),
        }?;

        self.metrics.record_started();
        Ok(handle)
    }

    /// Cancel the active session; returns whether one was running
    pub fn cancel_active(&mut self) -> bool {
        self.controller.cancel()
    }

    pub fn active_state(&self) -> Option<SessionState> {
        self.controller.active().map(|handle| handle.state())
    }

    pub fn record_finished(&mut self, snapshot: &SessionSnapshot) {
        self.metrics.record_finished(snapshot);
    }

    pub fn stats(&self) -> SessionStats {
        self.metrics.stats()
    }

    /// Follow a session to its end, rendering updates as they arrive.
    ///
    /// Ctrl-C cancels the session instead of killing the process.
    pub async fn follow(&mut self, handle: &SessionHandle, render: bool) -> SessionSnapshot {
        if let Some(mut updates) = handle.take_updates() {
            loop {
                tokio::select! {
                    update = updates.recv() => match update {
                        Some(update) => {
                            if render {
                                if let Err(e) = ui::cli::render_update(&update) {
                                    warn!("Failed to render update: {}", e);
                                }
                            }
                            if is_terminal_update(&update) {
                                break;
                            }
                        }
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => {
                        info!("Interrupted, cancelling session {}", handle.id());
                        handle.cancel();
                    }
                }
            }
        }

        let snapshot = handle.finished().await;
        self.record_finished(&snapshot);
        snapshot
    }

    /// Upload an image, then quietly read it by URL
    pub async fn snap(&mut self, image: &Path) -> Result<SessionHandle> {
        let file_url = self
            .rest
            .upload_image(image)
            .await
            .with_context(|| format!("Failed to upload {}", image.display()))?;

        info!("Reading uploaded image at {}", file_url);
        self.start_session(&file_url, SessionMode::QuietReading, None)
    }

    pub async fn index_url(&self, url: &str) -> Result<String> {
        self.rest
            .index_url(url)
            .await
            .with_context(|| format!("Failed to index {}", url))
    }

    pub async fn index_document(&self, path: &Path) -> Result<String> {
        self.rest
            .index_document(path)
            .await
            .with_context(|| format!("Failed to index {}", path.display()))
    }

    pub async fn ask(&self, question: &str) -> Result<ChatResponse> {
        self.rest
            .ask(question)
            .await
            .context("Failed to get an answer")
    }
}

/// Whether an update marks the end of its session
pub fn is_terminal_update(update: &SessionUpdate) -> bool {
    matches!(update, SessionUpdate::StateChanged(state) if state.is_terminal())
}

/// Receive the next update of an optional stream; pends forever when absent
pub async fn next_update(
    updates: &mut Option<mpsc::UnboundedReceiver<SessionUpdate>>,
) -> Option<SessionUpdate> {
    match updates {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_update_detection() {
        assert!(is_terminal_update(&SessionUpdate::StateChanged(
            SessionState::TimedOut
        )));
        assert!(!is_terminal_update(&SessionUpdate::StateChanged(
            SessionState::Streaming
        )));
        assert!(!is_terminal_update(&SessionUpdate::AnswerDelta(
            "x".to_string()
        )));
    }
}
