//! Console Manager for the interactive read/chat loop

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::command_router::{CommandRouter, ConsoleCommand};
use crate::app::{App, is_terminal_update, next_update};
use crate::session::{SessionHandle, SessionMode, SessionUpdate};
use crate::ui::cli as view;

/// Whether the loop should keep going after a command
#[derive(Debug, Clone, Copy, PartialEq)]
enum Flow {
    Continue,
    Quit,
}

/// Session being rendered by the console
struct ActiveSession {
    handle: SessionHandle,
    streamed: bool,
}

pub struct ConsoleManager {
    app: App,
    mode: SessionMode,
    active: Option<ActiveSession>,
    updates: Option<mpsc::UnboundedReceiver<SessionUpdate>>,
}

impl ConsoleManager {
    pub fn new(app: App) -> Self {
        Self {
            app,
            mode: SessionMode::InteractiveChat,
            active: None,
            updates: None,
        }
    }

    /// Run the console until /quit, end of input, or Ctrl-C while idle
    pub async fn run(&mut self) -> Result<()> {
        info!("Starting interactive console");
        if let Err(e) = view::display_welcome(self.mode) {
            error!("Failed to display welcome: {}", e);
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if self.handle_line(&line).await == Flow::Quit {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("Console input closed");
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read console input: {}", e);
                        break;
                    }
                },
                update = next_update(&mut self.updates) => match update {
                    Some(update) => self.on_update(update),
                    None => self.updates = None,
                },
                _ = tokio::signal::ctrl_c() => {
                    if !self.cancel() {
                        break;
                    }
                }
            }
        }

        self.cancel();
        self.settle();
        info!("Interactive console stopped");
        Ok(())
    }

    async fn handle_line(&mut self, line: &str) -> Flow {
        let command = match CommandRouter::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Flow::Continue,
            Err(e) => {
                let _ = view::display_error(&e.to_string());
                return Flow::Continue;
            }
        };

        debug!("Console command: {:?}", command);
        if let Err(e) = self.execute(command.clone()).await {
            let _ = view::display_error(&format!("{:#}", e));
        }

        if command == ConsoleCommand::Quit {
            Flow::Quit
        } else {
            Flow::Continue
        }
    }

    async fn execute(&mut self, command: ConsoleCommand) -> Result<()> {
        match command {
            ConsoleCommand::Submit { text } => self.submit(&text, self.mode)?,
            ConsoleCommand::Read { text } => self.submit(&text, SessionMode::QuietReading)?,
            ConsoleCommand::Chat { text } => self.submit(&text, SessionMode::InteractiveChat)?,
            ConsoleCommand::Mode { mode } => {
                if mode != self.mode {
                    // switching mode abandons whatever is in flight
                    self.cancel();
                    self.mode = mode;
                }
                view::display_info(&format!("Mode: {}", mode.label()))
                    .map_err(|e| anyhow::anyhow!(e))?;
            }
            ConsoleCommand::Snap { image } => {
                self.settle_previous();
                let handle = self.app.snap(&image).await?;
                self.track(handle);
            }
            ConsoleCommand::IndexUrl { url } => {
                let message = self.app.index_url(&url).await?;
                view::display_info(&message).map_err(|e| anyhow::anyhow!(e))?;
            }
            ConsoleCommand::IndexDoc { file } => {
                let message = self.app.index_document(&file).await?;
                view::display_info(&message).map_err(|e| anyhow::anyhow!(e))?;
            }
            ConsoleCommand::Cancel => {
                if !self.cancel() {
                    view::display_info("Nothing to cancel").map_err(|e| anyhow::anyhow!(e))?;
                }
            }
            ConsoleCommand::Status => {
                view::display_stats(self.mode, self.app.active_state(), &self.app.stats())
                    .map_err(|e| anyhow::anyhow!(e))?;
            }
            ConsoleCommand::Help => {
                for line in CommandRouter::help_messages() {
                    println!("{}", line);
                }
            }
            ConsoleCommand::Quit => {}
        }
        Ok(())
    }

    fn submit(&mut self, text: &str, mode: SessionMode) -> Result<()> {
        self.settle_previous();
        let handle = self.app.start_session(text, mode, None)?;
        self.track(handle);
        Ok(())
    }

    fn track(&mut self, handle: SessionHandle) {
        self.updates = handle.take_updates();
        self.active = Some(ActiveSession {
            handle,
            streamed: false,
        });
    }

    fn on_update(&mut self, update: SessionUpdate) {
        if let (Some(active), SessionUpdate::AnswerDelta(_)) = (self.active.as_mut(), &update) {
            active.streamed = true;
        }
        if let Err(e) = view::render_update(&update) {
            error!("Failed to render update: {}", e);
        }
        if is_terminal_update(&update) {
            self.settle();
        }
    }

    /// Cancel the tracked session; returns whether one was running
    fn cancel(&mut self) -> bool {
        let cancelled = self.app.cancel_active();
        if cancelled {
            self.settle();
        }
        cancelled
    }

    /// Before a new session replaces the tracked one
    fn settle_previous(&mut self) {
        self.cancel();
        self.settle();
    }

    /// Report a finished tracked session and clear it
    fn settle(&mut self) {
        match &self.active {
            Some(active) if active.handle.is_finished() => {}
            // nothing tracked, or still running
            _ => return,
        }
        let Some(active) = self.active.take() else {
            return;
        };
        self.updates = None;

        let snapshot = active.handle.snapshot();
        self.app.record_finished(&snapshot);
        if let Err(e) = view::display_outcome(&snapshot, active.streamed) {
            error!("Failed to display outcome: {}", e);
        }
    }
}
