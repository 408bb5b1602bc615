//! Session controller: one active streaming session at a time

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{Notify, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::machine::{Action, SessionMachine};
use super::types::{
    SessionError, SessionId, SessionMode, SessionSnapshot, SessionState, SessionUpdate,
};
use crate::config::Config;
use crate::remote::channel::{ChannelLink, Connector};
use crate::remote::types::ChannelEvent;

/// Endpoint and deadline settings for the controller
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub read_url: String,
    pub chat_url: String,
    pub reading_timeout: Option<Duration>,
    pub chat_timeout: Option<Duration>,
}

impl ControllerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            read_url: config.endpoint_url(SessionMode::QuietReading),
            chat_url: config.endpoint_url(SessionMode::InteractiveChat),
            reading_timeout: Some(Duration::from_secs(config.session.reading_timeout_secs)),
            chat_timeout: config.session.chat_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn endpoint(&self, mode: SessionMode) -> &str {
        match mode {
            SessionMode::QuietReading => &self.read_url,
            SessionMode::InteractiveChat => &self.chat_url,
        }
    }

    pub fn timeout(&self, mode: SessionMode) -> Option<Duration> {
        match mode {
            SessionMode::QuietReading => self.reading_timeout,
            SessionMode::InteractiveChat => self.chat_timeout,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// State shared between a handle and its driver task
struct SessionShared {
    machine: Mutex<SessionMachine>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    update_tx: mpsc::UnboundedSender<SessionUpdate>,
    update_rx: Mutex<Option<mpsc::UnboundedReceiver<SessionUpdate>>>,
    cancelled: Notify,
}

impl SessionShared {
    fn new(machine: SessionMachine) -> Self {
        let (snapshot_tx, _) = watch::channel(machine.snapshot().clone());
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        Self {
            machine: Mutex::new(machine),
            snapshot_tx,
            update_tx,
            update_rx: Mutex::new(Some(update_rx)),
            cancelled: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionMachine> {
        self.machine
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run one input through the machine and publish what changed
    fn apply<F>(&self, input: F) -> Option<Action>
    where
        F: FnOnce(&mut SessionMachine) -> Option<Action>,
    {
        let mut machine = self.lock();
        let action = input(&mut machine);

        for update in machine.drain_updates() {
            // subscribers may have stopped listening
            let _ = self.update_tx.send(update);
        }
        let snapshot = machine.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if current == snapshot {
                false
            } else {
                *current = snapshot.clone();
                true
            }
        });

        action
    }

    fn state(&self) -> SessionState {
        self.lock().state()
    }
}

/// Caller's view of one session.
///
/// Cheap to clone; all clones observe the same session.
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    mode: SessionMode,
    shared: Arc<SessionShared>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Current snapshot of state and accumulated result
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.lock().snapshot().clone()
    }

    /// Watch receiver that changes on every published transition
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// Ordered stream of incremental updates. Only the first caller gets it.
    pub fn take_updates(&self) -> Option<mpsc::UnboundedReceiver<SessionUpdate>> {
        self.shared
            .update_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    /// Cancel the session. Returns `false` if it had already ended.
    ///
    /// The state flips immediately; closing the channel is left to the driver.
    pub fn cancel(&self) -> bool {
        match self.shared.apply(|machine| machine.cancel()) {
            Some(_) => {
                self.shared.cancelled.notify_one();
                true
            }
            None => false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Wait until the session reaches a terminal state
    pub async fn finished(&self) -> SessionSnapshot {
        let mut rx = self.subscribe();
        match rx.wait_for(|snapshot| snapshot.state.is_terminal()).await {
            Ok(snapshot) => snapshot.clone(),
            // sender lives in `shared`, which we hold
            Err(_) => self.snapshot(),
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("state", &self.state())
            .finish()
    }
}

/// Owns the single active-session slot
pub struct SessionController {
    config: ControllerConfig,
    connector: Arc<dyn Connector>,
    active: Option<SessionHandle>,
}

impl SessionController {
    pub fn new(config: ControllerConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            active: None,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Start a session with the mode's default deadline.
    ///
    /// Any session still in flight is cancelled first. Must be called from
    /// within a tokio runtime.
    pub fn submit(
        &mut self,
        request: impl Into<String>,
        mode: SessionMode,
    ) -> Result<SessionHandle, SessionError> {
        let timeout = self.config.timeout(mode);
        self.submit_with_timeout(request, mode, timeout)
    }

    /// Start a session with an explicit deadline window (`None` = unbounded)
    pub fn submit_with_timeout(
        &mut self,
        request: impl Into<String>,
        mode: SessionMode,
        timeout: Option<Duration>,
    ) -> Result<SessionHandle, SessionError> {
        let request = request.into();
        if request.trim().is_empty() {
            return Err(SessionError::EmptyRequest);
        }

        self.cancel();

        let id = SessionId::new();
        let shared = Arc::new(SessionShared::new(SessionMachine::new(
            id,
            mode,
            request,
            timeout,
        )));
        // armed before the channel opens so it covers connecting as well
        let deadline = timeout.map(|window| Instant::now() + window);
        shared.apply(|machine| {
            machine.start();
            None
        });

        let url = self.config.endpoint(mode).to_string();
        info!("Session {} ({}) connecting to {}", id, mode, url);
        let link = self.connector.open(&url);

        tokio::spawn(drive_session(shared.clone(), link, deadline));

        let handle = SessionHandle { id, mode, shared };
        self.active = Some(handle.clone());
        Ok(handle)
    }

    /// Cancel the active session, if any. Returns whether one was cancelled.
    pub fn cancel(&mut self) -> bool {
        match self.active.take() {
            Some(handle) => {
                let cancelled = handle.cancel();
                if cancelled {
                    info!("Cancelled in-flight session {}", handle.id());
                }
                cancelled
            }
            None => false,
        }
    }

    /// The session occupying the active slot, if it has not ended
    pub fn active(&self) -> Option<&SessionHandle> {
        self.active
            .as_ref()
            .filter(|handle| !handle.state().is_terminal())
    }
}

/// Feed channel events, the deadline and cancellation into the machine
async fn drive_session(shared: Arc<SessionShared>, mut link: ChannelLink, deadline: Option<Instant>) {
    let expiry = async {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(expiry);

    while !shared.state().is_terminal() {
        let action = tokio::select! {
            _ = shared.cancelled.notified() => Some(Action::Close),
            _ = &mut expiry => shared.apply(|machine| machine.on_deadline()),
            event = link.next_event() => match event {
                Some(ChannelEvent::Opened) => shared.apply(|machine| machine.on_open()),
                Some(ChannelEvent::Message(text)) => {
                    shared.apply(|machine| machine.on_message(&text))
                }
                Some(ChannelEvent::Error(message)) => {
                    shared.apply(|machine| machine.on_error(&message))
                }
                Some(ChannelEvent::Closed) | None => shared.apply(|machine| machine.on_close()),
            },
        };

        match action {
            Some(Action::Send(request)) => {
                if let Err(e) = link.send_text(request) {
                    shared.apply(|machine| machine.on_error(&e.to_string()));
                }
            }
            Some(Action::Close) => break,
            None => {}
        }
    }

    // best-effort; a peer-closed channel ignores this
    link.close();

    let snapshot = shared.lock().snapshot().clone();
    match &snapshot.error {
        Some(error) if snapshot.state != SessionState::Cancelled => {
            warn!("Session {} ended {}: {}", snapshot.id, snapshot.state, error)
        }
        _ => info!(
            "Session {} ended {} after {} events",
            snapshot.id, snapshot.state, snapshot.events_received
        ),
    }
    debug!("Driver for session {} exiting", snapshot.id);
}
