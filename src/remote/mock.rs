//! In-process scripted peer for session channels
//! Used by tests and offline runs where no backend is reachable

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;

use super::channel::{ChannelLink, Connector};
use super::types::{ChannelCommand, ChannelEvent};

/// Connector whose channels are driven by a [`MockPeer`] handed to the caller
pub struct MockConnector {
    peer_tx: mpsc::UnboundedSender<MockPeer>,
    opened: Mutex<Vec<String>>,
}

impl MockConnector {
    /// Create a connector and the receiver on which each opened peer arrives
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockPeer>) {
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();

        let connector = Self {
            peer_tx,
            opened: Mutex::new(Vec::new()),
        };

        (connector, peer_rx)
    }

    /// URLs opened so far, in order
    pub fn opened_urls(&self) -> Vec<String> {
        self.opened
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Connector for MockConnector {
    fn open(&self, url: &str) -> ChannelLink {
        let (link, event_tx, command_rx) = ChannelLink::pair();

        self.opened
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(url.to_string());

        let peer = MockPeer {
            url: url.to_string(),
            event_tx,
            command_rx,
        };
        // nobody listening for peers is fine: the channel simply never opens
        let _ = self.peer_tx.send(peer);

        link
    }
}

/// Remote end of a mock channel
pub struct MockPeer {
    url: String,
    event_tx: mpsc::UnboundedSender<ChannelEvent>,
    command_rx: mpsc::UnboundedReceiver<ChannelCommand>,
}

impl MockPeer {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Report the channel as open
    pub fn open(&self) {
        self.emit(ChannelEvent::Opened);
    }

    /// Deliver a JSON envelope
    pub fn send_json(&self, value: serde_json::Value) {
        self.emit(ChannelEvent::Message(value.to_string()));
    }

    /// Deliver a raw text frame
    pub fn send_text(&self, text: &str) {
        self.emit(ChannelEvent::Message(text.to_string()));
    }

    /// Close from the peer side
    pub fn close(&self) {
        self.emit(ChannelEvent::Closed);
    }

    /// Fail the channel
    pub fn fail(&self, message: &str) {
        self.emit(ChannelEvent::Error(message.to_string()));
    }

    /// Wait for the next command from the channel owner
    pub async fn next_command(&mut self) -> Option<ChannelCommand> {
        self.command_rx.recv().await
    }

    /// Like [`MockPeer::next_command`] but gives up after `wait`
    pub async fn next_command_within(&mut self, wait: Duration) -> Option<ChannelCommand> {
        tokio::time::timeout(wait, self.command_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Drain commands already queued without waiting
    pub fn queued_commands(&mut self) -> Vec<ChannelCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = self.command_rx.try_recv() {
            commands.push(command);
        }
        commands
    }

    fn emit(&self, event: ChannelEvent) {
        // owner may already have finished; late events are dropped like on a real socket
        let _ = self.event_tx.send(event);
    }
}
