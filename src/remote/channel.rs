//! Duplex channel seam between the session controller and a transport

use tokio::sync::mpsc;
use tracing::debug;

use super::types::{ChannelCommand, ChannelEvent, RemoteError};

/// Opens duplex channels to a remote endpoint.
///
/// `open` must not block: the transport connects in the background and
/// reports `ChannelEvent::Opened` or `ChannelEvent::Error` on the returned link.
pub trait Connector: Send + Sync {
    fn open(&self, url: &str) -> ChannelLink;
}

/// The owner's end of one duplex channel
pub struct ChannelLink {
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    commands: mpsc::UnboundedSender<ChannelCommand>,
}

impl ChannelLink {
    /// Create a link and the transport-side ends of its two queues
    pub fn pair() -> (
        Self,
        mpsc::UnboundedSender<ChannelEvent>,
        mpsc::UnboundedReceiver<ChannelCommand>,
    ) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let link = Self {
            events: event_rx,
            commands: command_tx,
        };

        (link, event_tx, command_rx)
    }

    /// Next event from the transport; `None` once the transport is gone
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Queue a text frame for sending
    pub fn send_text(&self, text: String) -> Result<(), RemoteError> {
        self.commands
            .send(ChannelCommand::Send(text))
            .map_err(|_| RemoteError::ChannelClosed)
    }

    /// Ask the transport to close. Best-effort: never waits for acknowledgment.
    pub fn close(&self) {
        if self.commands.send(ChannelCommand::Close).is_err() {
            debug!("Close requested on a channel that is already gone");
        }
    }

    /// Whether the transport side has gone away
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}
