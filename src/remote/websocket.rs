//! WebSocket transport for session channels

use std::time::Duration;

use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Error as WsError, protocol::Message},
};
use tracing::{debug, error, info, warn};

use super::channel::{ChannelLink, Connector};
use super::types::{ChannelCommand, ChannelEvent, RemoteError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens one WebSocket per session channel
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    async fn connect(url: &str, connect_timeout: Duration) -> Result<WsStream, RemoteError> {
        match tokio::time::timeout(connect_timeout, connect_async(url)).await {
            Ok(Ok((ws_stream, _))) => Ok(ws_stream),
            Ok(Err(e)) => Err(RemoteError::ConnectionError(format!(
                "Failed to connect to {}: {}",
                url, e
            ))),
            Err(_) => Err(RemoteError::ConnectionError(format!(
                "Timed out connecting to {} after {:?}",
                url, connect_timeout
            ))),
        }
    }

    /// Drive one channel until either side closes it
    async fn run_channel(
        url: String,
        connect_timeout: Duration,
        event_tx: mpsc::UnboundedSender<ChannelEvent>,
        mut command_rx: mpsc::UnboundedReceiver<ChannelCommand>,
    ) {
        let ws_stream = tokio::select! {
            result = Self::connect(&url, connect_timeout) => match result {
                Ok(ws_stream) => ws_stream,
                Err(e) => {
                    error!("{}", e);
                    let _ = event_tx.send(ChannelEvent::Error(e.to_string()));
                    return;
                }
            },
            // owner gave up before the socket opened
            _ = Self::wait_for_close(&mut command_rx) => {
                debug!("Channel to {} abandoned while connecting", url);
                return;
            }
        };

        info!("Connected to {}", url);
        if event_tx.send(ChannelEvent::Opened).is_err() {
            debug!("Channel owner dropped before open was reported");
        }

        let (mut sink, mut stream) = ws_stream.split();

        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(ChannelCommand::Send(text)) => {
                        debug!("Sending {} byte frame to {}", text.len(), url);
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            let error_msg = format!("Failed to send frame: {}", e);
                            error!("{}", error_msg);
                            let _ = event_tx.send(ChannelEvent::Error(error_msg));
                            break;
                        }
                    }
                    Some(ChannelCommand::Close) | None => {
                        if let Err(e) = sink.close().await {
                            warn!("Error closing WebSocket connection: {}", e);
                        }
                        let _ = event_tx.send(ChannelEvent::Closed);
                        info!("Closed channel to {}", url);
                        break;
                    }
                },
                message = stream.next() => {
                    if let Some(event) = Self::process_frame(message) {
                        let terminal = matches!(event, ChannelEvent::Closed | ChannelEvent::Error(_));
                        if event_tx.send(event).is_err() {
                            debug!("Channel owner dropped, stopping reader");
                            break;
                        }
                        if terminal {
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn wait_for_close(command_rx: &mut mpsc::UnboundedReceiver<ChannelCommand>) {
        loop {
            match command_rx.recv().await {
                Some(ChannelCommand::Close) | None => return,
                // sends before open are not part of the protocol
                Some(ChannelCommand::Send(_)) => {
                    warn!("Dropping frame queued before the channel opened");
                }
            }
        }
    }

    /// Map a raw frame to a channel event; control frames yield nothing
    fn process_frame(message: Option<Result<Message, WsError>>) -> Option<ChannelEvent> {
        match message {
            Some(Ok(Message::Text(text))) => {
                debug!("Received WebSocket message: {}", text);
                Some(ChannelEvent::Message(text))
            }
            Some(Ok(Message::Binary(data))) => {
                debug!("Received {} byte binary frame", data.len());
                Some(ChannelEvent::Message(
                    String::from_utf8_lossy(&data).into_owned(),
                ))
            }
            Some(Ok(Message::Close(frame))) => {
                info!("Peer closed WebSocket connection: {:?}", frame);
                Some(ChannelEvent::Closed)
            }
            Some(Ok(_)) => {
                debug!("Ignoring control frame");
                None
            }
            Some(Err(e)) => {
                let error_msg = format!("WebSocket message error: {}", e);
                error!("{}", error_msg);
                Some(ChannelEvent::Error(error_msg))
            }
            None => {
                info!("WebSocket stream ended");
                Some(ChannelEvent::Closed)
            }
        }
    }
}

impl Connector for WebSocketConnector {
    fn open(&self, url: &str) -> ChannelLink {
        let (link, event_tx, command_rx) = ChannelLink::pair();
        let url = url.to_string();
        let connect_timeout = self.connect_timeout;

        tokio::spawn(async move {
            Self::run_channel(url, connect_timeout, event_tx, command_rx).await;
        });

        link
    }
}
