//! Session controller tests driven by a scripted mock peer

use std::sync::Arc;
use std::time::Duration;

use readbuddy::remote::{ChannelCommand, MockConnector, MockPeer};
use readbuddy::session::{
    ControllerConfig, SessionController, SessionError, SessionHandle, SessionMode,
    SessionSnapshot, SessionState, SessionUpdate,
};
use serde_json::json;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(2);

struct Harness {
    controller: SessionController,
    connector: Arc<MockConnector>,
    peers: mpsc::UnboundedReceiver<MockPeer>,
}

impl Harness {
    fn new() -> Self {
        let (connector, peers) = MockConnector::new();
        let connector = Arc::new(connector);
        let config = ControllerConfig {
            read_url: "ws://backend.test/read".to_string(),
            chat_url: "ws://backend.test/chat".to_string(),
            reading_timeout: Some(Duration::from_secs(15)),
            chat_timeout: None,
        };

        Self {
            controller: SessionController::new(config, connector.clone()),
            connector,
            peers,
        }
    }

    /// Submit a request and return the handle with its opened, request-checked peer
    async fn start(&mut self, request: &str, mode: SessionMode) -> (SessionHandle, MockPeer) {
        let handle = self
            .controller
            .submit(request, mode)
            .expect("submit should succeed");
        let mut peer = self.next_peer().await;

        peer.open();
        assert_eq!(
            peer.next_command_within(WAIT).await,
            Some(ChannelCommand::Send(request.to_string())),
            "request should be sent once the channel opens"
        );
        (handle, peer)
    }

    async fn next_peer(&mut self) -> MockPeer {
        tokio::time::timeout(WAIT, self.peers.recv())
            .await
            .expect("channel should be opened")
            .expect("connector should be alive")
    }
}

async fn finished(handle: &SessionHandle) -> SessionSnapshot {
    tokio::time::timeout(WAIT, handle.finished())
        .await
        .expect("session should reach a terminal state")
}

fn stream(fragment: &str) -> serde_json::Value {
    json!({"event_type": "on_chat_model_stream", "content": fragment})
}

fn retrieved(sources: &[&str]) -> serde_json::Value {
    let documents: Vec<serde_json::Value> = sources
        .iter()
        .map(|source| json!({"page_content": format!("about {}", source), "metadata": {"source": source}}))
        .collect();
    json!({"event_type": "on_retriever_end", "content": documents})
}

#[tokio::test]
async fn test_chat_fragments_concatenate_until_close() {
    let mut harness = Harness::new();
    let (handle, peer) = harness.start("what is RAG?", SessionMode::InteractiveChat).await;

    peer.send_json(stream("Hel"));
    peer.send_json(stream("lo"));
    peer.close();

    let snapshot = finished(&handle).await;
    assert_eq!(snapshot.state, SessionState::Completed);
    assert_eq!(snapshot.accumulator.answer(), Some("Hello"));
    assert_eq!(snapshot.events_received, 2);
    assert!(snapshot.error.is_none());
    assert!(snapshot.finished_at.is_some());
}

#[tokio::test]
async fn test_updates_arrive_in_order() {
    let mut harness = Harness::new();
    let (handle, peer) = harness.start("hi", SessionMode::InteractiveChat).await;
    let mut updates = handle.take_updates().expect("first take gets the stream");
    assert!(handle.take_updates().is_none());

    peer.send_json(stream("a"));
    peer.send_json(stream("b"));
    peer.close();
    finished(&handle).await;

    let mut received = Vec::new();
    while let Ok(update) = updates.try_recv() {
        received.push(update);
    }
    assert_eq!(
        received,
        vec![
            SessionUpdate::StateChanged(SessionState::Connecting),
            SessionUpdate::StateChanged(SessionState::Awaiting),
            SessionUpdate::StateChanged(SessionState::Streaming),
            SessionUpdate::AnswerDelta("a".to_string()),
            SessionUpdate::AnswerDelta("b".to_string()),
            SessionUpdate::StateChanged(SessionState::Completed),
        ]
    );
}

#[tokio::test]
async fn test_retrieved_documents_replaced_wholesale() {
    let mut harness = Harness::new();
    let (handle, peer) = harness.start("sources?", SessionMode::InteractiveChat).await;

    peer.send_json(retrieved(&["a.pdf", "b.pdf"]));
    peer.send_json(retrieved(&["c.pdf"]));
    peer.close();

    let snapshot = finished(&handle).await;
    let documents = snapshot.accumulator.documents();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].source, "c.pdf");
    assert_eq!(documents[0].content, "about c.pdf");
}

#[tokio::test]
async fn test_chat_terminator_completes_and_closes() {
    let mut harness = Harness::new();
    let (handle, mut peer) = harness.start("short", SessionMode::InteractiveChat).await;

    peer.send_json(json!({"event_type": "on_chat_model_stream", "content": "Done", "final": true}));

    let snapshot = finished(&handle).await;
    assert_eq!(snapshot.state, SessionState::Completed);
    assert_eq!(snapshot.accumulator.answer(), Some("Done"));
    assert_eq!(peer.next_command_within(WAIT).await, Some(ChannelCommand::Close));
}

#[tokio::test]
async fn test_quiet_reading_completes_on_close() {
    let mut harness = Harness::new();
    let (handle, peer) = harness
        .start("https://example.com/page.png", SessionMode::QuietReading)
        .await;

    peer.send_json(json!({"event_type": "on_image_process", "content": "first"}));
    // last write wins; a terminator is not a reading completion signal
    peer.send_json(json!({
        "event_type": "on_image_process",
        "content": {"text": "second", "image_url": "https://cdn.test/p.png"},
        "final": true
    }));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.state(), SessionState::Streaming);

    peer.close();
    let snapshot = finished(&handle).await;
    assert_eq!(snapshot.state, SessionState::Completed);

    let payload = snapshot.accumulator.payload().expect("payload present");
    assert_eq!(payload.text, "second");
    assert_eq!(payload.image_url.as_deref(), Some("https://cdn.test/p.png"));
}

#[tokio::test]
async fn test_deadline_times_out_and_closes() {
    let mut harness = Harness::new();
    let handle = harness
        .controller
        .submit_with_timeout(
            "slow",
            SessionMode::InteractiveChat,
            Some(Duration::from_millis(50)),
        )
        .expect("submit should succeed");
    let mut peer = harness.next_peer().await;
    peer.open();
    peer.send_json(stream("partial"));

    let snapshot = finished(&handle).await;
    assert_eq!(snapshot.state, SessionState::TimedOut);
    assert_eq!(
        snapshot.error,
        Some(SessionError::Timeout(Duration::from_millis(50)))
    );
    assert_eq!(snapshot.accumulator.answer(), Some("partial"));

    let commands = {
        let mut commands = Vec::new();
        while let Some(command) = peer.next_command_within(Duration::from_millis(200)).await {
            commands.push(command);
        }
        commands
    };
    assert_eq!(
        commands,
        vec![
            ChannelCommand::Send("slow".to_string()),
            ChannelCommand::Close
        ]
    );
}

#[tokio::test]
async fn test_deadline_covers_connecting() {
    let mut harness = Harness::new();
    let handle = harness
        .controller
        .submit_with_timeout(
            "never opens",
            SessionMode::QuietReading,
            Some(Duration::from_millis(30)),
        )
        .expect("submit should succeed");
    let _peer = harness.next_peer().await;

    let snapshot = finished(&handle).await;
    assert_eq!(snapshot.state, SessionState::TimedOut);
    assert_eq!(snapshot.events_received, 0);
}

#[tokio::test]
async fn test_new_submit_cancels_in_flight_session() {
    let mut harness = Harness::new();
    let (first, mut first_peer) = harness.start("first", SessionMode::InteractiveChat).await;
    first_peer.send_json(stream("par"));
    tokio::time::sleep(Duration::from_millis(20)).await;

    let second = harness
        .controller
        .submit("second", SessionMode::InteractiveChat)
        .expect("submit should succeed");

    // the old session ends before the new one is handed out
    assert_eq!(first.state(), SessionState::Cancelled);
    assert_eq!(first.snapshot().error, Some(SessionError::UserCancelled));
    assert_eq!(
        first_peer.next_command_within(WAIT).await,
        Some(ChannelCommand::Close)
    );

    let second_peer = harness.next_peer().await;
    assert_eq!(second_peer.url(), "ws://backend.test/chat");
    assert_eq!(
        harness.controller.active().map(|handle| handle.id()),
        Some(second.id())
    );

    // late output of the cancelled session is ignored
    first_peer.send_json(stream("tial"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(first.snapshot().accumulator.answer(), Some("par"));
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let mut harness = Harness::new();
    let (handle, _peer) = harness.start("stop me", SessionMode::InteractiveChat).await;

    assert!(harness.controller.cancel());
    assert!(!harness.controller.cancel());
    assert!(!handle.cancel());
    assert_eq!(handle.state(), SessionState::Cancelled);
    assert!(harness.controller.active().is_none());
}

#[tokio::test]
async fn test_cancel_after_completion_is_noop() {
    let mut harness = Harness::new();
    let (handle, peer) = harness.start("done", SessionMode::InteractiveChat).await;
    peer.close();
    finished(&handle).await;

    assert!(!handle.cancel());
    assert_eq!(handle.state(), SessionState::Completed);
}

#[tokio::test]
async fn test_malformed_event_fails_session() {
    let mut harness = Harness::new();
    let (handle, mut peer) = harness.start("hi", SessionMode::InteractiveChat).await;

    peer.send_text("{not json");

    let snapshot = finished(&handle).await;
    assert_eq!(snapshot.state, SessionState::Failed);
    assert!(matches!(snapshot.error, Some(SessionError::MalformedEvent(_))));
    assert_eq!(peer.next_command_within(WAIT).await, Some(ChannelCommand::Close));
}

#[tokio::test]
async fn test_channel_error_fails_session() {
    let mut harness = Harness::new();
    let (handle, peer) = harness.start("hi", SessionMode::QuietReading).await;

    peer.fail("connection reset");

    let snapshot = finished(&handle).await;
    assert_eq!(snapshot.state, SessionState::Failed);
    assert_eq!(
        snapshot.error,
        Some(SessionError::Connection("connection reset".to_string()))
    );
}

#[tokio::test]
async fn test_close_before_open_is_connection_failure() {
    let mut harness = Harness::new();
    let handle = harness
        .controller
        .submit("hi", SessionMode::InteractiveChat)
        .expect("submit should succeed");
    let peer = harness.next_peer().await;

    peer.close();

    let snapshot = finished(&handle).await;
    assert_eq!(snapshot.state, SessionState::Failed);
    assert!(matches!(snapshot.error, Some(SessionError::Connection(_))));
}

#[tokio::test]
async fn test_remote_error_event_fails_session() {
    let mut harness = Harness::new();
    let (handle, peer) = harness.start("hi", SessionMode::InteractiveChat).await;

    peer.send_json(json!({"event_type": "error", "content": "index unavailable"}));

    let snapshot = finished(&handle).await;
    assert_eq!(snapshot.state, SessionState::Failed);
    assert_eq!(
        snapshot.error,
        Some(SessionError::Remote("index unavailable".to_string()))
    );
}

#[tokio::test]
async fn test_unknown_events_are_ignored() {
    let mut harness = Harness::new();
    let (handle, peer) = harness.start("hi", SessionMode::InteractiveChat).await;

    peer.send_json(json!({"event_type": "on_tool_start", "content": {"name": "search"}}));
    peer.send_json(stream("ok"));
    peer.close();

    let snapshot = finished(&handle).await;
    assert_eq!(snapshot.state, SessionState::Completed);
    assert_eq!(snapshot.accumulator.answer(), Some("ok"));
    assert_eq!(snapshot.events_received, 2);
}

#[tokio::test]
async fn test_empty_request_rejected() {
    let mut harness = Harness::new();

    let result = harness.controller.submit("   ", SessionMode::InteractiveChat);

    assert_eq!(result.err(), Some(SessionError::EmptyRequest));
    assert!(harness.connector.opened_urls().is_empty());
}

#[tokio::test]
async fn test_modes_use_their_endpoints() {
    let mut harness = Harness::new();

    harness
        .controller
        .submit("read this", SessionMode::QuietReading)
        .expect("submit should succeed");
    harness
        .controller
        .submit("chat about it", SessionMode::InteractiveChat)
        .expect("submit should succeed");

    assert_eq!(
        harness.connector.opened_urls(),
        vec![
            "ws://backend.test/read".to_string(),
            "ws://backend.test/chat".to_string()
        ]
    );
}

#[tokio::test]
async fn test_watch_subscribers_see_terminal_state() {
    let mut harness = Harness::new();
    let (handle, peer) = harness.start("hi", SessionMode::InteractiveChat).await;
    let mut watcher = handle.subscribe();

    peer.send_json(stream("x"));
    peer.close();

    let snapshot = tokio::time::timeout(
        WAIT,
        watcher.wait_for(|snapshot| snapshot.state.is_terminal()),
    )
    .await
    .expect("watcher should observe the end")
    .expect("sender alive")
    .clone();
    assert_eq!(snapshot.state, SessionState::Completed);
    assert_eq!(snapshot.accumulator.answer(), Some("x"));
}
