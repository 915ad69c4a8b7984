//! Session integration tests
//!
//! Drive a full session against an in-process synthesis service and a
//! recording audio output.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use voicelink_core::audio::encode_audio;
use voicelink_core::{
    Base64Decoder, ClientConfig, ClientId, ClientMessage, ClockedOutput, FinishedSignal,
    InProcessTransport, InterruptSignal, OutputEvent, QueueState, RecordingOutput,
    ResourceTracker, ServerMessage, Session, SessionError, SessionEvent, SessionState,
    StreamOutcome, SynthesisConfig,
};

const DEADLINE: Duration = Duration::from_secs(5);

struct Harness {
    session: Session,
    requests: mpsc::Receiver<ClientMessage>,
    replies: Option<mpsc::Sender<ServerMessage>>,
    output: mpsc::UnboundedReceiver<OutputEvent>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    errors: mpsc::UnboundedReceiver<SessionError>,
    tracker: ResourceTracker,
    /// Completion signals of units that started, oldest first
    signals: Vec<FinishedSignal>,
}

fn new_session(
    config: ClientConfig,
    auto_finish: bool,
) -> (
    Session,
    ResourceTracker,
    mpsc::UnboundedReceiver<OutputEvent>,
    mpsc::UnboundedReceiver<SessionEvent>,
    mpsc::UnboundedReceiver<SessionError>,
) {
    let tracker = ResourceTracker::new();
    let (output, output_events) = RecordingOutput::new(auto_finish);
    let mut session = Session::new(
        config,
        Box::new(output),
        Arc::new(Base64Decoder::new(tracker.clone())),
    );

    let (event_tx, events) = mpsc::unbounded_channel();
    session.on_event(move |event| {
        let _ = event_tx.send(event);
    });
    let (error_tx, errors) = mpsc::unbounded_channel();
    session.on_error(move |error| {
        let _ = error_tx.send(error.clone());
    });

    (session, tracker, output_events, events, errors)
}

async fn connected(config: ClientConfig, auto_finish: bool) -> Harness {
    let (mut session, tracker, output, events, errors) = new_session(config, auto_finish);
    let (transport, requests, replies) = InProcessTransport::new_pair();

    replies
        .send(ServerMessage::Connected {
            client_id: ClientId("client_1".into()),
        })
        .await
        .unwrap();
    session.connect_with(Box::new(transport)).await.unwrap();

    Harness {
        session,
        requests,
        replies: Some(replies),
        output,
        events,
        errors,
        tracker,
        signals: Vec::new(),
    }
}

fn chunk(text: &str) -> ServerMessage {
    ServerMessage::AudioChunk {
        audio: encode_audio(format!("audio:{text}").as_bytes()),
        text: text.to_string(),
        mime_type: Some("audio/mpeg".into()),
        metrics: None,
    }
}

fn chat(text: &str) -> ClientMessage {
    ClientMessage::Chat {
        message: text.into(),
        persona_id: "yuki".into(),
        voice_id: None,
    }
}

impl Harness {
    async fn reply(&self, message: ServerMessage) {
        self.replies
            .as_ref()
            .expect("service already closed")
            .send(message)
            .await
            .unwrap();
    }

    /// Drive the session until `done` holds
    async fn pump_until(&mut self, mut done: impl FnMut(&Session) -> bool) {
        let session = &mut self.session;
        tokio::time::timeout(DEADLINE, async {
            while !done(session) {
                assert!(session.step().await, "session went quiet");
            }
        })
        .await
        .expect("timed out driving session");
    }

    /// Drive the session until it emits an event
    async fn next_event(&mut self) -> SessionEvent {
        let session = &mut self.session;
        let events = &mut self.events;
        tokio::time::timeout(DEADLINE, async {
            loop {
                if let Ok(event) = events.try_recv() {
                    return event;
                }
                assert!(session.step().await, "session went quiet");
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    fn drain_requests(&mut self) -> Vec<ClientMessage> {
        let mut requests = Vec::new();
        while let Ok(request) = self.requests.try_recv() {
            requests.push(request);
        }
        requests
    }

    /// Texts of units the output started since the last call
    ///
    /// Completion signals are kept for `finish_oldest`.
    fn started(&mut self) -> Vec<String> {
        let mut texts = Vec::new();
        while let Ok(event) = self.output.try_recv() {
            if let OutputEvent::Started { text, finished, .. } = event {
                texts.push(text);
                self.signals.extend(finished);
            }
        }
        texts
    }

    /// Let the oldest started unit finish naturally
    fn finish_oldest(&mut self) {
        self.started();
        let signal = self.signals.remove(0);
        signal.notify();
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_three_chunks_then_complete() {
    let mut h = connected(ClientConfig::default(), true).await;

    h.session.send_request("Hello", "yuki", None).await.unwrap();
    assert_eq!(h.drain_requests(), vec![chat("Hello")]);

    for text in ["A", "B", "C"] {
        h.reply(chunk(text)).await;
    }
    h.reply(ServerMessage::StreamComplete {
        full_text: "A B C".into(),
        duration: 1500,
    })
    .await;

    h.pump_until(|s| s.outcome().is_some()).await;

    assert_eq!(h.started(), vec!["A", "B", "C"]);
    assert_eq!(
        h.drain_events(),
        vec![
            SessionEvent::PartialText {
                text: "A".into(),
                metrics: None
            },
            SessionEvent::PartialText {
                text: "B".into(),
                metrics: None
            },
            SessionEvent::PartialText {
                text: "C".into(),
                metrics: None
            },
            SessionEvent::Complete {
                full_text: "A B C".into(),
                duration: Duration::from_millis(1500)
            },
        ]
    );
    assert_eq!(h.session.outcome(), Some(&StreamOutcome::Completed));
    assert_eq!(h.session.queue_state(), QueueState::Idle);
    assert_eq!(h.session.queue_stats().played, 3);
    assert_eq!(h.tracker.live(), 0);
}

#[tokio::test]
async fn test_complete_waits_for_last_unit() {
    let mut h = connected(ClientConfig::default(), false).await;

    h.session.send_request("Hello", "yuki", None).await.unwrap();
    h.reply(chunk("A")).await;
    h.reply(ServerMessage::StreamComplete {
        full_text: "A".into(),
        duration: 40,
    })
    .await;

    h.pump_until(|s| s.queue_state() == QueueState::Playing && s.pending_decodes() == 0)
        .await;
    // Give the stream_complete a chance to be handled
    h.session.poll();
    assert!(h.session.outcome().is_none(), "A is still playing");

    h.finish_oldest();
    h.pump_until(|s| s.outcome().is_some()).await;
    assert_eq!(h.session.outcome(), Some(&StreamOutcome::Completed));
}

#[tokio::test]
async fn test_interrupt_then_new_request() {
    let mut h = connected(ClientConfig::default(), false).await;

    h.session.send_request("Hello", "yuki", None).await.unwrap();
    h.drain_requests();

    h.reply(chunk("A")).await;
    h.reply(chunk("B")).await;
    h.pump_until(|s| s.handler_stats().chunks_decoded == 2).await;

    assert_eq!(h.started(), vec!["A"]);
    assert_eq!(h.session.backlog_len(), 1);
    assert_eq!(h.tracker.live(), 2);

    let report = h.session.interrupt().await;
    assert_eq!(report.discarded_units, 2);
    assert_eq!(report.signal, InterruptSignal::Sent);
    assert_eq!(h.session.queue_state(), QueueState::Idle);
    assert_eq!(h.session.backlog_len(), 0);
    assert_eq!(h.tracker.live(), 0);
    assert_eq!(h.session.outcome(), Some(&StreamOutcome::Interrupted));

    h.session.send_request("Goodbye", "yuki", None).await.unwrap();
    assert_eq!(
        h.drain_requests(),
        vec![ClientMessage::Interrupt, chat("Goodbye")]
    );

    // A was stopped, B never started
    assert!(h.started().is_empty());
}

#[tokio::test]
async fn test_text_fallback_never_enqueues() {
    let mut h = connected(ClientConfig::default(), true).await;

    h.session.send_request("Hello", "yuki", None).await.unwrap();
    h.reply(ServerMessage::TextFallback {
        text: "Hello there".into(),
        error: Some("tts offline".into()),
    })
    .await;
    h.reply(ServerMessage::StreamComplete {
        full_text: "Hello there".into(),
        duration: 90,
    })
    .await;

    let event = h.next_event().await;
    assert_eq!(
        event,
        SessionEvent::TextOnly {
            text: "Hello there".into(),
            error: Some("tts offline".into())
        }
    );
    assert_eq!(h.session.outcome(), Some(&StreamOutcome::TextOnly));

    assert!(matches!(h.next_event().await, SessionEvent::Complete { .. }));
    assert_eq!(h.session.outcome(), Some(&StreamOutcome::TextOnly));
    assert_eq!(h.session.queue_stats().enqueued, 0);
    assert_eq!(h.tracker.allocated(), 0);
    assert!(h.started().is_empty());
}

#[tokio::test]
async fn test_new_request_supersedes_playing_response() {
    let mut h = connected(ClientConfig::default(), false).await;

    h.session.send_request("First", "yuki", None).await.unwrap();
    h.reply(chunk("A1")).await;
    h.reply(chunk("A2")).await;
    h.pump_until(|s| s.handler_stats().chunks_decoded == 2).await;
    assert_eq!(h.started(), vec!["A1"]);
    h.drain_requests();

    // Barge in without an explicit interrupt
    h.session.send_request("Second", "yuki", None).await.unwrap();
    assert_eq!(
        h.drain_requests(),
        vec![ClientMessage::Interrupt, chat("Second")]
    );
    assert_eq!(h.tracker.live(), 0);

    h.reply(ServerMessage::InterruptConfirmed).await;
    h.reply(chunk("B1")).await;
    h.reply(chunk("B2")).await;
    h.pump_until(|s| s.handler_stats().chunks_decoded == 4).await;
    assert_eq!(h.started(), vec!["B1"]);

    // The stopped A1 reporting late must not advance the queue
    let stale = h.signals.remove(0);
    assert_eq!(stale.unit().0, 0);
    stale.notify();
    h.session.poll();
    assert_eq!(h.session.backlog_len(), 1);

    h.finish_oldest();
    h.pump_until(|s| s.backlog_len() == 0).await;
    assert_eq!(h.started(), vec!["B2"]);
    assert_eq!(h.session.queue_stats().stale_finishes, 1);
}

#[tokio::test]
async fn test_stale_chunk_dropped_until_ack() {
    let mut h = connected(ClientConfig::default(), true).await;

    h.session.send_request("First", "yuki", None).await.unwrap();
    h.reply(chunk("A1")).await;
    h.pump_until(|s| s.handler_stats().chunks_received == 1).await;

    h.session.send_request("Second", "yuki", None).await.unwrap();

    // Already in flight when the server saw the interrupt
    h.reply(chunk("A2")).await;
    h.reply(ServerMessage::InterruptConfirmed).await;
    h.reply(chunk("B1")).await;
    h.pump_until(|s| s.handler_stats().chunks_received == 2 && s.pending_decodes() == 0)
        .await;
    h.pump_until(|s| s.queue_state() == QueueState::Idle).await;

    let started = h.started();
    assert!(!started.contains(&"A2".to_string()));
    assert_eq!(started.last().map(String::as_str), Some("B1"));
    assert_eq!(h.session.handler_stats().dropped_stale, 1);
}

#[tokio::test]
async fn test_stale_chunk_never_sounds_after_cancel() {
    let mut h = connected(ClientConfig::default(), false).await;

    h.session.send_request("First", "yuki", None).await.unwrap();
    h.reply(chunk("A1")).await;
    h.pump_until(|s| s.queue_state() == QueueState::Playing).await;
    assert_eq!(h.started(), vec!["A1"]);

    h.session.send_request("Second", "yuki", None).await.unwrap();
    h.reply(chunk("A2")).await;
    h.reply(chunk("A3")).await;
    h.pump_until(|s| s.handler_stats().dropped_stale == 2).await;

    assert!(h.started().is_empty(), "nothing from First plays after the cancel");
    assert_eq!(h.session.queue_state(), QueueState::Idle);
    assert_eq!(h.tracker.live(), 0);
}

#[tokio::test]
async fn test_stale_completion_does_not_settle_new_request() {
    let mut h = connected(ClientConfig::default(), true).await;

    h.session.send_request("First", "yuki", None).await.unwrap();
    h.reply(chunk("A1")).await;
    h.pump_until(|s| s.handler_stats().chunks_received == 1).await;

    h.session.send_request("Second", "yuki", None).await.unwrap();
    h.drain_events();

    // First's completion was already on the wire
    h.reply(ServerMessage::StreamComplete {
        full_text: "A1".into(),
        duration: 7,
    })
    .await;
    h.pump_until(|s| s.handler_stats().dropped_stale == 1).await;
    assert!(h.session.is_busy());
    assert!(h.session.outcome().is_none());

    // Gate opened by First's end; Second streams normally
    h.reply(chunk("B1")).await;
    h.reply(ServerMessage::StreamComplete {
        full_text: "B1".into(),
        duration: 9,
    })
    .await;
    h.pump_until(|s| s.outcome().is_some()).await;

    assert_eq!(h.session.outcome(), Some(&StreamOutcome::Completed));
    assert_eq!(
        h.drain_events(),
        vec![
            SessionEvent::PartialText {
                text: "B1".into(),
                metrics: None
            },
            SessionEvent::Complete {
                full_text: "B1".into(),
                duration: Duration::from_millis(9)
            },
        ]
    );
    assert_eq!(h.started().last().map(String::as_str), Some("B1"));
}

#[tokio::test]
async fn test_stale_gate_opens_after_timeout() {
    let config = ClientConfig {
        interrupt_ack_timeout_ms: 50,
        ..Default::default()
    };
    let mut h = connected(config, true).await;

    h.session.send_request("First", "yuki", None).await.unwrap();
    h.reply(chunk("A1")).await;
    h.pump_until(|s| s.handler_stats().chunks_decoded == 1).await;

    // The service never acknowledges and never ends First
    h.session.send_request("Second", "yuki", None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    h.reply(chunk("B1")).await;
    h.pump_until(|s| s.handler_stats().chunks_decoded == 2).await;
    assert_eq!(h.started().last().map(String::as_str), Some("B1"));
    assert_eq!(h.session.handler_stats().dropped_stale, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_clocked_output_plays_every_chunk() {
    let tracker = ResourceTracker::new();
    let output = ClockedOutput::new(128_000).with_min_duration(Duration::from_millis(1));
    let mut session = Session::new(
        ClientConfig::default(),
        Box::new(output),
        Arc::new(Base64Decoder::new(tracker.clone())),
    );
    let (transport, mut requests, replies) = InProcessTransport::new_pair();
    replies
        .send(ServerMessage::Connected {
            client_id: ClientId("client_1".into()),
        })
        .await
        .unwrap();
    session.connect_with(Box::new(transport)).await.unwrap();
    session.send_request("Long answer", "yuki", None).await.unwrap();
    assert_eq!(requests.recv().await, Some(chat("Long answer")));

    let n: u64 = 300;
    let service = tokio::spawn(async move {
        for i in 0..n {
            replies.send(chunk(&format!("c{i}"))).await.unwrap();
        }
        replies
            .send(ServerMessage::StreamComplete {
                full_text: "all".into(),
                duration: 300,
            })
            .await
            .unwrap();
        replies
    });

    tokio::time::timeout(Duration::from_secs(30), async {
        while session.outcome().is_none() {
            assert!(session.step().await);
        }
    })
    .await
    .expect("response did not finish");
    let _replies = service.await.unwrap();

    assert_eq!(session.outcome(), Some(&StreamOutcome::Completed));
    let stats = session.queue_stats();
    assert_eq!(stats.enqueued, n);
    assert_eq!(stats.played, n);
    assert_eq!(stats.rejected, 0);
    assert_eq!(tracker.live(), 0);
}

#[tokio::test]
async fn test_no_resource_growth_over_many_turns() {
    let mut h = connected(ClientConfig::default(), false).await;

    for turn in 0..50u64 {
        h.session
            .send_request(&format!("turn {turn}"), "yuki", None)
            .await
            .unwrap();
        h.drain_requests();
        h.reply(ServerMessage::InterruptConfirmed).await;

        for i in 0..3 {
            h.reply(chunk(&format!("{turn}-{i}"))).await;
        }
        let expected = (turn + 1) * 3;
        h.pump_until(|s| s.handler_stats().chunks_decoded == expected)
            .await;
        assert_eq!(h.tracker.live(), 3);
        h.started();
    }

    h.session.interrupt().await;
    assert_eq!(h.tracker.live(), 0);
    assert_eq!(h.tracker.allocated(), 150);
    assert_eq!(h.tracker.released(), 150);
}

#[tokio::test]
async fn test_decode_failure_is_not_fatal() {
    let mut h = connected(ClientConfig::default(), true).await;

    h.session.send_request("Hello", "yuki", None).await.unwrap();
    h.reply(chunk("A")).await;
    h.reply(ServerMessage::AudioChunk {
        audio: "!!! not base64 !!!".into(),
        text: "B".into(),
        mime_type: None,
        metrics: None,
    })
    .await;
    h.reply(chunk("C")).await;
    h.reply(ServerMessage::StreamComplete {
        full_text: "A B C".into(),
        duration: 10,
    })
    .await;

    h.pump_until(|s| s.outcome().is_some()).await;

    assert_eq!(h.started(), vec!["A", "C"]);
    assert_eq!(h.session.outcome(), Some(&StreamOutcome::Completed));
    assert!(matches!(
        h.errors.try_recv(),
        Ok(SessionError::ChunkDecode { sequence: 1, .. })
    ));
    assert_eq!(h.session.handler_stats().decode_failures, 1);
}

#[tokio::test]
async fn test_remote_error_fails_request_not_session() {
    let mut h = connected(ClientConfig::default(), true).await;

    h.session.send_request("Hello", "yuki", None).await.unwrap();
    h.reply(ServerMessage::Error {
        error: "quota exceeded".into(),
    })
    .await;
    h.pump_until(|s| s.outcome().is_some()).await;

    assert_eq!(
        h.session.outcome(),
        Some(&StreamOutcome::Failed("quota exceeded".into()))
    );
    assert_eq!(
        h.errors.try_recv().ok(),
        Some(SessionError::Remote("quota exceeded".into()))
    );
    assert_eq!(h.session.state(), SessionState::Open);
}

#[tokio::test]
async fn test_unknown_message_passes_through() {
    let mut h = connected(ClientConfig::default(), true).await;

    let payload = serde_json::json!({"type": "viseme", "frames": [[0, "AA"]]});
    h.reply(ServerMessage::Unknown {
        kind: "viseme".into(),
        payload: payload.clone(),
    })
    .await;

    assert_eq!(
        h.next_event().await,
        SessionEvent::Passthrough {
            kind: "viseme".into(),
            payload
        }
    );
}

#[tokio::test]
async fn test_update_config_sends_config_message() {
    let mut h = connected(ClientConfig::default(), true).await;

    let config = SynthesisConfig {
        voice_id: Some("nova".into()),
        ..Default::default()
    };
    h.session.update_config(config.clone()).await.unwrap();
    assert_eq!(h.drain_requests(), vec![ClientMessage::Config { config }]);
}

#[tokio::test]
async fn test_poll_drives_without_waiting() {
    let mut h = connected(ClientConfig::default(), true).await;

    h.session.send_request("Hello", "yuki", None).await.unwrap();
    h.reply(chunk("A")).await;
    h.reply(ServerMessage::StreamComplete {
        full_text: "A".into(),
        duration: 5,
    })
    .await;

    tokio::time::timeout(DEADLINE, async {
        while h.session.outcome().is_none() {
            h.session.poll();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(h.session.outcome(), Some(&StreamOutcome::Completed));
    assert_eq!(h.started(), vec!["A"]);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_connection_lost_is_terminal() {
    let mut h = connected(ClientConfig::default(), false).await;

    h.session.send_request("Hello", "yuki", None).await.unwrap();
    h.reply(chunk("A")).await;
    h.pump_until(|s| s.queue_state() == QueueState::Playing).await;

    drop(h.replies.take());
    h.pump_until(|s| s.state() == SessionState::Closed).await;

    assert!(matches!(
        h.session.outcome(),
        Some(StreamOutcome::Failed(_))
    ));
    assert!(matches!(
        h.errors.try_recv(),
        Ok(SessionError::TransportClosed(_))
    ));
    assert_eq!(h.session.queue_state(), QueueState::Idle);
    assert!(h.session.client_id().is_none());
    assert_eq!(h.tracker.live(), 0);
    assert!(!h.session.step().await);

    assert_eq!(
        h.session.send_request("Again", "yuki", None).await,
        Err(SessionError::NotConnected)
    );
    assert!(
        matches!(h.session.outcome(), Some(StreamOutcome::Failed(_))),
        "rejected request keeps the previous outcome"
    );
}

#[tokio::test]
async fn test_disconnect_stops_playback() {
    let mut h = connected(ClientConfig::default(), false).await;

    h.session.send_request("Hello", "yuki", None).await.unwrap();
    h.reply(chunk("A")).await;
    h.pump_until(|s| s.queue_state() == QueueState::Playing).await;

    h.session.disconnect().await;
    assert_eq!(h.session.state(), SessionState::Closed);
    assert_eq!(h.session.outcome(), Some(&StreamOutcome::Interrupted));
    assert_eq!(h.tracker.live(), 0);

    // Idempotent
    h.session.disconnect().await;
    assert_eq!(h.session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_connect_fails_when_service_gone() {
    let (mut session, _tracker, _output, _events, mut errors) =
        new_session(ClientConfig::default(), true);
    let (transport, requests, _replies) = InProcessTransport::new_pair();
    drop(requests);

    let result = session.connect_with(Box::new(transport)).await;
    assert!(matches!(result, Err(SessionError::Connection(_))));
    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(errors.try_recv(), Ok(SessionError::Connection(_))));
}

#[tokio::test]
async fn test_connect_fails_when_closed_before_confirmation() {
    let (mut session, ..) = new_session(ClientConfig::default(), true);
    let (transport, _requests, replies) = InProcessTransport::new_pair();
    drop(replies);

    let result = session.connect_with(Box::new(transport)).await;
    match result {
        Err(SessionError::Connection(detail)) => {
            assert!(detail.contains("before session confirmation"), "{detail}");
        }
        other => panic!("expected connection error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_connect_times_out() {
    let mut config = ClientConfig::default();
    config.transport.connect_timeout_ms = 50;
    let (mut session, ..) = new_session(config, true);
    let (transport, _requests, _replies) = InProcessTransport::new_pair();

    let result = tokio::time::timeout(DEADLINE, session.connect_with(Box::new(transport)))
        .await
        .expect("connect timeout did not fire");
    match result {
        Err(SessionError::Connection(detail)) => assert!(detail.contains("50 ms"), "{detail}"),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Closed);
}
