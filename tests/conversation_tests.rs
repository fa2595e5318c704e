use std::time::Duration;

use preplive::config::RealtimeConfig;
use preplive::realtime::{
    ConversationChannel, ConversationManager, ConversationState, RealtimeEvent, RealtimeOutbound,
    ResponseGate, ResponseOutcome,
};
use preplive::ServerEvent;
use tokio::sync::mpsc;

fn ready_channel() -> ConversationChannel {
    let mut ch = ConversationChannel::new(3200, Duration::from_millis(0), 5, Duration::from_millis(250));
    assert!(ch.begin_connect());
    assert!(ch.on_session_created());
    ch
}

#[test]
fn test_connect_handshake_transitions() {
    let mut ch = ConversationChannel::new(3200, Duration::from_secs(1), 5, Duration::from_millis(250));
    assert_eq!(ch.state(), ConversationState::Disconnected);
    assert!(!ch.is_active());
    assert!(!ch.on_session_created());

    assert!(ch.begin_connect());
    assert!(!ch.begin_connect());
    assert!(ch.is_active());

    assert!(ch.on_session_created());
    assert_eq!(ch.state(), ConversationState::SessionReady);
}

#[test]
fn test_barge_in_drops_late_audio_for_cancelled_response() {
    let mut ch = ready_channel();

    assert!(ch.on_response_created("r1"));
    assert_eq!(ch.state(), ConversationState::Speaking);
    assert!(ch.should_forward_delta(Some("r1")));

    // User speaks over the AI
    assert_eq!(ch.on_speech_started().as_deref(), Some("r1"));
    assert_eq!(ch.state(), ConversationState::Cancelling);

    // Two late deltas for the cancelled response arrive; both drop
    assert!(!ch.should_forward_delta(Some("r1")));
    assert!(!ch.should_forward_delta(Some("r1")));

    // Service confirms the cancellation
    assert_eq!(
        ch.on_response_done(Some("r1")),
        ResponseOutcome::CancelConfirmed
    );
    assert_eq!(ch.state(), ConversationState::SessionReady);
    assert!(ch.cancelled_response().is_none());
}

#[test]
fn test_cancelled_response_id_cannot_reactivate() {
    let mut ch = ready_channel();
    ch.on_response_created("r1");
    ch.on_speech_started();

    // A stray response.created echo for the cancelled id is rejected
    assert!(!ch.on_response_created("r1"));
    assert!(!ch.should_forward_delta(Some("r1")));
}

#[test]
fn test_active_response_finishes_normally() {
    let mut ch = ready_channel();
    ch.on_response_created("r1");

    assert_eq!(
        ch.on_response_done(Some("r1")),
        ResponseOutcome::ActiveFinished
    );
    assert_eq!(ch.state(), ConversationState::SessionReady);
    assert!(ch.active_response().is_none());

    // Done for an id nobody tracks is stale
    assert_eq!(ch.on_response_done(Some("r9")), ResponseOutcome::Stale);
}

#[test]
fn test_untagged_deltas_trusted_only_while_speaking() {
    let mut ch = ready_channel();
    assert!(!ch.should_forward_delta(None));

    ch.on_response_created("r1");
    assert!(ch.should_forward_delta(None));

    ch.on_speech_started();
    assert!(!ch.should_forward_delta(None));
}

#[test]
fn test_response_gate_defers_then_forces_progress() {
    let mut ch = ready_channel();
    ch.on_response_created("r1");

    for _ in 0..5 {
        assert_eq!(
            ch.request_response(),
            ResponseGate::Defer {
                delay: Duration::from_millis(250)
            }
        );
    }

    // Budget spent; flags are force-cleared so the session moves on
    assert_eq!(ch.request_response(), ResponseGate::ForceProceed);
    assert_eq!(ch.state(), ConversationState::SessionReady);
    assert!(ch.active_response().is_none());

    assert_eq!(ch.request_response(), ResponseGate::Proceed);
}

#[test]
fn test_commit_guards_byte_floor_and_interval() {
    let mut ch = ConversationChannel::new(3200, Duration::from_secs(60), 5, Duration::from_millis(250));
    ch.begin_connect();
    ch.on_session_created();

    assert!(!ch.commit_allowed());
    ch.note_audio_appended(1600);
    assert!(!ch.commit_allowed());
    ch.note_audio_appended(1600);
    assert!(ch.commit_allowed());

    ch.note_committed();
    assert_eq!(ch.uncommitted_bytes(), 0);

    // Enough bytes again, but the interval has not elapsed
    ch.note_audio_appended(4000);
    assert!(!ch.commit_allowed());
}

#[test]
fn test_empty_commit_rejection_resets_counter() {
    let mut ch = ready_channel();
    ch.note_audio_appended(5000);
    ch.note_commit_rejected_empty();
    assert_eq!(ch.uncommitted_bytes(), 0);
    assert!(!ch.commit_allowed());
}

#[test]
fn test_reset_clears_all_session_state() {
    let mut ch = ready_channel();
    ch.on_response_created("r1");
    ch.on_speech_started();
    ch.note_audio_appended(9999);

    ch.reset();
    assert_eq!(ch.state(), ConversationState::Disconnected);
    assert!(ch.active_response().is_none());
    assert!(ch.cancelled_response().is_none());
    assert_eq!(ch.uncommitted_bytes(), 0);

    // Reusable for a fresh connection
    assert!(ch.begin_connect());
}

fn manager() -> (ConversationManager, mpsc::Receiver<preplive::SessionEvent>) {
    let mut cfg = RealtimeConfig::default();
    // A key the environment will not have, so the link task exits without
    // touching the network
    cfg.api_key_env = "PREPLIVE_TEST_UNSET_REALTIME_KEY".to_string();
    let (events_tx, events_rx) = mpsc::channel(16);
    (ConversationManager::new(cfg, events_tx), events_rx)
}

fn frame_type(out: Option<RealtimeOutbound>) -> String {
    match out {
        Some(RealtimeOutbound::Json(v)) => v["type"].as_str().unwrap_or("").to_string(),
        other => panic!("unexpected frame: {:?}", other),
    }
}

#[tokio::test]
async fn test_cancel_confirmation_reaches_client() {
    let (mut manager, _events_rx) = manager();
    manager.connect();
    let (tx, _link_rx) = mpsc::channel(64);
    manager.on_opened(tx);

    assert!(matches!(
        manager.handle(RealtimeEvent::SessionCreated).as_slice(),
        [ServerEvent::ConversationReady]
    ));
    assert!(manager
        .handle(RealtimeEvent::ResponseCreated {
            response_id: "r1".to_string()
        })
        .is_empty());

    // Barge-in announces the cancel ahead of confirmation
    assert!(matches!(
        manager.handle(RealtimeEvent::SpeechStarted).as_slice(),
        [ServerEvent::RealtimeResponseCancelled { immediate: true }]
    ));

    // Confirmation from the service is relayed too
    assert!(matches!(
        manager
            .handle(RealtimeEvent::ResponseDone {
                response_id: Some("r1".to_string())
            })
            .as_slice(),
        [ServerEvent::RealtimeResponseCancelled { immediate: false }]
    ));
}

#[tokio::test]
async fn test_stop_queues_cancel_commit_and_close() {
    let (mut manager, _events_rx) = manager();
    manager.connect();
    let (tx, mut link_rx) = mpsc::channel(64);
    manager.on_opened(tx);

    manager.handle(RealtimeEvent::SessionCreated);
    manager.handle(RealtimeEvent::ResponseCreated {
        response_id: "r1".to_string(),
    });
    manager.send_audio(&[0u8; 4000]);
    manager.stop();

    // Every frame queued before teardown must still be readable, in order,
    // and the channel must end cleanly after the Close
    assert_eq!(frame_type(link_rx.recv().await), "input_audio_buffer.append");
    assert_eq!(frame_type(link_rx.recv().await), "response.cancel");
    assert_eq!(frame_type(link_rx.recv().await), "input_audio_buffer.commit");
    assert!(matches!(
        link_rx.recv().await,
        Some(RealtimeOutbound::Close)
    ));
    assert!(link_rx.recv().await.is_none());
}
