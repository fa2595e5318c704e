use chrono::Utc;
use serde_json::{json, Value};

use preplive::session::{ClientMessage, ServerEvent};
use preplive::suggest::Suggestion;

#[test]
fn test_init_message_parses_with_speaker_hints() {
    let raw = r#"{
        "type": "init",
        "context": "Sales call with Acme",
        "speakerHints": {"0": "You", "1": "Dana"}
    }"#;

    match serde_json::from_str::<ClientMessage>(raw).unwrap() {
        ClientMessage::Init {
            context,
            speaker_hints,
        } => {
            assert_eq!(context, "Sales call with Acme");
            assert_eq!(speaker_hints.get(&0).map(String::as_str), Some("You"));
            assert_eq!(speaker_hints.get(&1).map(String::as_str), Some("Dana"));
        }
        other => panic!("unexpected message: {:?}", other),
    }
}

#[test]
fn test_init_fields_default_when_omitted() {
    let msg: ClientMessage = serde_json::from_str(r#"{"type":"init"}"#).unwrap();
    match msg {
        ClientMessage::Init {
            context,
            speaker_hints,
        } => {
            assert!(context.is_empty());
            assert!(speaker_hints.is_empty());
        }
        other => panic!("unexpected message: {:?}", other),
    }
}

#[test]
fn test_control_message_tags() {
    assert!(matches!(
        serde_json::from_str::<ClientMessage>(r#"{"type":"start_conversation"}"#).unwrap(),
        ClientMessage::StartConversation
    ));
    assert!(matches!(
        serde_json::from_str::<ClientMessage>(r#"{"type":"stop_conversation"}"#).unwrap(),
        ClientMessage::StopConversation
    ));
    assert!(matches!(
        serde_json::from_str::<ClientMessage>(r#"{"type":"stop"}"#).unwrap(),
        ClientMessage::Stop
    ));

    let map: ClientMessage =
        serde_json::from_str(r#"{"type":"map_speaker","speakerId":2,"name":"Dana"}"#).unwrap();
    match map {
        ClientMessage::MapSpeaker { speaker_id, name } => {
            assert_eq!(speaker_id, 2);
            assert_eq!(name, "Dana");
        }
        other => panic!("unexpected message: {:?}", other),
    }
}

#[test]
fn test_unknown_message_type_is_an_error() {
    assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"restart"}"#).is_err());
}

#[test]
fn test_transcript_event_uses_camel_case_fields() {
    let event = ServerEvent::Transcript {
        speaker: "Dana".to_string(),
        text: "let's review the numbers".to_string(),
        confidence: 0.97,
        is_user: false,
        speaker_id: Some(1),
        timestamp: Utc::now(),
    };

    let v: Value = serde_json::to_value(&event).unwrap();
    assert_eq!(v["type"], "transcript");
    assert_eq!(v["speaker"], "Dana");
    assert_eq!(v["isUser"], false);
    assert_eq!(v["speakerId"], 1);
    assert!(v.get("is_user").is_none());
}

#[test]
fn test_suggestions_event_serializes_list() {
    let event = ServerEvent::Suggestions {
        list: vec![Suggestion {
            kind: "fact".to_string(),
            message: "Their Series B was $55M.".to_string(),
            severity: "info".to_string(),
            content_hash: "abc123".to_string(),
            emitted_at: Utc::now(),
        }],
        timestamp: Utc::now(),
    };

    let v: Value = serde_json::to_value(&event).unwrap();
    assert_eq!(v["type"], "suggestions");
    assert_eq!(v["list"][0]["type"], "fact");
    assert_eq!(v["list"][0]["contentHash"], "abc123");
    assert_eq!(v["list"][0]["severity"], "info");
}

#[test]
fn test_error_event_carries_retry_flag() {
    let v: Value = serde_json::to_value(ServerEvent::error("stt unavailable", false)).unwrap();
    assert_eq!(
        v,
        json!({"type": "error", "message": "stt unavailable", "canRetry": false})
    );
}

#[test]
fn test_lifecycle_event_tags() {
    for (event, tag) in [
        (ServerEvent::Ready, "ready"),
        (ServerEvent::TranscriptionReady, "transcription_ready"),
        (ServerEvent::ConversationReady, "conversation_ready"),
        (ServerEvent::ConversationStopped, "conversation_stopped"),
        (ServerEvent::RealtimeAudioDone, "realtime_audio_done"),
        (ServerEvent::Stopped, "stopped"),
    ] {
        let v: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], tag);
    }
}

#[test]
fn test_realtime_audio_round_trip() {
    let event = ServerEvent::RealtimeAudio {
        audio: "AAAA".to_string(),
    };
    let raw = serde_json::to_string(&event).unwrap();
    let back: ServerEvent = serde_json::from_str(&raw).unwrap();
    match back {
        ServerEvent::RealtimeAudio { audio } => assert_eq!(audio, "AAAA"),
        other => panic!("unexpected event: {:?}", other),
    }
}
