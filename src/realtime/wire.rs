use base64::Engine;
use serde_json::{json, Value};

use crate::config::RealtimeConfig;

/// Parsed downstream event, reduced to what the manager acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    SessionCreated,
    ResponseCreated {
        response_id: String,
    },
    AudioDelta {
        response_id: Option<String>,
        audio: Vec<u8>,
    },
    AudioDone {
        response_id: Option<String>,
    },
    SpeechStarted,
    SpeechStopped,
    ResponseDone {
        response_id: Option<String>,
    },
    Error {
        code: Option<String>,
        message: String,
    },
    Other,
}

/// Downstream error codes treated as benign (absorbed, counters reset).
pub fn is_benign_error(code: Option<&str>) -> bool {
    matches!(
        code,
        Some("input_audio_buffer_commit_empty") | Some("commit_empty")
    )
}

/// Session configuration sent right after the socket opens. Server-side
/// turn detection is the documented assumption the commit guards back up.
pub fn session_update(cfg: &RealtimeConfig) -> Value {
    json!({
        "type": "session.update",
        "session": {
            "instructions": cfg.instructions,
            "voice": cfg.voice,
            "modalities": ["audio", "text"],
            "input_audio_format": cfg.input_audio_format,
            "output_audio_format": cfg.output_audio_format,
            "turn_detection": { "type": "server_vad" },
        }
    })
}

pub fn append_audio(pcm: &[u8]) -> Value {
    json!({
        "type": "input_audio_buffer.append",
        "audio": base64::engine::general_purpose::STANDARD.encode(pcm),
    })
}

pub fn commit() -> Value {
    json!({ "type": "input_audio_buffer.commit" })
}

pub fn response_create() -> Value {
    json!({
        "type": "response.create",
        "response": { "modalities": ["audio", "text"] }
    })
}

pub fn response_cancel(response_id: &str) -> Value {
    json!({
        "type": "response.cancel",
        "response_id": response_id,
    })
}

pub fn parse_event(raw: &str) -> RealtimeEvent {
    let v: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => return RealtimeEvent::Other,
    };

    match v["type"].as_str().unwrap_or("") {
        "session.created" => RealtimeEvent::SessionCreated,
        "response.created" => match v["response"]["id"].as_str() {
            Some(id) => RealtimeEvent::ResponseCreated {
                response_id: id.to_string(),
            },
            None => RealtimeEvent::Other,
        },
        "response.audio.delta" | "response.output_audio.delta" => {
            let b64 = v["delta"]
                .as_str()
                .or_else(|| v["audio"].as_str())
                .unwrap_or("");
            match base64::engine::general_purpose::STANDARD.decode(b64) {
                Ok(audio) => RealtimeEvent::AudioDelta {
                    response_id: event_response_id(&v),
                    audio,
                },
                Err(_) => RealtimeEvent::Other,
            }
        }
        "response.audio.done" | "response.output_audio.done" => RealtimeEvent::AudioDone {
            response_id: event_response_id(&v),
        },
        "input_audio_buffer.speech_started" => RealtimeEvent::SpeechStarted,
        "input_audio_buffer.speech_stopped" => RealtimeEvent::SpeechStopped,
        "response.done" | "response.cancelled" => RealtimeEvent::ResponseDone {
            response_id: v["response"]["id"]
                .as_str()
                .map(|s| s.to_string())
                .or_else(|| event_response_id(&v)),
        },
        "error" => RealtimeEvent::Error {
            code: v["error"]["code"].as_str().map(|s| s.to_string()),
            message: v["error"]["message"]
                .as_str()
                .or_else(|| v["message"].as_str())
                .unwrap_or("realtime error")
                .to_string(),
        },
        _ => RealtimeEvent::Other,
    }
}

fn event_response_id(v: &Value) -> Option<String> {
    v["response_id"].as_str().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_tagged_audio_delta() {
        let raw = r#"{"type":"response.audio.delta","response_id":"r1","delta":"AAA="}"#;
        match parse_event(raw) {
            RealtimeEvent::AudioDelta { response_id, audio } => {
                assert_eq!(response_id.as_deref(), Some("r1"));
                assert_eq!(audio.len(), 2);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parses_error_with_code() {
        let raw = r#"{"type":"error","error":{"code":"input_audio_buffer_commit_empty","message":"buffer empty"}}"#;
        match parse_event(raw) {
            RealtimeEvent::Error { code, message } => {
                assert!(is_benign_error(code.as_deref()));
                assert_eq!(message, "buffer empty");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_events_are_other() {
        assert_eq!(
            parse_event(r#"{"type":"rate_limits.updated"}"#),
            RealtimeEvent::Other
        );
        assert_eq!(parse_event("not json"), RealtimeEvent::Other);
    }
}
