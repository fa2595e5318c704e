use serde_json::{json, Value};

use crate::config::SttConfig;

/// One transcription result off the wire.
#[derive(Debug, Clone)]
pub struct SttTranscript {
    pub text: String,
    pub confidence: f32,

    /// Diarized speaker index, when the service attributes one
    pub speaker: Option<u32>,
}

/// Streaming listen URL with the PCM contract the client sends us.
pub fn listen_url(cfg: &SttConfig) -> String {
    format!(
        "{}?model={}&encoding=linear16&sample_rate={}&channels={}&diarize=true&punctuate=true&interim_results=false",
        cfg.url, cfg.model, cfg.sample_rate, cfg.channels
    )
}

/// Keep-alive text frame, sent only while the link is ready.
pub fn keepalive_frame() -> String {
    json!({ "type": "KeepAlive" }).to_string()
}

/// Parse a service message into a transcript, ignoring everything that is
/// not a non-empty result (metadata, keep-alive echoes, empty interim).
pub fn parse_transcript(raw: &str) -> Option<SttTranscript> {
    let v: Value = serde_json::from_str(raw).ok()?;
    if v["type"].as_str() != Some("Results") {
        return None;
    }

    let alt = &v["channel"]["alternatives"][0];
    let text = alt["transcript"].as_str()?.trim();
    if text.is_empty() {
        return None;
    }

    Some(SttTranscript {
        text: text.to_string(),
        confidence: alt["confidence"].as_f64().unwrap_or(0.0) as f32,
        speaker: alt["words"][0]["speaker"].as_u64().map(|s| s as u32),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_diarized_result() {
        let raw = r#"{
            "type": "Results",
            "is_final": true,
            "channel": {
                "alternatives": [{
                    "transcript": "let's review the numbers",
                    "confidence": 0.97,
                    "words": [{"word": "let's", "speaker": 1}]
                }]
            }
        }"#;

        let t = parse_transcript(raw).unwrap();
        assert_eq!(t.text, "let's review the numbers");
        assert_eq!(t.speaker, Some(1));
        assert!((t.confidence - 0.97).abs() < 1e-6);
    }

    #[test]
    fn test_ignores_metadata_and_empty_results() {
        assert!(parse_transcript(r#"{"type":"Metadata"}"#).is_none());
        let empty = r#"{"type":"Results","channel":{"alternatives":[{"transcript":"  "}]}}"#;
        assert!(parse_transcript(empty).is_none());
        assert!(parse_transcript("not json").is_none());
    }
}
