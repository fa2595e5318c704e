use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::suggest::Suggestion;

/// JSON object keys are always strings; serde_json converts them back to
/// integer map keys, but that conversion is lost inside internally tagged
/// enums (the tag buffering erases the format-specific key handling), so
/// the parse is done explicitly here.
fn deserialize_u32_keyed_map<'de, D>(deserializer: D) -> Result<HashMap<u32, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = HashMap::<String, String>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| {
            key.parse::<u32>()
                .map(|key| (key, value))
                .map_err(serde::de::Error::custom)
        })
        .collect()
}

/// Control/audio messages sent by the client over the session WebSocket.
///
/// Audio bytes cross the JSON boundary base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Establish the session: meeting/voice context plus optional initial
    /// speaker-index → display-name hints. No downstream connection is
    /// opened yet.
    Init {
        #[serde(default)]
        context: String,
        #[serde(
            default,
            rename = "speakerHints",
            deserialize_with = "deserialize_u32_keyed_map"
        )]
        speaker_hints: HashMap<u32, String>,
    },

    /// Map a diarized speaker index to a display name
    MapSpeaker {
        #[serde(rename = "speakerId")]
        speaker_id: u32,
        name: String,
    },

    /// One chunk of linear PCM audio, base64-encoded
    Audio { audio: String },

    StartConversation,
    StopConversation,

    /// Tear down the whole session
    Stop,
}

/// Events the relay sends back to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Session initialized and accepting audio
    Ready,

    /// The streaming STT link confirmed open
    TranscriptionReady,

    /// One transcription result, forwarded unbatched
    Transcript {
        speaker: String,
        text: String,
        confidence: f32,
        #[serde(rename = "isUser")]
        is_user: bool,
        #[serde(rename = "speakerId")]
        speaker_id: Option<u32>,
        timestamp: DateTime<Utc>,
    },

    /// Zero or more suggestions from one analysis cycle
    Suggestions {
        list: Vec<Suggestion>,
        timestamp: DateTime<Utc>,
    },

    /// Speaker mapping confirmation echo
    SpeakerMapped {
        #[serde(rename = "speakerId")]
        speaker_id: u32,
        name: String,
    },

    /// The speech-to-speech session is live
    ConversationReady,

    /// The speech-to-speech session was shut down
    ConversationStopped,

    /// One chunk of AI speech audio, base64-encoded
    RealtimeAudio { audio: String },

    /// The current AI response finished producing audio
    RealtimeAudioDone,

    /// An in-flight AI response was cancelled. Emitted with `immediate`
    /// true the moment the cancel is issued (barge-in, ahead of
    /// confirmation) and false once the downstream service confirms it
    RealtimeResponseCancelled { immediate: bool },

    /// Session fully stopped, all downstream links released
    Stopped,

    Error {
        message: String,
        #[serde(rename = "canRetry")]
        can_retry: bool,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>, can_retry: bool) -> Self {
        Self::Error {
            message: message.into(),
            can_retry,
        }
    }
}
