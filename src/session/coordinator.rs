use axum::extract::ws::{Message, WebSocket};
use base64::Engine;
use chrono::Utc;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::messages::{ClientMessage, ServerEvent};
use super::transcript::{TranscriptBuffer, TranscriptEntry};
use super::SessionEvent;
use crate::config::RelayConfig;
use crate::providers::{LlmClient, SearchClient};
use crate::realtime::{ConversationManager, RealtimeLinkEvent, RealtimeOutbound};
use crate::stt::{SttFailure, SttLinkEvent, SttManager, SttOutbound, SttTranscript};
use crate::suggest::{self, SuggestionEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Active,
    Stopped,
}

/// One coordinator per client connection. Demultiplexes inbound
/// control/audio messages to the STT and conversation managers and
/// multiplexes their events back to the client. Owns every piece of
/// session state; nothing is shared across sessions.
pub struct SessionCoordinator {
    id: String,
    state: SessionState,
    context: String,
    speakers: HashMap<u32, String>,
    transcript: TranscriptBuffer,
    stt: Option<SttManager>,
    conversation: Option<ConversationManager>,
    engine: SuggestionEngine,
    cfg: Arc<RelayConfig>,
    llm: Arc<dyn LlmClient>,
    search: Arc<dyn SearchClient>,
    events_tx: mpsc::Sender<SessionEvent>,
    analysis_task: Option<JoinHandle<()>>,
}

impl SessionCoordinator {
    pub fn new(
        id: String,
        cfg: Arc<RelayConfig>,
        llm: Arc<dyn LlmClient>,
        search: Arc<dyn SearchClient>,
        events_tx: mpsc::Sender<SessionEvent>,
    ) -> Self {
        let engine = SuggestionEngine::new(cfg.suggest.clone());
        let transcript = TranscriptBuffer::new(cfg.suggest.buffer_capacity);
        Self {
            id,
            state: SessionState::Initializing,
            context: String::new(),
            speakers: HashMap::new(),
            transcript,
            stt: None,
            conversation: None,
            engine,
            cfg,
            llm,
            search,
            events_tx,
            analysis_task: None,
        }
    }

    /// Drive the session until the client stops it or the transport closes.
    pub async fn run(mut self, socket: WebSocket, mut events_rx: mpsc::Receiver<SessionEvent>) {
        info!("Session {} connected", self.id);

        let (mut ws_tx, mut ws_rx) = socket.split();

        loop {
            tokio::select! {
                msg = ws_rx.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        let parsed: Result<ClientMessage, _> = serde_json::from_str(&text);
                        match parsed {
                            Ok(message) => {
                                let stopping = matches!(message, ClientMessage::Stop);
                                let replies = self.handle_client(message);
                                if !send_all(&mut ws_tx, replies).await {
                                    break;
                                }
                                if stopping {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!("Session {}: unrecognized message ({})", self.id, e);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Session {} transport closed", self.id);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("Session {} transport error: {}", self.id, e);
                        break;
                    }
                    _ => {}
                },
                Some(event) = events_rx.recv() => {
                    let replies = self.handle_event(event);
                    if !send_all(&mut ws_tx, replies).await {
                        break;
                    }
                }
            }
        }

        self.teardown();
    }

    fn handle_client(&mut self, message: ClientMessage) -> Vec<ServerEvent> {
        match message {
            ClientMessage::Init {
                context,
                speaker_hints,
            } => {
                if self.state != SessionState::Initializing {
                    warn!("Session {}: duplicate init ignored", self.id);
                    return Vec::new();
                }
                self.context = context;
                self.speakers = speaker_hints;
                self.state = SessionState::Active;
                info!("Session {} initialized", self.id);
                vec![ServerEvent::Ready]
            }

            // Stop is honored in any state; teardown is idempotent.
            ClientMessage::Stop => {
                self.teardown();
                vec![ServerEvent::Stopped]
            }

            message if self.state != SessionState::Active => {
                warn!(
                    "Session {}: {} before init; ignored",
                    self.id,
                    kind_of(&message)
                );
                Vec::new()
            }

            ClientMessage::MapSpeaker { speaker_id, name } => {
                self.speakers.insert(speaker_id, name.clone());
                vec![ServerEvent::SpeakerMapped { speaker_id, name }]
            }

            ClientMessage::Audio { audio } => {
                let bytes = match base64::engine::general_purpose::STANDARD.decode(&audio) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!("Session {}: undecodable audio ignored ({})", self.id, e);
                        return Vec::new();
                    }
                };

                // Conversation mode claims the microphone; otherwise the
                // frame goes to transcription, creating the link lazily.
                if let Some(conversation) = &mut self.conversation {
                    if conversation.is_active() {
                        conversation.send_audio(&bytes);
                        return Vec::new();
                    }
                }
                let stt_cfg = self.cfg.stt.clone();
                let events = self.events_tx.clone();
                self.stt
                    .get_or_insert_with(|| SttManager::new(stt_cfg, events))
                    .send_audio(bytes);
                Vec::new()
            }

            ClientMessage::StartConversation => {
                let realtime_cfg = self.cfg.realtime.clone();
                let events = self.events_tx.clone();
                let conversation = self
                    .conversation
                    .get_or_insert_with(|| ConversationManager::new(realtime_cfg, events));
                if conversation.is_active() {
                    warn!("Session {}: conversation already running", self.id);
                    return Vec::new();
                }
                conversation.connect();
                Vec::new()
            }

            ClientMessage::StopConversation => match self.conversation.take() {
                Some(mut conversation) => {
                    conversation.stop();
                    vec![ServerEvent::ConversationStopped]
                }
                None => {
                    warn!("Session {}: no conversation to stop", self.id);
                    Vec::new()
                }
            },
        }
    }

    fn handle_event(&mut self, event: SessionEvent) -> Vec<ServerEvent> {
        match event {
            SessionEvent::Stt(SttLinkEvent::Opened(tx)) => match &mut self.stt {
                Some(stt) => {
                    if stt.on_opened(tx) {
                        vec![ServerEvent::TranscriptionReady]
                    } else {
                        Vec::new()
                    }
                }
                None => {
                    let _ = tx.try_send(SttOutbound::Close);
                    Vec::new()
                }
            },

            SessionEvent::Stt(SttLinkEvent::Transcript(transcript)) => {
                self.on_transcript(transcript)
            }

            SessionEvent::Stt(SttLinkEvent::Failed { message }) => {
                match self.stt.as_mut().map(|stt| stt.on_failed(&message)) {
                    Some(SttFailure::Unavailable) => vec![ServerEvent::error(
                        "Transcription is unavailable for this session",
                        false,
                    )],
                    _ => Vec::new(),
                }
            }

            SessionEvent::Stt(SttLinkEvent::Retry) => {
                if let Some(stt) = &mut self.stt {
                    stt.on_retry();
                }
                Vec::new()
            }

            SessionEvent::Realtime(RealtimeLinkEvent::Opened(tx)) => {
                match &mut self.conversation {
                    Some(conversation) => conversation.on_opened(tx),
                    None => {
                        let _ = tx.try_send(RealtimeOutbound::Close);
                    }
                }
                Vec::new()
            }

            SessionEvent::Realtime(RealtimeLinkEvent::Event(event)) => self
                .conversation
                .as_mut()
                .map(|c| c.handle(event))
                .unwrap_or_default(),

            SessionEvent::Realtime(RealtimeLinkEvent::Failed { message }) => self
                .conversation
                .as_mut()
                .map(|c| vec![c.on_failed(&message)])
                .unwrap_or_default(),

            SessionEvent::Realtime(RealtimeLinkEvent::RetryResponse) => {
                if let Some(conversation) = &mut self.conversation {
                    conversation.try_create_response();
                }
                Vec::new()
            }

            SessionEvent::AnalysisDone(candidates) => {
                let list = self.engine.admit(candidates);
                if list.is_empty() {
                    Vec::new()
                } else {
                    info!("Session {}: emitting {} suggestions", self.id, list.len());
                    vec![ServerEvent::Suggestions {
                        list,
                        timestamp: Utc::now(),
                    }]
                }
            }
        }
    }

    /// One transcription result: resolve the speaker, append to the
    /// buffer, forward immediately (never batched), then check whether an
    /// analysis cycle is due.
    fn on_transcript(&mut self, transcript: SttTranscript) -> Vec<ServerEvent> {
        let speaker = match transcript.speaker {
            Some(idx) => self
                .speakers
                .get(&idx)
                .cloned()
                .unwrap_or_else(|| format!("Speaker {}", idx + 1)),
            None => "Speaker 1".to_string(),
        };
        // The session owner maps their own diarized index to "You".
        let is_user = speaker.eq_ignore_ascii_case("you");
        let timestamp = Utc::now();

        self.transcript.append(TranscriptEntry {
            speaker: speaker.clone(),
            text: transcript.text.clone(),
            is_user,
            timestamp,
        });
        self.engine.note_entry();

        if self.engine.should_analyze(self.transcript.len()) {
            self.engine.note_cycle_started();
            self.spawn_analysis();
        }

        vec![ServerEvent::Transcript {
            speaker,
            text: transcript.text,
            confidence: transcript.confidence,
            is_user,
            speaker_id: transcript.speaker,
            timestamp,
        }]
    }

    /// Run one analysis cycle off the transcript path. The result comes
    /// back through the event channel; the dedup store is only touched on
    /// the dispatch loop.
    fn spawn_analysis(&mut self) {
        let llm = Arc::clone(&self.llm);
        let search = Arc::clone(&self.search);
        let cfg = self.cfg.suggest.clone();
        let context = self.context.clone();
        let entries = self.transcript.recent(cfg.window);
        let events = self.events_tx.clone();

        if let Some(previous) = self.analysis_task.take() {
            previous.abort();
        }
        self.analysis_task = Some(tokio::spawn(async move {
            let candidates = suggest::analyze(llm, search, cfg, context, entries).await;
            let _ = events.send(SessionEvent::AnalysisDone(candidates)).await;
        }));
    }

    /// Release both downstream connections exactly once, even if they were
    /// never fully established. Safe to call repeatedly.
    fn teardown(&mut self) {
        if self.state == SessionState::Stopped {
            debug!("Session {} already stopped", self.id);
            return;
        }
        info!("Session {} stopping", self.id);

        if let Some(mut stt) = self.stt.take() {
            stt.shutdown();
        }
        if let Some(mut conversation) = self.conversation.take() {
            conversation.stop();
        }
        if let Some(task) = self.analysis_task.take() {
            task.abort();
        }
        self.transcript.clear();
        self.state = SessionState::Stopped;
        info!("Session {} stopped", self.id);
    }
}

fn kind_of(message: &ClientMessage) -> &'static str {
    match message {
        ClientMessage::Init { .. } => "init",
        ClientMessage::MapSpeaker { .. } => "map_speaker",
        ClientMessage::Audio { .. } => "audio",
        ClientMessage::StartConversation => "start_conversation",
        ClientMessage::StopConversation => "stop_conversation",
        ClientMessage::Stop => "stop",
    }
}

async fn send_all(ws_tx: &mut SplitSink<WebSocket, Message>, events: Vec<ServerEvent>) -> bool {
    for event in events {
        let payload = match serde_json::to_string(&event) {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to serialize server event: {}", e);
                continue;
            }
        };
        if ws_tx.send(Message::Text(payload)).await.is_err() {
            return false;
        }
    }
    true
}
