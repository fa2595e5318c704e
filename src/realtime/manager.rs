use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::channel::{ConversationChannel, ConversationState, ResponseGate, ResponseOutcome};
use super::wire::{self, RealtimeEvent};
use super::RealtimeLinkEvent;
use crate::config::RealtimeConfig;
use crate::session::messages::ServerEvent;
use crate::session::SessionEvent;

/// Frames handed to the conversation link writer.
#[derive(Debug)]
pub enum RealtimeOutbound {
    Json(serde_json::Value),
    Close,
}

/// Owns the duplex link to the speech-to-speech service for one session:
/// audio relay both ways, barge-in cancellation, response ordering, and
/// full state reset on teardown. Socket I/O runs in a spawned task; every
/// state change is applied here on the session dispatch loop.
pub struct ConversationManager {
    channel: ConversationChannel,
    cfg: RealtimeConfig,
    events: mpsc::Sender<SessionEvent>,
    out_tx: Option<mpsc::Sender<RealtimeOutbound>>,
    link_task: Option<JoinHandle<()>>,
}

impl ConversationManager {
    pub fn new(cfg: RealtimeConfig, events: mpsc::Sender<SessionEvent>) -> Self {
        Self {
            channel: ConversationChannel::from_config(&cfg),
            cfg,
            events,
            out_tx: None,
            link_task: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.channel.is_active()
    }

    /// Open the downstream link. No-op unless disconnected.
    pub fn connect(&mut self) {
        if !self.channel.begin_connect() {
            warn!("Conversation already connecting or active; ignoring");
            return;
        }
        info!("Opening conversation link");
        let cfg = self.cfg.clone();
        let events = self.events.clone();
        self.link_task = Some(tokio::spawn(async move {
            run_link(cfg, events).await;
        }));
    }

    pub fn on_opened(&mut self, tx: mpsc::Sender<RealtimeOutbound>) {
        if self.channel.state() == ConversationState::Disconnected {
            // Stale open after teardown
            let _ = tx.try_send(RealtimeOutbound::Close);
            return;
        }
        self.out_tx = Some(tx);
    }

    /// Relay one chunk of user audio into the downstream input buffer.
    pub fn send_audio(&mut self, pcm: &[u8]) {
        if !matches!(
            self.channel.state(),
            ConversationState::SessionReady
                | ConversationState::Speaking
                | ConversationState::Cancelling
        ) {
            debug!("Conversation not ready; dropping user audio chunk");
            return;
        }
        self.send_json(wire::append_audio(pcm));
        self.channel.note_audio_appended(pcm.len());
    }

    /// Apply one downstream event; returns the events to forward to the
    /// client.
    pub fn handle(&mut self, event: RealtimeEvent) -> Vec<ServerEvent> {
        match event {
            RealtimeEvent::SessionCreated => {
                if self.channel.on_session_created() {
                    info!("Conversation session ready");
                    vec![ServerEvent::ConversationReady]
                } else {
                    Vec::new()
                }
            }
            RealtimeEvent::ResponseCreated { response_id } => {
                if !self.channel.on_response_created(&response_id) {
                    debug!("Response {} was already cancelled at creation", response_id);
                }
                Vec::new()
            }
            RealtimeEvent::AudioDelta { response_id, audio } => {
                if self.channel.should_forward_delta(response_id.as_deref()) {
                    vec![ServerEvent::RealtimeAudio {
                        audio: base64_encode(&audio),
                    }]
                } else {
                    debug!(
                        "Dropping late audio delta for superseded response {:?}",
                        response_id
                    );
                    Vec::new()
                }
            }
            RealtimeEvent::AudioDone { response_id } => {
                if self.channel.should_forward_delta(response_id.as_deref()) {
                    vec![ServerEvent::RealtimeAudioDone]
                } else {
                    Vec::new()
                }
            }
            RealtimeEvent::SpeechStarted => {
                // Barge-in: cancel the in-flight response the moment the
                // user starts talking over it.
                if let Some(id) = self.channel.on_speech_started() {
                    info!("Barge-in; cancelling response {}", id);
                    self.send_json(wire::response_cancel(&id));
                    vec![ServerEvent::RealtimeResponseCancelled { immediate: true }]
                } else {
                    Vec::new()
                }
            }
            RealtimeEvent::SpeechStopped => {
                self.try_create_response();
                Vec::new()
            }
            RealtimeEvent::ResponseDone { response_id } => {
                match self.channel.on_response_done(response_id.as_deref()) {
                    ResponseOutcome::CancelConfirmed => {
                        debug!("Cancellation confirmed for {:?}", response_id);
                        vec![ServerEvent::RealtimeResponseCancelled { immediate: false }]
                    }
                    ResponseOutcome::ActiveFinished => {
                        debug!("Response {:?} finished", response_id);
                        Vec::new()
                    }
                    ResponseOutcome::Stale => {
                        debug!("Stale response.done for {:?}", response_id);
                        Vec::new()
                    }
                }
            }
            RealtimeEvent::Error { code, message } => {
                if wire::is_benign_error(code.as_deref()) {
                    debug!("Benign conversation error absorbed: {}", message);
                    self.channel.note_commit_rejected_empty();
                    Vec::new()
                } else {
                    warn!("Conversation error: {}", message);
                    vec![ServerEvent::error(
                        format!("Voice conversation error: {}", message),
                        true,
                    )]
                }
            }
            RealtimeEvent::Other => Vec::new(),
        }
    }

    /// Request a spoken response, deferring while one is still speaking or
    /// cancelling; after the retry budget the flags are force-cleared.
    pub fn try_create_response(&mut self) {
        match self.channel.request_response() {
            ResponseGate::Proceed => self.send_json(wire::response_create()),
            ResponseGate::ForceProceed => {
                warn!("Response request retries exhausted; forcing flags clear");
                self.send_json(wire::response_create());
            }
            ResponseGate::Defer { delay } => {
                debug!("Response in flight; retrying request in {:?}", delay);
                let events = self.events.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events
                        .send(SessionEvent::Realtime(RealtimeLinkEvent::RetryResponse))
                        .await;
                });
            }
        }
    }

    /// Link failure: surface a recoverable error and reset for a future
    /// `start_conversation`.
    pub fn on_failed(&mut self, message: &str) -> ServerEvent {
        warn!("Conversation link failed: {}", message);
        self.out_tx = None;
        self.channel.reset();
        ServerEvent::error(format!("Voice conversation lost: {}", message), true)
    }

    /// Idempotent teardown: cancel anything in flight, flush the input
    /// buffer if enough audio accumulated, close the link, reset state.
    pub fn stop(&mut self) {
        if let Some(id) = self.channel.active_response().map(|s| s.to_string()) {
            self.send_json(wire::response_cancel(&id));
        }
        if self.channel.commit_allowed() {
            self.send_json(wire::commit());
            self.channel.note_committed();
        }
        if let Some(tx) = self.out_tx.take() {
            let _ = tx.try_send(RealtimeOutbound::Close);
        }
        // The link task must drain the queued cancel/commit/Close frames
        // before it goes away; abort only if it fails to exit in time.
        if let Some(mut task) = self.link_task.take() {
            tokio::spawn(async move {
                if timeout(Duration::from_secs(2), &mut task).await.is_err() {
                    warn!("Conversation link did not drain in time; aborting");
                    task.abort();
                }
            });
        }
        self.channel.reset();
    }

    fn send_json(&self, value: serde_json::Value) {
        if let Some(tx) = &self.out_tx {
            if tx.try_send(RealtimeOutbound::Json(value)).is_err() {
                warn!("Conversation writer backlogged; frame dropped");
            }
        }
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

async fn run_link(cfg: RealtimeConfig, events: mpsc::Sender<SessionEvent>) {
    let fail = |message: String| {
        let events = events.clone();
        async move {
            let _ = events
                .send(SessionEvent::Realtime(RealtimeLinkEvent::Failed { message }))
                .await;
        }
    };

    let api_key = match std::env::var(&cfg.api_key_env) {
        Ok(key) => key,
        Err(_) => {
            fail(format!("Realtime API key not set ({})", cfg.api_key_env)).await;
            return;
        }
    };

    let mut request = match cfg.url.clone().into_client_request() {
        Ok(r) => r,
        Err(e) => {
            fail(format!("Bad realtime URL {}: {}", cfg.url, e)).await;
            return;
        }
    };
    match HeaderValue::from_str(&format!("Bearer {}", api_key)) {
        Ok(value) => {
            let headers = request.headers_mut();
            headers.insert("Authorization", value);
            headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));
        }
        Err(e) => {
            fail(format!("Invalid realtime API key: {}", e)).await;
            return;
        }
    }

    let connect_ceiling = Duration::from_secs(cfg.connect_timeout_secs);
    let ws = match timeout(connect_ceiling, connect_async(request)).await {
        Ok(Ok((ws, _))) => ws,
        Ok(Err(e)) => {
            fail(format!("Realtime connect failed: {}", e)).await;
            return;
        }
        Err(_) => {
            fail(format!(
                "Realtime service did not open within {}s",
                cfg.connect_timeout_secs
            ))
            .await;
            return;
        }
    };

    info!("Connected to realtime voice service");

    let (mut sink, mut stream) = ws.split();

    // Configure the session before relaying anything.
    if sink
        .send(Message::Text(wire::session_update(&cfg).to_string()))
        .await
        .is_err()
    {
        fail("Failed to send session configuration".to_string()).await;
        return;
    }

    let (out_tx, mut out_rx) = mpsc::channel::<RealtimeOutbound>(64);
    if events
        .send(SessionEvent::Realtime(RealtimeLinkEvent::Opened(out_tx)))
        .await
        .is_err()
    {
        return; // session already gone
    }

    loop {
        tokio::select! {
            out = out_rx.recv() => match out {
                Some(RealtimeOutbound::Json(value)) => {
                    if sink.send(Message::Text(value.to_string())).await.is_err() {
                        fail("Realtime send failed".to_string()).await;
                        return;
                    }
                }
                Some(RealtimeOutbound::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let event = wire::parse_event(&text);
                    if event != RealtimeEvent::Other
                        && events
                            .send(SessionEvent::Realtime(RealtimeLinkEvent::Event(event)))
                            .await
                            .is_err()
                    {
                        return;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    fail("Realtime service closed the connection".to_string()).await;
                    return;
                }
                Some(Err(e)) => {
                    fail(format!("Realtime socket error: {}", e)).await;
                    return;
                }
                _ => {}
            },
        }
    }
}
