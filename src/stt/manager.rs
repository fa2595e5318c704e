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

use super::channel::{AudioDisposition, RetryVerdict, SttChannel, SttState};
use super::wire;
use super::SttLinkEvent;
use crate::config::SttConfig;
use crate::session::SessionEvent;

/// Frames the dispatch loop hands to the link writer.
#[derive(Debug)]
pub enum SttOutbound {
    Audio(Vec<u8>),
    Close,
}

/// Coordinator-facing outcome of a link failure.
#[derive(Debug, PartialEq, Eq)]
pub enum SttFailure {
    Retrying { attempt: u32 },
    /// Retry budget exhausted; transcription is gone for this session
    Unavailable,
    Ignored,
}

/// Owns the lifecycle of the streaming STT link for one session: lazy
/// connect on the first audio frame, pre-ready buffering, reconnects, and
/// the keep-alive. All socket I/O lives in a spawned task; state changes
/// come back through the session event channel and are applied here, on
/// the dispatch loop.
pub struct SttManager {
    channel: SttChannel,
    cfg: SttConfig,
    events: mpsc::Sender<SessionEvent>,
    out_tx: Option<mpsc::Sender<SttOutbound>>,
    link_task: Option<JoinHandle<()>>,
}

impl SttManager {
    pub fn new(cfg: SttConfig, events: mpsc::Sender<SessionEvent>) -> Self {
        Self {
            channel: SttChannel::from_config(&cfg),
            cfg,
            events,
            out_tx: None,
            link_task: None,
        }
    }

    pub fn state(&self) -> SttState {
        self.channel.state()
    }

    /// Route one client audio chunk. The first chunk triggers the connect;
    /// until the service confirms open, chunks queue (bounded, oldest-drop).
    pub fn send_audio(&mut self, chunk: Vec<u8>) {
        if self.channel.state() == SttState::NotInitialized && self.channel.begin_connect() {
            info!("First audio frame; opening STT link");
            self.spawn_link();
        }

        match self.channel.accept_audio(chunk) {
            AudioDisposition::Forward(bytes) => {
                if let Some(tx) = &self.out_tx {
                    if tx.try_send(SttOutbound::Audio(bytes)).is_err() {
                        warn!("STT writer backlogged; dropping audio chunk");
                    }
                }
            }
            AudioDisposition::Queued => {}
            AudioDisposition::QueuedDroppedOldest => {
                warn!(
                    "STT pending queue full ({} chunks); dropped oldest",
                    self.channel.pending_len()
                );
            }
            AudioDisposition::Discarded => {
                debug!("STT link closed; audio chunk discarded");
            }
        }
    }

    /// Service confirmed open: flush everything queued before readiness,
    /// in arrival order, exactly once.
    pub fn on_opened(&mut self, tx: mpsc::Sender<SttOutbound>) -> bool {
        match self.channel.mark_ready() {
            Some(pending) => {
                if !pending.is_empty() {
                    info!("STT link ready; flushing {} queued chunks", pending.len());
                }
                for chunk in pending {
                    if tx.try_send(SttOutbound::Audio(chunk)).is_err() {
                        warn!("STT writer backlogged during flush; dropping chunk");
                    }
                }
                self.out_tx = Some(tx);
                true
            }
            None => {
                // Stale open (e.g. after teardown); tell the task to close.
                let _ = tx.try_send(SttOutbound::Close);
                false
            }
        }
    }

    /// Link failed or was closed by the service. Schedules a backoff retry
    /// until the budget runs out, then reports transcription unavailable.
    pub fn on_failed(&mut self, message: &str) -> SttFailure {
        self.out_tx = None;
        match self.channel.mark_error() {
            RetryVerdict::RetryAfter { delay, attempt } => {
                warn!(
                    "STT link failed ({}); reconnect attempt {} in {:?}",
                    message, attempt, delay
                );
                let events = self.events.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(SessionEvent::Stt(SttLinkEvent::Retry)).await;
                });
                SttFailure::Retrying { attempt }
            }
            RetryVerdict::GiveUp => {
                warn!("STT link failed ({}); retry budget exhausted", message);
                SttFailure::Unavailable
            }
            RetryVerdict::Ignored => SttFailure::Ignored,
        }
    }

    /// Backoff elapsed; reconnect.
    pub fn on_retry(&mut self) {
        if self.channel.begin_connect() {
            self.spawn_link();
        }
    }

    /// Idempotent teardown: close the link, drop queued audio, stop tasks.
    pub fn shutdown(&mut self) {
        self.channel.close();
        if let Some(tx) = self.out_tx.take() {
            let _ = tx.try_send(SttOutbound::Close);
        }
        // Give the link task a chance to drain the Close frame and shut
        // the socket down cleanly; abort only if it hangs.
        if let Some(mut task) = self.link_task.take() {
            tokio::spawn(async move {
                if timeout(Duration::from_secs(2), &mut task).await.is_err() {
                    warn!("STT link did not drain in time; aborting");
                    task.abort();
                }
            });
        }
    }

    fn spawn_link(&mut self) {
        let cfg = self.cfg.clone();
        let events = self.events.clone();
        self.link_task = Some(tokio::spawn(async move {
            run_link(cfg, events).await;
        }));
    }
}

/// The writer channel must absorb a full pre-ready flush in one burst,
/// so its capacity tracks the pending-queue bound.
fn outbound_capacity(max_pending: usize) -> usize {
    (max_pending + 1).max(64)
}

async fn run_link(cfg: SttConfig, events: mpsc::Sender<SessionEvent>) {
    let fail = |message: String| {
        let events = events.clone();
        async move {
            let _ = events
                .send(SessionEvent::Stt(SttLinkEvent::Failed { message }))
                .await;
        }
    };

    let api_key = match std::env::var(&cfg.api_key_env) {
        Ok(key) => key,
        Err(_) => {
            fail(format!("STT API key not set ({})", cfg.api_key_env)).await;
            return;
        }
    };

    let url = wire::listen_url(&cfg);
    let mut request = match url.clone().into_client_request() {
        Ok(r) => r,
        Err(e) => {
            fail(format!("Bad STT URL {}: {}", url, e)).await;
            return;
        }
    };
    match HeaderValue::from_str(&format!("Token {}", api_key)) {
        Ok(value) => {
            request.headers_mut().insert("Authorization", value);
        }
        Err(e) => {
            fail(format!("Invalid STT API key: {}", e)).await;
            return;
        }
    }

    let connect_ceiling = Duration::from_secs(cfg.connect_timeout_secs);
    let ws = match timeout(connect_ceiling, connect_async(request)).await {
        Ok(Ok((ws, _))) => ws,
        Ok(Err(e)) => {
            fail(format!("STT connect failed: {}", e)).await;
            return;
        }
        Err(_) => {
            fail(format!(
                "STT service did not confirm open within {}s",
                cfg.connect_timeout_secs
            ))
            .await;
            return;
        }
    };

    info!("Connected to STT service");

    let (mut sink, mut stream) = ws.split();
    let (out_tx, mut out_rx) =
        mpsc::channel::<SttOutbound>(outbound_capacity(cfg.max_pending_chunks));
    if events
        .send(SessionEvent::Stt(SttLinkEvent::Opened(out_tx)))
        .await
        .is_err()
    {
        return; // session already gone
    }

    // Keep-alive only while ready; reset by every successful audio send so
    // an active stream never wastes frames on it.
    let keepalive_period = Duration::from_secs(cfg.keepalive_secs.max(1));
    let mut keepalive =
        tokio::time::interval_at(tokio::time::Instant::now() + keepalive_period, keepalive_period);

    loop {
        tokio::select! {
            out = out_rx.recv() => match out {
                Some(SttOutbound::Audio(bytes)) => {
                    if sink.send(Message::Binary(bytes)).await.is_err() {
                        fail("STT send failed".to_string()).await;
                        return;
                    }
                    keepalive.reset();
                }
                Some(SttOutbound::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                }
            },
            _ = keepalive.tick() => {
                if sink.send(Message::Text(wire::keepalive_frame())).await.is_err() {
                    fail("STT keep-alive send failed".to_string()).await;
                    return;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(transcript) = wire::parse_transcript(&text) {
                        if events
                            .send(SessionEvent::Stt(SttLinkEvent::Transcript(transcript)))
                            .await
                            .is_err()
                        {
                            return;
                        }
                        keepalive.reset();
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    fail("STT service closed the connection".to_string()).await;
                    return;
                }
                Some(Err(e)) => {
                    fail(format!("STT socket error: {}", e)).await;
                    return;
                }
                _ => {}
            },
        }
    }
}
