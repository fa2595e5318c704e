use std::time::{Duration, Instant};

use crate::config::RealtimeConfig;

/// Lifecycle of one duplex speech-to-speech link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    Disconnected,
    Connecting,
    SessionReady,
    Speaking,
    Cancelling,
}

/// Decision on a "speak now" request.
#[derive(Debug, PartialEq, Eq)]
pub enum ResponseGate {
    /// Nothing in flight; create the response
    Proceed,

    /// A response is speaking or cancelling; retry after this delay
    Defer { delay: Duration },

    /// Retry budget spent; flags were force-cleared so the session makes
    /// forward progress instead of deadlocking
    ForceProceed,
}

/// Classification of a `response.done`-style event.
#[derive(Debug, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// The active response finished normally
    ActiveFinished,

    /// The service confirmed the cancellation we issued
    CancelConfirmed,

    /// A response we no longer track; ignore
    Stale,
}

/// Pure state machine for the conversation link. Tracks the single
/// in-flight response, the id whose late audio must be discarded after a
/// barge-in, and the uncommitted-audio guards that make a manual commit
/// safe under server-side turn detection.
#[derive(Debug)]
pub struct ConversationChannel {
    state: ConversationState,
    active_response: Option<String>,
    cancelled_response: Option<String>,
    uncommitted_bytes: usize,
    last_commit: Option<Instant>,
    min_commit_bytes: usize,
    commit_interval: Duration,
    response_retries: u32,
    max_response_retries: u32,
    retry_delay: Duration,
}

impl ConversationChannel {
    pub fn new(
        min_commit_bytes: usize,
        commit_interval: Duration,
        max_response_retries: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            state: ConversationState::Disconnected,
            active_response: None,
            cancelled_response: None,
            uncommitted_bytes: 0,
            last_commit: None,
            min_commit_bytes,
            commit_interval,
            response_retries: 0,
            max_response_retries,
            retry_delay,
        }
    }

    pub fn from_config(cfg: &RealtimeConfig) -> Self {
        Self::new(
            cfg.min_commit_bytes,
            Duration::from_millis(cfg.commit_interval_ms),
            cfg.max_response_retries,
            Duration::from_millis(cfg.response_retry_delay_ms),
        )
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn active_response(&self) -> Option<&str> {
        self.active_response.as_deref()
    }

    pub fn cancelled_response(&self) -> Option<&str> {
        self.cancelled_response.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.state != ConversationState::Disconnected
    }

    pub fn uncommitted_bytes(&self) -> usize {
        self.uncommitted_bytes
    }

    /// `Disconnected → Connecting`.
    pub fn begin_connect(&mut self) -> bool {
        if self.state != ConversationState::Disconnected {
            return false;
        }
        self.state = ConversationState::Connecting;
        true
    }

    /// `Connecting → SessionReady` once the service confirms the session.
    pub fn on_session_created(&mut self) -> bool {
        if self.state != ConversationState::Connecting {
            return false;
        }
        self.state = ConversationState::SessionReady;
        true
    }

    /// A response began. Rejected (false) when the id is one we already
    /// cancelled; such a response stays filtered.
    pub fn on_response_created(&mut self, response_id: &str) -> bool {
        if self.cancelled_response.as_deref() == Some(response_id) {
            return false;
        }
        self.active_response = Some(response_id.to_string());
        if matches!(
            self.state,
            ConversationState::SessionReady | ConversationState::Speaking
        ) {
            self.state = ConversationState::Speaking;
        }
        true
    }

    /// Audio deltas forward to the client only for the current,
    /// non-cancelled response.
    pub fn should_forward_delta(&self, response_id: Option<&str>) -> bool {
        match response_id {
            Some(id) => {
                self.cancelled_response.as_deref() != Some(id)
                    && self.active_response.as_deref() == Some(id)
            }
            // Untagged deltas trusted only while a response is speaking
            None => self.state == ConversationState::Speaking,
        }
    }

    /// Barge-in: the user started speaking while the AI was. Records the
    /// in-flight response as cancelled so its late audio is dropped, and
    /// returns the id a cancel must be issued for.
    pub fn on_speech_started(&mut self) -> Option<String> {
        if self.state != ConversationState::Speaking {
            return None;
        }
        let id = self.active_response.clone()?;
        self.cancelled_response = Some(id.clone());
        self.state = ConversationState::Cancelling;
        Some(id)
    }

    /// A response finished or its cancellation was confirmed.
    pub fn on_response_done(&mut self, response_id: Option<&str>) -> ResponseOutcome {
        let cancelled_match = match (response_id, self.cancelled_response.as_deref()) {
            (Some(id), Some(c)) => id == c,
            (None, Some(_)) => self.state == ConversationState::Cancelling,
            _ => false,
        };
        if cancelled_match {
            self.cancelled_response = None;
            if response_id.is_none() || self.active_response.as_deref() == response_id {
                self.active_response = None;
            }
            if self.state == ConversationState::Cancelling {
                self.state = ConversationState::SessionReady;
            }
            return ResponseOutcome::CancelConfirmed;
        }

        let active_match = match (response_id, self.active_response.as_deref()) {
            (Some(id), Some(a)) => id == a,
            (None, Some(_)) => true,
            _ => false,
        };
        if active_match {
            self.active_response = None;
            if self.state == ConversationState::Speaking {
                self.state = ConversationState::SessionReady;
            }
            return ResponseOutcome::ActiveFinished;
        }

        ResponseOutcome::Stale
    }

    pub fn note_audio_appended(&mut self, bytes: usize) {
        self.uncommitted_bytes += bytes;
    }

    /// Manual commits are guarded: enough bytes accumulated (an empty
    /// commit is a downstream error) and not too soon after the last one.
    pub fn commit_allowed(&self) -> bool {
        self.uncommitted_bytes >= self.min_commit_bytes
            && self
                .last_commit
                .map_or(true, |at| at.elapsed() >= self.commit_interval)
    }

    pub fn note_committed(&mut self) {
        self.uncommitted_bytes = 0;
        self.last_commit = Some(Instant::now());
    }

    /// Benign empty-buffer commit rejection: absorb, reset the counter.
    pub fn note_commit_rejected_empty(&mut self) {
        self.uncommitted_bytes = 0;
    }

    /// Gate a response request: defer while a response is speaking or
    /// cancelling, up to the retry budget, then force the flags clear.
    pub fn request_response(&mut self) -> ResponseGate {
        match self.state {
            ConversationState::Speaking | ConversationState::Cancelling => {
                if self.response_retries >= self.max_response_retries {
                    self.active_response = None;
                    self.cancelled_response = None;
                    self.state = ConversationState::SessionReady;
                    self.response_retries = 0;
                    ResponseGate::ForceProceed
                } else {
                    self.response_retries += 1;
                    ResponseGate::Defer {
                        delay: self.retry_delay,
                    }
                }
            }
            _ => {
                self.response_retries = 0;
                ResponseGate::Proceed
            }
        }
    }

    /// Full reset so a reused session object cannot leak state into a
    /// future connection.
    pub fn reset(&mut self) {
        self.state = ConversationState::Disconnected;
        self.active_response = None;
        self.cancelled_response = None;
        self.uncommitted_bytes = 0;
        self.last_commit = None;
        self.response_retries = 0;
    }
}
