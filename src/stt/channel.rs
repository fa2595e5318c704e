use std::collections::VecDeque;
use std::time::Duration;

use crate::config::SttConfig;

/// Lifecycle of one streaming STT link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttState {
    NotInitialized,
    Connecting,
    Ready,
    Error,
    Closed,
}

/// What happened to one inbound audio chunk.
#[derive(Debug, PartialEq, Eq)]
pub enum AudioDisposition {
    /// Link ready; transmit now
    Forward(Vec<u8>),

    /// Link not ready; chunk buffered for the flush on `Ready`
    Queued,

    /// Buffered, but the queue was full and the oldest chunk was dropped
    QueuedDroppedOldest,

    /// Link permanently closed; chunk discarded
    Discarded,
}

/// Outcome of recording a link failure.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryVerdict {
    /// Reconnect after this backoff delay
    RetryAfter { delay: Duration, attempt: u32 },

    /// Retry budget exhausted; link is permanently closed
    GiveUp,

    /// Link was already closed; stale failure, nothing to do
    Ignored,
}

/// Pure state machine for the STT connection: pre-ready audio queue with
/// oldest-drop overflow, bounded reconnects with capped doubling backoff.
/// The async driver in `manager.rs` owns the socket; every transition goes
/// through here so invalid moves are rejected in one place.
#[derive(Debug)]
pub struct SttChannel {
    state: SttState,
    pending: VecDeque<Vec<u8>>,
    max_pending: usize,
    attempts: u32,
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl SttChannel {
    pub fn new(
        max_pending: usize,
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        Self {
            state: SttState::NotInitialized,
            pending: VecDeque::new(),
            max_pending: max_pending.max(1),
            attempts: 0,
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(cfg: &SttConfig) -> Self {
        Self::new(
            cfg.max_pending_chunks,
            cfg.max_reconnect_attempts,
            Duration::from_millis(cfg.reconnect_base_delay_ms),
            Duration::from_millis(cfg.reconnect_max_delay_ms),
        )
    }

    pub fn state(&self) -> SttState {
        self.state
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Audio only flows downstream while `Ready`; otherwise it queues, and
    /// a full queue drops its oldest chunk so the drop is an explicit,
    /// observable policy decision.
    pub fn accept_audio(&mut self, chunk: Vec<u8>) -> AudioDisposition {
        match self.state {
            SttState::Ready => AudioDisposition::Forward(chunk),
            SttState::Closed => AudioDisposition::Discarded,
            _ => {
                let dropped = if self.pending.len() >= self.max_pending {
                    self.pending.pop_front();
                    true
                } else {
                    false
                };
                self.pending.push_back(chunk);
                if dropped {
                    AudioDisposition::QueuedDroppedOldest
                } else {
                    AudioDisposition::Queued
                }
            }
        }
    }

    /// `NotInitialized | Error → Connecting`. Returns false (and changes
    /// nothing) from any other state.
    pub fn begin_connect(&mut self) -> bool {
        match self.state {
            SttState::NotInitialized | SttState::Error => {
                self.state = SttState::Connecting;
                true
            }
            _ => false,
        }
    }

    /// `Connecting → Ready`. Drains the pending queue, in arrival order,
    /// exactly once; resets the reconnect budget. Returns `None` on an
    /// invalid transition.
    pub fn mark_ready(&mut self) -> Option<Vec<Vec<u8>>> {
        if self.state != SttState::Connecting {
            return None;
        }
        self.state = SttState::Ready;
        self.attempts = 0;
        Some(self.pending.drain(..).collect())
    }

    /// Record a link failure and decide the retry. The delay doubles per
    /// attempt, capped; past the budget the link closes for good.
    pub fn mark_error(&mut self) -> RetryVerdict {
        if self.state == SttState::Closed {
            return RetryVerdict::Ignored;
        }
        if self.attempts >= self.max_attempts {
            self.state = SttState::Closed;
            self.pending.clear();
            return RetryVerdict::GiveUp;
        }
        self.attempts += 1;
        self.state = SttState::Error;
        let exp = self.base_delay.saturating_mul(1u32 << (self.attempts - 1).min(16));
        RetryVerdict::RetryAfter {
            delay: exp.min(self.max_delay),
            attempt: self.attempts,
        }
    }

    /// Terminal close (session teardown). Idempotent.
    pub fn close(&mut self) {
        self.state = SttState::Closed;
        self.pending.clear();
    }
}
