pub mod channel;
pub mod manager;
pub mod wire;

pub use channel::{AudioDisposition, RetryVerdict, SttChannel, SttState};
pub use manager::{SttFailure, SttManager, SttOutbound};
pub use wire::SttTranscript;

use tokio::sync::mpsc;

/// Events the STT link tasks feed back into the session dispatch loop.
#[derive(Debug)]
pub enum SttLinkEvent {
    /// Socket open and confirmed; carries the outbound frame channel
    Opened(mpsc::Sender<SttOutbound>),

    /// One transcription result
    Transcript(SttTranscript),

    /// Socket failed or closed by the service
    Failed { message: String },

    /// Backoff elapsed; the manager should attempt a reconnect
    Retry,
}
