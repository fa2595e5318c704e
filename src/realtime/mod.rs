pub mod channel;
pub mod manager;
pub mod wire;

pub use channel::{ConversationChannel, ConversationState, ResponseGate, ResponseOutcome};
pub use manager::{ConversationManager, RealtimeOutbound};
pub use wire::RealtimeEvent;

use tokio::sync::mpsc;

/// Events the conversation link task feeds into the session dispatch loop.
#[derive(Debug)]
pub enum RealtimeLinkEvent {
    /// Socket open; carries the outbound frame channel
    Opened(mpsc::Sender<RealtimeOutbound>),

    /// One parsed downstream event
    Event(RealtimeEvent),

    /// Socket failed or closed by the service
    Failed { message: String },

    /// Deferred response request is due for another try
    RetryResponse,
}
