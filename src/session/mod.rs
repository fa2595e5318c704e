pub mod coordinator;
pub mod messages;
pub mod transcript;

pub use coordinator::{SessionCoordinator, SessionState};
pub use messages::{ClientMessage, ServerEvent};
pub use transcript::{TranscriptBuffer, TranscriptEntry};

use crate::realtime::RealtimeLinkEvent;
use crate::stt::SttLinkEvent;
use crate::suggest::Candidate;

/// Internal events all three managers emit into one per-session channel.
/// The coordinator's dispatch loop is the only consumer, so session state
/// is serialized by construction.
#[derive(Debug)]
pub enum SessionEvent {
    Stt(SttLinkEvent),
    Realtime(RealtimeLinkEvent),
    AnalysisDone(Vec<Candidate>),
}
