pub mod config;
pub mod http;
pub mod providers;
pub mod realtime;
pub mod session;
pub mod stt;
pub mod suggest;

pub use config::RelayConfig;
pub use http::{create_router, AppState};
pub use session::{
    ClientMessage, ServerEvent, SessionCoordinator, SessionEvent, TranscriptBuffer,
    TranscriptEntry,
};
pub use stt::{SttChannel, SttManager, SttState};
pub use suggest::{DedupStore, Suggestion, SuggestionEngine};
