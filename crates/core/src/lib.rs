pub mod activity;
pub mod call_transport;
pub mod call_types;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod feedback;
pub mod identity;
pub mod notify;
pub mod orchestrator;
pub mod preflight;
pub mod session_state;
pub mod setup;
pub mod store;
pub mod transport;

pub use activity::ActivitySink;
pub use config::SessionConfig;
pub use error::SessionError;
pub use orchestrator::{Collaborators, SessionHandle, SessionInput, SessionOrchestrator, SessionOutcome};
pub use session_state::{CallSession, CallStatus, SessionKind, Speaker, Turn};
pub use setup::SessionSetup;
pub use store::{ApiStore, InterviewStore, MemoryStore};
pub use transport::{LogFilterPolicy, TransportAdapter};

/// Represents commands that the caller (a UI or CLI) issues to the orchestrator.
///
/// This enum is the primary API for decoupling user intent from the session's
/// state machine: the caller never mutates call state directly, it only asks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Begin a call attempt from `Inactive`.
    Start,
    /// Clear the transcript and error and start again from `Error`.
    Retry,
    /// The user pressed "End Interview" while the call is active.
    EndCall,
    /// Tear everything down and return control to the caller.
    Shutdown,
}
