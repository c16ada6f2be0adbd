use crate::session_state::CallStatus;

/// Every failure a call session can run into.
///
/// Only some of these reach the user: checkpoint save/load failures are logged
/// and absorbed where they happen, everything else ends up as the session's
/// `last_error` and a single notification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Microphone access is required for the interview: {0}")]
    PermissionDenied(String),
    #[error("No internet connection. Please check your connection and try again.")]
    NetworkUnavailable,
    #[error("Interview generation is not configured: {0} is not set")]
    MissingConfiguration(String),
    #[error("No interview questions available")]
    NoQuestions,
    #[error("No signed-in user")]
    NotSignedIn,
    #[error("Failed to start the call after {attempts} attempt(s): {message}")]
    TransportStart { attempts: u32, message: String },
    #[error("{0}")]
    TransientConnection(String),
    #[error("{0}")]
    Transport(String),
    #[error("Call ended unexpectedly. Please try again.")]
    CallTooShort,
    #[error("Interview too short ({turns} turns). Please try again with a longer conversation.")]
    TranscriptTooShort { turns: usize },
    #[error("Failed to save interview progress: {0}")]
    CheckpointSave(String),
    #[error("Failed to load interview progress: {0}")]
    CheckpointLoad(String),
    #[error("Failed to generate feedback: {0}")]
    FeedbackGeneration(String),
    #[error("invalid call status transition {from:?} -> {to:?}")]
    InvalidTransition { from: CallStatus, to: CallStatus },
}

impl SessionError {
    /// Builds the error for a transport `error` event, classifying network
    /// hiccups as transient. An empty message is never transient; it only
    /// gets a generic text for display.
    pub fn from_transport_message(message: &str) -> Self {
        if message.trim().is_empty() {
            return Self::Transport("Connection error occurred".to_string());
        }
        if is_transient_network(message) {
            Self::TransientConnection(message.to_string())
        } else {
            Self::Transport(message.to_string())
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientConnection(_))
    }
}

/// Transport failures whose reason mentions a denied device permission are
/// never retried.
pub fn is_permission_denial(reason: &str) -> bool {
    reason.to_lowercase().contains("permission")
}

pub fn is_transient_network(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("network") || message.contains("connection")
}
