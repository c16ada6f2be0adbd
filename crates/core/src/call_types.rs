use crate::session_state::Speaker;
use serde::Serialize;
use std::collections::BTreeMap;

/// What the transport should dial: a question-generation workflow or the
/// interviewer assistant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    Workflow(String),
    Assistant(String),
}

impl CallTarget {
    pub fn id(&self) -> &str {
        match self {
            CallTarget::Workflow(id) | CallTarget::Assistant(id) => id,
        }
    }
}

/// Per-call payload handed to the transport on start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StartOptions {
    #[serde(rename = "variableValues")]
    pub variable_values: BTreeMap<String, String>,
}

impl StartOptions {
    pub fn with_variable(mut self, key: &str, value: impl Into<String>) -> Self {
        self.variable_values.insert(key.to_string(), value.into());
        self
    }

    pub fn variable(&self, key: &str) -> Option<&str> {
        self.variable_values.get(key).map(String::as_str)
    }
}

/// Returned by a successful transport start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallHandle {
    pub id: String,
}

/// Low-level peer connection state, as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerState {
    #[default]
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl PeerState {
    pub fn is_failed(self) -> bool {
        self == PeerState::Failed
    }
}

impl From<&str> for PeerState {
    fn from(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "connecting" | "checking" => PeerState::Connecting,
            "connected" | "completed" => PeerState::Connected,
            "disconnected" => PeerState::Disconnected,
            "failed" => PeerState::Failed,
            "closed" => PeerState::Closed,
            _ => PeerState::New,
        }
    }
}

/// Snapshot of the transport and media connection states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionHealth {
    pub transport: PeerState,
    pub media: PeerState,
}

impl ConnectionHealth {
    pub fn is_failed(&self) -> bool {
        self.transport.is_failed() || self.media.is_failed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptKind {
    Partial,
    Final,
}

/// Domain events coming out of the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    CallStart,
    CallEnd,
    Message {
        speaker: Speaker,
        kind: TranscriptKind,
        text: String,
    },
    SpeechStart,
    SpeechEnd,
    Error(String),
    /// Synthesised by the adapter when a peer connection state fails.
    ConnectionFailed,
}

impl TransportEvent {
    pub fn final_transcript(speaker: Speaker, text: impl Into<String>) -> Self {
        TransportEvent::Message {
            speaker,
            kind: TranscriptKind::Final,
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_webrtc_state_names() {
        assert_eq!(PeerState::from("failed"), PeerState::Failed);
        assert_eq!(PeerState::from("completed"), PeerState::Connected);
        assert_eq!(PeerState::from("checking"), PeerState::Connecting);
        assert_eq!(PeerState::from("something-new"), PeerState::New);
    }

    #[test]
    fn either_side_failing_fails_the_connection() {
        let health = ConnectionHealth {
            transport: PeerState::Connected,
            media: PeerState::Failed,
        };
        assert!(health.is_failed());
        assert!(!ConnectionHealth::default().is_failed());
    }

    #[test]
    fn start_options_serialize_as_variable_values() {
        let options = StartOptions::default().with_variable("questions", "1. Why Rust?");
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["variableValues"]["questions"], "1. Why Rust?");
    }
}
