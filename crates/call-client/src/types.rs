//! JSON frames exchanged with the call relay. Every frame carries a `type`
//! discriminator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What the relay should dial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Target {
    Workflow(String),
    Assistant(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStartEvent {
    pub target: Target,
    #[serde(default)]
    pub variable_values: BTreeMap<String, String>,
}

impl CallStartEvent {
    pub fn new(target: Target, variable_values: BTreeMap<String, String>) -> Self {
        Self {
            target,
            variable_values,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "call.start")]
    CallStart(CallStartEvent),
    #[serde(rename = "call.stop")]
    CallStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptType {
    Partial,
    Final,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEvent {
    pub role: String,
    pub transcript_type: TranscriptType,
    pub transcript: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "call-start")]
    CallStart,
    #[serde(rename = "call-end")]
    CallEnd,
    #[serde(rename = "transcript")]
    Transcript(TranscriptEvent),
    #[serde(rename = "speech-start")]
    SpeechStart,
    #[serde(rename = "speech-end")]
    SpeechEnd,
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    /// Transport (signalling) connection state, e.g. `connected` or `failed`.
    #[serde(rename = "connection-state")]
    ConnectionState { state: String },
    /// Media (ICE) connection state.
    #[serde(rename = "media-state")]
    MediaState { state: String },
    /// Never sent by the relay; emitted locally when the socket closes.
    #[serde(rename = "close")]
    Close { reason: Option<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_start_frame_layout() {
        let mut variables = BTreeMap::new();
        variables.insert("questions".to_string(), "1. Why Rust?".to_string());
        let event = ClientEvent::CallStart(CallStartEvent::new(
            Target::Assistant("asst-1".into()),
            variables,
        ));

        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "call.start");
        assert_eq!(json["target"]["kind"], "assistant");
        assert_eq!(json["target"]["id"], "asst-1");
        assert_eq!(json["variableValues"]["questions"], "1. Why Rust?");
        assert_eq!(
            serde_json::to_value(&ClientEvent::CallStop).unwrap()["type"],
            "call.stop"
        );
    }

    #[test]
    fn parses_relay_frames() {
        let transcript: ServerEvent = serde_json::from_str(
            r#"{"type":"transcript","role":"user","transcriptType":"final","transcript":"hello"}"#,
        )
        .unwrap();
        assert_eq!(
            transcript,
            ServerEvent::Transcript(TranscriptEvent {
                role: "user".into(),
                transcript_type: TranscriptType::Final,
                transcript: "hello".into(),
            })
        );

        let error: ServerEvent = serde_json::from_str(r#"{"type":"error"}"#).unwrap();
        assert_eq!(error, ServerEvent::Error { message: None });

        let state: ServerEvent =
            serde_json::from_str(r#"{"type":"media-state","state":"failed","ts":17}"#).unwrap();
        assert_eq!(
            state,
            ServerEvent::MediaState {
                state: "failed".into()
            }
        );
    }
}
