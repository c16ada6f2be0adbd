use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Who produced a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    System,
    Assistant,
}

/// One transcribed contribution. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    #[serde(rename = "role")]
    speaker: Speaker,
    #[serde(rename = "content")]
    text: String,
}

impl Turn {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
        }
    }

    pub fn speaker(&self) -> Speaker {
        self.speaker
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Inactive,
    Connecting,
    Active,
    Finished,
    Error,
}

impl CallStatus {
    /// The only edges the state machine may follow. `Error -> Inactive` is the
    /// retry edge; every other terminal state stays put.
    pub fn can_transition_to(self, next: CallStatus) -> bool {
        use CallStatus::*;
        matches!(
            (self, next),
            (Inactive, Connecting)
                | (Connecting, Active)
                | (Connecting, Error)
                | (Active, Finished)
                | (Active, Error)
                | (Error, Inactive)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CallStatus::Finished | CallStatus::Error)
    }
}

/// What the call is for. Decides the transport target and what happens once
/// the call finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    GenerateQuestions,
    ConductInterview,
}

/// In-memory state of one call attempt.
#[derive(Debug)]
pub struct CallSession {
    kind: SessionKind,
    status: CallStatus,
    transcript: Vec<Turn>,
    last_error: Option<String>,
    started_at: Option<Instant>,
}

impl CallSession {
    pub fn new(kind: SessionKind) -> Self {
        Self {
            kind,
            status: CallStatus::Inactive,
            transcript: Vec::new(),
            last_error: None,
            started_at: None,
        }
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// Rough progress indicator: one question answered per user/assistant pair.
    pub fn questions_answered(&self) -> usize {
        self.transcript.len() / 2
    }

    pub fn elapsed_since_start(&self, now: Instant) -> Option<Duration> {
        self.started_at
            .map(|started| now.saturating_duration_since(started))
    }

    pub fn transition(&mut self, next: CallStatus) -> Result<(), SessionError> {
        if !self.status.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        tracing::debug!(from = ?self.status, to = ?next, "call status transition");
        self.status = next;
        Ok(())
    }

    /// `Connecting -> Active`, stamping the start time and clearing any error.
    pub fn activate(&mut self, now: Instant) -> Result<(), SessionError> {
        self.transition(CallStatus::Active)?;
        self.started_at = Some(now);
        self.last_error = None;
        Ok(())
    }

    /// Moves to `Error` and records why.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), SessionError> {
        self.transition(CallStatus::Error)?;
        self.last_error = Some(message.into());
        Ok(())
    }

    /// `Error -> Inactive` for the automatic reconnect. The transcript survives.
    pub fn rearm(&mut self) -> Result<(), SessionError> {
        self.transition(CallStatus::Inactive)?;
        self.last_error = None;
        self.started_at = None;
        Ok(())
    }

    /// `Error -> Inactive` for a user-initiated retry. This is the only place
    /// the transcript is cleared.
    pub fn reset_for_retry(&mut self) -> Result<(), SessionError> {
        self.rearm()?;
        self.transcript.clear();
        Ok(())
    }

    pub fn append(&mut self, turn: Turn) {
        self.transcript.push(turn);
    }

    /// Seeds the transcript with turns recovered from a checkpoint. Only
    /// applies to an empty transcript so restored turns always come first.
    pub fn restore(&mut self, turns: Vec<Turn>) -> bool {
        if !self.transcript.is_empty() || turns.is_empty() {
            return false;
        }
        self.transcript = turns;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [CallStatus; 5] = [
        CallStatus::Inactive,
        CallStatus::Connecting,
        CallStatus::Active,
        CallStatus::Finished,
        CallStatus::Error,
    ];

    #[test]
    fn only_defined_edges_are_allowed() {
        let allowed = [
            (CallStatus::Inactive, CallStatus::Connecting),
            (CallStatus::Connecting, CallStatus::Active),
            (CallStatus::Connecting, CallStatus::Error),
            (CallStatus::Active, CallStatus::Finished),
            (CallStatus::Active, CallStatus::Error),
            (CallStatus::Error, CallStatus::Inactive),
        ];
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from:?} -> {to:?}"
                );
            }
        }
    }

    #[test]
    fn finished_is_a_dead_end() {
        let mut session = CallSession::new(SessionKind::ConductInterview);
        session.transition(CallStatus::Connecting).unwrap();
        session.activate(Instant::now()).unwrap();
        session.transition(CallStatus::Finished).unwrap();

        let err = session.transition(CallStatus::Inactive).unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidTransition {
                from: CallStatus::Finished,
                to: CallStatus::Inactive
            }
        );
        assert_eq!(session.status(), CallStatus::Finished);
    }

    #[test]
    fn retry_clears_transcript_but_rearm_keeps_it() {
        let mut session = CallSession::new(SessionKind::ConductInterview);
        session.transition(CallStatus::Connecting).unwrap();
        session.activate(Instant::now()).unwrap();
        session.append(Turn::new(Speaker::Assistant, "Tell me about yourself."));
        session.fail("network dropped").unwrap();
        assert_eq!(session.last_error(), Some("network dropped"));

        session.rearm().unwrap();
        assert_eq!(session.transcript().len(), 1);
        assert_eq!(session.last_error(), None);

        session.transition(CallStatus::Connecting).unwrap();
        session.fail("boom").unwrap();
        session.reset_for_retry().unwrap();
        assert!(session.transcript().is_empty());
        assert_eq!(session.status(), CallStatus::Inactive);
    }

    #[test]
    fn restore_only_fills_an_empty_transcript() {
        let mut session = CallSession::new(SessionKind::ConductInterview);
        assert!(!session.restore(vec![]));
        assert!(session.restore(vec![Turn::new(Speaker::User, "hi")]));
        assert!(!session.restore(vec![Turn::new(Speaker::User, "again")]));
        assert_eq!(session.transcript()[0].text(), "hi");
    }

    #[test]
    fn counts_answered_questions_by_pairs() {
        let mut session = CallSession::new(SessionKind::ConductInterview);
        for i in 0..5 {
            session.append(Turn::new(Speaker::User, format!("turn {i}")));
        }
        assert_eq!(session.questions_answered(), 2);
    }
}
