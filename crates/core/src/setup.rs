use crate::call_types::{CallTarget, StartOptions};
use crate::error::SessionError;
use crate::identity::CurrentUser;
use crate::session_state::SessionKind;
use crate::store::CheckpointKey;

/// Everything a session needs to know before it dials: who, what for, and
/// against which target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSetup {
    kind: SessionKind,
    user: CurrentUser,
    interview_id: Option<String>,
    feedback_id: Option<String>,
    questions: Vec<String>,
    workflow_id: Option<String>,
    interviewer_id: Option<String>,
}

impl SessionSetup {
    /// A call that collects the user's preferences and generates questions.
    /// The workflow id is checked when the call starts, not here.
    pub fn generate_questions(user: CurrentUser, workflow_id: Option<String>) -> Self {
        Self {
            kind: SessionKind::GenerateQuestions,
            user,
            interview_id: None,
            feedback_id: None,
            questions: Vec::new(),
            workflow_id,
            interviewer_id: None,
        }
    }

    pub fn interview(
        user: CurrentUser,
        interview_id: impl Into<String>,
        questions: Vec<String>,
    ) -> Self {
        Self {
            kind: SessionKind::ConductInterview,
            user,
            interview_id: Some(interview_id.into()),
            feedback_id: None,
            questions,
            workflow_id: None,
            interviewer_id: None,
        }
    }

    pub fn with_feedback_id(mut self, feedback_id: impl Into<String>) -> Self {
        self.feedback_id = Some(feedback_id.into());
        self
    }

    pub fn with_interviewer(mut self, assistant_id: impl Into<String>) -> Self {
        self.interviewer_id = Some(assistant_id.into());
        self
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn user(&self) -> &CurrentUser {
        &self.user
    }

    pub fn interview_id(&self) -> Option<&str> {
        self.interview_id.as_deref()
    }

    pub fn feedback_id(&self) -> Option<&str> {
        self.feedback_id.as_deref()
    }

    /// Present only for interviews; question generation has nothing to save.
    pub fn checkpoint_key(&self) -> Option<CheckpointKey> {
        match (self.kind, &self.interview_id) {
            (SessionKind::ConductInterview, Some(id)) => {
                Some(CheckpointKey::new(id.clone(), self.user.id.clone()))
            }
            _ => None,
        }
    }

    pub fn call_target(&self) -> Result<(CallTarget, StartOptions), SessionError> {
        match self.kind {
            SessionKind::GenerateQuestions => {
                let workflow_id = self
                    .workflow_id
                    .as_deref()
                    .filter(|id| !id.trim().is_empty())
                    .ok_or_else(|| {
                        SessionError::MissingConfiguration("QUESTION_WORKFLOW_ID".into())
                    })?;
                let options = StartOptions::default()
                    .with_variable("username", self.user.name.clone())
                    .with_variable("userid", self.user.id.clone());
                Ok((CallTarget::Workflow(workflow_id.to_string()), options))
            }
            SessionKind::ConductInterview => {
                if self.questions.is_empty() {
                    return Err(SessionError::NoQuestions);
                }
                let interviewer = self
                    .interviewer_id
                    .clone()
                    .unwrap_or_else(|| DEFAULT_INTERVIEWER.to_string());
                let options = StartOptions::default()
                    .with_variable("questions", format_questions(&self.questions));
                Ok((CallTarget::Assistant(interviewer), options))
            }
        }
    }
}

pub const DEFAULT_INTERVIEWER: &str = "interviewer";

/// Renders questions as a numbered list, one per line.
pub fn format_questions(questions: &[String]) -> String {
    questions
        .iter()
        .enumerate()
        .map(|(i, q)| format!("{}. {}", i + 1, q))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> CurrentUser {
        CurrentUser {
            id: "u-1".into(),
            name: "Ada".into(),
        }
    }

    #[test]
    fn question_generation_needs_a_workflow() {
        let setup = SessionSetup::generate_questions(user(), None);
        assert_eq!(
            setup.call_target(),
            Err(SessionError::MissingConfiguration(
                "QUESTION_WORKFLOW_ID".into()
            ))
        );

        let blank = SessionSetup::generate_questions(user(), Some("  ".into()));
        assert!(blank.call_target().is_err());
    }

    #[test]
    fn question_generation_passes_the_user() {
        let setup = SessionSetup::generate_questions(user(), Some("wf-7".into()));
        let (target, options) = setup.call_target().unwrap();

        assert_eq!(target, CallTarget::Workflow("wf-7".into()));
        assert_eq!(options.variable("username"), Some("Ada"));
        assert_eq!(options.variable("userid"), Some("u-1"));
        assert!(setup.checkpoint_key().is_none());
    }

    #[test]
    fn interview_sends_numbered_questions() {
        let setup = SessionSetup::interview(
            user(),
            "int-1",
            vec!["Why Rust?".into(), "Explain ownership.".into()],
        )
        .with_interviewer("asst-9");
        let (target, options) = setup.call_target().unwrap();

        assert_eq!(target, CallTarget::Assistant("asst-9".into()));
        assert_eq!(
            options.variable("questions"),
            Some("1. Why Rust?\n2. Explain ownership.")
        );
        assert_eq!(
            setup.checkpoint_key(),
            Some(CheckpointKey::new("int-1", "u-1"))
        );
    }

    #[test]
    fn interview_without_questions_cannot_start() {
        let setup = SessionSetup::interview(user(), "int-1", vec![]);
        assert_eq!(setup.call_target(), Err(SessionError::NoQuestions));
    }
}
