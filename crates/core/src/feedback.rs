use crate::error::SessionError;
use crate::notify::{Notifier, NotifyKind};
use crate::session_state::Turn;
use crate::store::{CheckpointKey, FeedbackRequest, FeedbackResponse, InterviewStore};
use std::sync::Arc;

/// Turns a finished interview transcript into a feedback report id.
pub struct FeedbackHandoff {
    store: Arc<dyn InterviewStore>,
    key: CheckpointKey,
    min_turns: usize,
    existing_feedback_id: Option<String>,
    notifier: Arc<dyn Notifier>,
}

impl FeedbackHandoff {
    pub fn new(
        store: Arc<dyn InterviewStore>,
        key: CheckpointKey,
        min_turns: usize,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            key,
            min_turns,
            existing_feedback_id: None,
            notifier,
        }
    }

    /// Regenerating feedback overwrites this report instead of creating a new one.
    pub fn with_existing_feedback(mut self, feedback_id: Option<String>) -> Self {
        self.existing_feedback_id = feedback_id;
        self
    }

    pub fn interview_id(&self) -> &str {
        &self.key.interview_id
    }

    pub async fn generate(&self, transcript: &[Turn]) -> Result<String, SessionError> {
        if transcript.len() < self.min_turns {
            tracing::info!(turns = transcript.len(), "transcript too short for feedback");
            self.notifier.notify(
                NotifyKind::Error,
                "Interview too short. Please try again with a longer conversation.",
            );
            return Err(SessionError::TranscriptTooShort {
                turns: transcript.len(),
            });
        }

        self.notifier
            .notify(NotifyKind::Info, "Generating your feedback...");
        let request = FeedbackRequest {
            interview_id: self.key.interview_id.clone(),
            user_id: self.key.user_id.clone(),
            transcript: transcript.to_vec(),
            feedback_id: self.existing_feedback_id.clone(),
        };

        match self.store.create_feedback(request).await {
            Ok(FeedbackResponse {
                success: true,
                feedback_id: Some(feedback_id),
            }) => {
                tracing::info!(%feedback_id, "feedback generated");
                self.notifier
                    .notify(NotifyKind::Success, "Feedback generated successfully!");
                Ok(feedback_id)
            }
            Ok(response) => {
                tracing::error!(?response, "feedback service reported failure");
                self.notifier.notify(
                    NotifyKind::Error,
                    "Failed to generate feedback. Please try again.",
                );
                Err(SessionError::FeedbackGeneration(
                    "feedback service reported failure".into(),
                ))
            }
            Err(err) => {
                tracing::error!("feedback generation failed: {err:#}");
                self.notifier
                    .notify(NotifyKind::Error, "Error generating feedback");
                Err(SessionError::FeedbackGeneration(format!("{err:#}")))
            }
        }
    }
}
