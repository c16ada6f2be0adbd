use crate::session_state::Turn;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Identifies whose interview a checkpoint belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointKey {
    pub interview_id: String,
    pub user_id: String,
}

impl CheckpointKey {
    pub fn new(interview_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            interview_id: interview_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// A persisted transcript snapshot. Each save replaces the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub interview_id: String,
    pub user_id: String,
    pub transcript: Vec<Turn>,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub interview_id: String,
    pub user_id: String,
    pub transcript: Vec<Turn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResponse {
    pub success: bool,
    #[serde(default)]
    pub feedback_id: Option<String>,
}

// The persistence boundary: interview progress and feedback generation both
// live behind whatever backend stores interviews. The orchestrator depends on
// this trait only, so tests swap in `MockInterviewStore` or `MemoryStore`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InterviewStore: Send + Sync {
    async fn save_checkpoint(&self, key: &CheckpointKey, transcript: &[Turn]) -> Result<()>;

    async fn load_checkpoint(&self, key: &CheckpointKey) -> Result<Option<Checkpoint>>;

    async fn create_feedback(&self, request: FeedbackRequest) -> Result<FeedbackResponse>;
}

/// Talks to the interview backend over HTTP/JSON.
pub struct ApiStore {
    client: Client,
    base_url: String,
}

impl ApiStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    // Ids are appended as single percent-encoded path segments.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid interview API URL: {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("Interview API URL cannot take a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn progress_url(&self, key: &CheckpointKey) -> Result<Url> {
        self.endpoint(&["interviews", &key.interview_id, "progress", &key.user_id])
    }

    fn feedback_url(&self, interview_id: &str) -> Result<Url> {
        self.endpoint(&["interviews", interview_id, "feedback"])
    }
}

#[async_trait]
impl InterviewStore for ApiStore {
    async fn save_checkpoint(&self, key: &CheckpointKey, transcript: &[Turn]) -> Result<()> {
        let body = serde_json::json!({
            "transcript": transcript,
            "savedAt": Utc::now(),
        });

        self.client
            .put(self.progress_url(key)?)
            .json(&body)
            .send()
            .await
            .context("Failed to send progress to the interview API")?
            .error_for_status()
            .context("Interview API rejected the progress update")?;
        Ok(())
    }

    async fn load_checkpoint(&self, key: &CheckpointKey) -> Result<Option<Checkpoint>> {
        let resp = self
            .client
            .get(self.progress_url(key)?)
            .send()
            .await
            .context("Failed to fetch progress from the interview API")?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let checkpoint = resp
            .error_for_status()
            .context("Interview API rejected the progress request")?
            .json::<Checkpoint>()
            .await
            .context("Failed to parse saved progress")?;
        Ok(Some(checkpoint))
    }

    async fn create_feedback(&self, request: FeedbackRequest) -> Result<FeedbackResponse> {
        let resp = self
            .client
            .post(self.feedback_url(&request.interview_id)?)
            .json(&request)
            .send()
            .await
            .context("Failed to reach the feedback endpoint")?
            .error_for_status()
            .context("Feedback endpoint returned an error")?
            .json::<FeedbackResponse>()
            .await
            .context("Failed to parse feedback response")?;
        Ok(resp)
    }
}

/// Keeps everything in process memory. Feedback ids are fresh UUIDs unless the
/// request names an existing one.
#[derive(Default)]
pub struct MemoryStore {
    checkpoints: Mutex<HashMap<CheckpointKey, Checkpoint>>,
    feedback: Mutex<HashMap<String, FeedbackRequest>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, key: &CheckpointKey, transcript: Vec<Turn>) {
        let checkpoint = Checkpoint {
            interview_id: key.interview_id.clone(),
            user_id: key.user_id.clone(),
            transcript,
            saved_at: Utc::now(),
        };
        self.checkpoints.lock().await.insert(key.clone(), checkpoint);
    }

    pub async fn checkpoint(&self, key: &CheckpointKey) -> Option<Checkpoint> {
        self.checkpoints.lock().await.get(key).cloned()
    }

    pub async fn feedback(&self, feedback_id: &str) -> Option<FeedbackRequest> {
        self.feedback.lock().await.get(feedback_id).cloned()
    }
}

#[async_trait]
impl InterviewStore for MemoryStore {
    async fn save_checkpoint(&self, key: &CheckpointKey, transcript: &[Turn]) -> Result<()> {
        self.seed(key, transcript.to_vec()).await;
        Ok(())
    }

    async fn load_checkpoint(&self, key: &CheckpointKey) -> Result<Option<Checkpoint>> {
        Ok(self.checkpoint(key).await)
    }

    async fn create_feedback(&self, request: FeedbackRequest) -> Result<FeedbackResponse> {
        let feedback_id = request
            .feedback_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.feedback
            .lock()
            .await
            .insert(feedback_id.clone(), request);
        Ok(FeedbackResponse {
            success: true,
            feedback_id: Some(feedback_id),
        })
    }
}
