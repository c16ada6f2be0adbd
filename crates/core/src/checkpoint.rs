use crate::error::SessionError;
use crate::session_state::Turn;
use crate::store::{CheckpointKey, InterviewStore};
use std::sync::Arc;
use tokio::sync::watch;

/// A transcript snapshot tagged with the order it was submitted in.
#[derive(Debug, Clone, Default)]
struct Snapshot {
    seq: u64,
    transcript: Vec<Turn>,
}

/// Saves and restores the in-progress transcript for one interview/user pair.
/// Failures never reach the caller; they are logged and the session goes on.
///
/// Saves go through a single writer task, so the store sees snapshots in the
/// order they were taken. Snapshots submitted while a write is in flight are
/// coalesced and only the newest one is persisted.
pub struct CheckpointStore {
    store: Arc<dyn InterviewStore>,
    key: CheckpointKey,
    pending: watch::Sender<Snapshot>,
    written: watch::Receiver<u64>,
}

impl CheckpointStore {
    /// Must be created inside a tokio runtime.
    pub fn new(store: Arc<dyn InterviewStore>, key: CheckpointKey) -> Self {
        let (pending, snapshots) = watch::channel(Snapshot::default());
        let (written_tx, written) = watch::channel(0);
        tokio::spawn(Self::writer(store.clone(), key.clone(), snapshots, written_tx));
        Self {
            store,
            key,
            pending,
            written,
        }
    }

    // Runs until the store is dropped, after persisting whatever was still
    // pending at that point.
    async fn writer(
        store: Arc<dyn InterviewStore>,
        key: CheckpointKey,
        mut snapshots: watch::Receiver<Snapshot>,
        written: watch::Sender<u64>,
    ) {
        while snapshots.changed().await.is_ok() {
            let Snapshot { seq, transcript } = snapshots.borrow_and_update().clone();
            let turns = transcript.len();
            match store.save_checkpoint(&key, &transcript).await {
                Ok(()) => tracing::debug!(turns, seq, interview = %key.interview_id, "checkpoint saved"),
                Err(err) => {
                    let err = SessionError::CheckpointSave(format!("{err:#}"));
                    tracing::warn!(turns, seq, interview = %key.interview_id, "{err}");
                }
            }
            written.send_replace(seq);
        }
    }

    pub fn key(&self) -> &CheckpointKey {
        &self.key
    }

    /// Queues `transcript` for saving and returns immediately.
    pub fn save(&self, transcript: Vec<Turn>) {
        self.pending.send_modify(|snapshot| {
            snapshot.seq += 1;
            snapshot.transcript = transcript;
        });
    }

    /// Waits until every snapshot queued so far has been written or has
    /// failed. Returns early if the writer is gone.
    pub async fn flushed(&self) {
        let target = self.pending.borrow().seq;
        let mut written = self.written.clone();
        let _ = written.wait_for(|seq| *seq >= target).await;
    }

    pub async fn restore(&self) -> Option<Vec<Turn>> {
        match self.store.load_checkpoint(&self.key).await {
            Ok(Some(checkpoint)) if !checkpoint.transcript.is_empty() => {
                tracing::info!(
                    turns = checkpoint.transcript.len(),
                    saved_at = %checkpoint.saved_at,
                    "restoring saved interview progress"
                );
                Some(checkpoint.transcript)
            }
            Ok(_) => None,
            Err(err) => {
                let err = SessionError::CheckpointLoad(format!("{err:#}"));
                tracing::warn!(interview = %self.key.interview_id, "{err}");
                None
            }
        }
    }
}
