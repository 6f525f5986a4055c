use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::models::*;

pub type ProgressSender = broadcast::Sender<IngestionProgress>;
pub type ProgressReceiver = broadcast::Receiver<IngestionProgress>;

/// Tracks the ingestion progress of every source and rejects overlapping runs
#[derive(Clone)]
pub struct IngestionStateManager {
    states: Arc<RwLock<HashMap<Uuid, IngestionProgress>>>,
    progress_tx: ProgressSender,
}

impl IngestionStateManager {
    pub fn new() -> Self {
        let (progress_tx, _) = broadcast::channel(1000);
        Self {
            states: Arc::new(RwLock::new(HashMap::new())),
            progress_tx,
        }
    }

    pub fn subscribe(&self) -> ProgressReceiver {
        self.progress_tx.subscribe()
    }

    /// Mark a source as being ingested.
    ///
    /// Returns false if an ingestion of the same source is still running.
    pub async fn try_start(&self, source_id: Uuid) -> bool {
        let progress = {
            let mut states = self.states.write().await;
            if let Some(existing) = states.get(&source_id) {
                if existing.completed_at.is_none() {
                    return false;
                }
            }

            let progress = IngestionProgress {
                source_id,
                state: IngestionState::Idle,
                progress: ProgressInfo {
                    current_step: "Queued".to_string(),
                    percentage: Some(0.0),
                    ..Default::default()
                },
                started_at: Utc::now(),
                updated_at: Utc::now(),
                completed_at: None,
                error: None,
            };
            states.insert(source_id, progress.clone());
            progress
        };

        let _ = self.progress_tx.send(progress);
        true
    }

    pub async fn update_progress(
        &self,
        source_id: Uuid,
        state: IngestionState,
        progress_info: ProgressInfo,
    ) {
        let updated = {
            let mut states = self.states.write().await;
            states.get_mut(&source_id).map(|progress| {
                progress.state = state.clone();
                progress.progress = progress_info;
                progress.updated_at = Utc::now();
                if matches!(state, IngestionState::Completed | IngestionState::Error) {
                    progress.completed_at = Some(Utc::now());
                }
                progress.clone()
            })
        };

        if let Some(progress) = updated {
            let _ = self.progress_tx.send(progress);
        }
    }

    pub async fn set_error(&self, source_id: Uuid, error: String) {
        let updated = {
            let mut states = self.states.write().await;
            states.get_mut(&source_id).map(|progress| {
                progress.state = IngestionState::Error;
                progress.error = Some(error);
                progress.updated_at = Utc::now();
                progress.completed_at = Some(Utc::now());
                progress.clone()
            })
        };

        if let Some(progress) = updated {
            let _ = self.progress_tx.send(progress);
        }
    }

    pub async fn complete_ingestion(&self, source_id: Uuid, summary: &IngestSummary) {
        self.update_progress(
            source_id,
            IngestionState::Completed,
            ProgressInfo {
                current_step: format!(
                    "Completed - {} channels, {} programmes saved",
                    summary.channel_count, summary.programme_count
                ),
                channels_parsed: Some(summary.channel_count),
                programmes_parsed: Some(summary.programme_count + summary.orphaned_programmes),
                programmes_saved: Some(summary.programme_count),
                percentage: Some(100.0),
                ..Default::default()
            },
        )
        .await;
    }

    pub async fn get_progress(&self, source_id: Uuid) -> Option<IngestionProgress> {
        let states = self.states.read().await;
        states.get(&source_id).cloned()
    }

    pub async fn get_all_progress(&self) -> HashMap<Uuid, IngestionProgress> {
        let states = self.states.read().await;
        states.clone()
    }
}

impl Default for IngestionStateManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_start_rejected_until_finished() {
        let manager = IngestionStateManager::new();
        let source_id = Uuid::new_v4();

        assert!(manager.try_start(source_id).await);
        assert!(!manager.try_start(source_id).await);

        manager.set_error(source_id, "boom".to_string()).await;
        let progress = manager.get_progress(source_id).await.unwrap();
        assert_eq!(progress.state, IngestionState::Error);
        assert_eq!(progress.error.as_deref(), Some("boom"));

        assert!(manager.try_start(source_id).await);
    }

    #[tokio::test]
    async fn test_progress_is_broadcast() {
        let manager = IngestionStateManager::new();
        let mut rx = manager.subscribe();
        let source_id = Uuid::new_v4();

        manager.try_start(source_id).await;
        manager
            .complete_ingestion(
                source_id,
                &IngestSummary {
                    channel_count: 2,
                    programme_count: 10,
                    orphaned_programmes: 1,
                },
            )
            .await;

        assert_eq!(rx.recv().await.unwrap().state, IngestionState::Idle);
        let done = rx.recv().await.unwrap();
        assert_eq!(done.state, IngestionState::Completed);
        assert_eq!(done.progress.programmes_parsed, Some(11));
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_updates_for_unknown_source_are_ignored() {
        let manager = IngestionStateManager::new();
        let source_id = Uuid::new_v4();
        manager
            .update_progress(source_id, IngestionState::Parsing, ProgressInfo::default())
            .await;
        assert!(manager.get_progress(source_id).await.is_none());
        assert!(manager.get_all_progress().await.is_empty());
    }
}
