use std::sync::Arc;
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Settings;
use crate::pipeline::types::{ErrorDetail, TaskStatus};
use crate::store::TaskStore;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SweepStats {
    pub expired_deleted: usize,
    pub pending_timed_out: usize,
    pub processing_timed_out: usize,
}

/// Periodic background sweep enforcing the retention and timeout policy over
/// the task store. Each status has its own independent window.
pub struct Janitor {
    store: Arc<dyn TaskStore>,
    settings: Settings,
    shutdown: CancellationToken,
}

impl Janitor {
    pub fn new(store: Arc<dyn TaskStore>, settings: Settings) -> Self {
        Self {
            store,
            settings,
            shutdown: CancellationToken::new(),
        }
    }

    /// Spawns the sweep loop. The returned handle finishes once `stop` is
    /// called.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let janitor = self.clone();
        info!(
            interval_secs = janitor.settings.cleanup_interval.as_secs(),
            "janitor started"
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(janitor.settings.cleanup_interval);
            // the immediate first tick would sweep right at startup
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let stats = janitor.sweep().await;
                        if stats.expired_deleted + stats.pending_timed_out + stats.processing_timed_out > 0 {
                            info!(?stats, "janitor sweep finished");
                        }
                    }
                    _ = janitor.shutdown.cancelled() => {
                        info!("janitor stopped");
                        break;
                    }
                }
            }
        })
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// One pass over every record. Individual record failures are logged and
    /// skipped so one bad record cannot stall the sweep.
    pub async fn sweep(&self) -> SweepStats {
        let now = Utc::now();
        let retention = ChronoDuration::from_std(self.settings.terminal_retention)
            .unwrap_or_else(|_| ChronoDuration::hours(48));
        let pending_timeout = ChronoDuration::from_std(self.settings.pending_timeout)
            .unwrap_or_else(|_| ChronoDuration::hours(1));
        let processing_timeout = ChronoDuration::from_std(self.settings.processing_timeout)
            .unwrap_or_else(|_| ChronoDuration::hours(2));

        let mut stats = SweepStats::default();
        let tasks = match self.store.list().await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!("janitor could not list tasks: {e}");
                return stats;
            }
        };

        let total = tasks.len();
        for task in tasks {
            match task.status {
                TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => {
                    if now - task.created_at > retention {
                        // the client never collected this result
                        info!(task_id = %task.id, status = %task.status,
                              "deleting expired task the caller never cleaned up");
                        match self.store.delete(&task.id).await {
                            Ok(()) => stats.expired_deleted += 1,
                            Err(e) => warn!(task_id = %task.id, "janitor delete failed: {e}"),
                        }
                    }
                }
                TaskStatus::Pending => {
                    if now - task.created_at > pending_timeout {
                        if self.force_fail(&task.id, "Task timed out before processing started")
                            .await
                        {
                            stats.pending_timed_out += 1;
                        }
                    }
                }
                TaskStatus::Processing => {
                    if now - task.updated_at > processing_timeout {
                        if self.force_fail(&task.id, "Task processing stalled and timed out").await
                        {
                            stats.processing_timed_out += 1;
                        }
                    }
                }
                TaskStatus::Retry => {}
            }
        }

        if total > self.settings.memory_warn_threshold {
            warn!(
                total,
                threshold = self.settings.memory_warn_threshold,
                "task store holds an unusually high number of records"
            );
        }

        stats
    }

    async fn force_fail(&self, task_id: &str, message: &str) -> bool {
        let message = message.to_string();
        let result = self
            .store
            .update(
                task_id,
                Box::new(move |task| {
                    task.status = TaskStatus::Failed;
                    task.message = message.clone();
                    task.error_detail = Some(ErrorDetail {
                        error_kind: "ai_timeout".to_string(),
                        message,
                    });
                    task.failed_at = Some(Utc::now());
                }),
            )
            .await;
        match result {
            Ok(applied) => applied,
            Err(e) => {
                warn!(task_id, "janitor force-fail failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{AnalyzeMediaRequest, FrameLevel, Task, TaskKind};
    use crate::store::MemoryTaskStore;

    fn task_with(id: &str, status: TaskStatus, age_hours: i64, updated_mins_ago: i64) -> Task {
        let mut task = Task::new(
            id.to_string(),
            AnalyzeMediaRequest {
                media_id: "m1".to_string(),
                media_type: TaskKind::VideoAnalysis,
                catalog_id: Some("v1".to_string()),
                brand_name: Some("acme".to_string()),
                frame_level: FrameLevel::Medium,
                smart_frame_count: None,
                transcript_url: None,
                custom_prompt: None,
            },
        );
        task.status = status;
        task.created_at = Utc::now() - ChronoDuration::hours(age_hours);
        task.updated_at = Utc::now() - ChronoDuration::minutes(updated_mins_ago);
        task
    }

    async fn seeded_janitor(tasks: Vec<Task>) -> (Arc<Janitor>, Arc<MemoryTaskStore>) {
        let store = Arc::new(MemoryTaskStore::new());
        for task in tasks {
            store.create(task).await.unwrap();
        }
        let janitor = Arc::new(Janitor::new(store.clone(), Settings::default()));
        (janitor, store)
    }

    #[tokio::test]
    async fn stale_pending_task_is_force_failed() {
        let (janitor, store) =
            seeded_janitor(vec![task_with("t1", TaskStatus::Pending, 2, 120)]).await;

        let stats = janitor.sweep().await;
        assert_eq!(stats.pending_timed_out, 1);

        let task = store.get("t1").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error_detail.unwrap().error_kind, "ai_timeout");
        assert!(task.failed_at.is_some());
    }

    #[tokio::test]
    async fn expired_completed_task_is_deleted() {
        let (janitor, store) =
            seeded_janitor(vec![task_with("t1", TaskStatus::Completed, 49, 0)]).await;

        let stats = janitor.sweep().await;
        assert_eq!(stats.expired_deleted, 1);
        assert!(store.get("t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recently_updated_processing_task_is_left_alone() {
        let (janitor, store) =
            seeded_janitor(vec![task_with("t1", TaskStatus::Processing, 3, 10)]).await;

        let stats = janitor.sweep().await;
        assert_eq!(stats.processing_timed_out, 0);
        assert_eq!(
            store.get("t1").await.unwrap().unwrap().status,
            TaskStatus::Processing
        );
    }

    #[tokio::test]
    async fn stalled_processing_task_is_force_failed() {
        let (janitor, store) =
            seeded_janitor(vec![task_with("t1", TaskStatus::Processing, 5, 150)]).await;

        let stats = janitor.sweep().await;
        assert_eq!(stats.processing_timed_out, 1);
        assert_eq!(
            store.get("t1").await.unwrap().unwrap().status,
            TaskStatus::Failed
        );
    }

    #[tokio::test]
    async fn fresh_terminal_tasks_survive_the_sweep() {
        let (janitor, store) = seeded_janitor(vec![
            task_with("done", TaskStatus::Completed, 1, 0),
            task_with("failed", TaskStatus::Failed, 12, 0),
        ])
        .await;

        let stats = janitor.sweep().await;
        assert_eq!(stats.expired_deleted, 0);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn stop_cancels_the_loop() {
        let (janitor, _store) = seeded_janitor(Vec::new()).await;
        let handle = janitor.start();
        janitor.stop();
        handle.await.unwrap();
    }
}
