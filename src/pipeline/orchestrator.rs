use std::sync::Arc;
use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::collab::{MediaLibrary, TranscriptSource};
use crate::config::Settings;
use crate::pipeline::analyzer::{AnalysisContext, BatchAnalyzer};
use crate::pipeline::error::{classify, PipelineError};
use crate::pipeline::gate::ConcurrencyGate;
use crate::pipeline::types::{
    AnalyzeMediaRequest, FrameRef, MediaAnalysis, Task, TaskKind, TaskStatus,
    TranscriptSegment,
};
use crate::store::TaskStore;

/// Status-bucketed record counts for the stats endpoint.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TaskCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Drives one submitted unit of work through the analysis pipeline:
/// metadata -> frames -> optional transcript -> batched model analysis ->
/// result assembly, with stage admission bounded by the concurrency gate.
pub struct Orchestrator {
    store: Arc<dyn TaskStore>,
    gate: Arc<ConcurrencyGate>,
    media: Arc<dyn MediaLibrary>,
    transcripts: Arc<dyn TranscriptSource>,
    analyzer: BatchAnalyzer,
    settings: Settings,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        gate: Arc<ConcurrencyGate>,
        media: Arc<dyn MediaLibrary>,
        transcripts: Arc<dyn TranscriptSource>,
        analyzer: BatchAnalyzer,
        settings: Settings,
    ) -> Self {
        Self {
            store,
            gate,
            media,
            transcripts,
            analyzer,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn gate(&self) -> &Arc<ConcurrencyGate> {
        &self.gate
    }

    /// Accepts a unit of work: validates it, creates the Pending record and
    /// spawns the pipeline run. Returns immediately with the new record.
    pub async fn submit(self: &Arc<Self>, request: AnalyzeMediaRequest) -> Result<Task> {
        Self::validate(&request)?;

        let id = format!(
            "task_{}_{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple()
        );
        let task = Task::new(id.clone(), request);
        self.store.create(task.clone()).await?;
        info!(task_id = %id, kind = %task.kind, "task submitted");

        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator.run_pipeline(&id).await;
        });

        Ok(task)
    }

    fn validate(request: &AnalyzeMediaRequest) -> Result<()> {
        if request.media_id.trim().is_empty() {
            return Err(PipelineError::InvalidParameters("media_id is required".into()).into());
        }
        if request.media_type == TaskKind::VideoAnalysis
            && (request.catalog_id.is_none() || request.brand_name.is_none())
        {
            return Err(PipelineError::InvalidParameters(
                "catalog_id and brand_name are required for video analysis".into(),
            )
            .into());
        }
        Ok(())
    }

    /// One pipeline run for one record. All stage failures propagate to the
    /// single handler here, which classifies and records them; lane permits
    /// are scope-bound and already released by the time the failure is
    /// written.
    pub async fn run_pipeline(&self, task_id: &str) {
        let outcome = match self.task_kind(task_id).await {
            Some(TaskKind::VideoAnalysis) => self.run_video(task_id).await,
            Some(TaskKind::ImageAnalysis) => self.run_image(task_id).await,
            None => {
                warn!(task_id, "record vanished before the pipeline started");
                return;
            }
        };

        if let Err(e) = outcome {
            let detail = classify(&e);
            error!(task_id, kind = %detail.error_kind, "pipeline failed: {:#}", e);
            let message = format!("Analysis failed: {}", detail.message);
            let update = self
                .store
                .update(
                    task_id,
                    Box::new(move |task| {
                        task.status = TaskStatus::Failed;
                        task.message = message;
                        task.error_detail = Some(detail);
                        task.failed_at = Some(Utc::now());
                    }),
                )
                .await;
            if let Err(store_err) = update {
                // never mask the original failure with a bookkeeping error
                error!(task_id, "failed to record task failure: {store_err}");
            }
        }
    }

    async fn task_kind(&self, task_id: &str) -> Option<TaskKind> {
        self.store.get(task_id).await.ok().flatten().map(|t| t.kind)
    }

    async fn run_video(&self, task_id: &str) -> Result<()> {
        let task = self.load(task_id).await?;
        let request = task.request;

        self.progress(task_id, TaskStatus::Processing, 10, "Fetching media info...")
            .await?;

        // stage 1: metadata + frame planning, bounded by the extraction lane
        let (info, frames) = {
            let _permit = self.gate.acquire_extraction().await?;
            let info = self.media.get_media_info(&request.media_id).await?;

            self.progress(task_id, TaskStatus::Processing, 30, "Extracting frames...")
                .await?;

            let timestamps = crate::collab::plan_frame_timestamps(
                info.duration,
                request.frame_level,
                request
                    .smart_frame_count
                    .unwrap_or(self.settings.smart_frame_count),
                &self.settings,
            );
            if timestamps.is_empty() {
                return Err(PipelineError::NoFrames(request.media_id.clone()).into());
            }

            let frames: Vec<FrameRef> = timestamps
                .iter()
                .enumerate()
                .map(|(i, &t)| FrameRef {
                    number: i + 1,
                    timestamp: t,
                    url: self
                        .media
                        .snapshot_url(&info.storage_locator, (t * 1000.0) as u64),
                })
                .collect();
            (info, frames)
        };

        info!(task_id, frames = frames.len(), "frame extraction planned");
        self.progress(task_id, TaskStatus::Processing, 50, "Fetching transcript...")
            .await?;

        // stage 2: optional transcript; failure degrades to visual-only
        let transcript: Option<Vec<TranscriptSegment>> = match &request.transcript_url {
            Some(url) => match self.transcripts.download(url).await {
                Ok(segments) if !segments.is_empty() => Some(segments),
                Ok(_) => None,
                Err(e) => {
                    warn!(task_id, "transcript fetch failed, continuing visual-only: {e}");
                    None
                }
            },
            None => None,
        };

        self.progress(task_id, TaskStatus::Processing, 60, "Analyzing frames with AI...")
            .await?;

        // stage 3: model analysis, bounded by the analysis lane
        let analysis = {
            let _permit = self.gate.acquire_analysis().await?;
            let context = AnalysisContext {
                duration: info.duration,
                resolution: info.resolution.clone(),
                frame_count: frames.len(),
            };
            self.analyzer
                .analyze(
                    &frames,
                    &context,
                    transcript.as_deref(),
                    request.custom_prompt.as_deref(),
                )
                .await?
        };

        self.complete(task_id, analysis, "Video analysis completed").await
    }

    async fn run_image(&self, task_id: &str) -> Result<()> {
        let task = self.load(task_id).await?;
        let request = task.request;

        self.progress(task_id, TaskStatus::Processing, 10, "Getting image URL...")
            .await?;

        let image_url = {
            let _permit = self.gate.acquire_extraction().await?;
            let info = self.media.get_media_info(&request.media_id).await?;
            self.media.asset_url(&info.storage_locator)
        };

        self.progress(task_id, TaskStatus::Processing, 50, "Analyzing image with AI...")
            .await?;

        let overall = {
            let _permit = self.gate.acquire_analysis().await?;
            self.analyzer
                .analyze_image(&image_url, request.custom_prompt.as_deref())
                .await?
        };

        let analysis = MediaAnalysis {
            overall,
            timeline_segments: Vec::new(),
            frame_count: 1,
            model_used: self.analyzer_model_name(),
        };
        self.complete(task_id, analysis, "Image analysis completed").await
    }

    fn analyzer_model_name(&self) -> String {
        self.analyzer.model_name().to_string()
    }

    async fn load(&self, task_id: &str) -> Result<Task> {
        self.store
            .get(task_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("task {task_id} disappeared mid-pipeline"))
    }

    async fn progress(
        &self,
        task_id: &str,
        status: TaskStatus,
        progress: u8,
        message: &str,
    ) -> Result<()> {
        let message = message.to_string();
        self.store
            .update(
                task_id,
                Box::new(move |task| {
                    task.status = status;
                    // progress never moves backwards while processing
                    task.progress = task.progress.max(progress);
                    task.message = message;
                }),
            )
            .await?;
        Ok(())
    }

    async fn complete(&self, task_id: &str, analysis: MediaAnalysis, message: &str) -> Result<()> {
        let message = message.to_string();
        let applied = self
            .store
            .update(
                task_id,
                Box::new(move |task| {
                    task.status = TaskStatus::Completed;
                    task.progress = 100;
                    task.message = message;
                    task.result = Some(analysis);
                    task.completed_at = Some(Utc::now());
                }),
            )
            .await?;
        if applied {
            info!(task_id, "task completed");
        }
        Ok(())
    }

    pub async fn task_counts(&self) -> Result<TaskCounts> {
        let mut counts = TaskCounts::default();
        for task in self.store.list().await? {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Processing => counts.processing += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
                TaskStatus::Retry | TaskStatus::Cancelled => {}
            }
        }
        Ok(counts)
    }
}
