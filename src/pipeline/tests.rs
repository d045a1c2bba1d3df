use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use tokio::time::sleep;

use crate::collab::{ContentPart, MediaInfo, MediaLibrary, TranscriptSource, VisionModel};
use crate::config::Settings;
use crate::pipeline::analyzer::BatchAnalyzer;
use crate::pipeline::error::PipelineError;
use crate::pipeline::gate::ConcurrencyGate;
use crate::pipeline::orchestrator::Orchestrator;
use crate::pipeline::types::{
    AnalyzeMediaRequest, FrameLevel, Task, TaskKind, TaskStatus, TranscriptSegment,
};
use crate::store::{MemoryTaskStore, TaskStore};

const TAGGING_JSON: &str = r#"{
    "main_subject": "a street performer",
    "action": "juggling",
    "scene": "city square",
    "visual_style": "documentary",
    "color_palette": "warm",
    "dominant_emotion": "joy",
    "atmosphere_tags": ["crowd", "evening"],
    "meme_tags": [],
    "keywords": ["juggling", "street art"]
}"#;

struct StubMedia {
    duration: f64,
    known: bool,
}

#[async_trait]
impl MediaLibrary for StubMedia {
    async fn get_media_info(&self, media_id: &str) -> Result<MediaInfo, PipelineError> {
        if !self.known {
            return Err(PipelineError::MediaNotFound(media_id.to_string()));
        }
        Ok(MediaInfo {
            media_id: media_id.to_string(),
            duration: self.duration,
            resolution: Some("1920x1080".to_string()),
            storage_locator: "videos/clip.mp4".to_string(),
        })
    }

    fn snapshot_url(&self, storage_locator: &str, timestamp_ms: u64) -> String {
        format!("https://store.example/{storage_locator}?t={timestamp_ms}")
    }

    fn asset_url(&self, storage_locator: &str) -> String {
        format!("https://store.example/{storage_locator}")
    }
}

struct StubTranscripts {
    segments: Option<Vec<TranscriptSegment>>,
}

#[async_trait]
impl TranscriptSource for StubTranscripts {
    async fn download(&self, _url: &str) -> Result<Vec<TranscriptSegment>, PipelineError> {
        match &self.segments {
            Some(segments) => Ok(segments.clone()),
            None => Err(PipelineError::Transcript("HTTP 500".to_string())),
        }
    }
}

struct StubModel;

#[async_trait]
impl VisionModel for StubModel {
    async fn complete(
        &self,
        _system_prompt: &str,
        _user_parts: Vec<ContentPart>,
    ) -> Result<String, PipelineError> {
        Ok(TAGGING_JSON.to_string())
    }

    fn name(&self) -> &str {
        "stub-vision"
    }
}

fn orchestrator(media: StubMedia, transcripts: StubTranscripts) -> Arc<Orchestrator> {
    let settings = Settings::default();
    let store: Arc<dyn TaskStore> = Arc::new(MemoryTaskStore::new());
    let gate = Arc::new(ConcurrencyGate::new(
        settings.max_extraction_concurrent,
        settings.max_analysis_concurrent,
    ));
    let analyzer = BatchAnalyzer::new(Arc::new(StubModel), &settings);
    Arc::new(Orchestrator::new(
        store,
        gate,
        Arc::new(media),
        Arc::new(transcripts),
        analyzer,
        settings,
    ))
}

fn video_request(media_id: &str, transcript_url: Option<&str>) -> AnalyzeMediaRequest {
    AnalyzeMediaRequest {
        media_id: media_id.to_string(),
        media_type: TaskKind::VideoAnalysis,
        catalog_id: Some("vid_001".to_string()),
        brand_name: Some("acme".to_string()),
        frame_level: FrameLevel::Medium,
        smart_frame_count: None,
        transcript_url: transcript_url.map(|s| s.to_string()),
        custom_prompt: None,
    }
}

async fn wait_for_terminal(orchestrator: &Arc<Orchestrator>, task_id: &str) -> Task {
    for _ in 0..200 {
        if let Some(task) = orchestrator.store().get(task_id).await.unwrap() {
            if task.status.is_terminal() {
                return task;
            }
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("task {task_id} never reached a terminal state");
}

#[tokio::test]
async fn nine_second_video_completes_with_tagging() {
    let orch = orchestrator(
        StubMedia {
            duration: 9.0,
            known: true,
        },
        StubTranscripts { segments: None },
    );

    let task = orch.submit(video_request("m1", None)).await.unwrap();
    assert_eq!(task.status, TaskStatus::Pending);

    let done = wait_for_terminal(&orch, &task.id).await;
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.progress, 100);
    assert!(done.completed_at.is_some());
    assert!(done.error_detail.is_none());

    let result = done.result.unwrap();
    // medium level on a 9s video samples t=0,3,6
    assert_eq!(result.frame_count, 3);
    assert!(!result.overall.main_subject.is_empty());
    // list fields are present even when empty
    assert_eq!(result.overall.atmosphere_tags, vec!["crowd", "evening"]);
    assert!(result.overall.meme_tags.is_empty());
}

#[tokio::test]
async fn unknown_media_fails_with_media_not_found() {
    let orch = orchestrator(
        StubMedia {
            duration: 9.0,
            known: false,
        },
        StubTranscripts { segments: None },
    );

    let task = orch.submit(video_request("ghost", None)).await.unwrap();
    let done = wait_for_terminal(&orch, &task.id).await;

    assert_eq!(done.status, TaskStatus::Failed);
    assert!(done.result.is_none());
    assert!(done.failed_at.is_some());
    let detail = done.error_detail.unwrap();
    assert_eq!(detail.error_kind, "media_not_found");
}

#[tokio::test]
async fn failed_transcript_download_degrades_to_visual_only() {
    // 99s at medium level gives 33 frames, above the single-call cap,
    // so the analyzer batches and emits timeline segments
    let orch = orchestrator(
        StubMedia {
            duration: 99.0,
            known: true,
        },
        StubTranscripts { segments: None },
    );

    let task = orch
        .submit(video_request("m1", Some("https://transcripts.example/t.json")))
        .await
        .unwrap();
    let done = wait_for_terminal(&orch, &task.id).await;

    assert_eq!(done.status, TaskStatus::Completed);
    let result = done.result.unwrap();
    assert!(!result.timeline_segments.is_empty());
    assert!(result
        .timeline_segments
        .iter()
        .all(|s| s.spoken_content.is_none()));
}

#[tokio::test]
async fn transcript_text_lands_on_timeline_segments() {
    let orch = orchestrator(
        StubMedia {
            duration: 30.0,
            known: true,
        },
        StubTranscripts {
            segments: Some(vec![TranscriptSegment {
                start_time: 0.0,
                end_time: 30.0,
                text: "welcome back everyone".to_string(),
            }]),
        },
    );

    let task = orch
        .submit(video_request("m1", Some("https://transcripts.example/t.json")))
        .await
        .unwrap();
    let done = wait_for_terminal(&orch, &task.id).await;

    assert_eq!(done.status, TaskStatus::Completed);
    let result = done.result.unwrap();
    assert!(!result.timeline_segments.is_empty());
    assert!(result
        .timeline_segments
        .iter()
        .all(|s| s.spoken_content.as_deref() == Some("welcome back everyone")));
}

#[tokio::test]
async fn video_submission_without_catalog_fields_is_rejected() {
    let orch = orchestrator(
        StubMedia {
            duration: 9.0,
            known: true,
        },
        StubTranscripts { segments: None },
    );

    let mut request = video_request("m1", None);
    request.catalog_id = None;
    let err = orch.submit(request).await.unwrap_err();
    let detail = crate::pipeline::error::classify(&err);
    assert_eq!(detail.error_kind, "invalid_parameters");
}

#[tokio::test]
async fn image_task_completes_without_timeline() {
    let orch = orchestrator(
        StubMedia {
            duration: 0.0,
            known: true,
        },
        StubTranscripts { segments: None },
    );

    let request = AnalyzeMediaRequest {
        media_id: "img1".to_string(),
        media_type: TaskKind::ImageAnalysis,
        catalog_id: None,
        brand_name: None,
        frame_level: FrameLevel::Medium,
        smart_frame_count: None,
        transcript_url: None,
        custom_prompt: Some("what is pictured?".to_string()),
    };
    let task = orch.submit(request).await.unwrap();
    let done = wait_for_terminal(&orch, &task.id).await;

    assert_eq!(done.status, TaskStatus::Completed);
    let result = done.result.unwrap();
    assert_eq!(result.frame_count, 1);
    assert!(result.timeline_segments.is_empty());
    assert_eq!(result.overall.dominant_emotion, "joy");
}

#[tokio::test]
async fn zero_duration_video_fails_before_analysis() {
    let orch = orchestrator(
        StubMedia {
            duration: 0.0,
            known: true,
        },
        StubTranscripts { segments: None },
    );

    let task = orch.submit(video_request("m1", None)).await.unwrap();
    let done = wait_for_terminal(&orch, &task.id).await;

    assert_eq!(done.status, TaskStatus::Failed);
    let detail = done.error_detail.unwrap();
    assert_eq!(detail.error_kind, "frame_extraction_failed");
    assert!(detail.message.contains("no frames"));
}
