use std::fmt::Display;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    VideoAnalysis,
    ImageAnalysis,
}

impl Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::VideoAnalysis => write!(f, "video_analysis"),
            TaskKind::ImageAnalysis => write!(f, "image_analysis"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    // reserved for a future retry policy, never produced by the pipeline
    Retry,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Frame sampling density for video analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FrameLevel {
    Low,
    #[default]
    Medium,
    High,
    Smart,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeMediaRequest {
    pub media_id: String,
    pub media_type: TaskKind,
    /// Catalog-side identifier for the asset, echoed back in results.
    pub catalog_id: Option<String>,
    pub brand_name: Option<String>,
    #[serde(default)]
    pub frame_level: FrameLevel,
    pub smart_frame_count: Option<usize>,
    pub transcript_url: Option<String>,
    pub custom_prompt: Option<String>,
}

/// One still sampled from the video, ordered by timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRef {
    pub number: usize,
    pub timestamp: f64,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
}

/// Fixed tagging schema produced by the model. The three list fields are
/// always present; an analysis with nothing to report yields empty lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaggingResult {
    #[serde(default)]
    pub main_subject: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub scene: String,
    #[serde(default)]
    pub visual_style: String,
    #[serde(default)]
    pub color_palette: String,
    #[serde(default)]
    pub dominant_emotion: String,
    #[serde(default)]
    pub atmosphere_tags: Vec<String>,
    #[serde(default)]
    pub meme_tags: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Tagging for one batch of frames, placed on the video timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentTagging {
    pub start_time: f64,
    pub end_time: f64,
    /// Aligned transcript text for this span, None for visual-only analyses.
    pub spoken_content: Option<String>,
    /// 1-based inclusive frame range, e.g. "11-20".
    pub frame_range: String,
    #[serde(flatten)]
    pub tagging: TaggingResult,
}

/// Result payload of a completed analysis task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAnalysis {
    pub overall: TaggingResult,
    pub timeline_segments: Vec<SegmentTagging>,
    pub frame_count: usize,
    pub model_used: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub error_kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub kind: TaskKind,
    pub request: AnalyzeMediaRequest,
    pub status: TaskStatus,
    pub message: String,
    pub progress: u8,
    pub result: Option<MediaAnalysis>,
    pub error_detail: Option<ErrorDetail>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: String, request: AnalyzeMediaRequest) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind: request.media_type,
            request,
            status: TaskStatus::Pending,
            message: "Task submitted".to_string(),
            progress: 0,
            result: None,
            error_detail: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            failed_at: None,
        }
    }
}
