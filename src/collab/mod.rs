pub mod media;
pub mod model;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::pipeline::error::PipelineError;
use crate::pipeline::types::TranscriptSegment;

pub use media::{plan_frame_timestamps, HttpMediaLibrary, HttpTranscriptSource};
pub use model::HttpVisionModel;

/// Media metadata as reported by the asset store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub media_id: String,
    pub duration: f64,
    pub resolution: Option<String>,
    /// Bucket-relative path the snapshot renderer resolves frames against.
    pub storage_locator: String,
}

/// Asset-store collaborator: metadata lookup plus frame-snapshot URL
/// rendering. Wire details live behind this boundary.
#[async_trait]
pub trait MediaLibrary: Send + Sync {
    async fn get_media_info(&self, media_id: &str) -> Result<MediaInfo, PipelineError>;

    /// Resolvable URL for a single frame snapshot at `timestamp_ms`.
    fn snapshot_url(&self, storage_locator: &str, timestamp_ms: u64) -> String;

    /// Resolvable URL for the asset itself (used for still images).
    fn asset_url(&self, storage_locator: &str) -> String;
}

/// One part of a multimodal user message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }
}

/// Vision-language model collaborator. Returns the raw completion text;
/// callers parse the expected JSON out of it.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_parts: Vec<ContentPart>,
    ) -> Result<String, PipelineError>;

    fn name(&self) -> &str;
}

/// Transcript download collaborator. Errors here never fail a task; the
/// pipeline degrades to visual-only analysis.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    async fn download(&self, url: &str) -> Result<Vec<TranscriptSegment>, PipelineError>;
}
