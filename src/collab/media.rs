use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::Settings;
use crate::pipeline::error::PipelineError;
use crate::pipeline::types::{FrameLevel, TranscriptSegment};
use super::{MediaInfo, MediaLibrary, TranscriptSource};

/// HTTP client for the media asset store.
pub struct HttpMediaLibrary {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct MediaInfoBody {
    media_id: String,
    #[serde(default)]
    duration: f64,
    resolution: Option<String>,
    #[serde(default)]
    status: Option<String>,
    file_url: Option<String>,
}

impl HttpMediaLibrary {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: settings.media_api_base.trim_end_matches('/').to_string(),
            api_key: settings.media_api_key.clone(),
        }
    }

    /// Reduces the asset store's file URL to a bucket-relative locator,
    /// stripping scheme, host and signing parameters.
    fn parse_locator(file_url: &str) -> String {
        let no_params = file_url.split('?').next().unwrap_or(file_url);
        if let Some(rest) = no_params.strip_prefix("oss://") {
            return rest.splitn(2, '/').nth(1).unwrap_or(rest).to_string();
        }
        if let Some(idx) = no_params.find(".aliyuncs.com/") {
            return no_params[idx + ".aliyuncs.com/".len()..].to_string();
        }
        no_params.to_string()
    }
}

#[async_trait]
impl MediaLibrary for HttpMediaLibrary {
    async fn get_media_info(&self, media_id: &str) -> Result<MediaInfo, PipelineError> {
        let url = format!("{}/media/{}", self.base_url, media_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PipelineError::MediaNotFound(media_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(PipelineError::FrameExtractionFailed(format!(
                "media info request for {} returned {}",
                media_id,
                response.status()
            )));
        }

        let body: MediaInfoBody = response.json().await?;
        if matches!(body.status.as_deref(), Some("transcoding") | Some("registering")) {
            return Err(PipelineError::MediaNotReady(media_id.to_string()));
        }
        let file_url = body
            .file_url
            .ok_or_else(|| PipelineError::MediaNotReady(media_id.to_string()))?;

        info!(
            media_id,
            duration = body.duration,
            resolution = body.resolution.as_deref().unwrap_or("unknown"),
            "retrieved media info"
        );

        Ok(MediaInfo {
            media_id: body.media_id,
            duration: body.duration,
            resolution: body.resolution,
            storage_locator: Self::parse_locator(&file_url),
        })
    }

    fn snapshot_url(&self, storage_locator: &str, timestamp_ms: u64) -> String {
        // Real-time snapshot rendering via object-store processing params.
        format!(
            "{}/render/{}?x-process=video/snapshot,t_{},f_jpg,w_1280,m_fast",
            self.base_url, storage_locator, timestamp_ms
        )
    }

    fn asset_url(&self, storage_locator: &str) -> String {
        format!("{}/render/{}", self.base_url, storage_locator)
    }
}

/// Timestamps (seconds from media start) to sample at the given density.
/// Interval-based levels walk the duration at a fixed step; Smart spreads a
/// target count evenly across the duration.
pub fn plan_frame_timestamps(
    duration: f64,
    level: FrameLevel,
    smart_count: usize,
    settings: &Settings,
) -> Vec<f64> {
    if duration <= 0.0 {
        return Vec::new();
    }
    match level {
        FrameLevel::Smart => {
            let count = smart_count.max(1);
            let step = duration / count as f64;
            (0..count).map(|i| i as f64 * step).collect()
        }
        _ => {
            let interval = match level {
                FrameLevel::Low => settings.frame_interval_low,
                FrameLevel::Medium => settings.frame_interval_medium,
                FrameLevel::High => settings.frame_interval_high,
                FrameLevel::Smart => unreachable!(),
            };
            let mut points = Vec::new();
            let mut current = 0.0;
            while current < duration {
                points.push(current);
                current += interval;
            }
            points
        }
    }
}

/// Downloads a transcript as a JSON array of segments.
pub struct HttpTranscriptSource {
    client: reqwest::Client,
}

impl HttpTranscriptSource {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTranscriptSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriptSource for HttpTranscriptSource {
    async fn download(&self, url: &str) -> Result<Vec<TranscriptSegment>, PipelineError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(PipelineError::Transcript(format!(
                "download returned {}",
                response.status()
            )));
        }
        let segments: Vec<TranscriptSegment> = response.json().await?;
        let valid: Vec<TranscriptSegment> = segments
            .into_iter()
            .filter(|s| {
                if s.end_time < s.start_time {
                    warn!(
                        start = s.start_time,
                        end = s.end_time,
                        "dropping transcript segment with inverted span"
                    );
                    false
                } else {
                    true
                }
            })
            .collect();
        Ok(valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn medium_level_samples_every_three_seconds() {
        let settings = Settings::default();
        let points = plan_frame_timestamps(9.0, FrameLevel::Medium, 50, &settings);
        assert_eq!(points, vec![0.0, 3.0, 6.0]);
    }

    #[test]
    fn zero_duration_yields_no_frames() {
        let settings = Settings::default();
        assert!(plan_frame_timestamps(0.0, FrameLevel::High, 50, &settings).is_empty());
    }

    #[test]
    fn smart_level_spreads_target_count() {
        let settings = Settings::default();
        let points = plan_frame_timestamps(100.0, FrameLevel::Smart, 4, &settings);
        assert_eq!(points, vec![0.0, 25.0, 50.0, 75.0]);
    }

    #[test]
    fn locator_parsing_strips_scheme_and_params() {
        assert_eq!(
            HttpMediaLibrary::parse_locator("oss://bucket/videos/a.mp4"),
            "videos/a.mp4"
        );
        assert_eq!(
            HttpMediaLibrary::parse_locator(
                "http://bucket.oss-cn.aliyuncs.com/videos/a.mp4?Expires=1"
            ),
            "videos/a.mp4"
        );
        assert_eq!(
            HttpMediaLibrary::parse_locator("videos/a.mp4"),
            "videos/a.mp4"
        );
    }
}
