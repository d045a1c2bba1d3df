use std::sync::Arc;
use tracing::{info, warn};

use crate::collab::{model::extract_json_block, ContentPart, VisionModel};
use crate::config::{ParseFailurePolicy, Settings};
use crate::pipeline::align::spoken_text_in_window;
use crate::pipeline::error::PipelineError;
use crate::pipeline::types::{
    FrameRef, MediaAnalysis, SegmentTagging, TaggingResult, TranscriptSegment,
};

const TAGGING_SYSTEM_PROMPT: &str = "\
You are a media tagging assistant. You are given an ordered sequence of video \
frames. Describe the content as a single JSON object with exactly these keys: \
main_subject, action, scene, visual_style, color_palette, dominant_emotion \
(one word), atmosphere_tags (array of strings), meme_tags (array of current \
meme or trend tags, empty if none apply), keywords (array of search keywords). \
Return only the JSON object.";

const SEGMENT_SYSTEM_PROMPT: &str = "\
You are a media tagging assistant. You are given frames from one time span of \
a longer video, possibly with the transcript spoken during that span. Describe \
this span as a single JSON object with exactly these keys: main_subject, \
action, scene, visual_style, color_palette, dominant_emotion (one word), \
atmosphere_tags, meme_tags, keywords (arrays of strings). Return only the \
JSON object.";

const SYNTHESIS_SYSTEM_PROMPT: &str = "\
You are a media tagging assistant. You are given per-segment tagging results \
covering a whole video in order. Synthesize them into one overall tagging for \
the full video, as a single JSON object with exactly these keys: main_subject, \
action, scene, visual_style, color_palette, dominant_emotion (one word), \
atmosphere_tags, meme_tags, keywords (arrays of strings). Return only the \
JSON object.";

const IMAGE_SYSTEM_PROMPT: &str = "\
You are a media tagging assistant. Describe the image as a single JSON object \
with exactly these keys: main_subject, action, scene, visual_style, \
color_palette, dominant_emotion (one word), atmosphere_tags, meme_tags, \
keywords (arrays of strings). Return only the JSON object.";

/// Media context forwarded to the model alongside the frames.
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    pub duration: f64,
    pub resolution: Option<String>,
    pub frame_count: usize,
}

/// Splits an ordered frame sequence into fixed-size batches, issues one model
/// call per batch plus a final synthesis call, and aggregates the results.
/// Small visual-only inputs skip segmentation entirely.
pub struct BatchAnalyzer {
    model: Arc<dyn VisionModel>,
    single_call_max_frames: usize,
    batch_size: usize,
    parse_failure_policy: ParseFailurePolicy,
}

impl BatchAnalyzer {
    pub fn new(model: Arc<dyn VisionModel>, settings: &Settings) -> Self {
        Self {
            model,
            single_call_max_frames: settings.single_call_max_frames,
            batch_size: settings.batch_size,
            parse_failure_policy: settings.parse_failure_policy,
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub async fn analyze(
        &self,
        frames: &[FrameRef],
        context: &AnalysisContext,
        transcript: Option<&[TranscriptSegment]>,
        custom_prompt: Option<&str>,
    ) -> Result<MediaAnalysis, PipelineError> {
        debug_assert!(!frames.is_empty(), "caller must reject empty extractions");

        if transcript.is_none() && frames.len() <= self.single_call_max_frames {
            return self.analyze_single_call(frames, context, custom_prompt).await;
        }
        self.analyze_batched(frames, context, transcript, custom_prompt)
            .await
    }

    /// Tags a standalone image with one model call.
    pub async fn analyze_image(
        &self,
        image_url: &str,
        custom_prompt: Option<&str>,
    ) -> Result<TaggingResult, PipelineError> {
        let mut parts = Vec::new();
        if let Some(prompt) = custom_prompt {
            parts.push(ContentPart::text(format!("Analysis requirements:\n{prompt}")));
        }
        parts.push(ContentPart::image(image_url));

        let raw = self.model.complete(IMAGE_SYSTEM_PROMPT, parts).await?;
        Ok(self.parse_tagging(&raw))
    }

    async fn analyze_single_call(
        &self,
        frames: &[FrameRef],
        context: &AnalysisContext,
        custom_prompt: Option<&str>,
    ) -> Result<MediaAnalysis, PipelineError> {
        info!(frames = frames.len(), "analyzing in a single model call");

        let mut parts = vec![ContentPart::text(Self::context_text(context))];
        if let Some(prompt) = custom_prompt {
            parts.push(ContentPart::text(format!("Analysis requirements:\n{prompt}")));
        }
        parts.push(ContentPart::text(
            "Analyze the following frame sequence (in time order):",
        ));
        parts.extend(frames.iter().map(|f| ContentPart::image(&f.url)));

        let raw = self.model.complete(TAGGING_SYSTEM_PROMPT, parts).await?;
        Ok(MediaAnalysis {
            overall: self.parse_tagging(&raw),
            timeline_segments: Vec::new(),
            frame_count: frames.len(),
            model_used: self.model.name().to_string(),
        })
    }

    async fn analyze_batched(
        &self,
        frames: &[FrameRef],
        context: &AnalysisContext,
        transcript: Option<&[TranscriptSegment]>,
        custom_prompt: Option<&str>,
    ) -> Result<MediaAnalysis, PipelineError> {
        let batch_count = frames.len().div_ceil(self.batch_size);
        info!(
            frames = frames.len(),
            batches = batch_count,
            "analyzing in batches"
        );

        // Sequential in index order; cross-task parallelism comes from the
        // analysis lane of the concurrency gate, not from here.
        let mut segments = Vec::with_capacity(batch_count);
        for (idx, batch) in frames.chunks(self.batch_size).enumerate() {
            let segment = self
                .analyze_batch(idx, batch_count, batch, context, transcript, custom_prompt)
                .await?;
            segments.push(segment);
        }

        let overall = self.synthesize(&segments, context).await?;
        Ok(MediaAnalysis {
            overall,
            timeline_segments: segments,
            frame_count: frames.len(),
            model_used: self.model.name().to_string(),
        })
    }

    async fn analyze_batch(
        &self,
        idx: usize,
        batch_count: usize,
        batch: &[FrameRef],
        context: &AnalysisContext,
        transcript: Option<&[TranscriptSegment]>,
        custom_prompt: Option<&str>,
    ) -> Result<SegmentTagging, PipelineError> {
        let start_index = idx * self.batch_size;
        let end_index = start_index + batch.len();
        // Linear interpolation of the batch's span over the whole duration.
        let per_frame = context.duration / context.frame_count as f64;
        let start_time = start_index as f64 * per_frame;
        let end_time = end_index as f64 * per_frame;
        let frame_range = format!("{}-{}", start_index + 1, end_index);

        let spoken = transcript
            .and_then(|t| spoken_text_in_window(t, start_time, end_time));

        let mut parts = vec![ContentPart::text(format!(
            "{}\nSegment {} of {}, time range {:.1}s - {:.1}s.",
            Self::context_text(context),
            idx + 1,
            batch_count,
            start_time,
            end_time
        ))];
        if let Some(text) = &spoken {
            parts.push(ContentPart::text(format!(
                "Transcript spoken during this span:\n{text}"
            )));
        }
        if let Some(prompt) = custom_prompt {
            parts.push(ContentPart::text(format!("Analysis requirements:\n{prompt}")));
        }
        parts.extend(batch.iter().map(|f| ContentPart::image(&f.url)));

        let tagging = self
            .call_with_policy(SEGMENT_SYSTEM_PROMPT, parts, &frame_range)
            .await?;

        Ok(SegmentTagging {
            start_time,
            end_time,
            spoken_content: spoken,
            frame_range,
            tagging,
        })
    }

    /// One model call parsed under the configured parse-failure policy:
    /// Degrade yields empty-field placeholders, Retry(n) re-issues the call
    /// up to n times first.
    async fn call_with_policy(
        &self,
        system_prompt: &str,
        parts: Vec<ContentPart>,
        frame_range: &str,
    ) -> Result<TaggingResult, PipelineError> {
        let attempts = match self.parse_failure_policy {
            ParseFailurePolicy::Degrade => 1,
            ParseFailurePolicy::Retry(n) => n.saturating_add(1),
        };

        for attempt in 1..=attempts {
            let raw = self.model.complete(system_prompt, parts.clone()).await?;
            match serde_json::from_str::<TaggingResult>(extract_json_block(&raw)) {
                Ok(tagging) => return Ok(tagging),
                Err(e) => warn!(
                    frame_range,
                    attempt, attempts, error = %e,
                    "batch response was not parseable JSON"
                ),
            }
        }

        warn!(frame_range, "degrading batch to a placeholder record");
        Ok(TaggingResult::default())
    }

    async fn synthesize(
        &self,
        segments: &[SegmentTagging],
        context: &AnalysisContext,
    ) -> Result<TaggingResult, PipelineError> {
        // Compact textual digest; the raw images are not re-sent.
        let mut digest = format!(
            "The video is {:.1}s long and was analyzed in {} segments:\n",
            context.duration,
            segments.len()
        );
        for (idx, seg) in segments.iter().enumerate() {
            digest.push_str(&format!(
                "Segment {} ({:.1}s-{:.1}s, frames {}): subject={}; action={}; \
                 scene={}; emotion={}; keywords={}\n",
                idx + 1,
                seg.start_time,
                seg.end_time,
                seg.frame_range,
                seg.tagging.main_subject,
                seg.tagging.action,
                seg.tagging.scene,
                seg.tagging.dominant_emotion,
                seg.tagging.keywords.join(", "),
            ));
        }

        let raw = self
            .model
            .complete(SYNTHESIS_SYSTEM_PROMPT, vec![ContentPart::text(digest)])
            .await?;

        match serde_json::from_str::<TaggingResult>(extract_json_block(&raw)) {
            Ok(overall) => Ok(overall),
            Err(e) => {
                warn!(error = %e, "synthesis response was not parseable, merging segment keywords");
                let mut overall = TaggingResult::default();
                for seg in segments {
                    for kw in &seg.tagging.keywords {
                        if !overall.keywords.contains(kw) {
                            overall.keywords.push(kw.clone());
                        }
                    }
                }
                Ok(overall)
            }
        }
    }

    /// Whole-item responses degrade the same way batches do: a malformed
    /// completion yields an empty-field tagging rather than a failed task.
    fn parse_tagging(&self, raw: &str) -> TaggingResult {
        match serde_json::from_str::<TaggingResult>(extract_json_block(raw)) {
            Ok(tagging) => tagging,
            Err(e) => {
                warn!(error = %e, "completion was not parseable JSON, returning empty tagging");
                TaggingResult::default()
            }
        }
    }

    fn context_text(context: &AnalysisContext) -> String {
        let mut text = format!(
            "Video info:\n- duration: {:.1}s\n- frame count: {}\n",
            context.duration, context.frame_count
        );
        if let Some(res) = &context.resolution {
            text.push_str(&format!("- resolution: {res}\n"));
        }
        text
    }
}
