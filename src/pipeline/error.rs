use std::fmt::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::types::ErrorDetail;

/// Stable client-facing failure taxonomy. The wire name of each kind is the
/// snake_case string clients key their retry policy on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AiTimeout,
    AiRateLimit,
    AiServiceUnavailable,
    NetworkError,
    SensitiveContent,
    ContentTooComplex,
    VideoFormatError,
    VideoCorrupted,
    ImageCorrupted,
    VideoTooShort,
    VideoTooLong,
    FrameExtractionTimeout,
    FrameExtractionFailed,
    ImageFormatError,
    ImageResolutionTooLow,
    ThumbnailFailed,
    MediaNotFound,
    MediaNotReady,
    InvalidParameters,
    AiServiceError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AiTimeout => "ai_timeout",
            ErrorKind::AiRateLimit => "ai_rate_limit",
            ErrorKind::AiServiceUnavailable => "ai_service_unavailable",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::SensitiveContent => "sensitive_content",
            ErrorKind::ContentTooComplex => "content_too_complex",
            ErrorKind::VideoFormatError => "video_format_error",
            ErrorKind::VideoCorrupted => "video_corrupted",
            ErrorKind::ImageCorrupted => "image_corrupted",
            ErrorKind::VideoTooShort => "video_too_short",
            ErrorKind::VideoTooLong => "video_too_long",
            ErrorKind::FrameExtractionTimeout => "frame_extraction_timeout",
            ErrorKind::FrameExtractionFailed => "frame_extraction_failed",
            ErrorKind::ImageFormatError => "image_format_error",
            ErrorKind::ImageResolutionTooLow => "image_resolution_too_low",
            ErrorKind::ThumbnailFailed => "thumbnail_failed",
            ErrorKind::MediaNotFound => "media_not_found",
            ErrorKind::MediaNotReady => "media_not_ready",
            ErrorKind::InvalidParameters => "invalid_parameters",
            ErrorKind::AiServiceError => "ai_service_error",
        }
    }

    /// Whether a client should retry the same request for this kind.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::AiTimeout
                | ErrorKind::AiRateLimit
                | ErrorKind::AiServiceUnavailable
                | ErrorKind::NetworkError
                | ErrorKind::AiServiceError
        )
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline failures, tagged at the point of failure so classification is
/// structural. The substring classifier below remains as a fallback for
/// opaque collaborator errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("media {0} not found")]
    MediaNotFound(String),
    #[error("media {0} is not ready yet")]
    MediaNotReady(String),
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("frame extraction produced no frames for media {0}")]
    NoFrames(String),
    #[error("frame extraction timed out: {0}")]
    FrameExtractionTimeout(String),
    #[error("frame extraction failed: {0}")]
    FrameExtractionFailed(String),
    #[error("model request timed out: {0}")]
    ModelTimeout(String),
    #[error("model rate limit exceeded: {0}")]
    ModelRateLimited(String),
    #[error("model service unavailable: {0}")]
    ModelUnavailable(String),
    #[error("content rejected as sensitive: {0}")]
    SensitiveContent(String),
    #[error("content too complex to analyze: {0}")]
    ContentTooComplex(String),
    #[error("model call failed: {0}")]
    ModelFailed(String),
    #[error("transcript fetch failed: {0}")]
    Transcript(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::MediaNotFound(_) => ErrorKind::MediaNotFound,
            PipelineError::MediaNotReady(_) => ErrorKind::MediaNotReady,
            PipelineError::InvalidParameters(_) => ErrorKind::InvalidParameters,
            PipelineError::NoFrames(_) => ErrorKind::FrameExtractionFailed,
            PipelineError::FrameExtractionTimeout(_) => ErrorKind::FrameExtractionTimeout,
            PipelineError::FrameExtractionFailed(_) => ErrorKind::FrameExtractionFailed,
            PipelineError::ModelTimeout(_) => ErrorKind::AiTimeout,
            PipelineError::ModelRateLimited(_) => ErrorKind::AiRateLimit,
            PipelineError::ModelUnavailable(_) => ErrorKind::AiServiceUnavailable,
            PipelineError::SensitiveContent(_) => ErrorKind::SensitiveContent,
            PipelineError::ContentTooComplex(_) => ErrorKind::ContentTooComplex,
            PipelineError::ModelFailed(_) => ErrorKind::AiServiceError,
            PipelineError::Transcript(_) => ErrorKind::NetworkError,
            PipelineError::Network(e) => {
                if e.is_timeout() {
                    ErrorKind::AiTimeout
                } else {
                    ErrorKind::NetworkError
                }
            }
        }
    }
}

// Ordered substring taxonomy: first match wins. Order matters, the broader
// patterns sit below the more specific ones.
const PATTERNS: &[(&[&str], ErrorKind)] = &[
    (&["timed out", "timeout"], ErrorKind::AiTimeout),
    (&["rate limit", "too many requests", "429"], ErrorKind::AiRateLimit),
    (&["service unavailable", "503", "502"], ErrorKind::AiServiceUnavailable),
    (&["connection", "network", "dns"], ErrorKind::NetworkError),
    (&["sensitive", "content policy", "moderation"], ErrorKind::SensitiveContent),
    (&["too complex"], ErrorKind::ContentTooComplex),
    (&["unsupported video format", "video format"], ErrorKind::VideoFormatError),
    (&["video corrupt", "corrupted video"], ErrorKind::VideoCorrupted),
    (&["image corrupt", "corrupted image"], ErrorKind::ImageCorrupted),
    (&["too short"], ErrorKind::VideoTooShort),
    (&["too long"], ErrorKind::VideoTooLong),
    (&["frame extraction timed", "snapshot timeout"], ErrorKind::FrameExtractionTimeout),
    (&["frame extraction", "no frames", "snapshot"], ErrorKind::FrameExtractionFailed),
    (&["unsupported image format", "image format"], ErrorKind::ImageFormatError),
    (&["resolution too low", "low resolution"], ErrorKind::ImageResolutionTooLow),
    (&["thumbnail"], ErrorKind::ThumbnailFailed),
    (&["not found", "404", "no media info"], ErrorKind::MediaNotFound),
    (&["not ready", "transcoding", "still processing"], ErrorKind::MediaNotReady),
    (&["invalid parameter", "missing parameter", "validation"], ErrorKind::InvalidParameters),
];

/// Maps any pipeline failure to a stable (kind, message) pair. Total: the
/// fallback `ai_service_error` kind is always reachable and this function
/// never panics.
pub fn classify(error: &anyhow::Error) -> ErrorDetail {
    if let Some(pe) = error.downcast_ref::<PipelineError>() {
        return ErrorDetail {
            error_kind: pe.kind().as_str().to_string(),
            message: pe.to_string(),
        };
    }

    let message = format!("{:#}", error);
    let lowered = message.to_lowercase();
    for (needles, kind) in PATTERNS {
        if needles.iter().any(|n| lowered.contains(n)) {
            return ErrorDetail {
                error_kind: kind.as_str().to_string(),
                message,
            };
        }
    }

    ErrorDetail {
        error_kind: ErrorKind::AiServiceError.as_str().to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn structural_classification_wins_over_text() {
        // the message mentions a timeout, but the variant says not-found
        let err = anyhow::Error::new(PipelineError::MediaNotFound(
            "m1 (lookup timeout)".to_string(),
        ));
        let detail = classify(&err);
        assert_eq!(detail.error_kind, "media_not_found");
    }

    #[test]
    fn timeout_text_maps_to_retryable_kind() {
        for msg in ["Request TIMEOUT after 30s", "upstream timed out"] {
            let detail = classify(&anyhow!("{msg}"));
            assert_eq!(detail.error_kind, "ai_timeout");
            assert!(ErrorKind::AiTimeout.retryable());
        }
    }

    #[test]
    fn unknown_errors_fall_back_to_ai_service_error() {
        let detail = classify(&anyhow!("something nobody anticipated"));
        assert_eq!(detail.error_kind, "ai_service_error");
        assert!(ErrorKind::AiServiceError.retryable());
    }

    #[test]
    fn ordered_matching_prefers_earlier_entries() {
        // contains both "rate limit" and "not found"; rate limit sits earlier
        let detail = classify(&anyhow!("rate limit hit while media not found"));
        assert_eq!(detail.error_kind, "ai_rate_limit");
    }

    #[test]
    fn permanent_kinds_are_not_retryable() {
        for kind in [
            ErrorKind::VideoFormatError,
            ErrorKind::InvalidParameters,
            ErrorKind::MediaNotFound,
            ErrorKind::SensitiveContent,
        ] {
            assert!(!kind.retryable(), "{kind} must be permanent");
        }
    }
}
