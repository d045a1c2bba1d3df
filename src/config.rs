use std::env;
use std::time::Duration;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().or_else(|| dotenv::var(key).ok())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_var(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// What to do when a batch model response is not parseable JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseFailurePolicy {
    /// Record a placeholder segment with empty fields and keep going.
    Degrade,
    /// Re-issue the batch call up to N times, then degrade.
    Retry(u32),
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,

    // media library collaborator
    pub media_api_base: String,
    pub media_api_key: String,

    // vision model collaborator
    pub model_endpoint: String,
    pub model_api_key: String,
    pub model_name: String,
    pub model_max_tokens: u32,
    pub model_timeout: Duration,

    // frame planning: seconds per frame at each level
    pub frame_interval_low: f64,
    pub frame_interval_medium: f64,
    pub frame_interval_high: f64,
    pub smart_frame_count: usize,

    // analyzer
    pub single_call_max_frames: usize,
    pub batch_size: usize,
    pub parse_failure_policy: ParseFailurePolicy,

    // concurrency lanes
    pub max_extraction_concurrent: usize,
    pub max_analysis_concurrent: usize,

    // janitor
    pub cleanup_interval: Duration,
    pub pending_timeout: Duration,
    pub processing_timeout: Duration,
    pub terminal_retention: Duration,
    pub memory_warn_threshold: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
            media_api_base: String::new(),
            media_api_key: String::new(),
            model_endpoint: "https://ark.cn-beijing.volces.com/api/v3".to_string(),
            model_api_key: String::new(),
            model_name: "doubao-pro".to_string(),
            model_max_tokens: 8192,
            model_timeout: Duration::from_secs(300),
            frame_interval_low: 10.0,
            frame_interval_medium: 3.0,
            frame_interval_high: 1.0,
            smart_frame_count: 50,
            single_call_max_frames: 30,
            batch_size: 10,
            parse_failure_policy: ParseFailurePolicy::Degrade,
            max_extraction_concurrent: 5,
            max_analysis_concurrent: 3,
            cleanup_interval: Duration::from_secs(1800),
            pending_timeout: Duration::from_secs(3600),
            processing_timeout: Duration::from_secs(7200),
            terminal_retention: Duration::from_secs(172_800),
            memory_warn_threshold: 500,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Settings::default();
        let retry = env_parse::<u32>("MTAG_BATCH_PARSE_RETRIES", 0);
        Self {
            host: env_var("MTAG_HOST").unwrap_or(defaults.host),
            port: env_parse("MTAG_PORT", defaults.port),
            media_api_base: env_var("MTAG_MEDIA_API_BASE").unwrap_or_default(),
            media_api_key: env_var("MTAG_MEDIA_API_KEY").unwrap_or_default(),
            model_endpoint: env_var("MTAG_MODEL_ENDPOINT").unwrap_or(defaults.model_endpoint),
            model_api_key: env_var("MTAG_MODEL_API_KEY").unwrap_or_default(),
            model_name: env_var("MTAG_MODEL_NAME").unwrap_or(defaults.model_name),
            model_max_tokens: env_parse("MTAG_MODEL_MAX_TOKENS", defaults.model_max_tokens),
            model_timeout: Duration::from_secs(env_parse("MTAG_MODEL_TIMEOUT_SECS", 300)),
            frame_interval_low: env_parse("MTAG_FRAME_INTERVAL_LOW", defaults.frame_interval_low),
            frame_interval_medium: env_parse(
                "MTAG_FRAME_INTERVAL_MEDIUM",
                defaults.frame_interval_medium,
            ),
            frame_interval_high: env_parse("MTAG_FRAME_INTERVAL_HIGH", defaults.frame_interval_high),
            smart_frame_count: env_parse("MTAG_SMART_FRAME_COUNT", defaults.smart_frame_count),
            single_call_max_frames: env_parse(
                "MTAG_SINGLE_CALL_MAX_FRAMES",
                defaults.single_call_max_frames,
            ),
            batch_size: env_parse("MTAG_BATCH_SIZE", defaults.batch_size),
            parse_failure_policy: if retry > 0 {
                ParseFailurePolicy::Retry(retry)
            } else {
                ParseFailurePolicy::Degrade
            },
            max_extraction_concurrent: env_parse(
                "MTAG_MAX_EXTRACTION_CONCURRENT",
                defaults.max_extraction_concurrent,
            ),
            max_analysis_concurrent: env_parse(
                "MTAG_MAX_ANALYSIS_CONCURRENT",
                defaults.max_analysis_concurrent,
            ),
            cleanup_interval: Duration::from_secs(env_parse("MTAG_CLEANUP_INTERVAL_SECS", 1800)),
            pending_timeout: Duration::from_secs(env_parse("MTAG_PENDING_TIMEOUT_SECS", 3600)),
            processing_timeout: Duration::from_secs(env_parse(
                "MTAG_PROCESSING_TIMEOUT_SECS",
                7200,
            )),
            terminal_retention: Duration::from_secs(env_parse(
                "MTAG_TERMINAL_RETENTION_SECS",
                172_800,
            )),
            memory_warn_threshold: env_parse(
                "MTAG_MEMORY_WARN_THRESHOLD",
                defaults.memory_warn_threshold,
            ),
        }
    }
}

pub static SETTINGS: Lazy<Settings> = Lazy::new(Settings::from_env);
