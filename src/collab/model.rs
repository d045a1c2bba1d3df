use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::config::Settings;
use crate::pipeline::error::PipelineError;
use super::{ContentPart, VisionModel};

/// Chat-completions client for the vision-language model. The model is an
/// opaque collaborator: we send system + multimodal user content and get raw
/// text back.
pub struct HttpVisionModel {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl HttpVisionModel {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(settings.model_timeout)
                .build()
                .unwrap_or_default(),
            endpoint: settings.model_endpoint.trim_end_matches('/').to_string(),
            api_key: settings.model_api_key.clone(),
            model: settings.model_name.clone(),
            max_tokens: settings.model_max_tokens,
        }
    }

    fn error_for_status(status: reqwest::StatusCode, message: String) -> PipelineError {
        use reqwest::StatusCode;
        match status {
            StatusCode::TOO_MANY_REQUESTS => PipelineError::ModelRateLimited(message),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                PipelineError::ModelTimeout(message)
            }
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => {
                PipelineError::ModelUnavailable(message)
            }
            StatusCode::BAD_REQUEST if message.to_lowercase().contains("sensitive") => {
                PipelineError::SensitiveContent(message)
            }
            _ => PipelineError::ModelFailed(format!("status {status}: {message}")),
        }
    }
}

#[async_trait]
impl VisionModel for HttpVisionModel {
    async fn complete(
        &self,
        system_prompt: &str,
        user_parts: Vec<ContentPart>,
    ) -> Result<String, PipelineError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_parts },
            ],
            "max_tokens": self.max_tokens,
            "temperature": 0.7,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PipelineError::ModelTimeout(e.to_string())
                } else {
                    PipelineError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .ok()
                .and_then(|b| b.error)
                .map(|e| e.message)
                .unwrap_or(text);
            error!(%status, %message, "model API error");
            return Err(Self::error_for_status(status, message));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| PipelineError::ModelFailed("no choices in response".to_string()))?;

        info!(model = %self.model, chars = content.len(), "model completion received");
        Ok(content)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Pulls the JSON object out of a completion, unwrapping a fenced code block
/// when the model wraps its answer in one.
pub fn extract_json_block(raw: &str) -> &str {
    if let Some(start) = raw.find("```json") {
        let rest = &raw[start + 7..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim();
        }
    }
    if let Some(start) = raw.find("```") {
        let rest = &raw[start + 3..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim();
        }
    }
    raw.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_block_unwraps_fenced_content() {
        let raw = "Here you go:\n```json\n{\"a\": 1}\n```\nDone.";
        assert_eq!(extract_json_block(raw), "{\"a\": 1}");
    }

    #[test]
    fn plain_fence_also_unwraps() {
        let raw = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json_block(raw), "{\"a\": 1}");
    }

    #[test]
    fn bare_json_passes_through() {
        assert_eq!(extract_json_block("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn rate_limit_status_maps_to_rate_limited() {
        let err = HttpVisionModel::error_for_status(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            "slow down".to_string(),
        );
        assert!(matches!(err, PipelineError::ModelRateLimited(_)));
    }
}
