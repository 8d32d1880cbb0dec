use super::{GenerationRequest, TextModel, DEFAULT_MODEL};
use crate::error::{RemoteErrorKind, Result, ScriptError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const RATE_LIMIT_MARKERS: [&str; 7] = [
    "429",
    "quota",
    "rate limit",
    "too many requests",
    "resource_exhausted",
    "resource exhausted",
    "overloaded",
];

/// Connection settings for the Gemini API. The key is supplied by the
/// caller; nothing here reads ambient state.
#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub request_timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into().trim().to_string(),
            model: DEFAULT_MODEL.to_string(),
            base_url: GEMINI_API_BASE.to_string(),
            request_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(ScriptError::InvalidInput(
                "a Gemini API key is required".to_string(),
            ));
        }
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl TextModel for GeminiClient {
    #[instrument(skip(self, request), fields(model = %self.config.model, json = request.json_response))]
    async fn generate(&self, request: &GenerationRequest) -> Result<Option<String>> {
        let generation_config = (request.json_response || request.temperature.is_some()).then(|| {
            GenerationConfig {
                response_mime_type: request.json_response.then_some("application/json"),
                temperature: request.temperature,
            }
        });
        let body = GenerateContentRequest {
            contents: [Content {
                role: "user",
                parts: [Part {
                    text: &request.prompt,
                }],
            }],
            generation_config,
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ScriptError::remote(RemoteErrorKind::Other, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ErrorEnvelope>(&error_text) {
                Ok(envelope) => format!(
                    "HTTP {}: {} {}",
                    status.as_u16(),
                    envelope.error.status,
                    envelope.error.message
                ),
                Err(_) => format!("HTTP {}: {}", status.as_u16(), error_text),
            };
            let kind = classify(Some(status), &message);
            warn!(?kind, "Gemini API error: {}", message);
            return Err(ScriptError::remote(kind, message));
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| ScriptError::remote(RemoteErrorKind::Other, e.to_string()))?;
        let parsed: GenerateContentResponse = serde_json::from_str(&response_text)?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect()
            })
            .unwrap_or_default();

        debug!(chars = text.len(), "Gemini response received");
        Ok((!text.trim().is_empty()).then_some(text))
    }
}

/// Decides whether a failed call looks like rate limiting or overload.
pub fn classify(status: Option<StatusCode>, message: &str) -> RemoteErrorKind {
    if matches!(
        status,
        Some(StatusCode::TOO_MANY_REQUESTS) | Some(StatusCode::SERVICE_UNAVAILABLE)
    ) {
        return RemoteErrorKind::RateLimited;
    }
    let lower = message.to_lowercase();
    if RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m)) {
        RemoteErrorKind::RateLimited
    } else {
        RemoteErrorKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_classify_rate_limits() {
        assert_eq!(
            classify(Some(StatusCode::TOO_MANY_REQUESTS), ""),
            RemoteErrorKind::RateLimited
        );
        assert_eq!(
            classify(Some(StatusCode::SERVICE_UNAVAILABLE), ""),
            RemoteErrorKind::RateLimited
        );
        assert_eq!(
            classify(Some(StatusCode::BAD_REQUEST), "API key not valid"),
            RemoteErrorKind::Other
        );
    }

    #[test]
    fn provider_messages_classify_rate_limits() {
        for message in [
            "You exceeded your current quota",
            "RESOURCE_EXHAUSTED",
            "The model is overloaded. Please try again later.",
            "Too Many Requests",
        ] {
            assert_eq!(
                classify(Some(StatusCode::INTERNAL_SERVER_ERROR), message),
                RemoteErrorKind::RateLimited,
                "{message}"
            );
        }
        assert_eq!(classify(None, "connection reset by peer"), RemoteErrorKind::Other);
    }

    #[test]
    fn request_body_uses_gemini_field_names() {
        let body = GenerateContentRequest {
            contents: [Content {
                role: "user",
                parts: [Part { text: "ping" }],
            }],
            generation_config: Some(GenerationConfig {
                response_mime_type: Some("application/json"),
                temperature: Some(0.5),
            }),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["contents"][0]["parts"][0]["text"], "ping");
        assert_eq!(value["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(value["generationConfig"]["temperature"], 0.5);
    }

    #[test]
    fn config_debug_hides_the_key() {
        let config = GeminiConfig::new("  AIzaSecret  ");
        assert_eq!(config.api_key, "AIzaSecret");
        assert!(!format!("{config:?}").contains("AIzaSecret"));
    }

    #[test]
    fn client_requires_a_key() {
        assert!(matches!(
            GeminiClient::new(GeminiConfig::new("")),
            Err(ScriptError::InvalidInput(_))
        ));
    }
}
