use super::models::{downgrade, GenerationOptions, ModelRequest, JSON_MIME_TYPE};
use crate::config::Config;
use crate::error::{BackendError, ModelCallError};
use crate::util::truncate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Back-off when a quota error carries no suggested delay
pub const DEFAULT_QUOTA_BACKOFF: Duration = Duration::from_secs(20);

/// Upper bound on any single quota back-off
pub const MAX_QUOTA_BACKOFF: Duration = Duration::from_secs(60);

/// Maximum length for error content in error messages
const MAX_ERROR_CONTENT_LEN: usize = 200;

/// One round-trip to a generative model.
///
/// Implemented by [`GeminiClient`] for the real API and by scripted
/// backends in tests.
#[allow(async_fn_in_trait)]
pub trait ModelBackend {
    async fn generate(&self, request: &ModelRequest<'_>) -> Result<String, BackendError>;
}

/// Sanitize API response content for error messages to prevent credential leakage.
fn sanitize_api_response(content: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &["api_key", "apikey", "x-goog-api-key", "secret", "aiza"];

    let truncated = truncate(content, MAX_ERROR_CONTENT_LEN);
    let lower = truncated.to_lowercase();
    for pattern in SECRET_PATTERNS {
        if lower.contains(pattern) {
            return "(response details redacted - may contain sensitive data)".to_string();
        }
    }
    truncated
}

// ═══════════════════════════════════════════════════════════════════════════
//  GEMINI REST BOUNDARY
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<Value>,
}

fn build_request<'a>(request: &ModelRequest<'a>) -> GenerateContentRequest<'a> {
    GenerateContentRequest {
        system_instruction: Content {
            role: None,
            parts: vec![Part {
                text: request.system,
            }],
        },
        contents: vec![Content {
            role: Some("user"),
            parts: vec![Part { text: request.user }],
        }],
        generation_config: GenerationConfig {
            response_mime_type: JSON_MIME_TYPE,
            max_output_tokens: request.options.max_output_tokens,
            temperature: request.options.temperature,
        },
    }
}

/// Concatenated text of every candidate part
fn response_text(response: GenerateContentResponse) -> String {
    response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .filter_map(|p| p.text)
        .collect::<Vec<_>>()
        .join("")
}

/// Parse a protobuf duration string such as `"5s"` or `"1.500s"`.
/// Values too large for a `Duration` saturate to `Duration::MAX`.
fn parse_proto_duration(raw: &str) -> Option<Duration> {
    let secs: f64 = raw.trim().strip_suffix('s')?.parse().ok()?;
    if secs.is_nan() || secs < 0.0 {
        return None;
    }
    Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
}

/// Suggested delay from a `google.rpc.RetryInfo` detail in an error body
fn parse_retry_delay(body: &str) -> Option<Duration> {
    let envelope: ErrorEnvelope = serde_json::from_str(body).ok()?;
    envelope
        .error
        .details
        .iter()
        .filter_map(|detail| detail.get("retryDelay").and_then(Value::as_str))
        .find_map(parse_proto_duration)
}

fn is_quota_error(status: u16, body: &str) -> bool {
    if status == 429 {
        return true;
    }
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error.status)
        .is_some_and(|s| s == "RESOURCE_EXHAUSTED")
}

/// Map a non-success HTTP reply to a backend error
fn classify_failure(status: u16, retry_after_header: Option<&str>, body: &str) -> BackendError {
    if is_quota_error(status, body) {
        let retry_after = parse_retry_delay(body).or_else(|| {
            retry_after_header
                .and_then(|h| h.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
        });
        return BackendError::QuotaExceeded { retry_after };
    }
    BackendError::Http {
        status,
        body: sanitize_api_response(body),
    }
}

/// Google AI Studio `generateContent` client
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let api_key = config.api_key().ok_or_else(|| {
            anyhow::anyhow!(
                "No API key configured. Set GOOGLE_API_KEY or add google_api_key to {}",
                Config::config_location()
            )
        })?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

impl ModelBackend for GeminiClient {
    async fn generate(&self, request: &ModelRequest<'_>) -> Result<String, BackendError> {
        let response = self
            .http
            .post(self.endpoint(request.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&build_request(request))
            .send()
            .await?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response.text().await?;

        if !status.is_success() {
            return Err(classify_failure(
                status.as_u16(),
                retry_after.as_deref(),
                &text,
            ));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text)
            .map_err(|e| BackendError::Decode(format!("{}: {}", e, sanitize_api_response(&text))))?;
        let content = response_text(parsed);
        if content.trim().is_empty() {
            return Err(BackendError::EmptyResponse);
        }
        Ok(content)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  RETRY LOOP
// ═══════════════════════════════════════════════════════════════════════════

/// Sleep to apply after a quota error
pub fn quota_backoff(suggested: Option<Duration>) -> Duration {
    suggested
        .unwrap_or(DEFAULT_QUOTA_BACKOFF)
        .min(MAX_QUOTA_BACKOFF)
}

/// Issues requests with quota back-off and one-way tier downgrade.
///
/// Quota errors sleep and retry (moving a pro model to the fallback tier).
/// Other errors move a pro model to the fallback tier and retry; on the
/// fallback tier they are returned immediately. The tier never moves back
/// up within one call.
pub struct ModelCaller<B> {
    backend: B,
    options: GenerationOptions,
    fallback_model: String,
}

impl<B: ModelBackend> ModelCaller<B> {
    pub fn new(backend: B, options: GenerationOptions, fallback_model: impl Into<String>) -> Self {
        Self {
            backend,
            options,
            fallback_model: fallback_model.into(),
        }
    }

    pub fn from_config(backend: B, config: &Config) -> Self {
        Self::new(
            backend,
            config.generation_options(),
            config.fallback_model.clone(),
        )
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run up to `max_retries + 1` attempts starting on `model`.
    pub async fn call(
        &self,
        system: &str,
        user: &str,
        model: &str,
        max_retries: u32,
    ) -> Result<String, ModelCallError> {
        let mut current = model.to_string();
        let mut last_error = String::from("no attempt made");

        for attempt in 0..=max_retries {
            let request = ModelRequest {
                system,
                user,
                model: &current,
                options: self.options,
            };
            debug!(model = %current, attempt, "calling model");

            let outcome = match self.backend.generate(&request).await {
                Ok(text) if text.trim().is_empty() => Err(BackendError::EmptyResponse),
                other => other,
            };

            match outcome {
                Ok(text) => return Ok(text),
                Err(BackendError::QuotaExceeded { retry_after }) => {
                    let delay = quota_backoff(retry_after);
                    last_error = format!("quota exceeded on {}", current);
                    warn!(
                        model = %current,
                        delay_secs = delay.as_secs_f64(),
                        attempt,
                        max_retries,
                        "quota exceeded, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    if let Some(next) = downgrade(&current, &self.fallback_model) {
                        warn!(from = %current, to = %next, "downgrading model tier after quota error");
                        current = next;
                    }
                }
                Err(err) => match downgrade(&current, &self.fallback_model) {
                    Some(next) => {
                        warn!(from = %current, to = %next, error = %err, "model call failed, downgrading tier");
                        last_error = err.to_string();
                        current = next;
                    }
                    None => {
                        return Err(ModelCallError::Backend {
                            model: current,
                            source: err,
                        });
                    }
                },
            }
        }

        Err(ModelCallError::RetriesExhausted {
            attempts: max_retries + 1,
            last_error,
        })
    }
}
