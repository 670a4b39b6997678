//! Vision-language oracle client.
//!
//! The autopilot asks an external model what to do with the current frame.
//! Two seams keep the loop independent of any particular provider:
//!
//! - [`VisionOracle`] – one request/response call: image + instruction in,
//!   free-form text out.
//! - [`OracleConnector`] – builds a [`VisionOracle`] session from a credential
//!   and a model identifier.  An autopilot without a connector cannot start.
//!
//! [`GeminiOracle`] talks to the Google Generative Language REST API
//! (`/v1beta/models/{model}:generateContent`).
//!
//! # Example
//!
//! ```rust,no_run
//! use rover_runtime::oracle::{GeminiOracle, VisionOracle, SYSTEM_PROMPT};
//!
//! # async fn demo(jpeg: Vec<u8>) {
//! let oracle = GeminiOracle::new(
//!     "https://generativelanguage.googleapis.com",
//!     "gemini-2.0-flash",
//!     std::env::var("GEMINI_API_KEY").unwrap_or_default(),
//! )
//! .expect("http client");
//!
//! // Requires network access and a valid key – skipped in unit tests.
//! let reply = oracle.decide(&jpeg, SYSTEM_PROMPT).await;
//! # let _ = reply;
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Fixed instruction sent alongside every frame.
pub const SYSTEM_PROMPT: &str = "\
You are controlling a Roomba robot. You see through its front-facing camera.

Available commands:
- forward: Move straight ahead
- left: Turn left
- right: Turn right
- back: Move backward
- stop: Stop moving

Rules:
- If the path ahead is clear, go forward.
- If there is an obstacle ahead, turn left or right to avoid it.
- If very close to an obstacle or wall, go back.
- If the image is unclear or too dark, stop.

Respond with ONLY this JSON (no markdown, no extra text):
{\"command\": \"<command>\", \"reason\": \"<brief reason>\"}";

/// Model used when the caller does not name one.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Public Generative Language API endpoint.
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";

/// Low temperature keeps replies close to deterministic.
pub const ORACLE_TEMPERATURE: f32 = 0.3;

/// Per-request ceiling so a hung oracle cannot wedge the loop forever.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const JPEG_MIME: &str = "image/jpeg";

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from an oracle call.
#[derive(Error, Debug)]
pub enum OracleError {
    /// The HTTP request failed (network, auth, quota, timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The reply could not be understood.
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Seams
// ─────────────────────────────────────────────────────────────────────────────

/// One image + instruction → text exchange with a vision-language model.
#[async_trait]
pub trait VisionOracle: Send + Sync {
    async fn decide(&self, jpeg: &[u8], instruction: &str) -> Result<String, OracleError>;
}

/// Factory for oracle sessions; its presence is what makes the oracle
/// "available" to the autopilot.
pub trait OracleConnector: Send + Sync {
    fn connect(&self, credential: &str, model: &str) -> Result<Arc<dyn VisionOracle>, OracleError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire shapes (generateContent)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 2],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum Part<'a> {
    InlineData(InlineData),
    Text(&'a str),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
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
    parts: Vec<ReplyPart>,
}

#[derive(Deserialize)]
struct ReplyPart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate, trimmed.
    fn into_text(self) -> Result<String, OracleError> {
        let parts = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .ok_or_else(|| OracleError::BadResponse("no candidates in reply".into()))?;
        let text: String = parts.into_iter().filter_map(|p| p.text).collect();
        let text = text.trim();
        if text.is_empty() {
            return Err(OracleError::BadResponse("empty reply text".into()));
        }
        Ok(text.to_string())
    }
}

fn build_request<'a>(jpeg: &[u8], instruction: &'a str) -> GenerateRequest<'a> {
    GenerateRequest {
        contents: [Content {
            role: "user",
            parts: [
                Part::InlineData(InlineData {
                    mime_type: JPEG_MIME,
                    data: BASE64.encode(jpeg),
                }),
                Part::Text(instruction),
            ],
        }],
        generation_config: GenerationConfig {
            temperature: ORACLE_TEMPERATURE,
        },
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// GeminiOracle
// ─────────────────────────────────────────────────────────────────────────────

/// A Gemini session bound to one model and API key.
pub struct GeminiOracle {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiOracle")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl GeminiOracle {
    /// Create a session with [`DEFAULT_REQUEST_TIMEOUT`].
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, OracleError> {
        Self::with_timeout(base_url, model, api_key, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl VisionOracle for GeminiOracle {
    #[instrument(skip_all, fields(model = %self.model, frame_bytes = jpeg.len()))]
    async fn decide(&self, jpeg: &[u8], instruction: &str) -> Result<String, OracleError> {
        let body = build_request(jpeg, instruction);
        let response: GenerateResponse = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let text = response.into_text()?;
        debug!(chars = text.len(), "oracle replied");
        Ok(text)
    }
}

/// Builds [`GeminiOracle`] sessions against a fixed endpoint.
#[derive(Debug, Clone)]
pub struct GeminiConnector {
    pub base_url: String,
    pub timeout: Duration,
}

impl GeminiConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl Default for GeminiConnector {
    fn default() -> Self {
        Self::new(DEFAULT_GEMINI_URL)
    }
}

impl OracleConnector for GeminiConnector {
    fn connect(&self, credential: &str, model: &str) -> Result<Arc<dyn VisionOracle>, OracleError> {
        let oracle = GeminiOracle::with_timeout(&self.base_url, model, credential, self.timeout)?;
        debug!(model = oracle.model(), endpoint = %oracle.endpoint(), "oracle session created");
        Ok(Arc::new(oracle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_carries_image_prompt_and_temperature() {
        let body = serde_json::to_value(build_request(&[0xFF, 0xD8], "hello")).unwrap();
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[0]["inlineData"]["data"], "/9g=");
        assert_eq!(parts[1]["text"], "hello");
        let temp = body["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((temp - 0.3).abs() < 1e-6);
    }

    #[test]
    fn response_text_is_concatenated_and_trimmed() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":" {\"command\": "},{"text":"\"stop\"} \n"}]}}]}"#;
        let resp: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.into_text().unwrap(), r#"{"command": "stop"}"#);
    }

    #[test]
    fn response_without_candidates_is_bad_response() {
        let resp: GenerateResponse = serde_json::from_str(r#"{"promptFeedback":{}}"#).unwrap();
        assert!(matches!(resp.into_text(), Err(OracleError::BadResponse(_))));
    }

    #[test]
    fn response_with_blank_text_is_bad_response() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"   "}]}}]}"#;
        let resp: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert!(matches!(resp.into_text(), Err(OracleError::BadResponse(_))));
    }

    #[test]
    fn endpoint_includes_model_and_trims_slash() {
        let oracle = GeminiOracle::new("http://localhost:9999/", "gemini-x", "k").unwrap();
        assert_eq!(oracle.model(), "gemini-x");
        assert_eq!(
            oracle.endpoint(),
            "http://localhost:9999/v1beta/models/gemini-x:generateContent"
        );
    }

    #[test]
    fn debug_redacts_api_key() {
        let oracle = GeminiOracle::new(DEFAULT_GEMINI_URL, DEFAULT_MODEL, "sk-secret").unwrap();
        let dbg = format!("{oracle:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn system_prompt_lists_every_command() {
        for cmd in rover_types::Command::ALL {
            assert!(SYSTEM_PROMPT.contains(&format!("- {cmd}:")));
        }
    }

    #[tokio::test]
    async fn unreachable_server_is_http_error() {
        let connector = GeminiConnector {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout: Duration::from_secs(2),
        };
        let oracle = connector.connect("k", DEFAULT_MODEL).unwrap();
        let err = oracle.decide(&[0xFF], SYSTEM_PROMPT).await.unwrap_err();
        assert!(matches!(err, OracleError::Http(_)));
    }
}
