//! Vision-capable language model client.
//!
//! The semantic descriptor depends only on [`VisionModelClient`]; the daemon
//! injects an [`HttpVisionClient`], tests inject deterministic stubs.

use crate::geometric::Enrichment;
use crate::profile::is_profile_object;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("vision model timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("vision model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("image encoding failed: {0}")]
    Encode(String),
}

/// One description request: base64 JPEG, prompt, optional geometric grounding.
#[derive(Debug, Clone, Serialize)]
pub struct VisionRequest {
    pub image: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<Enrichment>,
}

/// Free-text completion over an image.
pub trait VisionModelClient: Send + Sync {
    fn complete(&self, request: &VisionRequest) -> Result<String, VisionError>;
}

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub endpoint: String,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl VisionConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: None,
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

#[derive(Serialize)]
struct Payload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(flatten)]
    request: &'a VisionRequest,
}

/// Blocking HTTP client with a bounded per-request timeout.
///
/// Must be built and used off the async runtime (the daemon's engine thread).
pub struct HttpVisionClient {
    client: reqwest::blocking::Client,
    config: VisionConfig,
}

impl HttpVisionClient {
    pub fn new(config: VisionConfig) -> Result<Self, VisionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VisionError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }
}

impl VisionModelClient for HttpVisionClient {
    fn complete(&self, request: &VisionRequest) -> Result<String, VisionError> {
        let payload = Payload {
            model: self.config.model.as_deref(),
            request,
        };
        let mut builder = self.client.post(&self.config.endpoint).json(&payload);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().map_err(|e| {
            if e.is_timeout() {
                VisionError::Timeout
            } else {
                VisionError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response.text().map_err(|e| {
            if e.is_timeout() {
                VisionError::Timeout
            } else {
                VisionError::Malformed(e.to_string())
            }
        })?;
        if !status.is_success() {
            return Err(VisionError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let answer = extract_answer(&body)?;
        if answer.trim().is_empty() {
            return Err(VisionError::Malformed("empty answer".into()));
        }
        Ok(answer)
    }
}

/// Pull the model's answer text out of the common response envelopes
/// (`response`, `text`, `content`, `output`, OpenAI `choices`). Plain text
/// and bare profile objects are returned as-is; any other JSON object, such
/// as an `{"error": ...}` body sent with HTTP 200, is malformed.
pub fn extract_answer(body: &str) -> Result<String, VisionError> {
    let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(body) else {
        return Ok(body.to_string());
    };

    for key in ["response", "text", "content", "output"] {
        if let Some(Value::String(s)) = obj.get(key) {
            return Ok(s.clone());
        }
    }
    if let Some(s) = obj
        .get("choices")
        .and_then(|c| c.pointer("/0/message/content"))
        .and_then(Value::as_str)
    {
        return Ok(s.to_string());
    }
    if is_profile_object(&obj) {
        return Ok(body.to_string());
    }
    let detail = obj
        .get("error")
        .map(|e| e.as_str().map(str::to_string).unwrap_or_else(|| e.to_string()))
        .unwrap_or_else(|| "no answer field in response".to_string());
    Err(VisionError::Malformed(detail))
}
