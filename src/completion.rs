//! Completion service abstraction and the Gemini implementation.
//!
//! The scorer and pipeline consume a [`CompletionService`] as an opaque
//! prompt-in/text-out collaborator. The production implementation calls
//! the Gemini `generateContent` endpoint with temperature 0, retrying
//! rate limits and server errors with exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::CompletionConfig;

/// Failure modes of a completion call.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("completion service error: {0}")]
    Service(String),
}

/// Opaque text-generation collaborator: prompt in, response text out.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

/// Completion client for the Gemini API.
///
/// Reads the API key from `GEMINI_API_KEY` at call time so that a missing
/// key surfaces as a recoverable [`CompletionError`] rather than aborting
/// startup.
pub struct GeminiClient {
    model: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl GeminiClient {
    pub fn new(config: &CompletionConfig) -> Self {
        Self {
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        }
    }
}

#[async_trait]
impl CompletionService for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| CompletionError::Service("GEMINI_API_KEY not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| CompletionError::Service(e.to_string()))?;

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, api_key
        );

        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": 0 },
        });

        let mut last_err: Option<CompletionError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client.post(&url).json(&body).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| CompletionError::Service(e.to_string()))?;
                        return extract_candidate_text(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 {
                        last_err = Some(CompletionError::RateLimited(format!(
                            "Gemini API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }
                    if status.is_server_error() {
                        last_err = Some(CompletionError::Service(format!(
                            "Gemini API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    // Other client errors: fail immediately
                    return Err(CompletionError::Service(format!(
                        "Gemini API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(CompletionError::Service(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| CompletionError::Service("completion failed after retries".into())))
    }
}

/// Pull the first candidate's text out of a `generateContent` response.
fn extract_candidate_text(json: &serde_json::Value) -> Result<String, CompletionError> {
    json.pointer("/candidates/0/content/parts/0/text")
        .and_then(|t| t.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            CompletionError::Service("Gemini response missing candidate text".to_string())
        })
}
