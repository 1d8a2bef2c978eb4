//! Google Generative AI (Gemini) provider.
//!
//! Uses the non-streaming `generateContent` endpoint. Auth is via the
//! `x-goog-api-key` header so the key never appears in a URL.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use vozqa_core::config::GenerationConfig;
use vozqa_core::error::GenerationError;

use crate::{AnswerGenerator, RetryPolicy};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiGenerator {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl GeminiGenerator {
    /// Build the provider. The API key is resolved here, once per process;
    /// a missing key surfaces as an auth error on the first call.
    pub fn from_config(config: &GenerationConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: config.model.clone(),
            api_key: config.resolve_api_key().unwrap_or_default(),
            client,
            retry: RetryPolicy::from_config(config),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Endpoint URL without the key.
    pub fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    async fn attempt(&self, body: &GeminiRequest<'_>, attempt: u32) -> Result<String, GenerationError> {
        let transport = |e: reqwest::Error| GenerationError::Transport {
            attempts: attempt,
            message: e.without_url().to_string(),
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let text = response.text().await.map_err(transport)?;

        if !status.is_success() {
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        extract_answer(&text)
    }
}

// --- Gemini request/response types ---

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

impl<'a> GeminiRequest<'a> {
    fn from_prompt(prompt: &'a str) -> Self {
        Self {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

/// Pull `candidates[0].content.parts[0].text` out of a response body.
fn extract_answer(body: &str) -> Result<String, GenerationError> {
    let response: GeminiResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::MalformedResponse(format!("invalid JSON: {e}")))?;

    let Some(candidate) = response.candidates.first() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .map(|r| format!(" (prompt blocked: {r})"))
            .unwrap_or_default();
        return Err(GenerationError::MalformedResponse(format!(
            "response has no candidates{reason}"
        )));
    };

    let text = candidate
        .content
        .as_ref()
        .and_then(|c| c.parts.first())
        .and_then(|p| p.text.as_deref())
        .ok_or_else(|| {
            let finish = candidate.finish_reason.as_deref().unwrap_or("unknown");
            GenerationError::MalformedResponse(format!(
                "first candidate has no text part (finish reason: {finish})"
            ))
        })?;

    let text = text.trim();
    if text.is_empty() {
        return Err(GenerationError::EmptyAnswer);
    }
    Ok(text.to_string())
}

#[async_trait]
impl AnswerGenerator for GeminiGenerator {
    fn id(&self) -> &str {
        "google"
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        if prompt.trim().is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }

        let body = GeminiRequest::from_prompt(prompt);
        debug!(model = %self.model, prompt_len = prompt.len(), "Calling Gemini API");

        let answer = self
            .retry
            .run(self.id(), |attempt| self.attempt(&body, attempt))
            .await?;

        debug!(model = %self.model, answer_len = answer.len(), "Gemini answer received");
        Ok(answer)
    }
}
