//! Speech-to-text over an OpenAI-compatible transcription API.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use vozqa_core::config::TranscriptionConfig;
use vozqa_core::error::TranscriptionError;

use crate::gate::ConcurrencyGate;
use crate::wav::read_wav_info;
use crate::Transcriber;

const DEFAULT_MODEL: &str = "whisper-large-v3-turbo";

/// Get the transcription API URL for a given config.
pub fn provider_url(config: &TranscriptionConfig) -> String {
    if let Some(url) = &config.base_url {
        return url.trim_end_matches('/').to_string();
    }
    match config.provider.as_str() {
        "openai" => "https://api.openai.com/v1/audio/transcriptions".into(),
        _ => "https://api.groq.com/openai/v1/audio/transcriptions".into(),
    }
}

pub struct WhisperApiTranscriber {
    url: String,
    model: String,
    api_key: Option<String>,
    language: Option<String>,
    client: reqwest::Client,
    gate: ConcurrencyGate,
}

impl WhisperApiTranscriber {
    /// Build the adapter. The API key is resolved here, once.
    pub fn from_config(config: &TranscriptionConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            url: provider_url(config),
            model: config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.into()),
            api_key: config.resolve_api_key(),
            language: config.language.clone(),
            client,
            gate: ConcurrencyGate::new(config.max_concurrent),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send(&self, wav: Vec<u8>) -> Result<String, TranscriptionError> {
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| TranscriptionError::Transport(e.without_url().to_string()))?;

        let mut form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .text("response_format", "text")
            .part("file", part);
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let mut request = self.client.post(&self.url).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| TranscriptionError::Transport(e.without_url().to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TranscriptionError::Backend { status, body });
        }

        resp.text()
            .await
            .map_err(|e| TranscriptionError::Transport(e.without_url().to_string()))
    }
}

#[async_trait]
impl Transcriber for WhisperApiTranscriber {
    fn id(&self) -> &str {
        "whisper-api"
    }

    async fn transcribe(&self, path: &Path) -> Result<String, TranscriptionError> {
        let wav = tokio::fs::read(path)
            .await
            .map_err(TranscriptionError::Read)?;

        let info = read_wav_info(&wav).map_err(|e| TranscriptionError::Decode(e.to_string()))?;
        if info.frames == 0 {
            return Err(TranscriptionError::EmptyAudio);
        }

        debug!(
            url = %self.url,
            model = %self.model,
            sample_rate = info.sample_rate,
            channels = info.channels,
            duration_secs = info.duration_secs(),
            "Sending audio for transcription"
        );

        let text = self.gate.run(self.send(wav)).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(TranscriptionError::EmptyTranscript);
        }
        Ok(text.to_string())
    }
}
