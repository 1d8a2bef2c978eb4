//! Text-to-speech using the ElevenLabs API.
//!
//! The backend is asked for raw 16-bit PCM, which is resampled to the fixed
//! output rate and written as a mono WAV file.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use vozqa_core::config::TtsConfig;
use vozqa_core::error::SynthesisError;
use vozqa_core::OUTPUT_SAMPLE_RATE;

use crate::gate::ConcurrencyGate;
use crate::wav::{pcm16le_to_f32, resample};
use crate::{SynthesizedAudio, Synthesizer};

const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";

/// Models that accept a `language_code` field. Others reject the request.
const LANGUAGE_CODE_MODELS: &[&str] = &["eleven_flash_v2_5", "eleven_turbo_v2_5"];

fn accepts_language_code(model: &str) -> bool {
    LANGUAGE_CODE_MODELS.contains(&model)
}

/// Build the ElevenLabs TTS request URL for a given voice and format.
pub fn build_tts_url(base_url: &str, voice: &str, output_format: &str) -> String {
    format!(
        "{}/v1/text-to-speech/{voice}?output_format={output_format}",
        base_url.trim_end_matches('/')
    )
}

pub struct ElevenLabsSynthesizer {
    url: String,
    api_key: Option<String>,
    voice: String,
    model: String,
    language: String,
    source_rate: u32,
    max_text_chars: usize,
    client: reqwest::Client,
    gate: ConcurrencyGate,
}

impl ElevenLabsSynthesizer {
    /// Build the adapter. Voice, model and language stay fixed afterwards.
    pub fn from_config(config: &TtsConfig) -> anyhow::Result<Self> {
        let source_rate = config.pcm_sample_rate().ok_or_else(|| {
            anyhow::anyhow!(
                "tts.output_format '{}' is not a raw PCM format",
                config.output_format
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);

        Ok(Self {
            url: build_tts_url(base_url, &config.voice, &config.output_format),
            api_key: config.resolve_api_key(),
            voice: config.voice.clone(),
            model: config.model.clone(),
            language: config.language.clone(),
            source_rate,
            max_text_chars: config.max_text_chars,
            client,
            gate: ConcurrencyGate::new(config.max_concurrent),
        })
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        let mut body = json!({
            "text": text,
            "model_id": self.model,
        });
        if accepts_language_code(&self.model) {
            body["language_code"] = json!(self.language);
        }
        body
    }

    async fn fetch_pcm(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&self.request_body(text));
        if let Some(key) = &self.api_key {
            request = request.header("xi-api-key", key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| SynthesisError::Transport(e.without_url().to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(SynthesisError::Backend { status, body });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| SynthesisError::Transport(e.without_url().to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Synthesizer for ElevenLabsSynthesizer {
    fn id(&self) -> &str {
        "elevenlabs"
    }

    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, SynthesisError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SynthesisError::EmptyText);
        }
        let len = text.chars().count();
        if len > self.max_text_chars {
            return Err(SynthesisError::TextTooLong {
                len,
                max: self.max_text_chars,
            });
        }

        debug!(voice = %self.voice, model = %self.model, text_len = len, "Requesting speech");
        let pcm = self.gate.run(self.fetch_pcm(text)).await?;

        let samples = pcm16le_to_f32(&pcm)
            .ok_or_else(|| SynthesisError::InvalidAudio("odd number of PCM bytes".into()))?;
        if samples.is_empty() {
            return Err(SynthesisError::InvalidAudio("backend returned no audio".into()));
        }

        let source_rate = self.source_rate;
        let audio = tokio::task::spawn_blocking(move || {
            let samples = resample(&samples, source_rate, OUTPUT_SAMPLE_RATE);
            SynthesizedAudio::from_samples(&samples, OUTPUT_SAMPLE_RATE)
        })
        .await
        .map_err(|e| SynthesisError::InvalidAudio(format!("encoder task failed: {e}")))??;

        info!(
            path = %audio.path().display(),
            duration_secs = audio.duration_secs(),
            voice = %self.voice,
            "TTS audio generated"
        );

        Ok(audio)
    }
}
