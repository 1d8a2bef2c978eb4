//! Audio handling and the two speech adapters of the pipeline.
//!
//! [`Transcriber`] turns an audio file into text and [`Synthesizer`] turns
//! text back into a 48 kHz mono WAV file. Both are shared across requests
//! behind `Arc<dyn _>`, so implementations must be `Send + Sync`.

use std::path::Path;

use async_trait::async_trait;
use tempfile::TempPath;

use vozqa_core::error::{SynthesisError, TranscriptionError};

pub mod gate;
pub mod stt;
pub mod tts;
pub mod wav;

pub use gate::ConcurrencyGate;
pub use stt::WhisperApiTranscriber;
pub use tts::ElevenLabsSynthesizer;

/// Speech-to-text adapter.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Backend identifier used in logs.
    fn id(&self) -> &str;

    /// Transcribe the audio file at `path`. One attempt, no retries.
    async fn transcribe(&self, path: &Path) -> Result<String, TranscriptionError>;
}

/// Text-to-speech adapter.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Backend identifier used in logs.
    fn id(&self) -> &str;

    /// Synthesize `text` into a freshly created temporary WAV file.
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, SynthesisError>;
}

/// A synthesized reply on disk. Dropping it deletes the file.
#[derive(Debug)]
pub struct SynthesizedAudio {
    path: TempPath,
    pub sample_rate: u32,
    pub frames: u64,
}

impl SynthesizedAudio {
    pub fn new(path: TempPath, sample_rate: u32, frames: u64) -> Self {
        Self {
            path,
            sample_rate,
            frames,
        }
    }

    /// Write `samples` to a new temporary WAV file.
    pub fn from_samples(samples: &[f32], sample_rate: u32) -> Result<Self, SynthesisError> {
        let path = wav::write_temp_wav("vozqa-tts-", samples, sample_rate).map_err(hound_error)?;
        Ok(Self::new(path, sample_rate, samples.len() as u64))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / self.sample_rate as f64
    }

    /// Give up the wrapper but keep the file alive for as long as the
    /// returned path is held.
    pub fn into_temp_path(self) -> TempPath {
        self.path
    }
}

pub(crate) fn hound_error(e: hound::Error) -> SynthesisError {
    match e {
        hound::Error::IoError(io) => SynthesisError::Io(io),
        other => SynthesisError::InvalidAudio(other.to_string()),
    }
}
