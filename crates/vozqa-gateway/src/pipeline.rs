//! The audio question-answer pipeline.
//!
//! Each request walks the same linear path:
//! `ReceivingUpload -> Transcribing -> Generating -> Synthesizing -> Responding`.
//! The first failing stage ends the run; there is no partial recovery.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use tempfile::TempPath;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use vozqa_core::error::{PipelineError, SynthesisError};
use vozqa_core::OUTPUT_SAMPLE_RATE;
use vozqa_media::{SynthesizedAudio, Synthesizer, Transcriber};
use vozqa_providers::AnswerGenerator;

/// Where a request currently is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    ReceivingUpload,
    Transcribing,
    Generating,
    Synthesizing,
    Responding,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReceivingUpload => "receiving_upload",
            Self::Transcribing => "transcribing",
            Self::Generating => "generating",
            Self::Synthesizing => "synthesizing",
            Self::Responding => "responding",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful run.
#[derive(Debug)]
pub struct PipelineOutput {
    pub transcript: String,
    pub answer: String,
    pub audio: SynthesizedAudio,
}

/// STT -> answer generation -> TTS over shared adapter handles.
#[derive(Clone)]
pub struct AudioPipeline {
    transcriber: Arc<dyn Transcriber>,
    generator: Arc<dyn AnswerGenerator>,
    synthesizer: Arc<dyn Synthesizer>,
}

impl AudioPipeline {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        generator: Arc<dyn AnswerGenerator>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            transcriber,
            generator,
            synthesizer,
        }
    }

    /// Run one uploaded WAV through the whole chain.
    ///
    /// The input is staged in a temporary file that is removed once
    /// transcription returns. The output file lives as long as the returned
    /// [`SynthesizedAudio`].
    pub async fn process(&self, upload: Bytes) -> Result<PipelineOutput, PipelineError> {
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        let span = info_span!("pipeline", %request_id);

        let result = self.run(upload).instrument(span.clone()).await;
        let _guard = span.enter();

        match &result {
            Ok(output) => {
                #[cfg(feature = "metrics")]
                crate::metrics::record_request("ok");
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    transcript_len = output.transcript.len(),
                    answer_len = output.answer.len(),
                    duration_secs = output.audio.duration_secs(),
                    "Pipeline completed"
                );
            }
            Err(e) => {
                #[cfg(feature = "metrics")]
                {
                    crate::metrics::record_request("error");
                    crate::metrics::record_error(e.kind());
                }
                warn!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    kind = e.kind(),
                    error = %e,
                    "Pipeline failed"
                );
            }
        }

        result
    }

    async fn run(&self, upload: Bytes) -> Result<PipelineOutput, PipelineError> {
        let input = timed(PipelineStage::ReceivingUpload, stage_upload(&upload)).await?;
        drop(upload);

        let transcript = timed(
            PipelineStage::Transcribing,
            self.transcriber.transcribe(&input),
        )
        .await;
        drop(input);
        let transcript = transcript?;
        debug!(transcriber = self.transcriber.id(), %transcript, "Transcript ready");

        let answer = timed(PipelineStage::Generating, self.generator.generate(&transcript)).await?;
        debug!(generator = self.generator.id(), %answer, "Answer ready");

        let audio = timed(PipelineStage::Synthesizing, self.synthesizer.synthesize(&answer)).await?;
        verify_output(&audio)?;

        Ok(PipelineOutput {
            transcript,
            answer,
            audio,
        })
    }
}

/// Run one stage inside its own span and record its duration.
pub(crate) async fn timed<T, E, F>(stage: PipelineStage, fut: F) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<PipelineError>,
{
    let started = Instant::now();
    let result = fut
        .instrument(info_span!("stage", stage = stage.as_str()))
        .await
        .map_err(Into::into);

    let elapsed = started.elapsed().as_secs_f64();
    #[cfg(feature = "metrics")]
    crate::metrics::record_stage(stage.as_str(), elapsed);
    debug!(%stage, elapsed_secs = elapsed, ok = result.is_ok(), "Stage finished");

    result
}

/// Write the upload to a fresh temporary `.wav` file.
async fn stage_upload(upload: &[u8]) -> Result<TempPath, PipelineError> {
    if upload.is_empty() {
        return Err(PipelineError::InvalidUpload("uploaded file is empty".into()));
    }

    let path = tempfile::Builder::new()
        .prefix("vozqa-upload-")
        .suffix(".wav")
        .tempfile()
        .map_err(PipelineError::Storage)?
        .into_temp_path();
    tokio::fs::write(&path, upload)
        .await
        .map_err(PipelineError::Storage)?;

    Ok(path)
}

/// A reply is only sent if it is non-empty audio at the fixed output rate.
fn verify_output(audio: &SynthesizedAudio) -> Result<(), SynthesisError> {
    if audio.sample_rate != OUTPUT_SAMPLE_RATE {
        return Err(SynthesisError::InvalidAudio(format!(
            "synthesized audio is {} Hz, expected {OUTPUT_SAMPLE_RATE} Hz",
            audio.sample_rate
        )));
    }
    if audio.frames == 0 {
        return Err(SynthesisError::InvalidAudio(
            "synthesized audio has no frames".into(),
        ));
    }
    Ok(())
}
