//! HTTP gateway for the audio question-answer pipeline.
//!
//! Accepts a WAV upload, runs it through speech-to-text, answer generation
//! and text-to-speech, and streams the synthesized reply back as WAV.

pub mod error;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod pipeline;
pub mod server;
pub mod state;

pub use pipeline::{AudioPipeline, PipelineOutput, PipelineStage};
pub use server::{build_router, start_server};
pub use state::AppState;
