//! Core config, error taxonomy, and shared constants for vozqa.

pub mod config;
pub mod error;

/// Sample rate of every synthesized reply, regardless of the uploaded audio.
pub const OUTPUT_SAMPLE_RATE: u32 = 48_000;

/// Liveness message returned by `GET /`.
pub const STATUS_MESSAGE: &str = "API funcionando correctamente";

/// Error message returned when the upload has no `file` field.
pub const MISSING_UPLOAD_MESSAGE: &str = "Falta el archivo de audio";
