use thiserror::Error;

#[derive(Debug, Error)]
pub enum VozError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VozError>;

/// Failure of the speech-to-text stage.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("failed to read audio file: {0}")]
    Read(#[source] std::io::Error),

    #[error("audio is not a decodable WAV file: {0}")]
    Decode(String),

    #[error("audio contains no samples")]
    EmptyAudio,

    #[error("transcription backend returned {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("transcription request failed: {0}")]
    Transport(String),

    #[error("no speech recognized in audio")]
    EmptyTranscript,
}

impl TranscriptionError {
    /// Whether the failure was caused by the uploaded audio itself.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::EmptyAudio)
    }

    /// Whether the remote backend failed or could not be reached.
    pub fn is_remote_error(&self) -> bool {
        matches!(self, Self::Backend { .. } | Self::Transport(_))
    }
}

/// Failure of the answer-generation stage.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("prompt text is empty")]
    EmptyPrompt,

    #[error("generation request failed after {attempts} attempt(s): {message}")]
    Transport { attempts: u32, message: String },

    #[error("generation API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected generation response: {0}")]
    MalformedResponse(String),

    #[error("generation API returned an empty answer")]
    EmptyAnswer,
}

impl GenerationError {
    /// Transient failures worth another attempt. 4xx and parse failures are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Failure of the text-to-speech stage.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("answer text is empty")]
    EmptyText,

    #[error("answer text has {len} characters, synthesis limit is {max}")]
    TextTooLong { len: usize, max: usize },

    #[error("synthesis backend returned {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("synthesis request failed: {0}")]
    Transport(String),

    #[error("synthesized audio is invalid: {0}")]
    InvalidAudio(String),

    #[error("failed to write synthesized audio: {0}")]
    Io(#[from] std::io::Error),
}

/// Any failure of one request through the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{}", crate::MISSING_UPLOAD_MESSAGE)]
    MissingUpload,

    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error(transparent)]
    Transcription(#[from] TranscriptionError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error("temporary file error: {0}")]
    Storage(#[source] std::io::Error),
}

impl PipelineError {
    /// HTTP status this error is reported with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingUpload | Self::InvalidUpload(_) => 400,
            Self::Transcription(e) if e.is_input_error() => 422,
            Self::Transcription(e) if e.is_remote_error() => 502,
            Self::Transcription(_) => 500,
            Self::Generation(_) => 502,
            Self::Synthesis(SynthesisError::Backend { .. } | SynthesisError::Transport(_)) => 502,
            Self::Synthesis(_) => 500,
            Self::Storage(_) => 500,
        }
    }

    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingUpload => "missing_upload",
            Self::InvalidUpload(_) => "invalid_upload",
            Self::Transcription(_) => "transcription",
            Self::Generation(_) => "generation",
            Self::Synthesis(_) => "synthesis",
            Self::Storage(_) => "storage",
        }
    }
}
