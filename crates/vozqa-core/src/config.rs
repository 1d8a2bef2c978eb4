//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level vozqa configuration.
///
/// Every section is optional; accessors fall back to the defaults documented
/// on each field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription: Option<TranscriptionConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<GenerationConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts: Option<TtsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    /// `${VAR}` references that were not set when the file was parsed.
    #[serde(skip)]
    unset_env_vars: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// Maximum accepted request body in bytes (default: 25 MiB).
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: None,
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_port() -> u16 {
    8000
}

fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

/// Speech-to-text configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Provider: "groq", "openai", or "custom" (default: "groq").
    #[serde(default = "default_transcription_provider")]
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_transcription_key_env")]
    pub api_key_env: Option<String>,
    /// Full transcription endpoint URL; overrides the provider URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Model name (e.g. "whisper-large-v3-turbo").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// ISO-639-1 hint. Unset lets the model detect the language.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default = "default_transcription_timeout")]
    pub timeout_secs: u64,
    /// Maximum overlapping calls into the backend. Unset means unlimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<usize>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            provider: default_transcription_provider(),
            api_key: None,
            api_key_env: default_transcription_key_env(),
            base_url: None,
            model: None,
            language: None,
            timeout_secs: default_transcription_timeout(),
            max_concurrent: None,
        }
    }
}

fn default_transcription_provider() -> String {
    "groq".into()
}

fn default_transcription_key_env() -> Option<String> {
    Some("GROQ_API_KEY".into())
}

fn default_transcription_timeout() -> u64 {
    60
}

impl TranscriptionConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

/// Remote answer generation (Gemini) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_generation_key_env")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_generation_model")]
    pub model: String,
    /// Per-attempt request timeout.
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    /// Extra attempts after a transient failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First retry delay; doubles on each further retry.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_generation_key_env(),
            base_url: None,
            model: default_generation_model(),
            timeout_secs: default_generation_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

fn default_generation_key_env() -> Option<String> {
    Some("GEMINI_API_KEY".into())
}

fn default_generation_model() -> String {
    "gemini-2.0-flash".into()
}

fn default_generation_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_backoff_ms() -> u64 {
    250
}

impl GenerationConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

/// Text-to-speech configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    /// TTS provider (default: "elevenlabs").
    #[serde(default = "default_tts_provider")]
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_tts_key_env")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Voice ID, fixed for the process lifetime.
    #[serde(default = "default_voice")]
    pub voice: String,
    /// Model ID (default: "eleven_flash_v2_5").
    #[serde(default = "default_tts_model")]
    pub model: String,
    /// Language hint. Only sent to models that accept `language_code`.
    #[serde(default = "default_tts_language")]
    pub language: String,
    /// Raw PCM format requested from the backend (default: "pcm_24000").
    #[serde(default = "default_output_format")]
    pub output_format: String,
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
    #[serde(default = "default_tts_timeout")]
    pub timeout_secs: u64,
    /// Maximum overlapping calls into the backend. Unset means unlimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<usize>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: default_tts_provider(),
            api_key: None,
            api_key_env: default_tts_key_env(),
            base_url: None,
            voice: default_voice(),
            model: default_tts_model(),
            language: default_tts_language(),
            output_format: default_output_format(),
            max_text_chars: default_max_text_chars(),
            timeout_secs: default_tts_timeout(),
            max_concurrent: None,
        }
    }
}

fn default_tts_provider() -> String {
    "elevenlabs".into()
}

fn default_tts_key_env() -> Option<String> {
    Some("ELEVENLABS_API_KEY".into())
}

fn default_voice() -> String {
    "21m00Tcm4TlvDq8ikWAM".into()
}

fn default_tts_model() -> String {
    "eleven_flash_v2_5".into()
}

fn default_tts_language() -> String {
    "es".into()
}

fn default_output_format() -> String {
    "pcm_24000".into()
}

fn default_max_text_chars() -> usize {
    5000
}

fn default_tts_timeout() -> u64 {
    60
}

impl TtsConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }

    /// Sample rate encoded in `output_format` ("pcm_24000" -> 24000).
    pub fn pcm_sample_rate(&self) -> Option<u32> {
        self.output_format
            .strip_prefix("pcm_")
            .and_then(|rate| rate.parse().ok())
            .filter(|rate| *rate > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "vozqa_gateway=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            level: None,
            filters: Vec::new(),
            output: default_log_output(),
        }
    }
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
///
/// Unset variables become empty strings and are returned by name.
fn substitute_env_vars(input: &str) -> (String, Vec<String>) {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex");
    let mut unset = Vec::new();
    let output = re
        .replace_all(input, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| {
                unset.push(caps[1].to_string());
                String::new()
            })
        })
        .into_owned();
    (output, unset)
}

const REDACTED: &str = "********";

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    ///
    /// A missing file yields the default config.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        Self::from_json5(&raw)
    }

    /// Parse config text, substituting `${ENV_VAR}` references first.
    pub fn from_json5(raw: &str) -> crate::error::Result<Self> {
        let (substituted, unset_env_vars) = substitute_env_vars(raw);
        let mut config: Self = json5::from_str(&substituted)
            .map_err(|e| crate::error::VozError::Config(e.to_string()))?;
        config.unset_env_vars = unset_env_vars;
        Ok(config)
    }

    /// Environment variables referenced by the file but unset at load time.
    pub fn unset_env_vars(&self) -> &[String] {
        &self.unset_env_vars
    }

    /// Default config file path.
    pub fn default_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn gateway(&self) -> GatewayConfig {
        self.gateway.clone().unwrap_or_default()
    }

    pub fn transcription(&self) -> TranscriptionConfig {
        self.transcription.clone().unwrap_or_default()
    }

    pub fn generation(&self) -> GenerationConfig {
        self.generation.clone().unwrap_or_default()
    }

    pub fn tts(&self) -> TtsConfig {
        self.tts.clone().unwrap_or_default()
    }

    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    pub fn gateway_port(&self) -> u16 {
        self.gateway.as_ref().map(|g| g.port).unwrap_or_else(default_port)
    }

    pub fn gateway_bind(&self) -> String {
        self.gateway
            .as_ref()
            .and_then(|g| g.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    /// Copy of this config with every direct secret replaced, for display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        let redact = |secret: &mut Option<String>| {
            if secret.is_some() {
                *secret = Some(REDACTED.into());
            }
        };
        if let Some(t) = config.transcription.as_mut() {
            redact(&mut t.api_key);
        }
        if let Some(g) = config.generation.as_mut() {
            redact(&mut g.api_key);
        }
        if let Some(t) = config.tts.as_mut() {
            redact(&mut t.api_key);
        }
        config
    }

    /// Validate the effective configuration.
    ///
    /// Returns `(warnings, errors)`. Missing credentials are warnings since
    /// they only surface when the backend is first called.
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        for var in &self.unset_env_vars {
            warnings.push(format!("Config references unset environment variable ${{{var}}}"));
        }

        let gateway = self.gateway();
        if gateway.port == 0 {
            errors.push("Gateway port must be non-zero".to_string());
        }
        if gateway.max_upload_bytes == 0 {
            errors.push("gateway.max_upload_bytes must be non-zero".to_string());
        }

        let stt = self.transcription();
        match stt.provider.as_str() {
            "groq" | "openai" => {
                if stt.resolve_api_key().is_none() {
                    warnings.push(format!(
                        "Transcription provider '{}' has no API key configured",
                        stt.provider
                    ));
                }
            }
            "custom" => {
                if stt.base_url.is_none() {
                    errors.push("Transcription provider 'custom' requires base_url".to_string());
                }
            }
            other => errors.push(format!("Unknown transcription provider '{other}'")),
        }
        if stt.timeout_secs == 0 {
            errors.push("transcription.timeout_secs must be non-zero".to_string());
        }
        if stt.max_concurrent == Some(0) {
            errors.push("transcription.max_concurrent must be at least 1".to_string());
        }

        let generation = self.generation();
        if generation.resolve_api_key().is_none() {
            warnings.push("Generation API key is not configured".to_string());
        }
        if generation.model.trim().is_empty() {
            errors.push("generation.model must not be empty".to_string());
        }
        if generation.timeout_secs == 0 {
            errors.push("generation.timeout_secs must be non-zero".to_string());
        }

        let tts = self.tts();
        if tts.provider != "elevenlabs" {
            errors.push(format!("Unknown TTS provider '{}'", tts.provider));
        } else if tts.resolve_api_key().is_none() {
            warnings.push("TTS provider 'elevenlabs' has no API key configured".to_string());
        }
        if tts.pcm_sample_rate().is_none() {
            errors.push(format!(
                "tts.output_format '{}' is not a raw PCM format (expected pcm_<rate>)",
                tts.output_format
            ));
        }
        if tts.timeout_secs == 0 {
            errors.push("tts.timeout_secs must be non-zero".to_string());
        }
        if tts.max_concurrent == Some(0) {
            errors.push("tts.max_concurrent must be at least 1".to_string());
        }

        let logging = self.logging();
        if !matches!(logging.format.as_str(), "plain" | "json") {
            errors.push(format!("Unknown log format '{}'", logging.format));
        }
        if !matches!(logging.output.as_str(), "stderr" | "stdout") {
            errors.push(format!("Unknown log output '{}'", logging.output));
        }

        (warnings, errors)
    }
}

/// Base directory for vozqa state (`~/.vozqa`).
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vozqa")
}
