use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vozqa_core::config::{Config, LoggingConfig};
use vozqa_gateway::{AppState, AudioPipeline};
use vozqa_media::{ElevenLabsSynthesizer, WhisperApiTranscriber};
use vozqa_providers::GeminiGenerator;

#[derive(Parser)]
#[command(
    name = "vozqa",
    about = "Spoken question in, spoken answer out: STT, Gemini and TTS behind one endpoint",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (default: ~/.vozqa/config.json)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on (default: 8000)
        #[arg(long)]
        port: Option<u16>,

        /// Address to bind (default: 0.0.0.0)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run one WAV file through the pipeline without HTTP
    Process {
        /// Input WAV file
        input: PathBuf,

        /// Where to write the synthesized reply
        output: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration with secrets redacted
    Show,
    /// Check the configuration for problems
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    init_logging(&config.logging(), cli.verbose)?;

    match cli.command {
        Commands::Serve { port, bind } => {
            check_config(&config)?;

            let port = port.unwrap_or_else(|| config.gateway_port());
            let bind = bind.unwrap_or_else(|| config.gateway_bind());
            let pipeline = build_pipeline(&config)?;

            let state = AppState::new(Arc::new(config), pipeline);
            #[cfg(feature = "metrics")]
            let state = state.with_prometheus(vozqa_gateway::metrics::install_prometheus_recorder()?);

            tracing::info!(config = %config_path.display(), "Starting vozqa on {bind}:{port}");
            vozqa_gateway::start_server(Arc::new(state), &bind, port).await?;
        }
        Commands::Process { input, output } => {
            check_config(&config)?;
            let pipeline = build_pipeline(&config)?;
            process_file(&pipeline, &input, &output).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("Config: {}", config_path.display());
                println!("{}", serde_json::to_string_pretty(&config.redacted())?);
            }
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for w in &warnings {
                    println!("warning: {w}");
                }
                for e in &errors {
                    println!("error: {e}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} configuration error(s)", errors.len());
                }
                println!("Config OK ({} warning(s))", warnings.len());
            }
        },
    }

    Ok(())
}

/// Set up the global subscriber. `RUST_LOG` wins over the config file.
fn init_logging(logging: &LoggingConfig, verbose: bool) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let level = if verbose {
                "debug"
            } else {
                logging.level.as_deref().unwrap_or("info")
            };
            let mut filter = EnvFilter::new(level);
            for directive in &logging.filters {
                filter = filter.add_directive(
                    directive
                        .parse()
                        .with_context(|| format!("invalid log filter '{directive}'"))?,
                );
            }
            filter
        }
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match (logging.format.as_str(), logging.output.as_str()) {
        ("json", "stdout") => builder.json().with_writer(std::io::stdout).init(),
        ("json", _) => builder.json().with_writer(std::io::stderr).init(),
        (_, "stdout") => builder.with_writer(std::io::stdout).init(),
        _ => builder.with_writer(std::io::stderr).init(),
    }

    Ok(())
}

/// Log warnings, abort on errors.
fn check_config(config: &Config) -> anyhow::Result<()> {
    let (warnings, errors) = config.validate();
    for w in &warnings {
        tracing::warn!("Config: {w}");
    }
    for e in &errors {
        tracing::error!("Config: {e}");
    }
    if !errors.is_empty() {
        anyhow::bail!("invalid configuration, run `vozqa config validate` for details");
    }
    Ok(())
}

/// Construct the three adapters once; they are shared by every request.
fn build_pipeline(config: &Config) -> anyhow::Result<AudioPipeline> {
    let transcriber = WhisperApiTranscriber::from_config(&config.transcription())
        .context("failed to build transcriber")?;
    let generator =
        GeminiGenerator::from_config(&config.generation()).context("failed to build generator")?;
    let synthesizer =
        ElevenLabsSynthesizer::from_config(&config.tts()).context("failed to build synthesizer")?;

    tracing::info!(
        stt = transcriber.url(),
        llm = %generator.endpoint(),
        "Adapters ready"
    );

    Ok(AudioPipeline::new(
        Arc::new(transcriber),
        Arc::new(generator),
        Arc::new(synthesizer),
    ))
}

async fn process_file(pipeline: &AudioPipeline, input: &Path, output: &Path) -> anyhow::Result<()> {
    let upload = tokio::fs::read(input)
        .await
        .with_context(|| format!("failed to read {}", input.display()))?;

    let result = pipeline.process(upload.into()).await?;
    tokio::fs::copy(result.audio.path(), output)
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!("Transcript: {}", result.transcript);
    println!("Answer:     {}", result.answer);
    println!(
        "Audio:      {} ({:.2}s at {} Hz)",
        output.display(),
        result.audio.duration_secs(),
        result.audio.sample_rate
    );
    Ok(())
}
