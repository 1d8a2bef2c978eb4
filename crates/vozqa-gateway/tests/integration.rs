//! Gateway integration tests: start a real server and drive it over HTTP.
//!
//! Run with: `cargo test -p vozqa-gateway --test integration`

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use mockito::Matcher;
use serde_json::json;

use vozqa_core::config::{Config, GenerationConfig, TranscriptionConfig, TtsConfig};
use vozqa_core::error::{GenerationError, SynthesisError, TranscriptionError};
use vozqa_gateway::{AppState, AudioPipeline};
use vozqa_media::{
    ElevenLabsSynthesizer, SynthesizedAudio, Synthesizer, Transcriber, WhisperApiTranscriber,
};
use vozqa_providers::{AnswerGenerator, GeminiGenerator};

/// Find an available port.
fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Start a gateway around `pipeline` and wait until it answers `/health`.
async fn start_test_gateway(pipeline: AudioPipeline) -> u16 {
    let port = find_free_port();
    let state = Arc::new(AppState::new(Arc::new(Config::default()), pipeline));

    tokio::spawn(async move {
        let _ = vozqa_gateway::start_server(state, "127.0.0.1", port).await;
    });

    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if reqwest::get(format!("http://127.0.0.1:{port}/health"))
            .await
            .is_ok()
        {
            break;
        }
    }

    port
}

/// A mono 16 kHz WAV, as a phone or browser recorder would send.
fn wav_upload(frames: usize, sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
    for i in 0..frames {
        let v = ((i as f32 * 0.07).sin() * 8_000.0) as i16;
        writer.write_sample(v).unwrap();
    }
    writer.finalize().unwrap();
    cursor.into_inner()
}

fn upload_form(bytes: Vec<u8>) -> reqwest::multipart::Form {
    let part = reqwest::multipart::Part::bytes(bytes)
        .file_name("pregunta.wav")
        .mime_str("audio/wav")
        .unwrap();
    reqwest::multipart::Form::new().part("file", part)
}

// --- in-process fakes ---

struct FakeTranscriber;

#[async_trait]
impl Transcriber for FakeTranscriber {
    fn id(&self) -> &str {
        "fake"
    }

    async fn transcribe(&self, path: &Path) -> Result<String, TranscriptionError> {
        let bytes = tokio::fs::read(path).await.map_err(TranscriptionError::Read)?;
        hound::WavReader::new(Cursor::new(bytes))
            .map_err(|e| TranscriptionError::Decode(e.to_string()))?;
        Ok("hola".into())
    }
}

struct FakeGenerator {
    fail_with: Option<fn() -> GenerationError>,
}

#[async_trait]
impl AnswerGenerator for FakeGenerator {
    fn id(&self) -> &str {
        "fake"
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        match self.fail_with {
            Some(make) => Err(make()),
            None => Ok(format!("Respuesta a: {prompt}")),
        }
    }
}

struct FakeSynthesizer;

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    fn id(&self) -> &str {
        "fake"
    }

    async fn synthesize(&self, _text: &str) -> Result<SynthesizedAudio, SynthesisError> {
        SynthesizedAudio::from_samples(&vec![0.1; 9_600], 48_000)
    }
}

fn fake_pipeline(fail_with: Option<fn() -> GenerationError>) -> AudioPipeline {
    AudioPipeline::new(
        Arc::new(FakeTranscriber),
        Arc::new(FakeGenerator { fail_with }),
        Arc::new(FakeSynthesizer),
    )
}

fn assert_48k_wav(bytes: &[u8]) {
    let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
    assert_eq!(reader.spec().sample_rate, 48_000);
    assert!(reader.duration() > 0);
}

#[tokio::test]
async fn test_status_endpoint() {
    let port = start_test_gateway(fake_pipeline(None)).await;

    let resp = reqwest::get(format!("http://127.0.0.1:{port}/"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"message": "API funcionando correctamente"}));
}

#[tokio::test]
async fn test_health_endpoint() {
    let port = start_test_gateway(fake_pipeline(None)).await;

    let resp = reqwest::get(format!("http://127.0.0.1:{port}/health"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_missing_file_field() {
    let port = start_test_gateway(fake_pipeline(None)).await;

    let form = reqwest::multipart::Form::new().text("note", "sin audio");
    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/process-audio"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Falta el archivo de audio");
}

#[tokio::test]
async fn test_process_audio_returns_48k_wav() {
    let port = start_test_gateway(fake_pipeline(None)).await;

    // Input rate differs from output rate on purpose.
    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/process-audio"))
        .multipart(upload_form(wav_upload(16_000, 16_000)))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "audio/wav");
    let bytes = resp.bytes().await.unwrap();
    assert_48k_wav(&bytes);
}

#[tokio::test]
async fn test_generation_failure_is_json_error() {
    let port = start_test_gateway(fake_pipeline(Some(|| {
        GenerationError::MalformedResponse("response has no candidates".into())
    })))
    .await;

    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/process-audio"))
        .multipart(upload_form(wav_upload(1_600, 16_000)))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 502);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["kind"], "generation");
    assert!(body["error"].as_str().unwrap().contains("no candidates"));
}

#[tokio::test]
async fn test_end_to_end_with_remote_backends() {
    let mut backend = mockito::Server::new_async().await;
    let base = backend.url();

    let stt_mock = backend
        .mock("POST", "/v1/audio/transcriptions")
        .with_status(200)
        .with_body("hola\n")
        .create_async()
        .await;

    let gemini_mock = backend
        .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
        .match_header("x-goog-api-key", "e2e-key")
        .match_body(Matcher::PartialJson(json!({
            "contents": [{"parts": [{"text": "hola"}]}]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"¡Hola! ¿En qué te ayudo?"}]}}]}"#)
        .create_async()
        .await;

    // 0.25 s of 24 kHz PCM from the TTS backend.
    let pcm: Vec<u8> = (0..6_000i32)
        .flat_map(|i| (((i % 40) - 20) as i16 * 500).to_le_bytes())
        .collect();
    let tts_mock = backend
        .mock("POST", Matcher::Regex(r"^/v1/text-to-speech/".into()))
        .match_query(Matcher::Any)
        .match_body(Matcher::PartialJson(json!({"text": "¡Hola! ¿En qué te ayudo?"})))
        .with_status(200)
        .with_body(pcm)
        .create_async()
        .await;

    let transcriber = WhisperApiTranscriber::from_config(&TranscriptionConfig {
        base_url: Some(format!("{base}/v1/audio/transcriptions")),
        api_key: Some("stt-key".into()),
        ..TranscriptionConfig::default()
    })
    .unwrap();
    let generator = GeminiGenerator::from_config(&GenerationConfig {
        base_url: Some(base.clone()),
        api_key: Some("e2e-key".into()),
        ..GenerationConfig::default()
    })
    .unwrap();
    let synthesizer = ElevenLabsSynthesizer::from_config(&TtsConfig {
        base_url: Some(base.clone()),
        api_key: Some("tts-key".into()),
        ..TtsConfig::default()
    })
    .unwrap();

    let pipeline = AudioPipeline::new(
        Arc::new(transcriber),
        Arc::new(generator),
        Arc::new(synthesizer),
    );
    let port = start_test_gateway(pipeline).await;

    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/process-audio"))
        .multipart(upload_form(wav_upload(8_000, 16_000)))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let bytes = resp.bytes().await.unwrap();
    assert_48k_wav(&bytes);

    stt_mock.assert_async().await;
    gemini_mock.assert_async().await;
    tts_mock.assert_async().await;
}

#[tokio::test]
async fn test_unparsable_candidate_never_synthesized() {
    let mut backend = mockito::Server::new_async().await;
    let base = backend.url();

    let _stt = backend
        .mock("POST", "/v1/audio/transcriptions")
        .with_status(200)
        .with_body("hola")
        .create_async()
        .await;
    let _gemini = backend
        .mock("POST", Matcher::Regex(r"generateContent$".into()))
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"unexpected": true}"#)
        .create_async()
        .await;
    let tts = backend
        .mock("POST", Matcher::Regex(r"^/v1/text-to-speech/".into()))
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let pipeline = AudioPipeline::new(
        Arc::new(
            WhisperApiTranscriber::from_config(&TranscriptionConfig {
                base_url: Some(format!("{base}/v1/audio/transcriptions")),
                ..TranscriptionConfig::default()
            })
            .unwrap(),
        ),
        Arc::new(
            GeminiGenerator::from_config(&GenerationConfig {
                base_url: Some(base.clone()),
                ..GenerationConfig::default()
            })
            .unwrap(),
        ),
        Arc::new(
            ElevenLabsSynthesizer::from_config(&TtsConfig {
                base_url: Some(base.clone()),
                ..TtsConfig::default()
            })
            .unwrap(),
        ),
    );
    let port = start_test_gateway(pipeline).await;

    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/process-audio"))
        .multipart(upload_form(wav_upload(1_600, 16_000)))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 502);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["kind"], "generation");
    tts.assert_async().await;
}
