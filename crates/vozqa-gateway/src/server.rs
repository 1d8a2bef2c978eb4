//! Axum-based HTTP server.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde_json::json;
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use vozqa_core::error::PipelineError;
use vozqa_core::STATUS_MESSAGE;

use crate::error::ApiError;
use crate::pipeline::{timed, PipelineStage};
use crate::state::AppState;

/// Multipart field carrying the uploaded audio.
const UPLOAD_FIELD: &str = "file";

/// Build the router with all routes and layers.
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.max_upload_bytes();

    let app = Router::new()
        .route("/", get(status_handler))
        .route("/health", get(health_handler))
        .route(
            "/process-audio",
            post(process_audio_handler).layer(DefaultBodyLimit::max(body_limit)),
        );

    #[cfg(feature = "metrics")]
    let app = app.route("/metrics", get(metrics_handler));

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Start the HTTP server and run until Ctrl-C.
pub async fn start_server(state: Arc<AppState>, bind: &str, port: u16) -> anyhow::Result<()> {
    let app = build_router(state);

    let addr = format!("{bind}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn status_handler() -> impl IntoResponse {
    Json(json!({ "message": STATUS_MESSAGE }))
}

async fn health_handler() -> impl IntoResponse {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "status": "ok",
        "version": version,
    }))
}

#[cfg(feature = "metrics")]
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match &state.prometheus {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => axum::http::StatusCode::NOT_FOUND.into_response(),
    }
}

async fn process_audio_handler(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    // A request that is not multipart at all has no `file` field either.
    let mut multipart = multipart.map_err(|rejection| {
        debug!(%rejection, "Request is not multipart");
        PipelineError::MissingUpload
    })?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(ApiError::from_multipart)?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_owned);
        let bytes = field.bytes().await.map_err(ApiError::from_multipart)?;
        debug!(file_name = ?file_name, size = bytes.len(), "Upload received");
        upload = Some(bytes);
        break;
    }
    let upload = upload.ok_or(PipelineError::MissingUpload)?;

    let output = state.pipeline.process(upload).await?;
    let response = timed(PipelineStage::Responding, audio_response(output.audio)).await?;
    Ok(response)
}

/// Stream the synthesized WAV back. The temporary file is kept alive by the
/// body stream and removed once the body is dropped.
async fn audio_response(audio: vozqa_media::SynthesizedAudio) -> Result<Response, PipelineError> {
    let file = tokio::fs::File::open(audio.path())
        .await
        .map_err(PipelineError::Storage)?;
    let len = file
        .metadata()
        .await
        .map_err(PipelineError::Storage)?
        .len();

    let temp_path = audio.into_temp_path();
    let stream = ReaderStream::new(file).map(move |chunk| {
        let _keep = &temp_path;
        chunk
    });

    let response = Response::builder()
        .header(header::CONTENT_TYPE, "audio/wav")
        .header(header::CONTENT_LENGTH, len)
        .header(header::CONTENT_DISPOSITION, "attachment; filename=\"respuesta.wav\"")
        .body(Body::from_stream(stream))
        .map_err(|e| PipelineError::Storage(std::io::Error::other(e)))?;

    Ok(response)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl-C handler: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
