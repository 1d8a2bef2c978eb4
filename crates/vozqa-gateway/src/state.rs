//! Gateway shared state.

use std::sync::Arc;

use vozqa_core::config::Config;

use crate::pipeline::AudioPipeline;

/// Shared state handed to every request handler.
///
/// Built once before the listener accepts connections and never mutated
/// afterwards; handlers only read from it.
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: AudioPipeline,
    #[cfg(feature = "metrics")]
    pub prometheus: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Arc<Config>, pipeline: AudioPipeline) -> Self {
        Self {
            config,
            pipeline,
            #[cfg(feature = "metrics")]
            prometheus: None,
        }
    }

    /// Attach a Prometheus handle so `/metrics` can render it.
    #[cfg(feature = "metrics")]
    pub fn with_prometheus(
        mut self,
        handle: metrics_exporter_prometheus::PrometheusHandle,
    ) -> Self {
        self.prometheus = Some(handle);
        self
    }

    /// Maximum request body accepted by `/process-audio`.
    pub fn max_upload_bytes(&self) -> usize {
        self.config.gateway().max_upload_bytes
    }
}
