//! HTTP front end.
//!
//! Exposes the pipeline as `POST /get_embedding`, plus `GET /health` and
//! `GET /providers`. Errors come back as `{ "error": ..., "kind": ... }` with a
//! status that depends on the error kind.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::config::EmbedvizConfig;
use crate::embedding::{EmbeddingService, ProviderSelector};
use crate::error::PipelineError;
use crate::pipeline::Pipeline;

/// Body of `POST /get_embedding`.
#[derive(Debug, Deserialize)]
pub struct EmbedRequest {
    /// Delimiter-separated texts.
    pub text: String,
    /// Provider wire name.
    pub model: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

#[derive(Debug, Serialize)]
struct HealthBody {
    healthy: bool,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct ProvidersBody {
    providers: Vec<ProviderSelector>,
}

/// Wrapper so handlers can return `PipelineError` directly.
pub struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            error: self.0.to_string(),
            kind: self.0.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Build the router around a shared pipeline.
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/get_embedding", post(get_embedding))
        .route("/health", get(health))
        .route("/providers", get(providers))
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

async fn get_embedding(
    State(pipeline): State<Arc<Pipeline>>,
    request: Result<Json<EmbedRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) =
        request.map_err(|rejection| PipelineError::InvalidInput(rejection.body_text()))?;
    tracing::debug!(model = %request.model, text_len = request.text.len(), "get_embedding called");
    let result = pipeline.run(&request.model, &request.text).await?;
    Ok(Json(result))
}

async fn health() -> impl IntoResponse {
    Json(HealthBody {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn providers(State(pipeline): State<Arc<Pipeline>>) -> impl IntoResponse {
    Json(ProvidersBody {
        providers: pipeline.service().available(),
    })
}

/// Build the pipeline from config.
pub fn build_pipeline(config: &EmbedvizConfig) -> Result<Pipeline> {
    let service = EmbeddingService::from_config(&config.providers)
        .context("failed to initialize embedding providers")?;

    if service.available().is_empty() {
        tracing::warn!("no embedding provider has credentials; every request will be rejected");
    }

    Ok(Pipeline::new(
        service,
        config.pipeline.delimiter,
        config.pipeline.empty_labels,
    )
    .with_max_texts(config.pipeline.max_texts))
}

/// Start the HTTP server and run until Ctrl-C.
pub async fn serve(config: EmbedvizConfig) -> Result<()> {
    let bind_addr = config.bind_addr();
    let pipeline = Arc::new(build_pipeline(&config)?);
    let app = router(pipeline);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "embedviz listening at http://{bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await
        .context("HTTP server error")?;

    Ok(())
}
