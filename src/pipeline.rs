//! The request/response cycle: split the input text, embed it, project it.
//!
//! A run either returns a fully aligned [`PipelineResult`] or a
//! [`PipelineError`]; there is no partial success.

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::embedding::{EmbeddingMatrix, EmbeddingService};
use crate::error::PipelineError;
use crate::reduce::{self, ReducedMatrix, TARGET_RANK};

/// Largest batch a single request may carry unless configured otherwise.
/// PCA cost grows with the cube of `min(texts, dims)`.
pub const DEFAULT_MAX_TEXTS: usize = 512;

/// What to do with labels that are empty after trimming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyLabelPolicy {
    /// Send empty labels to the provider as-is.
    Keep,
    /// Remove them before embedding.
    Drop,
    /// Fail the request with [`PipelineError::InvalidInput`].
    Reject,
}

impl std::str::FromStr for EmptyLabelPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep" => Ok(Self::Keep),
            "drop" => Ok(Self::Drop),
            "reject" => Ok(Self::Reject),
            _ => Err(format!("unknown empty label policy: {s}")),
        }
    }
}

/// Split `raw` on `delimiter` and trim each piece. Empty pieces are kept:
/// `"a,,b"` gives `["a", "", "b"]`.
pub fn split_labels(raw: &str, delimiter: char) -> Vec<String> {
    raw.split(delimiter).map(|s| s.trim().to_string()).collect()
}

/// Ordered, trimmed, non-empty batch of texts to embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBatch(Vec<String>);

impl TextBatch {
    /// Build a batch from split labels, applying `policy` to empty ones.
    pub fn from_labels(labels: Vec<String>, policy: EmptyLabelPolicy) -> Result<Self, PipelineError> {
        let labels = match policy {
            EmptyLabelPolicy::Keep => labels,
            EmptyLabelPolicy::Drop => labels.into_iter().filter(|l| !l.is_empty()).collect(),
            EmptyLabelPolicy::Reject => {
                if let Some(pos) = labels.iter().position(|l| l.is_empty()) {
                    return Err(PipelineError::InvalidInput(format!(
                        "label #{pos} is empty"
                    )));
                }
                labels
            }
        };

        if labels.is_empty() || labels.iter().all(|l| l.is_empty()) {
            return Err(PipelineError::InvalidInput("no text to embed".into()));
        }

        Ok(Self(labels))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_labels(self) -> Vec<String> {
        self.0
    }
}

/// Everything the caller needs to plot a batch.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub embeddings: EmbeddingMatrix,
    pub reduced_embeddings: ReducedMatrix,
    pub labels: Vec<String>,
    pub explained_variance_ratio: [f64; TARGET_RANK],
    pub model: String,
}

/// Composes the embedding service and the reducer.
#[derive(Clone)]
pub struct Pipeline {
    service: EmbeddingService,
    delimiter: char,
    empty_labels: EmptyLabelPolicy,
    max_texts: usize,
}

impl Pipeline {
    pub fn new(service: EmbeddingService, delimiter: char, empty_labels: EmptyLabelPolicy) -> Self {
        Self {
            service,
            delimiter,
            empty_labels,
            max_texts: DEFAULT_MAX_TEXTS,
        }
    }

    /// Cap the number of texts per request. Larger batches fail with
    /// [`PipelineError::InvalidInput`] before any provider call.
    pub fn with_max_texts(mut self, max_texts: usize) -> Self {
        self.max_texts = max_texts;
        self
    }

    pub fn service(&self) -> &EmbeddingService {
        &self.service
    }

    /// Run the whole pipeline for one request.
    pub async fn run(&self, selector: &str, raw_text: &str) -> Result<PipelineResult, PipelineError> {
        let request_id = uuid::Uuid::now_v7();
        let span = tracing::info_span!("pipeline", %request_id, model = %selector);

        let result = self.run_inner(selector, raw_text).instrument(span.clone()).await;

        span.in_scope(|| match &result {
            Ok(res) => tracing::info!(
                labels = res.labels.len(),
                dims = res.embeddings.first().map_or(0, Vec::len),
                "pipeline complete"
            ),
            Err(e) => tracing::error!(kind = e.kind(), error = %e, "pipeline failed"),
        });

        result
    }

    async fn run_inner(&self, selector: &str, raw_text: &str) -> Result<PipelineResult, PipelineError> {
        // Resolve before splitting so a bad selector never costs a network call.
        let provider = self.service.resolve(selector)?;

        let batch = TextBatch::from_labels(split_labels(raw_text, self.delimiter), self.empty_labels)?;
        if batch.len() > self.max_texts {
            return Err(PipelineError::InvalidInput(format!(
                "{} texts exceed the limit of {}",
                batch.len(),
                self.max_texts
            )));
        }
        tracing::info!(texts = batch.len(), "embedding batch");

        let embeddings = self.service.embed_with(provider, batch.as_slice()).await?;

        let matrix = embeddings.clone();
        let projection = tokio::task::spawn_blocking(move || reduce::reduce(&matrix))
            .await
            .map_err(|e| PipelineError::Shape(format!("reduction task failed: {e}")))??;

        Ok(PipelineResult {
            embeddings,
            reduced_embeddings: projection.coordinates,
            labels: batch.into_labels(),
            explained_variance_ratio: projection.explained_variance_ratio,
            model: provider.to_string(),
        })
    }
}
