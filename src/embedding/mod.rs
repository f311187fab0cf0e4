//! Text-to-vector embedding acquisition.
//!
//! Provides the [`EmbeddingProvider`] trait, one remote implementation per
//! supported API ([`openai`], [`gemini`], [`cloudflare`]) and the
//! [`EmbeddingService`] that dispatches on a [`ProviderSelector`] and checks
//! the shape of what comes back.

pub mod cloudflare;
pub mod gemini;
pub mod openai;
pub mod service;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::ProviderError;

pub use service::EmbeddingService;

/// One embedding vector per input text, in input order.
pub type EmbeddingMatrix = Vec<Vec<f32>>;

/// The closed set of embedding providers a request can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderSelector {
    /// OpenAI `/v1/embeddings`, batched.
    OpenAi,
    /// Google Gemini `embedContent`, one call per text.
    Gemini,
    /// Cloudflare Workers AI, one call per text.
    Cloudflare,
}

impl ProviderSelector {
    pub const ALL: [ProviderSelector; 3] = [Self::OpenAi, Self::Gemini, Self::Cloudflare];

    /// Wire name used in requests and config.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Cloudflare => "cloudflare",
        }
    }
}

impl std::fmt::Display for ProviderSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            "cloudflare" => Ok(Self::Cloudflare),
            _ => Err(format!("unknown model: {s}")),
        }
    }
}

/// Trait for remote embedding APIs.
///
/// Implementations return exactly one non-empty vector per input text, in
/// input order, or fail the whole batch. Whether they batch requests or issue
/// one call per text is their own business.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Which selector this provider answers to.
    fn selector(&self) -> ProviderSelector;

    /// Model identifier sent to the provider.
    fn model(&self) -> &str;

    /// Embed a batch of texts.
    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingMatrix, ProviderError>;
}

/// Build an HTTP client with JSON content type, the given auth headers and a
/// per-request timeout.
pub(crate) fn build_client(
    provider: ProviderSelector,
    mut headers: HeaderMap,
    timeout_secs: u64,
) -> Result<reqwest::Client, ProviderError> {
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .default_headers(headers)
        .build()
        .map_err(|e| ProviderError::Config(format!("failed to build {provider} HTTP client: {e}")))
}

/// Turn a secret into a sensitive header value so it never shows up in `Debug` output.
pub(crate) fn secret_header(
    provider: ProviderSelector,
    value: &str,
) -> Result<HeaderValue, ProviderError> {
    let mut header = HeaderValue::from_str(value)
        .map_err(|e| ProviderError::Config(format!("invalid {provider} API key format: {e}")))?;
    header.set_sensitive(true);
    Ok(header)
}

/// Read a response body, mapping transport and timeout failures.
pub(crate) async fn read_body(
    provider: ProviderSelector,
    response: reqwest::Response,
) -> Result<(reqwest::StatusCode, Vec<u8>), ProviderError> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| ProviderError::from_reqwest(provider, e))?;
    Ok((status, body.to_vec()))
}

/// Lossy, trimmed text of a body, used when an error envelope can't be parsed.
pub(crate) fn body_text(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body).trim().to_string();
    if text.is_empty() {
        "Unknown error".to_string()
    } else {
        text
    }
}

/// Decode a successful JSON body into the provider's envelope type.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    provider: ProviderSelector,
    body: &[u8],
) -> Result<T, ProviderError> {
    serde_json::from_slice(body).map_err(|e| ProviderError::MalformedResponse {
        provider,
        message: e.to_string(),
    })
}

/// Embed each text with its own call, at most `max_concurrency` in flight.
///
/// Results are put back in input order. The first failure drops the
/// [`JoinSet`], which aborts every call still running.
pub(crate) async fn embed_each<F, Fut>(
    provider: ProviderSelector,
    texts: &[String],
    max_concurrency: usize,
    embed_one: F,
) -> Result<EmbeddingMatrix, ProviderError>
where
    F: Fn(usize, String) -> Fut,
    Fut: Future<Output = Result<Vec<f32>, ProviderError>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (index, text) in texts.iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let call = embed_one(index, text.clone());
        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| ProviderError::TaskFailed {
                    provider,
                    message: e.to_string(),
                })?;
            call.await.map(|vector| (index, vector))
        });
    }

    let mut rows: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
    while let Some(joined) = tasks.join_next().await {
        let (index, vector) = joined.map_err(|e| ProviderError::TaskFailed {
            provider,
            message: e.to_string(),
        })??;
        rows[index] = Some(vector);
    }

    rows.into_iter()
        .enumerate()
        .map(|(index, row)| row.ok_or(ProviderError::MissingEmbedding { provider, index }))
        .collect()
}

/// Reject missing or empty vectors; a partial result is never padded.
pub(crate) fn require_vector(
    provider: ProviderSelector,
    index: usize,
    vector: Option<Vec<f32>>,
) -> Result<Vec<f32>, ProviderError> {
    match vector {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ProviderError::MissingEmbedding { provider, index }),
    }
}
