//! OpenAI embeddings API provider.
//!
//! Sends the whole batch in one request (chunked at `max_batch_size`) and
//! re-orders the returned rows by their `index` field.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{EmbeddingMatrix, EmbeddingProvider, ProviderSelector};
use crate::config::OpenAiConfig;
use crate::error::ProviderError;

const PROVIDER: ProviderSelector = ProviderSelector::OpenAi;

pub struct OpenAiProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    max_batch_size: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl OpenAiProvider {
    pub fn new(config: &OpenAiConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Config("OpenAI API key is not set".into()))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            super::secret_header(PROVIDER, &format!("Bearer {api_key}"))?,
        );
        let client = super::build_client(PROVIDER, headers, config.timeout_secs)?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            max_batch_size: config.max_batch_size.max(1),
        })
    }

    /// One request for `texts`; `offset` is the position of `texts[0]` in the
    /// caller's batch so errors name the right input.
    async fn request_embeddings(
        &self,
        texts: &[String],
        offset: usize,
    ) -> Result<EmbeddingMatrix, ProviderError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            encoding_format: "float",
        };

        debug!(endpoint = %self.endpoint, texts = texts.len(), "sending OpenAI embedding request");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, e))?;

        let (status, body) = super::read_body(PROVIDER, response).await?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| super::body_text(&body));
            return Err(ProviderError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                message,
            });
        }

        let parsed: EmbeddingResponse = super::decode(PROVIDER, &body)?;
        if let Some(usage) = &parsed.usage {
            debug!(tokens = usage.total_tokens, "OpenAI embedding request usage");
        }

        align_by_index(parsed.data, texts.len(), offset)
    }
}

/// Place each returned row at its `index`; any slot left empty fails the batch.
fn align_by_index(
    data: Vec<EmbeddingData>,
    expected: usize,
    offset: usize,
) -> Result<EmbeddingMatrix, ProviderError> {
    let mut rows: Vec<Option<Vec<f32>>> = vec![None; expected];
    for item in data {
        if let Some(slot) = rows.get_mut(item.index) {
            *slot = Some(item.embedding);
        }
    }

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| super::require_vector(PROVIDER, offset + i, row))
        .collect()
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn selector(&self) -> ProviderSelector {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingMatrix, ProviderError> {
        let mut matrix = Vec::with_capacity(texts.len());
        for (chunk_no, chunk) in texts.chunks(self.max_batch_size).enumerate() {
            let rows = self
                .request_embeddings(chunk, chunk_no * self.max_batch_size)
                .await?;
            matrix.extend(rows);
        }
        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(index: usize, embedding: Vec<f32>) -> EmbeddingData {
        EmbeddingData { embedding, index }
    }

    #[test]
    fn align_by_index_reorders_rows() {
        let data = vec![item(2, vec![3.0]), item(0, vec![1.0]), item(1, vec![2.0])];
        let matrix = align_by_index(data, 3, 0).unwrap();
        assert_eq!(matrix, vec![vec![1.0], vec![2.0], vec![3.0]]);
    }

    #[test]
    fn align_by_index_reports_missing_row_with_offset() {
        let data = vec![item(0, vec![1.0]), item(2, vec![3.0])];
        let err = align_by_index(data, 3, 10).unwrap_err();
        assert!(matches!(err, ProviderError::MissingEmbedding { index: 11, .. }));
    }

    #[test]
    fn align_by_index_rejects_empty_vector() {
        let data = vec![item(0, vec![1.0]), item(1, vec![])];
        assert!(align_by_index(data, 2, 0).is_err());
    }

    #[test]
    fn new_requires_api_key() {
        let config = OpenAiConfig::default();
        assert!(matches!(
            OpenAiProvider::new(&config),
            Err(ProviderError::Config(_))
        ));
    }

    #[test]
    fn request_serializes_openai_shape() {
        let input = vec!["a".to_string(), "b".to_string()];
        let request = EmbeddingRequest {
            model: "text-embedding-ada-002",
            input: &input,
            encoding_format: "float",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "text-embedding-ada-002");
        assert_eq!(json["input"], serde_json::json!(["a", "b"]));
    }
}
