//! Google Gemini `embedContent` provider. One request per text.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{EmbeddingMatrix, EmbeddingProvider, ProviderSelector};
use crate::config::GeminiConfig;
use crate::error::ProviderError;

const PROVIDER: ProviderSelector = ProviderSelector::Gemini;

pub struct GeminiProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    max_concurrency: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: Option<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl GeminiProvider {
    pub fn new(config: &GeminiConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Config("Gemini API key is not set".into()))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-goog-api-key"),
            super::secret_header(PROVIDER, api_key)?,
        );
        let client = super::build_client(PROVIDER, headers, config.timeout_secs)?;

        let model = config
            .model
            .strip_prefix("models/")
            .unwrap_or(&config.model)
            .to_string();
        let url = format!(
            "{}/models/{}:embedContent",
            config.base_url.trim_end_matches('/'),
            model
        );

        Ok(Self {
            client,
            url,
            model,
            max_concurrency: config.max_concurrency,
        })
    }
}

async fn embed_one(
    client: reqwest::Client,
    url: String,
    model: String,
    index: usize,
    text: String,
) -> Result<Vec<f32>, ProviderError> {
    let request = EmbedContentRequest {
        model: format!("models/{model}"),
        content: Content {
            parts: [Part { text: &text }],
        },
    };

    let response = client
        .post(&url)
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

    let parsed: EmbedContentResponse = super::decode(PROVIDER, &body)?;
    super::require_vector(PROVIDER, index, parsed.embedding.map(|e| e.values))
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn selector(&self) -> ProviderSelector {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingMatrix, ProviderError> {
        debug!(model = %self.model, texts = texts.len(), "embedding with Gemini");
        super::embed_each(PROVIDER, texts, self.max_concurrency, |index, text| {
            embed_one(
                self.client.clone(),
                self.url.clone(),
                self.model.clone(),
                index,
                text,
            )
        })
        .await
    }
}
