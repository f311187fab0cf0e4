//! Cloudflare Workers AI provider.
//!
//! Workers AI wraps every answer in a `{success, errors, result}` envelope and
//! may report failure with `success: false` on an HTTP 200, so both are
//! checked. The vector for a single `text` input is `result.data[0]`.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{EmbeddingMatrix, EmbeddingProvider, ProviderSelector};
use crate::config::CloudflareConfig;
use crate::error::ProviderError;

const PROVIDER: ProviderSelector = ProviderSelector::Cloudflare;

pub struct CloudflareProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    max_concurrency: usize,
}

#[derive(Debug, Serialize)]
struct RunRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    #[serde(default)]
    result: Option<EmbeddingResult>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResult {
    #[serde(default)]
    data: Vec<Vec<f32>>,
}

impl Envelope {
    fn error_message(&self) -> String {
        self.errors
            .first()
            .map(|e| e.message.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "Unknown error".to_string())
    }
}

impl CloudflareProvider {
    pub fn new(config: &CloudflareConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Config("Cloudflare API key is not set".into()))?;
        let account_id = config
            .account_id
            .as_deref()
            .ok_or_else(|| ProviderError::Config("Cloudflare account id is not set".into()))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            super::secret_header(PROVIDER, &format!("Bearer {api_key}"))?,
        );
        let client = super::build_client(PROVIDER, headers, config.timeout_secs)?;

        let url = format!(
            "{}/accounts/{}/ai/run/{}",
            config.base_url.trim_end_matches('/'),
            account_id,
            config.model
        );

        Ok(Self {
            client,
            url,
            model: config.model.clone(),
            max_concurrency: config.max_concurrency,
        })
    }
}

async fn embed_one(
    client: reqwest::Client,
    url: String,
    index: usize,
    text: String,
) -> Result<Vec<f32>, ProviderError> {
    let response = client
        .post(&url)
        .json(&RunRequest { text: &text })
        .send()
        .await
        .map_err(|e| ProviderError::from_reqwest(PROVIDER, e))?;

    let (status, body) = super::read_body(PROVIDER, response).await?;

    let envelope = match serde_json::from_slice::<Envelope>(&body) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => {
            return Err(ProviderError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                message: super::body_text(&body),
            })
        }
        Err(e) => {
            return Err(ProviderError::MalformedResponse {
                provider: PROVIDER,
                message: e.to_string(),
            })
        }
    };

    if !status.is_success() || !envelope.success {
        return Err(ProviderError::Api {
            provider: PROVIDER,
            status: status.as_u16(),
            message: envelope.error_message(),
        });
    }

    let vector = envelope
        .result
        .and_then(|result| result.data.into_iter().next());
    super::require_vector(PROVIDER, index, vector)
}

#[async_trait]
impl EmbeddingProvider for CloudflareProvider {
    fn selector(&self) -> ProviderSelector {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingMatrix, ProviderError> {
        debug!(model = %self.model, texts = texts.len(), "embedding with Cloudflare Workers AI");
        super::embed_each(PROVIDER, texts, self.max_concurrency, |index, text| {
            embed_one(self.client.clone(), self.url.clone(), index, text)
        })
        .await
    }
}
