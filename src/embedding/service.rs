//! Provider dispatch and shape validation.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::cloudflare::CloudflareProvider;
use super::gemini::GeminiProvider;
use super::openai::OpenAiProvider;
use super::{EmbeddingMatrix, EmbeddingProvider, ProviderSelector};
use crate::config::ProvidersConfig;
use crate::error::{PipelineError, ProviderError};

/// Dispatches embedding requests to the provider registered for a selector.
///
/// The registry is built once at startup and never mutated, so the service
/// can be shared across requests behind an `Arc`.
#[derive(Clone, Default)]
pub struct EmbeddingService {
    providers: BTreeMap<ProviderSelector, Arc<dyn EmbeddingProvider>>,
}

impl EmbeddingService {
    /// Build a service from explicit providers. A later provider with the same
    /// selector replaces an earlier one.
    pub fn new(providers: impl IntoIterator<Item = Arc<dyn EmbeddingProvider>>) -> Self {
        let providers = providers
            .into_iter()
            .map(|provider| (provider.selector(), provider))
            .collect();
        Self { providers }
    }

    /// Build every provider that has credentials in `config`. Providers
    /// without credentials are skipped and selecting them later fails with
    /// [`PipelineError::InvalidSelector`].
    pub fn from_config(config: &ProvidersConfig) -> Result<Self, ProviderError> {
        let mut providers: Vec<Arc<dyn EmbeddingProvider>> = Vec::new();

        for selector in ProviderSelector::ALL {
            let provider: Option<Arc<dyn EmbeddingProvider>> = match selector {
                ProviderSelector::OpenAi => match config.openai.api_key {
                    Some(_) => Some(Arc::new(OpenAiProvider::new(&config.openai)?)),
                    None => None,
                },
                ProviderSelector::Gemini => match config.gemini.api_key {
                    Some(_) => Some(Arc::new(GeminiProvider::new(&config.gemini)?)),
                    None => None,
                },
                ProviderSelector::Cloudflare => {
                    match (&config.cloudflare.api_key, &config.cloudflare.account_id) {
                        (Some(_), Some(_)) => {
                            Some(Arc::new(CloudflareProvider::new(&config.cloudflare)?))
                        }
                        _ => None,
                    }
                }
            };

            match provider {
                Some(provider) => {
                    tracing::info!(provider = %selector, model = provider.model(), "embedding provider ready");
                    providers.push(provider);
                }
                None => {
                    tracing::warn!(provider = %selector, "embedding provider not configured, skipping");
                }
            }
        }

        Ok(Self::new(providers))
    }

    /// Selectors with a registered provider, in declaration order.
    pub fn available(&self) -> Vec<ProviderSelector> {
        self.providers.keys().copied().collect()
    }

    /// Model name used by the provider behind `selector`, if registered.
    pub fn model_for(&self, selector: ProviderSelector) -> Option<&str> {
        self.providers.get(&selector).map(|p| p.model())
    }

    /// Resolve a wire selector to its provider without touching the network.
    pub fn resolve(&self, selector: &str) -> Result<ProviderSelector, PipelineError> {
        let parsed: ProviderSelector = selector.parse().map_err(PipelineError::InvalidSelector)?;
        if !self.providers.contains_key(&parsed) {
            return Err(PipelineError::InvalidSelector(format!(
                "provider not configured: {parsed}"
            )));
        }
        Ok(parsed)
    }

    /// Embed `texts` with the provider named by the wire selector.
    pub async fn get_embeddings(
        &self,
        selector: &str,
        texts: &[String],
    ) -> Result<EmbeddingMatrix, PipelineError> {
        let selector = self.resolve(selector)?;
        self.embed_with(selector, texts).await
    }

    /// Embed `texts` with an already-parsed selector and validate the result.
    pub async fn embed_with(
        &self,
        selector: ProviderSelector,
        texts: &[String],
    ) -> Result<EmbeddingMatrix, PipelineError> {
        let provider = self.providers.get(&selector).ok_or_else(|| {
            PipelineError::InvalidSelector(format!("provider not configured: {selector}"))
        })?;

        let matrix = provider.embed_batch(texts).await?;
        validate_matrix(&matrix, texts.len())?;

        tracing::debug!(
            provider = %selector,
            rows = matrix.len(),
            dims = matrix.first().map_or(0, Vec::len),
            "embeddings received"
        );

        Ok(matrix)
    }
}

/// Check that `matrix` has one row per input and every row has the same length.
pub fn validate_matrix(matrix: &EmbeddingMatrix, expected_rows: usize) -> Result<(), PipelineError> {
    if matrix.len() != expected_rows {
        return Err(PipelineError::Shape(format!(
            "expected {expected_rows} embeddings, got {}",
            matrix.len()
        )));
    }

    if let Some(first) = matrix.first() {
        let dims = first.len();
        if let Some((row, bad)) = matrix.iter().enumerate().find(|(_, r)| r.len() != dims) {
            return Err(PipelineError::Shape(format!(
                "row {row} has {} dimensions, expected {dims}",
                bad.len()
            )));
        }
    }

    Ok(())
}
