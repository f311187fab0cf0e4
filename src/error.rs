//! Error taxonomy for the embedding pipeline.
//!
//! [`ProviderError`] covers everything that can go wrong talking to a remote
//! embedding API. [`PipelineError`] is what the orchestrator hands back to
//! callers; it keeps the originating kind so the HTTP layer can pick a status
//! without parsing messages.

use crate::embedding::ProviderSelector;

/// Failure of a single embedding provider call.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider answered with an unsuccessful status. `message` is the
    /// provider's own error text.
    #[error("{provider} API error ({status}): {message}")]
    Api {
        provider: ProviderSelector,
        status: u16,
        message: String,
    },

    /// The request never produced a response.
    #[error("{provider} request failed: {source}")]
    Transport {
        provider: ProviderSelector,
        #[source]
        source: reqwest::Error,
    },

    /// The per-call timeout elapsed.
    #[error("{provider} request timed out")]
    Timeout { provider: ProviderSelector },

    /// The response body could not be decoded into the provider's envelope.
    #[error("{provider} returned a malformed response: {message}")]
    MalformedResponse {
        provider: ProviderSelector,
        message: String,
    },

    /// No usable vector came back for the text at `index`.
    #[error("{provider} returned no embedding for input #{index}")]
    MissingEmbedding {
        provider: ProviderSelector,
        index: usize,
    },

    /// A concurrent sub-call task panicked or was cancelled.
    #[error("{provider} embedding task failed: {message}")]
    TaskFailed {
        provider: ProviderSelector,
        message: String,
    },

    /// The provider could not be constructed from its configuration.
    #[error("provider configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    /// Classify a `reqwest` error, separating timeouts from other transport failures.
    pub(crate) fn from_reqwest(provider: ProviderSelector, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout { provider }
        } else if err.is_decode() {
            Self::MalformedResponse {
                provider,
                message: err.to_string(),
            }
        } else {
            Self::Transport {
                provider,
                source: err,
            }
        }
    }
}

/// Failure of a full pipeline run. Every variant aborts the whole request.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Unknown or unconfigured provider selector.
    #[error("Invalid model selection: {0}")]
    InvalidSelector(String),

    /// The request text produced no embeddable labels.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A matrix violated the rectangular shape invariant.
    #[error("Shape error: {0}")]
    Shape(String),

    #[error("At least {required} texts are required for a 3D projection, got {rows}")]
    InsufficientSamples { rows: usize, required: usize },
}

impl PipelineError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidSelector(_) => "invalid_selector",
            Self::InvalidInput(_) => "invalid_input",
            Self::Provider(_) => "provider",
            Self::Shape(_) => "shape",
            Self::InsufficientSamples { .. } => "insufficient_samples",
        }
    }

    /// HTTP status code the web layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidSelector(_) | Self::InvalidInput(_) => 400,
            Self::InsufficientSamples { .. } => 422,
            Self::Provider(ProviderError::Timeout { .. }) => 504,
            Self::Provider(_) => 502,
            Self::Shape(_) => 500,
        }
    }
}
