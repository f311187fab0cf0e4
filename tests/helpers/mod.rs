#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use embedviz::embedding::{EmbeddingMatrix, EmbeddingProvider, EmbeddingService, ProviderSelector};
use embedviz::error::ProviderError;
use embedviz::pipeline::{EmptyLabelPolicy, Pipeline};

/// How a [`MockProvider`] should misbehave.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fault {
    None,
    /// No vector for the input at this position.
    MissingAt(usize),
    /// The row at this position is one element short.
    RaggedAt(usize),
    /// Return one row fewer than requested.
    DropLastRow,
}

/// In-process provider with a call counter.
pub struct MockProvider {
    selector: ProviderSelector,
    dims: usize,
    fault: Fault,
    calls: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new(selector: ProviderSelector, dims: usize) -> Self {
        Self {
            selector,
            dims,
            fault: Fault::None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = fault;
        self
    }

    /// Shared handle to the number of `embed_batch` calls.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    fn selector(&self) -> ProviderSelector {
        self.selector
    }

    fn model(&self) -> &str {
        "mock-embedding"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingMatrix, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut matrix = Vec::with_capacity(texts.len());
        for (index, text) in texts.iter().enumerate() {
            if self.fault == Fault::MissingAt(index) {
                return Err(ProviderError::MissingEmbedding {
                    provider: self.selector,
                    index,
                });
            }
            let mut row = text_embedding(text, self.dims);
            if self.fault == Fault::RaggedAt(index) {
                row.pop();
            }
            matrix.push(row);
        }
        if self.fault == Fault::DropLastRow {
            matrix.pop();
        }
        Ok(matrix)
    }
}

/// Deterministic embedding for `text`: byte values scattered over `dims`
/// slots, with the text length in slot 0.
pub fn text_embedding(text: &str, dims: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dims];
    v[0] = text.len() as f32;
    for (i, b) in text.bytes().enumerate() {
        v[(i + b as usize) % dims] += f32::from(b) / 100.0;
    }
    v
}

pub fn labels(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Pipeline over the given mock providers with comma delimiter.
pub fn mock_pipeline(providers: Vec<MockProvider>, policy: EmptyLabelPolicy) -> Pipeline {
    let providers: Vec<Arc<dyn EmbeddingProvider>> = providers
        .into_iter()
        .map(|p| Arc::new(p) as Arc<dyn EmbeddingProvider>)
        .collect();
    Pipeline::new(EmbeddingService::new(providers), ',', policy)
}

/// Serve `router` on an ephemeral localhost port and return its base URL.
pub async fn spawn_server(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}
