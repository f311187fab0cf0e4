//! Each real provider client against an in-process stub of its API.

mod helpers;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use embedviz::config::{CloudflareConfig, GeminiConfig, OpenAiConfig};
use embedviz::embedding::cloudflare::CloudflareProvider;
use embedviz::embedding::gemini::GeminiProvider;
use embedviz::embedding::openai::OpenAiProvider;
use embedviz::embedding::EmbeddingProvider;
use embedviz::error::ProviderError;
use helpers::{labels, spawn_server, text_embedding};
use serde_json::{json, Value};

const DIMS: usize = 6;

// ── OpenAI ────────────────────────────────────────────────────────────────────

/// Answers with rows in reverse order, each carrying its original index.
async fn openai_stub(
    State(requests): State<Arc<AtomicUsize>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    requests.fetch_add(1, Ordering::SeqCst);

    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer sk-test") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": { "message": "Incorrect API key provided", "type": "invalid_request_error" } })),
        );
    }

    let inputs: Vec<String> = body["input"]
        .as_array()
        .map(|items| items.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();

    let data: Vec<Value> = inputs
        .iter()
        .enumerate()
        .rev()
        .map(|(index, text)| json!({ "object": "embedding", "index": index, "embedding": text_embedding(text, DIMS) }))
        .collect();

    (
        StatusCode::OK,
        Json(json!({ "object": "list", "data": data, "model": body["model"], "usage": { "prompt_tokens": 3, "total_tokens": 3 } })),
    )
}

async fn openai_provider(api_key: &str, max_batch_size: usize) -> (OpenAiProvider, Arc<AtomicUsize>) {
    let requests = Arc::new(AtomicUsize::new(0));
    let router = Router::new()
        .route("/v1/embeddings", post(openai_stub))
        .with_state(Arc::clone(&requests));
    let base = spawn_server(router).await;

    let config = OpenAiConfig {
        api_key: Some(api_key.into()),
        endpoint: format!("{base}/v1/embeddings"),
        max_batch_size,
        ..OpenAiConfig::default()
    };
    (OpenAiProvider::new(&config).unwrap(), requests)
}

#[tokio::test]
async fn openai_reorders_rows_by_index() {
    let (provider, requests) = openai_provider("sk-test", 100).await;
    let texts = labels(&["red", "green", "blue"]);

    let matrix = provider.embed_batch(&texts).await.unwrap();

    assert_eq!(requests.load(Ordering::SeqCst), 1);
    for (row, text) in matrix.iter().zip(&texts) {
        assert_eq!(row, &text_embedding(text, DIMS));
    }
}

#[tokio::test]
async fn openai_chunks_large_batches_and_keeps_order() {
    let (provider, requests) = openai_provider("sk-test", 2).await;
    let texts = labels(&["a", "bb", "ccc", "dddd", "eeeee"]);

    let matrix = provider.embed_batch(&texts).await.unwrap();

    assert_eq!(requests.load(Ordering::SeqCst), 3);
    assert_eq!(matrix.len(), 5);
    for (row, text) in matrix.iter().zip(&texts) {
        assert_eq!(row, &text_embedding(text, DIMS));
    }
}

#[tokio::test]
async fn openai_surfaces_provider_error_message() {
    let (provider, _) = openai_provider("sk-wrong", 100).await;

    let err = provider.embed_batch(&labels(&["a"])).await.unwrap_err();

    match err {
        ProviderError::Api { status, message, .. } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Incorrect API key provided");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

// ── Gemini ────────────────────────────────────────────────────────────────────

async fn gemini_stub(uri: Uri, headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    if headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()) != Some("g-test") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": { "code": 400, "message": "API key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT" } })),
        );
    }
    if uri.path() != "/v1beta/models/embedding-001:embedContent" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": { "code": 404, "message": format!("unexpected path {}", uri.path()) } })),
        );
    }

    let text = body["content"]["parts"][0]["text"].as_str().unwrap_or_default().to_string();
    if text == "void" {
        return (StatusCode::OK, Json(json!({ "embedding": { "values": [] } })));
    }

    // Longer texts answer sooner so completion order differs from input order.
    tokio::time::sleep(Duration::from_millis(60u64.saturating_sub(text.len() as u64 * 10))).await;
    (
        StatusCode::OK,
        Json(json!({ "embedding": { "values": text_embedding(&text, DIMS) } })),
    )
}

async fn gemini_provider(api_key: &str) -> GeminiProvider {
    let base = spawn_server(Router::new().fallback(gemini_stub)).await;
    let config = GeminiConfig {
        api_key: Some(api_key.into()),
        base_url: format!("{base}/v1beta"),
        max_concurrency: 3,
        ..GeminiConfig::default()
    };
    GeminiProvider::new(&config).unwrap()
}

#[tokio::test]
async fn gemini_embeds_each_text_and_keeps_input_order() {
    let provider = gemini_provider("g-test").await;
    let texts = labels(&["a", "bb", "ccc", "dddd", "eeeee"]);

    let matrix = provider.embed_batch(&texts).await.unwrap();

    assert_eq!(matrix.len(), 5);
    for (row, text) in matrix.iter().zip(&texts) {
        assert_eq!(row, &text_embedding(text, DIMS));
    }
}

#[tokio::test]
async fn gemini_empty_values_is_missing_embedding() {
    let provider = gemini_provider("g-test").await;

    let err = provider
        .embed_batch(&labels(&["ok", "void", "fine"]))
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::MissingEmbedding { index: 1, .. }));
}

#[tokio::test]
async fn gemini_surfaces_provider_error_message() {
    let provider = gemini_provider("wrong").await;

    let err = provider.embed_batch(&labels(&["a"])).await.unwrap_err();

    assert!(
        err.to_string().contains("API key not valid"),
        "unexpected error: {err}"
    );
}

// ── Cloudflare ────────────────────────────────────────────────────────────────

async fn cloudflare_stub(uri: Uri, headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    if uri.path() != "/client/v4/accounts/acct-1/ai/run/@cf/baai/bge-large-en-v1.5" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "errors": [{ "code": 7003, "message": "No route for the URI" }], "result": null })),
        );
    }
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer cf-test") {
        return (
            StatusCode::OK,
            Json(json!({ "success": false, "errors": [{ "code": 10000, "message": "Authentication error" }], "result": null })),
        );
    }

    let text = body["text"].as_str().unwrap_or_default().to_string();
    match text.as_str() {
        "slow" => {
            tokio::time::sleep(Duration::from_secs(3)).await;
            (StatusCode::OK, Json(json!({ "success": true, "errors": [], "result": { "data": [[1.0]] } })))
        }
        "hollow" => (
            StatusCode::OK,
            Json(json!({ "success": true, "errors": [], "result": { "shape": [1, 0], "data": [] } })),
        ),
        _ => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "errors": [],
                "messages": [],
                "result": { "shape": [1, DIMS], "data": [text_embedding(&text, DIMS)] }
            })),
        ),
    }
}

async fn cloudflare_provider(api_key: &str, timeout_secs: u64) -> CloudflareProvider {
    let base = spawn_server(Router::new().fallback(cloudflare_stub)).await;
    let config = CloudflareConfig {
        api_key: Some(api_key.into()),
        account_id: Some("acct-1".into()),
        base_url: format!("{base}/client/v4"),
        timeout_secs,
        ..CloudflareConfig::default()
    };
    CloudflareProvider::new(&config).unwrap()
}

#[tokio::test]
async fn cloudflare_unwraps_result_envelope() {
    let provider = cloudflare_provider("cf-test", 5).await;
    let texts = labels(&["north", "south", "east", "west"]);

    let matrix = provider.embed_batch(&texts).await.unwrap();

    for (row, text) in matrix.iter().zip(&texts) {
        assert_eq!(row, &text_embedding(text, DIMS));
    }
}

#[tokio::test]
async fn cloudflare_unsuccessful_envelope_on_200_is_api_error() {
    let provider = cloudflare_provider("cf-wrong", 5).await;

    let err = provider.embed_batch(&labels(&["a"])).await.unwrap_err();

    match err {
        ProviderError::Api { status, message, .. } => {
            assert_eq!(status, 200);
            assert_eq!(message, "Authentication error");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn cloudflare_empty_data_is_missing_embedding() {
    let provider = cloudflare_provider("cf-test", 5).await;

    let err = provider
        .embed_batch(&labels(&["a", "b", "hollow"]))
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::MissingEmbedding { index: 2, .. }));
}

#[tokio::test]
async fn cloudflare_slow_call_times_out_whole_batch() {
    let provider = cloudflare_provider("cf-test", 1).await;

    let err = provider
        .embed_batch(&labels(&["a", "slow", "c"]))
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Timeout { .. }), "got {err:?}");
}
