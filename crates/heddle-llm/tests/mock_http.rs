//! Mock HTTP server tests for the completion and inference clients.
//!
//! Uses [`wiremock`] to stand up a local server that emulates the
//! OpenAI-compatible completion API and the hosted inference API,
//! exercising the full request/response path without a real provider.
//!
//! Coverage:
//! - Successful completion with usage
//! - 401 authentication failure
//! - 429 rate limiting (with retry_after_ms extraction)
//! - 404 model not found
//! - Malformed completion body / empty choices
//! - Missing API key short-circuits before any request
//! - Successful inference invocation
//! - 404 endpoint not found
//! - Non-array inference body

use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use heddle_llm::{
    CompletionClient, HttpInferenceClient, InferenceClient, LlmTarget, OpenAiCompatClient,
    ProviderError,
};
use heddle_types::ModelConfig;

fn mock_target(server_url: &str) -> LlmTarget {
    LlmTarget::new("mock-target", server_url, "sk-mock-key")
}

fn model() -> ModelConfig {
    ModelConfig {
        model_name: "test-model".into(),
    }
}

// ── Completion client ───────────────────────────────────────────────────

#[tokio::test]
async fn complete_success_with_usage() {
    let server = MockServer::start().await;

    let body = serde_json::json!({
        "id": "cmpl-001",
        "object": "chat.completion",
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "normalized text"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 21, "completion_tokens": 4, "total_tokens": 25}
    });

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-mock-key"))
        .and(body_partial_json(serde_json::json!({
            "model": "test-model",
            "temperature": 0.0
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAiCompatClient::new(mock_target(&server.uri()));
    let completion = client.complete(&model(), "rewrite this").await.unwrap();

    assert_eq!(completion.text, "normalized text");
    let usage = completion.usage.unwrap();
    assert_eq!(usage.prompt_tokens, 21);
    assert_eq!(usage.total_tokens, 25);
}

#[tokio::test]
async fn complete_auth_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let client = OpenAiCompatClient::new(mock_target(&server.uri()));
    let err = client.complete(&model(), "hello").await.unwrap_err();
    assert!(matches!(err, ProviderError::AuthFailed(_)));
}

#[tokio::test]
async fn complete_rate_limited_with_retry_hint() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(serde_json::json!({"retry_after_ms": 750})),
        )
        .mount(&server)
        .await;

    let client = OpenAiCompatClient::new(mock_target(&server.uri()));
    let err = client.complete(&model(), "hello").await.unwrap_err();
    match err {
        ProviderError::RateLimited { retry_after_ms } => assert_eq!(retry_after_ms, 750),
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn complete_model_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such model"))
        .mount(&server)
        .await;

    let client = OpenAiCompatClient::new(mock_target(&server.uri()));
    let err = client.complete(&model(), "hello").await.unwrap_err();
    match err {
        ProviderError::ModelNotFound(message) => {
            assert!(message.contains("test-model"));
        }
        other => panic!("expected ModelNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn complete_malformed_body_is_invalid_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = OpenAiCompatClient::new(mock_target(&server.uri()));
    let err = client.complete(&model(), "hello").await.unwrap_err();
    assert!(matches!(err, ProviderError::InvalidResponse(_)));
}

#[tokio::test]
async fn complete_empty_choices_is_invalid_response() {
    let server = MockServer::start().await;

    let body = serde_json::json!({
        "id": "cmpl-002",
        "model": "test-model",
        "choices": []
    });

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let client = OpenAiCompatClient::new(mock_target(&server.uri()));
    let err = client.complete(&model(), "hello").await.unwrap_err();
    assert!(matches!(err, ProviderError::InvalidResponse(_)));
}

#[tokio::test]
async fn complete_without_api_key_never_hits_the_network() {
    let server = MockServer::start().await;

    // No mock mounted: any request would 404 and fail differently.
    let mut target = mock_target(&server.uri());
    target.api_key = None;
    let client = OpenAiCompatClient::new(target);

    let err = client.complete(&model(), "hello").await.unwrap_err();
    assert!(matches!(err, ProviderError::NotConfigured(_)));
}

// ── Inference client ────────────────────────────────────────────────────

#[tokio::test]
async fn invoke_success_returns_probability_vector() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/endpoints/support-intents-v2/invocations"))
        .and(body_partial_json(serde_json::json!({"inputs": "my invoice is overdue"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([0.91, 0.03])))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpInferenceClient::new(server.uri());
    let probabilities = client
        .invoke("support-intents-v2", "my invoice is overdue")
        .await
        .unwrap();
    assert_eq!(probabilities, vec![0.91, 0.03]);
}

#[tokio::test]
async fn invoke_unknown_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/endpoints/missing/invocations"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = HttpInferenceClient::new(server.uri());
    let err = client.invoke("missing", "text").await.unwrap_err();
    match err {
        ProviderError::EndpointNotFound(endpoint) => assert_eq!(endpoint, "missing"),
        other => panic!("expected EndpointNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn invoke_non_array_body_is_invalid_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/endpoints/e/invocations"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"scores": [0.5]})),
        )
        .mount(&server)
        .await;

    let client = HttpInferenceClient::new(server.uri());
    let err = client.invoke("e", "text").await.unwrap_err();
    assert!(matches!(err, ProviderError::InvalidResponse(_)));
}

#[tokio::test]
async fn invoke_forwards_bearer_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/endpoints/e/invocations"))
        .and(header("Authorization", "Bearer inference-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([1.0])))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpInferenceClient::new(server.uri()).with_api_key("inference-key");
    let probabilities = client.invoke("e", "text").await.unwrap();
    assert_eq!(probabilities, vec![1.0]);
}
