use std::time::Duration;

use rankgate::gateway::{Attribution, CompletionGateway, GeminiAdapter, GenerateRequest};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rankgate::ApiKey;

fn adapter(server: &MockServer) -> GeminiAdapter {
    GeminiAdapter::with_config(server.uri(), "gemini-2.0-flash", Duration::from_secs(5)).unwrap()
}

fn request() -> GenerateRequest {
    GenerateRequest::new("rate these comments", Attribution::new("test"))
        .temperature(0.1)
        .max_output_tokens(500)
}

#[tokio::test]
async fn gemini_parses_text_and_usage() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-2.0-flash:generateContent"))
        .and(query_param("key", "sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "0.8, " }, { "text": "0.3" }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": {
                "promptTokenCount": 12,
                "candidatesTokenCount": 6
            }
        })))
        .mount(&server)
        .await;

    let resp = adapter(&server)
        .generate(&ApiKey::new("sk-test"), &request())
        .await
        .unwrap();

    // Multiple parts concatenate into one completion.
    assert_eq!(resp.text, "0.8, 0.3");
    assert_eq!(resp.input_tokens, 12);
    assert_eq!(resp.output_tokens, 6);
}

#[tokio::test]
async fn gemini_maps_429_to_remote_quota() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-2.0-flash:generateContent"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {
                "message": "Resource has been exhausted",
                "status": "RESOURCE_EXHAUSTED"
            }
        })))
        .mount(&server)
        .await;

    let err = adapter(&server)
        .generate(&ApiKey::new("sk-test"), &request())
        .await
        .unwrap_err();

    assert!(err.is_quota());
    assert!(err.is_retryable());
    assert_eq!(err.code(), "quota_remote");
    let ctx = err.context().unwrap();
    assert_eq!(ctx.http_status, Some(429));
    assert_eq!(ctx.provider_code.as_deref(), Some("RESOURCE_EXHAUSTED"));
}

#[tokio::test]
async fn gemini_resource_exhausted_status_is_quota_even_without_429() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-2.0-flash:generateContent"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED" }
        })))
        .mount(&server)
        .await;

    let err = adapter(&server)
        .generate(&ApiKey::new("sk-test"), &request())
        .await
        .unwrap_err();

    assert!(err.is_quota());
}

#[tokio::test]
async fn gemini_5xx_is_retryable_but_not_quota() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-2.0-flash:generateContent"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": { "message": "overloaded", "status": "UNAVAILABLE" }
        })))
        .mount(&server)
        .await;

    let err = adapter(&server)
        .generate(&ApiKey::new("sk-test"), &request())
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert!(!err.is_quota());
}

#[tokio::test]
async fn gemini_4xx_is_permanent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-2.0-flash:generateContent"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "message": "Invalid argument", "status": "INVALID_ARGUMENT" }
        })))
        .mount(&server)
        .await;

    let err = adapter(&server)
        .generate(&ApiKey::new("sk-test"), &request())
        .await
        .unwrap_err();

    assert!(!err.is_retryable());
}

#[tokio::test]
async fn gemini_prompt_block_surfaces_as_refusal() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-2.0-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        })))
        .mount(&server)
        .await;

    let err = adapter(&server)
        .generate(&ApiKey::new("sk-test"), &request())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "refused");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn gemini_safety_finish_reason_surfaces_as_refusal() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-2.0-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        })))
        .mount(&server)
        .await;

    let err = adapter(&server)
        .generate(&ApiKey::new("sk-test"), &request())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "refused");
}

#[tokio::test]
async fn gemini_empty_completion_is_a_permanent_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-2.0-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "   " }] },
                "finishReason": "STOP"
            }]
        })))
        .mount(&server)
        .await;

    let err = adapter(&server)
        .generate(&ApiKey::new("sk-test"), &request())
        .await
        .unwrap_err();

    assert!(!err.is_retryable());
}

#[tokio::test]
async fn gemini_oversized_prompt_is_rejected_locally() {
    let server = MockServer::start().await;

    let huge = "x".repeat(500_001);
    let err = adapter(&server)
        .generate(
            &ApiKey::new("sk-test"),
            &GenerateRequest::new(huge, Attribution::new("test")),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), "invalid_request");
    // Nothing should have reached the server.
    assert!(server.received_requests().await.unwrap().is_empty());
}
