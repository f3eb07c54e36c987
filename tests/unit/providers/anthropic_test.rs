/*!
 * Tests for the Anthropic provider against a mock server
 */

use mockito::Matcher;
use postlingo::errors::ProviderError;
use postlingo::providers::anthropic::{Anthropic, AnthropicRequest};
use postlingo::providers::Provider;
use serde_json::json;

use super::{json_request, settings_for};

#[test]
fn test_anthropicRequest_builder_shouldSerializeSystemSeparately() {
    let request = AnthropicRequest::new("claude-test", 512)
        .system("Translate")
        .temperature(0.2)
        .add_message("user", "Hello");
    let body = serde_json::to_value(&request).unwrap();

    assert_eq!(body["system"], "Translate");
    assert_eq!(body["max_tokens"], 512);
    assert_eq!(body["messages"][0]["content"], "Hello");
}

#[tokio::test]
async fn test_complete_withTextBlocks_shouldConcatenateThem() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/messages")
        .match_header("x-api-key", "sk-test")
        .match_header("anthropic-version", "2023-06-01")
        .match_body(Matcher::PartialJson(json!({"model": "test-model", "max_tokens": 1024})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "content": [
                    {"type": "text", "text": "<p>Sable "},
                    {"type": "text", "text": "et soleil.</p>"}
                ],
                "usage": {"input_tokens": 20, "output_tokens": 8}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let provider = Anthropic::new(settings_for(server.url())).unwrap();
    let text = provider.complete(&json_request()).await.unwrap();

    assert_eq!(text, "<p>Sable et soleil.</p>");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_complete_withRateLimit_shouldReturnRetryableError() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/messages")
        .with_status(429)
        .with_body("{\"error\":{\"type\":\"rate_limit_error\"}}")
        .create_async()
        .await;

    let provider = Anthropic::new(settings_for(server.url())).unwrap();
    let error = provider.complete(&json_request()).await.unwrap_err();

    assert!(matches!(error, ProviderError::RateLimitExceeded(_)));
    assert!(error.is_retryable());
}

#[tokio::test]
async fn test_complete_withServerError_shouldKeepStatusCode() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/messages")
        .with_status(529)
        .with_body("overloaded")
        .create_async()
        .await;

    let provider = Anthropic::new(settings_for(server.url())).unwrap();
    let error = provider.complete(&json_request()).await.unwrap_err();

    match error {
        ProviderError::ApiError { status_code, message } => {
            assert_eq!(status_code, 529);
            assert_eq!(message, "overloaded");
        }
        other => panic!("unexpected error: {}", other),
    }
}
