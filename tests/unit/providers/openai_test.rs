/*!
 * Tests for the OpenAI provider against a mock server
 */

use mockito::Matcher;
use postlingo::errors::ProviderError;
use postlingo::providers::openai::{OpenAI, OpenAIRequest};
use postlingo::providers::Provider;
use serde_json::json;

use super::{json_request, settings_for};

#[test]
fn test_openaiRequest_fromCompletion_shouldAskForJsonObject() {
    let request = OpenAIRequest::from_completion("gpt-4o-mini", &json_request());
    let body = serde_json::to_value(&request).unwrap();

    assert_eq!(body["model"], "gpt-4o-mini");
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["role"], "user");
    assert_eq!(body["response_format"]["type"], "json_object");
    assert_eq!(body["max_tokens"], 1024);
}

#[test]
fn test_openaiRequest_withPlainText_shouldOmitResponseFormat() {
    let mut completion = json_request();
    completion.json_output = false;
    completion.system.clear();

    let body = serde_json::to_value(OpenAIRequest::from_completion("m", &completion)).unwrap();
    assert!(body.get("response_format").is_none());
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_complete_withSuccessResponse_shouldReturnMessageContent() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .match_body(Matcher::PartialJson(json!({"model": "test-model"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"title\":\"Plage\"}"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 5}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let provider = OpenAI::new(settings_for(server.url())).unwrap();
    let text = provider.complete(&json_request()).await.unwrap();

    assert_eq!(text, "{\"title\":\"Plage\"}");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_complete_withUnauthorized_shouldReturnAuthenticationError() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(401)
        .with_body("{\"error\":\"invalid api key\"}")
        .create_async()
        .await;

    let provider = OpenAI::new(settings_for(server.url())).unwrap();
    let error = provider.complete(&json_request()).await.unwrap_err();

    assert!(matches!(error, ProviderError::AuthenticationError(_)));
    assert!(!error.is_retryable());
}

#[tokio::test]
async fn test_complete_withEmptyChoices_shouldReturnParseError() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("{\"choices\": []}")
        .create_async()
        .await;

    let provider = OpenAI::new(settings_for(server.url())).unwrap();
    let error = provider.complete(&json_request()).await.unwrap_err();

    assert!(matches!(error, ProviderError::ParseError(_)));
}
