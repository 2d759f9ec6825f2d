//! HTTP behaviour of the model clients against a local mock server.

use modernizer::llm::client_impl::{OllamaClient, OpenAIClient};
use modernizer::llm::LlmClient;
use modernizer::util::SecretString;

fn ollama(url: &str) -> OllamaClient {
    OllamaClient::new(url.to_string(), "qwen2.5-coder:7b".to_string(), 0.1, 256, 5).unwrap()
}

#[tokio::test]
async fn test_ollama_complete_returns_response_text() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/generate")
        .match_body(mockito::Matcher::PartialJsonString(
            r#"{"model": "qwen2.5-coder:7b", "stream": false}"#.to_string(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"response": "{\"summary\": \"ok\"}", "done": true}"#)
        .create_async()
        .await;

    let text = ollama(&server.url()).complete("TASK: test").await.unwrap();
    assert_eq!(text, r#"{"summary": "ok"}"#);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_ollama_error_status_is_an_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/generate")
        .with_status(404)
        .with_body("model not found")
        .create_async()
        .await;

    let err = ollama(&server.url()).complete("TASK: test").await.unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("404"), "{}", msg);
    assert!(msg.contains("model not found"), "{}", msg);
}

#[tokio::test]
async fn test_ollama_availability() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/api/tags")
        .with_status(200)
        .with_body(r#"{"models": [{"name": "qwen2.5-coder:7b"}]}"#)
        .create_async()
        .await;
    assert!(ollama(&server.url()).is_available().await);

    // Nothing listening
    assert!(!ollama("http://127.0.0.1:9").is_available().await);
}

#[tokio::test]
async fn test_openai_compatible_sends_bearer_key() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer sk-local")
        .with_status(200)
        .with_body(r#"{"choices": [{"message": {"role": "assistant", "content": "hello"}}]}"#)
        .create_async()
        .await;

    let client = OpenAIClient::new(
        SecretString::from("sk-local".to_string()),
        "local-model".to_string(),
        format!("{}/v1/", server.url()),
        0.1,
        256,
        5,
    )
    .unwrap();
    assert_eq!(client.complete("hi").await.unwrap(), "hello");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_openai_compatible_without_choices_is_an_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body(r#"{"choices": []}"#)
        .create_async()
        .await;

    let client = OpenAIClient::new(
        SecretString::from(String::new()),
        "local-model".to_string(),
        server.url(),
        0.1,
        256,
        5,
    )
    .unwrap();
    let err = client.complete("hi").await.unwrap_err();
    assert!(err.to_string().contains("No choices"));
}
