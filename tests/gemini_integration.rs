use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use kaiwa::config::GeminiConfig;
use kaiwa::error::KaiwaError;
use kaiwa::providers::{GeminiClient, ModelClient, Turn};

fn client_for(server: &MockServer) -> GeminiClient {
    let config = GeminiConfig {
        api_base: Some(server.uri()),
        ..GeminiConfig::default()
    };
    GeminiClient::new("test-key".to_string(), config).expect("create client")
}

fn text_response(text: &str) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [{"text": text}]
            }
        }]
    })
}

#[tokio::test]
async fn test_complete_returns_response_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.5-flash:generateContent"))
        .and(query_param("key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_response("Hi there")))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let reply = client.complete("Hello").await.expect("complete");
    assert_eq!(reply, "Hi there");
}

#[tokio::test]
async fn test_chat_turn_translates_roles_and_appends_user_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_response("ok")))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let history = vec![Turn::user("Hello"), Turn::assistant("Hi there")];
    client
        .chat_turn(&history, "How are you?")
        .await
        .expect("chat turn");

    let requests = server.received_requests().await.expect("requests recorded");
    assert_eq!(requests.len(), 1);

    let body: serde_json::Value =
        serde_json::from_slice(&requests[0].body).expect("request body is JSON");
    let contents = body["contents"].as_array().expect("contents array");
    assert_eq!(contents.len(), 3);
    // Assistant turns are sent with the remote vocabulary's "model" role.
    assert_eq!(contents[0]["role"], "user");
    assert_eq!(contents[1]["role"], "model");
    assert_eq!(contents[2]["role"], "user");
    assert_eq!(contents[2]["parts"][0]["text"], "How are you?");
}

#[tokio::test]
async fn test_generation_config_rides_on_every_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_response("ok")))
        .mount(&server)
        .await;

    let config = GeminiConfig {
        api_base: Some(server.uri()),
        temperature: 0.3,
        max_output_tokens: 512,
        ..GeminiConfig::default()
    };
    let client = GeminiClient::new("test-key".to_string(), config).expect("create client");
    client.complete("Hello").await.expect("complete");

    let requests = server.received_requests().await.expect("requests recorded");
    let body: serde_json::Value =
        serde_json::from_slice(&requests[0].body).expect("request body is JSON");
    assert_eq!(body["generationConfig"]["temperature"], 0.3);
    assert_eq!(body["generationConfig"]["maxOutputTokens"], 512);
}

#[tokio::test]
async fn test_quota_error_surfaces_as_generation_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429).set_body_string(r#"{"error": "quota exhausted"}"#),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.complete("Hello").await.expect_err("should fail");
    match err.downcast_ref::<KaiwaError>() {
        Some(KaiwaError::Generation(cause)) => {
            assert!(cause.contains("429"));
            assert!(cause.contains("quota exhausted"));
        }
        other => panic!("expected Generation error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_candidates_return_empty_string_not_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let reply = client.complete("Hello").await.expect("complete");
    assert_eq!(reply, "");
}

#[tokio::test]
async fn test_malformed_response_is_a_generation_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.complete("Hello").await.expect_err("should fail");
    assert!(matches!(
        err.downcast_ref::<KaiwaError>(),
        Some(KaiwaError::Generation(_))
    ));
}

#[tokio::test]
async fn test_streaming_fragments_concatenate_to_full_response() {
    let server = MockServer::start().await;
    let body = format!(
        "data: {}\n\ndata: {}\n\ndata: {}\n\n",
        text_response("Hel"),
        text_response("lo wo"),
        text_response("rld")
    );
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.5-flash:streamGenerateContent"))
        .and(query_param("alt", "sse"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut stream = client.complete_streaming("Hello").await.expect("stream");

    let mut fragments = Vec::new();
    while let Some(fragment) = stream.next().await {
        fragments.push(fragment.expect("fragment"));
    }

    assert_eq!(fragments, vec!["Hel", "lo wo", "rld"]);
    assert_eq!(fragments.concat(), "Hello world");
}

#[tokio::test]
async fn test_streaming_error_request_fails_up_front() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .complete_streaming("Hello")
        .await
        .err()
        .expect("request should fail");
    assert!(matches!(
        err.downcast_ref::<KaiwaError>(),
        Some(KaiwaError::Generation(_))
    ));
}

#[tokio::test]
async fn test_streaming_malformed_event_yields_error_after_valid_fragments() {
    let server = MockServer::start().await;
    let body = format!("data: {}\n\ndata: {{broken\n\n", text_response("Hello"));
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut stream = client.complete_streaming("Hello").await.expect("stream");

    // Fragments delivered before the failure remain valid partial output.
    let first = stream.next().await.expect("first item");
    assert_eq!(first.expect("first fragment"), "Hello");

    let second = stream.next().await.expect("second item");
    assert!(second.is_err());

    // The stream terminates after the error.
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_list_models_filters_to_generation_capable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .and(query_param("key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {
                    "name": "models/gemini-2.5-flash",
                    "displayName": "Gemini 2.5 Flash",
                    "description": "Fast and versatile",
                    "supportedGenerationMethods": ["generateContent", "countTokens"]
                },
                {
                    "name": "models/embedding-001",
                    "displayName": "Embedding 001",
                    "description": "Text embeddings",
                    "supportedGenerationMethods": ["embedContent"]
                }
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let models = client.list_models().await.expect("list models");

    assert_eq!(models.len(), 1);
    assert_eq!(models[0].name, "gemini-2.5-flash");
    assert_eq!(models[0].display_name, "Gemini 2.5 Flash");
    assert!(models[0].supports_method("generateContent"));
}

#[tokio::test]
async fn test_model_switch_only_affects_subsequent_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.5-pro:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_response("from pro")))
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.set_model("gemini-2.5-pro");
    assert_eq!(client.current_model(), "gemini-2.5-pro");

    let reply = client.complete("Hello").await.expect("complete");
    assert_eq!(reply, "from pro");
}
