mod common;

use std::time::Duration;

use assistant_core::{collect_stream, ChatClient, ChatMessage, ChatOptions, ClientError};
use axum::http::{Method, StatusCode};
use futures_util::StreamExt;

use common::{broken, dead_url, hold_open, json, serve_once, sse, status};

fn question() -> Vec<ChatMessage> {
    vec![
        ChatMessage::system("You are a research assistant."),
        ChatMessage::user("Hello"),
    ]
}

#[tokio::test]
async fn stream_yields_fragments_in_order_until_sentinel() {
    let (url, request) = serve_once(sse(&[
        "data: {\"content\":\"Hello\"}\n\n",
        "data: {\"content\":\", \"}\n\ndata: {\"content\":\"world\"}\n\n",
        "data: [DONE]\n\n",
    ]))
    .await;

    let client = ChatClient::new(&url);
    let options = ChatOptions {
        model: Some("gpt-4".to_string()),
        temperature: Some(0.25),
        max_tokens: Some(256),
    };
    let stream = client.stream(&question(), &options).await.unwrap();
    let fragments: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
    assert_eq!(fragments, vec!["Hello", ", ", "world"]);

    let request = request.await.unwrap();
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.path, "/api/chat");
    let body = request.json();
    assert_eq!(body["stream"], true);
    assert_eq!(body["model"], "gpt-4");
    assert_eq!(body["temperature"], 0.25);
    assert_eq!(body["max_tokens"], 256);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["content"], "Hello");
}

#[tokio::test]
async fn malformed_frames_are_skipped() {
    let (url, _request) = serve_once(sse(&[
        "data: {\"content\":\"before\"}\n\n",
        "data: {\"content\": oops}\n\n",
        "data: {\"role\":\"assistant\"}\n\n",
        ": comment\n\n",
        "data: {\"content\":\" after\"}\n\n",
        "data: [DONE]\n\n",
    ]))
    .await;

    let client = ChatClient::new(&url);
    let stream = client.stream(&question(), &ChatOptions::default()).await.unwrap();
    let text = collect_stream(stream, |_| {}).await.unwrap();
    assert_eq!(text, "before after");
}

#[tokio::test]
async fn frames_split_over_packets_are_reassembled() {
    let (url, _request) = serve_once(sse(&[
        "data: {\"content\":\"Hel",
        "lo\"}\n",
        "\ndata: [DO",
        "NE]\n\n",
    ]))
    .await;

    let client = ChatClient::new(&url);
    let stream = client.stream(&question(), &ChatOptions::default()).await.unwrap();
    let text = collect_stream(stream, |_| {}).await.unwrap();
    assert_eq!(text, "Hello");
}

#[tokio::test]
async fn error_status_fails_before_any_fragment() {
    let (url, _request) = serve_once(status(StatusCode::INTERNAL_SERVER_ERROR)).await;

    let client = ChatClient::new(&url);
    let err = match client.stream(&question(), &ChatOptions::default()).await {
        Ok(_) => panic!("expected the request to fail"),
        Err(e) => e,
    };
    assert!(matches!(err, ClientError::Transport { status: 500 }));
    assert!(err.is_transport());
    assert_eq!(err.status(), Some(500));
}

#[tokio::test]
async fn success_without_body_is_a_protocol_error() {
    let (url, _request) = serve_once(status(StatusCode::OK)).await;

    let client = ChatClient::new(&url);
    let err = match client.stream(&question(), &ChatOptions::default()).await {
        Ok(_) => panic!("expected the request to fail"),
        Err(e) => e,
    };
    assert!(matches!(err, ClientError::Protocol(_)));
    assert!(!err.is_transport());
}

#[tokio::test]
async fn interrupted_stream_keeps_received_text() {
    let (url, _request) = serve_once(broken(&["data: {\"content\":\"partial\"}\n\n"])).await;

    let client = ChatClient::new(&url);
    let stream = client.stream(&question(), &ChatOptions::default()).await.unwrap();
    let mut seen = Vec::new();
    let err = collect_stream(stream, |f| seen.push(f.to_string()))
        .await
        .unwrap_err();

    assert_eq!(err.text, "partial");
    assert_eq!(seen, vec!["partial"]);
    assert!(err.error.is_transport());
}

#[tokio::test]
async fn dropping_the_stream_releases_the_connection() {
    let (reply, hung_up) = hold_open(&["data: {\"content\":\"first\"}\n\n"]);
    let (url, _request) = serve_once(reply).await;

    let client = ChatClient::new(&url);
    let mut stream = client.stream(&question(), &ChatOptions::default()).await.unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap(), "first");
    drop(stream);

    tokio::time::timeout(Duration::from_secs(5), hung_up)
        .await
        .expect("server never saw the client hang up")
        .unwrap();
}

#[tokio::test]
async fn send_returns_complete_response() {
    let (url, request) = serve_once(json(
        StatusCode::OK,
        r#"{"id":"chat_1234","content":"Hi there","model":"gpt-4","usage":{"prompt_tokens":3,"completion_tokens":2,"total_tokens":5}}"#,
    ))
    .await;

    let client = ChatClient::new(&url);
    let response = client
        .send(&question(), &ChatOptions::with_model("gpt-4"))
        .await
        .unwrap();

    assert_eq!(response.content, "Hi there");
    assert_eq!(response.usage.total_tokens, 5);
    assert_eq!(request.await.unwrap().json()["stream"], false);
}

#[tokio::test]
async fn send_rejects_unexpected_body() {
    let (url, _request) = serve_once(json(StatusCode::OK, r#"{"detail":"nope"}"#)).await;

    let client = ChatClient::new(&url);
    let err = client
        .send(&question(), &ChatOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));
}

#[tokio::test]
async fn send_error_status() {
    let (url, _request) = serve_once(status(StatusCode::SERVICE_UNAVAILABLE)).await;

    let client = ChatClient::new(&url);
    let err = client
        .send(&question(), &ChatOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(503));
}

#[tokio::test]
async fn list_models() {
    let (url, request) = serve_once(json(
        StatusCode::OK,
        r#"{"models":[{"id":"gpt-4","name":"GPT-4","provider":"OpenAI","context_length":8192,"capabilities":["chat"]},{"id":"claude-3-opus","name":"Claude 3 Opus","provider":"Anthropic"}]}"#,
    ))
    .await;

    let client = ChatClient::new(&url);
    let models = client.list_models().await.unwrap();
    assert_eq!(models.len(), 2);
    assert_eq!(models[0].context_length, Some(8192));
    assert_eq!(models[1].provider, "Anthropic");
    let request = request.await.unwrap();
    assert_eq!(request.method, Method::GET);
    assert_eq!(request.path, "/api/chat/models");
}

#[tokio::test]
async fn upload_document() {
    let (url, request) = serve_once(json(
        StatusCode::OK,
        r#"{"id":"doc_1a2b3c4d","filename":"notes.txt","content_type":"text/plain","size":11,"status":"processed","chunks":1}"#,
    ))
    .await;

    let client = ChatClient::new(&url);
    let doc = client
        .upload_document("notes.txt", b"hello notes".to_vec())
        .await
        .unwrap();
    assert_eq!(doc.id, "doc_1a2b3c4d");
    assert_eq!(doc.status, "processed");
    assert_eq!(doc.size, Some(11));

    let request = request.await.unwrap();
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.path, "/api/documents/upload");
    assert!(request
        .header("content-type")
        .is_some_and(|v| v.starts_with("multipart/form-data")));
    let body = String::from_utf8_lossy(&request.body);
    assert!(body.contains("name=\"file\""));
    assert!(body.contains("filename=\"notes.txt\""));
    assert!(body.contains("hello notes"));
}

#[tokio::test]
async fn health_check_reports_status() {
    let (url, _request) = serve_once(json(StatusCode::OK, "{\"status\":\"ok\"}")).await;
    assert!(ChatClient::new(&url).health_check().await);

    let (url, _request) = serve_once(status(StatusCode::INTERNAL_SERVER_ERROR)).await;
    assert!(!ChatClient::new(&url).health_check().await);

    assert!(!ChatClient::new(&dead_url().await).health_check().await);
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_error() {
    let client = ChatClient::new(&dead_url().await);
    let err = match client.stream(&question(), &ChatOptions::default()).await {
        Ok(_) => panic!("expected the request to fail"),
        Err(e) => e,
    };
    assert!(matches!(err, ClientError::Connection(_)));
    assert!(err.is_transport());
}
