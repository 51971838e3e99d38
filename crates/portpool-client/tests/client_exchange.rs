//! Integration tests for `ProtocolClient` against a scripted loopback server.
//!
//! The fake server below reads one frame per reply it was given and writes
//! that reply back, so each test controls exactly what the client sees.

use portpool_client::{ClientError, ProtocolClient};
use portpool_core::{read_frame, write_frame, Message, Payload};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

fn payload(value: Value) -> Payload {
    value.as_object().cloned().unwrap_or_default()
}

/// Starts a one-connection server that answers with `replies` in order and
/// returns the requests it saw.
async fn scripted_server(replies: Vec<Message>) -> (String, JoinHandle<Vec<Message>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut seen = Vec::new();
        for reply in replies {
            seen.push(read_frame(&mut stream).await.unwrap());
            write_frame(&mut stream, &reply).await.unwrap();
        }
        seen
    });
    (addr, handle)
}

#[tokio::test]
async fn test_hello_sends_timestamp_and_returns_greeting() {
    // Arrange
    let (addr, server) = scripted_server(vec![Message::new(
        "hello_response",
        payload(json!({"message": "Hello, client!"})),
    )])
    .await;
    let mut client = ProtocolClient::connect(&addr).await.unwrap();

    // Act
    let greeting = client.hello().await.unwrap();
    let seen = server.await.unwrap();

    // Assert
    assert_eq!(greeting, "Hello, client!");
    assert_eq!(seen[0].action, "hello");
    assert!(seen[0].payload["timestamp"].as_u64().is_some());
}

#[tokio::test]
async fn test_echo_returns_server_payload() {
    let body = payload(json!({"text": "This is a test message"}));
    let (addr, server) =
        scripted_server(vec![Message::new("echo_response", body.clone())]).await;
    let mut client = ProtocolClient::connect(&addr).await.unwrap();

    let echoed = client.echo(body.clone()).await.unwrap();
    let seen = server.await.unwrap();

    assert_eq!(echoed, body);
    assert_eq!(seen[0], Message::new("echo", body));
}

#[tokio::test]
async fn test_error_response_becomes_rejected() {
    let (addr, _server) =
        scripted_server(vec![Message::error("unknown action: echo")]).await;
    let mut client = ProtocolClient::connect(&addr).await.unwrap();

    let result = client.echo(Payload::new()).await;

    match result {
        Err(ClientError::Rejected(text)) => assert_eq!(text, "unknown action: echo"),
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_mismatched_response_action_is_reported() {
    let (addr, _server) = scripted_server(vec![Message::empty("echo_response")]).await;
    let mut client = ProtocolClient::connect(&addr).await.unwrap();

    let result = client.hello().await;

    assert!(matches!(
        result,
        Err(ClientError::UnexpectedResponse { ref expected, ref received })
            if expected == "hello_response" && received == "echo_response"
    ));
}

#[tokio::test]
async fn test_server_closing_early_is_a_frame_error() {
    // Arrange – a server that answers nothing.
    let (addr, server) = scripted_server(Vec::new()).await;
    let mut client = ProtocolClient::connect(&addr).await.unwrap();
    server.await.unwrap();

    // Act
    let result = client.request(&Message::empty("hello")).await;

    // Assert
    assert!(matches!(result, Err(ClientError::Frame(_))));
}

#[tokio::test]
async fn test_request_returns_error_frames_unchanged() {
    let (addr, _server) = scripted_server(vec![Message::error("nope")]).await;
    let mut client = ProtocolClient::connect(&addr).await.unwrap();

    let response = client.request(&Message::empty("anything")).await.unwrap();

    assert!(response.is_error());
    assert_eq!(response.message_text(), Some("nope"));
}
