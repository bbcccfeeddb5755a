//! Integration tests for the OpenRouter streaming backend.
//!
//! These tests start a one-shot HTTP server on a random port that answers
//! with a canned SSE body, and point the client at it.

use std::time::Duration;

use storyblock::OpenRouterClient;
use storyblock::api::{OpenRouterGenerator, TextGenerator};
use storyblock::config::GeneratorConfig;
use storyblock::generate::generate_block;
use storyblock::state::PromptState;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Read one HTTP request: headers, then the body as announced by
/// Content-Length.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut request = Vec::new();
    let mut buf = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut buf).await.unwrap();
        assert!(n > 0, "client closed before sending headers");
        request.extend_from_slice(&buf[..n]);
        if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&request[..header_end]).to_lowercase();
    let content_length = head
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while request.len() < header_end + content_length {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        request.extend_from_slice(&buf[..n]);
    }
    String::from_utf8_lossy(&request).to_string()
}

/// Spawn a server that serves one request with `status` and `body`.
/// Returns the endpoint URL and a handle yielding the raw request.
async fn spawn_sse_server(
    status: &'static str,
    body: String,
) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;

        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n{body}"
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        request
    });

    (format!("http://{addr}/api/v1/chat/completions"), handle)
}

/// Like [`spawn_sse_server`], but writes `parts` as separate chunked
/// transfer-encoding frames, flushing and pausing between them.
async fn spawn_chunked_sse_server(
    parts: Vec<Vec<u8>>,
) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;

        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\n\
                  transfer-encoding: chunked\r\nconnection: close\r\n\r\n",
            )
            .await
            .unwrap();
        for part in parts {
            let mut frame = format!("{:x}\r\n", part.len()).into_bytes();
            frame.extend_from_slice(&part);
            frame.extend_from_slice(b"\r\n");
            socket.write_all(&frame).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        socket.write_all(b"0\r\n\r\n").await.unwrap();
        socket.shutdown().await.unwrap();
        request
    });

    (format!("http://{addr}/api/v1/chat/completions"), handle)
}

fn generator_for(endpoint: &str) -> OpenRouterGenerator {
    let client = OpenRouterClient::new("test-key")
        .unwrap()
        .with_endpoint(endpoint);
    OpenRouterGenerator::new(
        client,
        GeneratorConfig {
            model: "test/model".into(),
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn streams_text_and_citations() {
    let body = [
        ": OPENROUTER PROCESSING",
        r#"data: {"choices":[{"delta":{"content":"Dunes "}}]}"#,
        r#"data: {"choices":[{"delta":{"content":"shifted.","annotations":[{"type":"url_citation","url_citation":{"url":"https://dunes.example","title":"Dunes"}}]}}]}"#,
        r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":10,"completion_tokens":3,"total_tokens":13}}"#,
        "data: [DONE]",
        "",
    ]
    .join("\n");
    let (endpoint, server) = spawn_sse_server("200 OK", body).await;
    let generator = generator_for(&endpoint);

    let mut seen = Vec::new();
    let mut on_chunk = |c: &str| seen.push(c.to_string());
    let generation = generator
        .generate_stream("Write about dunes.", &mut on_chunk)
        .await
        .unwrap();

    assert_eq!(seen, vec!["Dunes ", "shifted."]);
    assert_eq!(generation.text(), "Dunes shifted.");
    assert_eq!(generation.citations.len(), 1);
    assert_eq!(generation.usage.unwrap().total_tokens, Some(13));

    let request = server.await.unwrap();
    assert!(request.contains("Bearer test-key"));
    assert!(request.contains(r#""stream":true"#));
    assert!(request.contains("Write about dunes."));
    assert!(request.contains(r#""id":"web""#));
}

#[tokio::test]
async fn content_filter_maps_to_safety_message() {
    let body = [
        r#"data: {"choices":[{"delta":{"content":"Par"}}]}"#,
        r#"data: {"choices":[{"delta":{},"finish_reason":"content_filter"}]}"#,
        "data: [DONE]",
        "",
    ]
    .join("\n");
    let (endpoint, server) = spawn_sse_server("200 OK", body).await;

    let text = generate_block(&generator_for(&endpoint), &PromptState::default(), "Main").await;
    assert!(text.starts_with("Error: The content was blocked by safety filters."));
    server.await.unwrap();
}

#[tokio::test]
async fn http_error_is_reported() {
    let (endpoint, server) =
        spawn_sse_server("401 Unauthorized", r#"{"error":{"message":"bad key"}}"#.to_string())
            .await;

    let text = generate_block(&generator_for(&endpoint), &PromptState::default(), "Main").await;
    assert!(text.starts_with("Error: An unexpected error occurred: OpenRouter API HTTP 401"));
    assert!(text.contains("bad key"));
    server.await.unwrap();
}

#[tokio::test]
async fn stream_without_done_marker_still_completes() {
    let body = r#"data: {"choices":[{"delta":{"content":"The end."}}]}"#.to_string();
    let (endpoint, server) = spawn_sse_server("200 OK", body).await;

    let text = generate_block(&generator_for(&endpoint), &PromptState::default(), "Conclusion").await;
    assert_eq!(text, "The end.");
    server.await.unwrap();
}

#[tokio::test]
async fn multibyte_character_split_across_chunks() {
    let body = concat!(
        r#"data: {"choices":[{"delta":{"content":"café — naïve"}}]}"#,
        "\n",
        "data: [DONE]\n",
    )
    .as_bytes();
    // Split between the two bytes of 'é'.
    let split = body.windows(2).position(|w| w == "é".as_bytes()).unwrap() + 1;
    let parts = vec![body[..split].to_vec(), body[split..].to_vec()];
    let (endpoint, server) = spawn_chunked_sse_server(parts).await;

    let mut on_chunk = |_: &str| {};
    let generation = generator_for(&endpoint)
        .generate_stream("Write about a café.", &mut on_chunk)
        .await
        .unwrap();
    assert_eq!(generation.text(), "café — naïve");
    server.await.unwrap();
}
