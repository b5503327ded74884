//! OpenRouter client against a one-shot local HTTP server.

use std::sync::Arc;

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crumbs_core::{AnalysisEngine, ClientError, Commit, CompletionClient, CompletionRequest, Prompt};
use crumbs_openrouter::{OpenRouterClient, OpenRouterConfig};

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let length = text[..head_end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Serve one response, returning the base URL and the captured request.
async fn serve_once(status_line: &'static str, body: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
        request
    });
    (format!("http://{addr}/api/v1"), handle)
}

fn chat_body(content: &str) -> String {
    json!({
        "id": "gen-123",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    })
    .to_string()
}

fn request(prompt: &str) -> CompletionRequest {
    CompletionRequest {
        model: "openai/gpt-4o-mini".to_string(),
        prompt: Prompt::new(prompt),
    }
}

#[tokio::test]
async fn test_sends_bearer_token_and_user_message() {
    let (base_url, server) = serve_once("200 OK", chat_body("[]")).await;
    let config = OpenRouterConfig::new("sk-or-test")
        .with_base_url(base_url)
        .with_app_name("crumbs");
    let client = OpenRouterClient::new(&config).unwrap();

    let text = client.complete(request("classify these")).await.unwrap();
    assert_eq!(text, "[]");

    let captured = server.await.unwrap();
    let lowered = captured.to_ascii_lowercase();
    assert!(captured.starts_with("POST /api/v1/chat/completions"));
    assert!(lowered.contains("authorization: bearer sk-or-test"));
    assert!(lowered.contains("x-title: crumbs"));
    assert!(captured.contains(r#""messages":[{"role":"user","content":"classify these"}]"#));
    assert!(captured.contains(r#""model":"openai/gpt-4o-mini""#));
}

#[tokio::test]
async fn test_non_success_status_maps_to_status_error() {
    let (base_url, server) = serve_once(
        "429 Too Many Requests",
        r#"{"error":{"message":"slow down"}}"#.to_string(),
    )
    .await;
    let client = OpenRouterClient::new(&OpenRouterConfig::new("k").with_base_url(base_url)).unwrap();

    let err = client.complete(request("x")).await.unwrap_err();
    match err {
        ClientError::Status { code, body } => {
            assert_eq!(code, 429);
            assert!(body.contains("slow down"));
        }
        other => panic!("expected status error, got {other:?}"),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn test_refused_connection_maps_to_http_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = OpenRouterConfig::new("k").with_base_url(format!("http://{addr}"));
    let client = OpenRouterClient::new(&config).unwrap();

    assert!(matches!(
        client.complete(request("x")).await,
        Err(ClientError::Http(_))
    ));
}

#[tokio::test]
async fn test_drives_the_engine_end_to_end() {
    let commit = Commit::from_message(
        "5eed5eed5eed",
        "fix: handle empty config",
        "dev",
        "dev@example.com",
        chrono::Utc::now(),
    );
    let reply = json!([{"sha": "5eed5eed", "sentiment": "positive", "confidence": 0.9}]).to_string();
    let (base_url, server) = serve_once("200 OK", chat_body(&reply)).await;

    let config = OpenRouterConfig::new("sk-or-test").with_base_url(base_url);
    let client = Arc::new(OpenRouterClient::new(&config).unwrap());
    let engine = AnalysisEngine::new(client, config.engine_config()).unwrap();

    let report = engine.analyze_sentiment(&[commit]).await.unwrap();

    assert_eq!(report.results().len(), 1);
    assert_eq!(report.results()[0].sha, "5eed5eed5eed");
    assert_eq!(report.stats().batches_failed, 0);
    server.await.unwrap();
}
