// tests/cms_client.rs
//
// MicroCmsClient against a local axum stub bound to 127.0.0.1:0.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use blog_announcer::cms::{ContentSource, FetchError, MicroCmsClient};

const KEY: &str = "test-key";

async fn article(Path((api, id)): Path<(String, String)>, headers: HeaderMap) -> impl IntoResponse {
    let key = headers
        .get("x-microcms-api-key")
        .and_then(|v| v.to_str().ok());
    if key != Some(KEY) {
        return (StatusCode::UNAUTHORIZED, String::new());
    }
    if api != "blogs" {
        return (StatusCode::NOT_FOUND, String::new());
    }
    match id.as_str() {
        "abc123" => (
            StatusCode::OK,
            r#"{"id":"abc123","createdAt":"2024-04-01T09:00:00.000Z","updatedAt":"2024-04-01T09:00:00.000Z","title":"Hello World","content":"<p>hi</p>"}"#
                .to_string(),
        ),
        "broken" => (StatusCode::OK, "{\"id\":".to_string()),
        "flaky" => (StatusCode::SERVICE_UNAVAILABLE, String::new()),
        "busy" => (StatusCode::TOO_MANY_REQUESTS, String::new()),
        _ => (StatusCode::NOT_FOUND, r#"{"message":"not found"}"#.to_string()),
    }
}

async fn spawn_stub() -> SocketAddr {
    let app = Router::new().route("/api/v1/{api}/{id}", get(article));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client(addr: SocketAddr, key: Option<&str>) -> MicroCmsClient {
    MicroCmsClient::new(
        &format!("http://{addr}/api/v1"),
        key.map(str::to_string),
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn fetches_article_with_api_key() {
    let addr = spawn_stub().await;
    let rec = client(addr, Some(KEY)).fetch("blogs", "abc123").await.unwrap();
    assert_eq!(rec.id, "abc123");
    assert_eq!(rec.title, "Hello World");
}

#[tokio::test]
async fn missing_key_is_unauthorized() {
    let addr = spawn_stub().await;
    let err = client(addr, None).fetch("blogs", "abc123").await.unwrap_err();
    assert!(matches!(err, FetchError::Unauthorized(401)), "{err:?}");
}

#[tokio::test]
async fn status_codes_map_to_error_classes() {
    let addr = spawn_stub().await;
    let c = client(addr, Some(KEY));

    assert!(matches!(
        c.fetch("blogs", "missing").await,
        Err(FetchError::NotFound(id)) if id == "missing"
    ));
    assert!(matches!(
        c.fetch("blogs", "flaky").await,
        Err(FetchError::Transient(_))
    ));
    assert!(matches!(
        c.fetch("blogs", "busy").await,
        Err(FetchError::Transient(_))
    ));
    assert!(matches!(
        c.fetch("blogs", "broken").await,
        Err(FetchError::Malformed(_))
    ));
}

#[tokio::test]
async fn unreachable_host_is_transient() {
    // Grab a free port, then close it so the connect is refused.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(addr, Some(KEY))
        .fetch("blogs", "abc123")
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Transient(_)), "{err:?}");
}

/// Replies with `head` and a body shorter than its `Content-Length`, then closes.
async fn spawn_truncating_stub(head: &'static str) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            // GET carries no body; wait for the end of the headers.
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                match sock.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            }
            let _ = sock.write_all(head.as_bytes()).await;
            let _ = sock.write_all(br#"{"message":"#).await;
            let _ = sock.shutdown().await;
        }
    });
    addr
}

#[tokio::test]
async fn error_status_wins_over_unreadable_body() {
    let gone = spawn_truncating_stub(
        "HTTP/1.1 404 Not Found\r\ncontent-type: application/json\r\ncontent-length: 200\r\nconnection: close\r\n\r\n",
    )
    .await;
    let err = client(gone, Some(KEY)).fetch("blogs", "abc123").await.unwrap_err();
    assert!(matches!(err, FetchError::NotFound(_)), "{err:?}");

    let denied = spawn_truncating_stub(
        "HTTP/1.1 401 Unauthorized\r\ncontent-type: application/json\r\ncontent-length: 200\r\nconnection: close\r\n\r\n",
    )
    .await;
    let err = client(denied, Some(KEY)).fetch("blogs", "abc123").await.unwrap_err();
    assert!(matches!(err, FetchError::Unauthorized(401)), "{err:?}");
}
