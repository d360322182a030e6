use flate2::Compression;
use flate2::write::GzEncoder;
use futures_util::{SinkExt, StreamExt};
use portal_core::TransferEvent;
use portal_core::http_share::{UploadState, serve};
use portal_core::transfer::PathGuard;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server(root: &Path) -> (String, mpsc::Receiver<TransferEvent>) {
    let (tx, rx) = mpsc::channel(100);
    let state = Arc::new(UploadState::new(PathGuard::new(root).unwrap()).with_events(tx));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        serve(listener, state, None).await.unwrap();
    });

    (format!("ws://127.0.0.1:{}/ws", port), rx)
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn text(s: &str) -> Message {
    Message::Text(s.to_string().into())
}

fn header(name: &str, size: usize, last_modified: i64) -> Message {
    text(&format!(
        r#"{{"name":"{}","size":{},"lastModified":{},"mime":"text/plain"}}"#,
        name, size, last_modified
    ))
}

/// Next data or close message, skipping keepalives
async fn next_message(ws: &mut Client) -> Option<Message> {
    let fut = async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(message)) => return Some(message),
                _ => return None,
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out waiting for server")
}

async fn expect_text(ws: &mut Client, expected: &str) {
    match next_message(ws).await {
        Some(Message::Text(t)) => assert_eq!(t.as_str(), expected),
        other => panic!("expected {:?}, got {:?}", expected, other),
    }
}

async fn send_file(ws: &mut Client, name: &str, contents: &[u8], last_modified: i64) {
    ws.send(header(name, contents.len(), last_modified)).await.unwrap();
    expect_text(ws, "READY").await;

    // Deliberately uneven frame boundaries
    let compressed = gzip(contents);
    for chunk in compressed.chunks(7) {
        ws.send(Message::Binary(chunk.to_vec().into())).await.unwrap();
    }
    ws.send(text("EOF")).await.unwrap();
    expect_text(ws, "EOF").await;
}

#[tokio::test]
async fn test_single_file_session() {
    let dir = tempfile::tempdir().unwrap();
    let (url, _events) = spawn_server(dir.path()).await;
    let (mut ws, _) = connect_async(&url).await.expect("Failed to connect");

    send_file(&mut ws, "docs/a.txt", b"hello world", 1_700_000_000_000).await;
    ws.send(text("EOT")).await.unwrap();

    match next_message(&mut ws).await {
        Some(Message::Close(_)) | None => {}
        other => panic!("expected close, got {:?}", other),
    }

    let path = dir.path().join("docs").join("a.txt");
    assert_eq!(std::fs::read(&path).unwrap(), b"hello world");
    let modified = std::fs::metadata(&path).unwrap().modified().unwrap();
    assert_eq!(modified, UNIX_EPOCH + Duration::from_secs(1_700_000_000));
}

#[tokio::test]
async fn test_multiple_files_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let (url, mut events) = spawn_server(dir.path()).await;
    let (mut ws, _) = connect_async(&url).await.unwrap();

    let big: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
    send_file(&mut ws, "one.txt", b"first", 1_600_000_000_000).await;
    send_file(&mut ws, "nested/deeper/two.bin", &big, 1_600_000_000_000).await;
    send_file(&mut ws, "empty.txt", b"", 1_600_000_000_000).await;
    ws.send(text("EOT")).await.unwrap();
    let _ = next_message(&mut ws).await;

    assert_eq!(std::fs::read(dir.path().join("one.txt")).unwrap(), b"first");
    assert_eq!(
        std::fs::read(dir.path().join("nested/deeper/two.bin")).unwrap(),
        big
    );
    assert_eq!(std::fs::read(dir.path().join("empty.txt")).unwrap(), b"");

    let mut completed = Vec::new();
    while let Some(event) = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
    {
        match event {
            TransferEvent::FileCompleted { name, .. } => completed.push(name),
            TransferEvent::SessionEnded { files } => {
                assert_eq!(files, 3);
                break;
            }
            TransferEvent::SessionFailed { error } => panic!("session failed: {}", error),
            TransferEvent::FileStarted { .. } => {}
        }
    }
    assert_eq!(completed, ["one.txt", "nested/deeper/two.bin", "empty.txt"]);
}

#[tokio::test]
async fn test_existing_file_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"a much longer previous version").unwrap();
    let (url, _events) = spawn_server(dir.path()).await;
    let (mut ws, _) = connect_async(&url).await.unwrap();

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64;
    send_file(&mut ws, "a.txt", b"new", now).await;
    ws.send(text("EOT")).await.unwrap();
    let _ = next_message(&mut ws).await;

    assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"new");
}

#[tokio::test]
async fn test_corrupt_payload_reports_error_and_closes() {
    let dir = tempfile::tempdir().unwrap();
    let (url, _events) = spawn_server(dir.path()).await;
    let (mut ws, _) = connect_async(&url).await.unwrap();

    ws.send(header("bad.txt", 10, 0)).await.unwrap();
    expect_text(&mut ws, "READY").await;
    ws.send(Message::Binary(b"definitely not gzip".to_vec().into()))
        .await
        .unwrap();
    ws.send(text("EOF")).await.unwrap();

    match next_message(&mut ws).await {
        Some(Message::Text(t)) => assert!(t.as_str() != "EOF", "corrupt file acknowledged"),
        other => panic!("expected error text, got {:?}", other),
    }
    match next_message(&mut ws).await {
        Some(Message::Close(Some(frame))) => assert!(!frame.reason.is_empty()),
        other => panic!("expected close with reason, got {:?}", other),
    }
}

#[tokio::test]
async fn test_bad_header_is_rejected_without_ready() {
    let dir = tempfile::tempdir().unwrap();
    let (url, _events) = spawn_server(dir.path()).await;
    let (mut ws, _) = connect_async(&url).await.unwrap();

    ws.send(text(r#"{"size":3}"#)).await.unwrap();

    match next_message(&mut ws).await {
        Some(Message::Text(t)) => assert_ne!(t.as_str(), "READY"),
        other => panic!("expected error text, got {:?}", other),
    }
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn test_server_survives_dropped_client() {
    let dir = tempfile::tempdir().unwrap();
    let (url, mut events) = spawn_server(dir.path()).await;

    {
        let (mut ws, _) = connect_async(&url).await.unwrap();
        ws.send(header("partial.txt", 100, 0)).await.unwrap();
        expect_text(&mut ws, "READY").await;
        let compressed = gzip(&[b'x'; 100]);
        ws.send(Message::Binary(compressed[..10].to_vec().into()))
            .await
            .unwrap();
        // dropped without EOF or EOT
    }

    let failed = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = events.recv().await {
            if let TransferEvent::SessionFailed { error } = event {
                return error;
            }
        }
        panic!("event channel closed");
    })
    .await
    .unwrap();
    assert!(!failed.is_empty());

    // A fresh session on the same server still works
    let (mut ws, _) = connect_async(&url).await.unwrap();
    send_file(&mut ws, "after.txt", b"ok", 0).await;
    ws.send(text("EOT")).await.unwrap();
    let _ = next_message(&mut ws).await;
    assert_eq!(std::fs::read(dir.path().join("after.txt")).unwrap(), b"ok");
}
