use futures_util::{SinkExt, StreamExt};
use portal_core::http_share::{UploadState, serve};
use portal_core::transfer::PathGuard;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

async fn spawn_server(root: &std::path::Path) -> String {
    let state = Arc::new(UploadState::new(PathGuard::new(root).unwrap()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        serve(listener, state, None).await.unwrap();
    });
    format!("ws://127.0.0.1:{}/ws", port)
}

/// Send one header and collect everything the server says before closing
async fn try_header(url: &str, name: &str) -> Vec<Message> {
    let (mut ws, _) = connect_async(url).await.expect("Failed to connect");
    let header = serde_json::json!({
        "name": name,
        "size": 4,
        "lastModified": 0,
        "mime": "text/plain",
    });
    ws.send(Message::Text(header.to_string().into())).await.unwrap();

    let mut replies = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(message)) = ws.next().await {
            let done = matches!(message, Message::Close(_));
            replies.push(message);
            if done {
                break;
            }
        }
    })
    .await;
    replies
}

#[tokio::test]
async fn test_traversal_names_are_refused() {
    let outer = tempfile::tempdir().unwrap();
    let root = outer.path().join("root");
    std::fs::create_dir(&root).unwrap();
    let url = spawn_server(&root).await;

    for name in ["../escape.txt", "a/../../escape.txt", "../root-sibling/x.txt"] {
        let replies = try_header(&url, name).await;

        assert!(
            !replies
                .iter()
                .any(|m| matches!(m, Message::Text(t) if t.as_str() == "READY")),
            "READY sent for {}",
            name
        );
        let error = replies.iter().find_map(|m| match m {
            Message::Text(t) => Some(t.to_string()),
            _ => None,
        });
        let error = error.unwrap_or_else(|| panic!("no error text for {}", name));
        assert!(error.contains("escapes root"), "unexpected error {}", error);

        let close_reason = replies.iter().find_map(|m| match m {
            Message::Close(Some(frame)) => Some(frame.reason.to_string()),
            _ => None,
        });
        assert!(close_reason.is_some_and(|r| r.contains("escapes root")));
    }

    assert!(!outer.path().join("escape.txt").exists());
    assert!(!outer.path().join("root-sibling").exists());
}

#[tokio::test]
async fn test_contained_dot_dot_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let url = spawn_server(dir.path()).await;

    let replies = try_header_then_abort(&url, "a/b/../c.txt").await;
    assert!(replies);
    assert!(dir.path().join("a").join("c.txt").exists());
}

/// True if the server answered READY
async fn try_header_then_abort(url: &str, name: &str) -> bool {
    let (mut ws, _) = connect_async(url).await.unwrap();
    let header = serde_json::json!({ "name": name, "lastModified": 0 });
    ws.send(Message::Text(header.to_string().into())).await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap();
    let ready = matches!(reply, Some(Ok(Message::Text(ref t))) if t.as_str() == "READY");
    ws.send(Message::Text("EOT".to_string().into())).await.unwrap();
    let _ = tokio::time::timeout(Duration::from_secs(5), ws.next()).await;
    ready
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_out_of_root_is_refused() {
    let outer = tempfile::tempdir().unwrap();
    let root = outer.path().join("root");
    let elsewhere = outer.path().join("elsewhere");
    std::fs::create_dir(&root).unwrap();
    std::fs::create_dir(&elsewhere).unwrap();
    std::os::unix::fs::symlink(&elsewhere, root.join("link")).unwrap();
    let url = spawn_server(&root).await;

    let replies = try_header(&url, "link/planted.txt").await;
    assert!(
        !replies
            .iter()
            .any(|m| matches!(m, Message::Text(t) if t.as_str() == "READY"))
    );
    assert!(!elsewhere.join("planted.txt").exists());
}
