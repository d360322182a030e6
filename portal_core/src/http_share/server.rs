//! HTTP server for uploads
//!
//! One route, `/ws`, which upgrades to a receiving session.

use super::websocket::{self, UploadState};
use crate::config::{ServerConfig, prepare_root};
use crate::transfer::PathGuard;
use anyhow::{Context, Result};
use axum::{
    Router,
    extract::Request,
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Path the upload WebSocket is served on
pub const WS_PATH: &str = "/ws";

/// Handler for invalid routes
async fn not_found_handler() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "not found")
}

/// Middleware to add security headers
async fn add_security_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("no-referrer"),
    );

    response
}

/// Build the axum router
pub fn create_router(state: Arc<UploadState>) -> Router {
    Router::new()
        .route(WS_PATH, get(websocket::ws_handler))
        .fallback(not_found_handler)
        .layer(middleware::from_fn(add_security_headers))
        .with_state(state)
}

/// Serve uploads on an already bound listener until `cancel_token` fires
pub async fn serve(
    listener: TcpListener,
    state: Arc<UploadState>,
    cancel_token: Option<CancellationToken>,
) -> Result<()> {
    let router = create_router(state);

    if let Some(ct) = cancel_token {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            ct.cancelled().await;
            tracing::info!("HTTP server shutting down gracefully");
        })
        .await?;
    } else {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
    }

    Ok(())
}

/// Prepare the root, bind, announce the URL and serve
pub async fn start_server(config: &ServerConfig, cancel_token: Option<CancellationToken>) -> Result<()> {
    let root = prepare_root(&config.root)?;
    let guard = PathGuard::new(&root)
        .with_context(|| format!("failed to open root {}", root.display()))?;
    let state = Arc::new(UploadState::new(guard));

    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    let port = listener.local_addr()?.port();

    let url = format!("ws://{}:{}{}", lan_ip(), port, WS_PATH);
    tracing::info!(root = %root.display(), "Upload server listening on {}", url);
    println!("Receiving into {}", root.display());
    println!("Upload endpoint: {}", url);

    serve(listener, state, cancel_token).await
}

/// Local address peers on the LAN can reach, preferring private IPv4 ranges
pub fn lan_ip() -> IpAddr {
    local_ip_address::list_afinet_netifas()
        .ok()
        .and_then(|ips| {
            let mut best_ip = None;
            for (_name, ip) in ips {
                let IpAddr::V4(v4) = ip else {
                    continue;
                };
                if v4.is_loopback() {
                    continue;
                }
                let octets = v4.octets();
                if octets[0] == 192 && octets[1] == 168 {
                    return Some(ip); // Best match
                }
                if v4.is_private() || best_ip.is_none() {
                    best_ip = Some(ip);
                }
            }
            best_ip
        })
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_router() -> (tempfile::TempDir, Router) {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(UploadState::new(PathGuard::new(dir.path()).unwrap()));
        (dir, create_router(state))
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let (_dir, router) = test_router();
        let response = router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ws_path_without_upgrade_is_rejected() {
        let (_dir, router) = test_router();
        let response = router
            .oneshot(Request::builder().uri(WS_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_cors_headers_absent() {
        let (_dir, router) = test_router();
        let response = router
            .oneshot(
                Request::builder()
                    .uri(WS_PATH)
                    .header("Origin", "http://evil.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn test_security_headers() {
        let (_dir, router) = test_router();
        let response = router
            .oneshot(Request::builder().uri("/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
        assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
        assert_eq!(headers.get("referrer-policy").unwrap(), "no-referrer");
    }

    #[test]
    fn test_lan_ip_is_ipv4() {
        assert!(lan_ip().is_ipv4());
    }
}
