//! HTTP routing in front of the WebSocket endpoint.
//!
//! Every accepted connection speaks HTTP/1.1 through hyper; this router
//! decides what each request gets:
//!
//! | Request                                   | Response                         |
//! |-------------------------------------------|----------------------------------|
//! | WebSocket upgrade on the endpoint path    | `101 Switching Protocols`        |
//! | anything else on the endpoint path        | `400 Bad Request`                |
//! | any other path                            | `404 Not Found`                  |
//!
//! The upgrade headers are checked by tungstenite's
//! [`create_response`], which also derives `Sec-WebSocket-Accept`.  Once the
//! `101` is written, the upgraded connection is handed to
//! [`handle_upgrade`] in its own task.
//!
//! Rejections carry `Connection: close`, so the client reads the status and
//! then sees a clean end of stream.

use std::net::SocketAddr;
use std::sync::{atomic::AtomicBool, Arc};

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{self, header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use hyper::upgrade::OnUpgrade;
use tokio_tungstenite::tungstenite::handshake::server::create_response;
use tracing::debug;

use crate::application::registry::ConnectionRegistry;
use crate::domain::config::RelayConfig;
use crate::infrastructure::ws_server::handle_upgrade;

/// State shared by every request the router serves.
#[derive(Clone)]
pub struct RelayState {
    pub config: Arc<RelayConfig>,
    pub registry: Arc<ConnectionRegistry>,
    /// Cleared on shutdown; upgrades that finish afterwards are turned away.
    pub running: Arc<AtomicBool>,
}

/// Builds the relay's router: the endpoint path plus a `404` fallback.
///
/// The endpoint accepts any method so that a non-`GET` request to it is a
/// `400` like every other non-upgrade request.
pub fn router(state: RelayState) -> Router {
    let path = state.config.path.clone();
    Router::new()
        .route(&path, any(chat_endpoint))
        .fallback(not_found)
        .with_state(state)
}

async fn chat_endpoint(
    State(state): State<RelayState>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let (mut parts, _body) = request.into_parts();
    let on_upgrade = parts.extensions.remove::<OnUpgrade>();
    let head = http::Request::from_parts(parts, ());

    let response = match create_response(&head) {
        Ok(response) => response,
        Err(e) => {
            debug!(
                "{peer_addr}: {} {} is not a WebSocket upgrade ({e})",
                head.method(),
                head.uri()
            );
            return reject(StatusCode::BAD_REQUEST);
        }
    };
    let Some(on_upgrade) = on_upgrade else {
        debug!("{peer_addr}: connection does not support upgrades");
        return reject(StatusCode::BAD_REQUEST);
    };

    tokio::spawn(handle_upgrade(on_upgrade, peer_addr, state));
    response.map(|_| Body::empty())
}

async fn not_found(ConnectInfo(peer_addr): ConnectInfo<SocketAddr>, request: Request) -> Response {
    debug!("{peer_addr}: no route for {}", request.uri().path());
    reject(StatusCode::NOT_FOUND)
}

/// A bodyless status that also ends the HTTP connection.
fn reject(status: StatusCode) -> Response {
    (status, [(header::CONNECTION, "close")]).into_response()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    fn test_router() -> Router {
        router(RelayState {
            config: Arc::new(RelayConfig::default()),
            registry: Arc::new(ConnectionRegistry::new()),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    fn request(method: &str, uri: &str) -> http::request::Builder {
        let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        http::Request::builder()
            .method(method)
            .uri(uri)
            .extension(ConnectInfo(peer))
    }

    fn upgrade_request(uri: &str) -> Request {
        request("GET", uri)
            .header(header::HOST, "localhost")
            .header(header::CONNECTION, "Upgrade")
            .header(header::UPGRADE, "websocket")
            .header(header::SEC_WEBSOCKET_VERSION, "13")
            .header(header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_plain_get_on_endpoint_is_bad_request() {
        // Arrange
        let app = test_router();
        let req = request("GET", "/chat").body(Body::empty()).unwrap();

        // Act
        let response = app.oneshot(req).await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[header::CONNECTION], "close");
    }

    #[tokio::test]
    async fn test_post_on_endpoint_is_bad_request() {
        let app = test_router();
        let req = request("POST", "/chat").body(Body::from("hello")).unwrap();

        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_other_path_is_not_found() {
        let app = test_router();
        let req = request("GET", "/index.html").body(Body::empty()).unwrap();

        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::CONNECTION], "close");
    }

    #[tokio::test]
    async fn test_upgrade_on_other_path_is_not_found() {
        let app = test_router();

        let response = app.oneshot(upgrade_request("/elsewhere")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upgrade_headers_without_a_live_connection_are_refused() {
        // Arrange: valid headers, but no hyper connection behind the request
        let app = test_router();

        // Act
        let response = app.oneshot(upgrade_request("/chat")).await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_custom_endpoint_path_is_routed() {
        let app = router(RelayState {
            config: Arc::new(RelayConfig {
                path: "/ws".to_string(),
                ..RelayConfig::default()
            }),
            registry: Arc::new(ConnectionRegistry::new()),
            running: Arc::new(AtomicBool::new(true)),
        });

        let at_ws = app
            .clone()
            .oneshot(request("GET", "/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let at_chat = app
            .oneshot(request("GET", "/chat").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(at_ws.status(), StatusCode::BAD_REQUEST);
        assert_eq!(at_chat.status(), StatusCode::NOT_FOUND);
    }
}
