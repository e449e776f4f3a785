//! Axum server setup and router configuration.

use crate::api;
use crate::config::runtime::ServerConfig;
use crate::shutdown::shutdown_signal;
use crate::state::AppState;
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::get,
};
use ordercast_sdk::objects::HealthResponse;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the main application router.
pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        .nest("/sse", api::sse::router())
        .merge(api::ws::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&server.allowed_origins))
        // Add state to all routes
        .with_state(state)
}

/// Browsers on other origins open the event streams directly.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);
    if allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Reports the live subscriber and connection counts. Answers 503 when a
/// coordination loop is no longer running.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (broker, pool) = tokio::join!(state.broker.stats(), state.pool.stats());
    match (broker, pool) {
        (Ok(broker), Ok(pool)) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                subscribers: broker.subscribers,
                connections: pool.subscribers,
            }),
        ),
        _ => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unavailable".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                subscribers: 0,
                connections: 0,
            }),
        ),
    }
}

/// Run the server with graceful shutdown support.
///
/// On SIGTERM/SIGINT, `true` is sent on `shutdown_tx` so the broker and
/// pool loops stop and close every open stream, letting in-flight
/// connections finish.
pub async fn run_server(
    router: Router,
    addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);

    serve(listener, router, async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    })
    .await
}

async fn serve(
    listener: TcpListener,
    router: Router,
    signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    axum::serve(listener, router)
        .with_graceful_shutdown(signal)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::runtime::{BrokerConfig, PoolConfig, StreamConfig};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use ordercast_core::processors::{ConnectionPool, EventBroker};
    use ordercast_sdk::client::{NotifyClient, SocketClient};
    use ordercast_sdk::objects::{
        AcceptOrderRequest, OrderAction, OrderNotification, PublishResponse, SocketInbound,
        StreamConnected,
    };
    use std::time::Duration;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;
    use tower::ServiceExt;
    use url::Url;

    const WAIT: Duration = Duration::from_secs(5);

    struct Harness {
        state: AppState,
        shutdown_tx: watch::Sender<bool>,
        loops: Vec<JoinHandle<()>>,
    }

    fn start() -> Harness {
        let (broker, broker_loop) = EventBroker::new(BrokerConfig::default());
        let (pool, pool_loop) = ConnectionPool::new(PoolConfig::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let loops = vec![
            tokio::spawn(broker_loop.run(shutdown_rx.clone())),
            tokio::spawn(pool_loop.run(shutdown_rx)),
        ];
        let state = AppState::new(
            broker,
            pool,
            StreamConfig {
                keep_alive: Duration::from_millis(50),
            },
        );
        Harness {
            state,
            shutdown_tx,
            loops,
        }
    }

    fn router(state: AppState) -> Router {
        build_router(
            state,
            &ServerConfig {
                listen: SocketAddr::from(([127, 0, 0, 1], 0)),
                allowed_origins: Vec::new(),
            },
        )
    }

    /// Serve on an ephemeral port until the harness shuts down.
    async fn listen(harness: &Harness) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut shutdown_rx = harness.shutdown_tx.subscribe();
        let app = router(harness.state.clone());
        tokio::spawn(serve(listener, app, async move {
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
        }));
        Url::parse(&format!("http://{addr}")).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_counts() {
        let harness = start();
        let _subscription = harness
            .state
            .broker
            .subscribe(ordercast_core::events::TargetId::Wildcard)
            .unwrap();

        let resp = router(harness.state.clone())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.subscribers, 1);
        assert_eq!(health.connections, 0);
    }

    #[tokio::test]
    async fn test_send_order_is_accepted() {
        let harness = start();
        let mut subscription = harness
            .state
            .broker
            .subscribe(ordercast_core::events::TargetId::Order("42".into()))
            .unwrap();

        let resp = router(harness.state.clone())
            .oneshot(post_json("/sse/sendorder/42", r#"{"items":["tea"]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let published: PublishResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(published.order_id, "42");
        assert_eq!(published.action, OrderAction::Sent);

        let event = timeout(WAIT, subscription.recv()).await.unwrap().unwrap();
        let notification: OrderNotification = serde_json::from_str(event.payload()).unwrap();
        assert_eq!(notification.order_id, "42");
        assert_eq!(notification.order, Some(serde_json::json!({"items": ["tea"]})));
    }

    #[tokio::test]
    async fn test_accept_order_rejects_bad_bodies() {
        let harness = start();
        let app = router(harness.state.clone());

        let resp = app
            .clone()
            .oneshot(post_json("/sse/acceptorder", r#"{"status":"accepted"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let resp = app
            .clone()
            .oneshot(post_json("/sse/acceptorder", "not json"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .oneshot(post_json("/sse/acceptorder", r#"{"order_id":"  "}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_publish_after_shutdown_fails() {
        let harness = start();
        harness.shutdown_tx.send(true).unwrap();
        for handle in harness.loops {
            timeout(WAIT, handle).await.unwrap().unwrap();
        }

        let app = router(harness.state.clone());
        let resp = app
            .clone()
            .oneshot(post_json("/sse/acceptorder", r#"{"order_id":"1"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_event_stream_end_to_end() {
        let harness = start();
        let base = listen(&harness).await;
        let client = NotifyClient::new(base);

        let mut order = client.events("42").await.unwrap();
        let mut admin = client.events("admin").await.unwrap();
        let mut other = client.events("7").await.unwrap();

        let hello = timeout(WAIT, order.next_frame()).await.unwrap().unwrap().unwrap();
        assert_eq!(hello.event.as_deref(), Some("connected"));
        let hello: StreamConnected = serde_json::from_str(&hello.data).unwrap();
        assert_eq!(hello.target, "42");
        let hello = timeout(WAIT, admin.next_frame()).await.unwrap().unwrap().unwrap();
        let hello: StreamConnected = serde_json::from_str(&hello.data).unwrap();
        assert_eq!(hello.target, "*");
        timeout(WAIT, other.next_frame()).await.unwrap().unwrap().unwrap();

        client
            .send_order("42", &serde_json::json!({"total": 12}))
            .await
            .unwrap();
        client
            .accept_order(&AcceptOrderRequest {
                order_id: "7".into(),
                status: OrderAction::Rejected,
                message: Some("out of stock".into()),
            })
            .await
            .unwrap();

        let frame = timeout(WAIT, order.next_frame()).await.unwrap().unwrap().unwrap();
        let sent: OrderNotification = serde_json::from_str(&frame.data).unwrap();
        assert_eq!(sent.order_id, "42");
        assert_eq!(sent.action, OrderAction::Sent);

        // The first event on stream 7 is its own; order 42 never reached it.
        let frame = timeout(WAIT, other.next_frame()).await.unwrap().unwrap().unwrap();
        let rejected: OrderNotification = serde_json::from_str(&frame.data).unwrap();
        assert_eq!(rejected.order_id, "7");
        assert_eq!(rejected.message.as_deref(), Some("out of stock"));

        let first = timeout(WAIT, admin.next_frame()).await.unwrap().unwrap().unwrap();
        let second = timeout(WAIT, admin.next_frame()).await.unwrap().unwrap().unwrap();
        let first: OrderNotification = serde_json::from_str(&first.data).unwrap();
        let second: OrderNotification = serde_json::from_str(&second.data).unwrap();
        assert_eq!((first.order_id.as_str(), second.order_id.as_str()), ("42", "7"));

        assert_eq!(client.health().await.unwrap().subscribers, 3);
    }

    #[tokio::test]
    async fn test_idle_stream_sends_keep_alive_comments() {
        let harness = start();
        let base = listen(&harness).await;

        let mut resp = reqwest::get(base.join("/sse/events/5").unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers()["content-type"].to_str().unwrap().to_owned();
        assert!(content_type.starts_with("text/event-stream"));

        // Nothing is published, so after the hello frame only heartbeats
        // (every 50ms in this harness) can arrive.
        let mut body = String::new();
        let is_heartbeat = |line: &str| line.starts_with(':') && line.contains("keep-alive");
        timeout(WAIT, async {
            while body.lines().filter(|line| is_heartbeat(*line)).count() < 2 {
                let chunk = resp.chunk().await.unwrap().expect("stream ended early");
                body.push_str(&String::from_utf8_lossy(&chunk));
            }
        })
        .await
        .unwrap();

        let first = body.lines().next().unwrap();
        assert!(first.starts_with("event:") && first.ends_with("connected"));
        assert!(!body.lines().any(|line| line.starts_with("data:") && line.contains("order_id")));
    }

    #[tokio::test]
    async fn test_closed_stream_unregisters() {
        let harness = start();
        let base = listen(&harness).await;
        let client = NotifyClient::new(base);

        let mut stream = client.events("9").await.unwrap();
        timeout(WAIT, stream.next_frame()).await.unwrap().unwrap().unwrap();
        assert_eq!(client.health().await.unwrap().subscribers, 1);
        drop(stream);

        timeout(WAIT, async {
            while client.health().await.unwrap().subscribers != 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_ends_event_streams() {
        let harness = start();
        let base = listen(&harness).await;
        let client = NotifyClient::new(base);

        let mut stream = client.events("admin").await.unwrap();
        timeout(WAIT, stream.next_frame()).await.unwrap().unwrap().unwrap();

        harness.shutdown_tx.send(true).unwrap();
        let end = timeout(WAIT, stream.next_frame()).await.unwrap().unwrap();
        assert_eq!(end, None);
    }

    #[tokio::test]
    async fn test_socket_pool_end_to_end() {
        let harness = start();
        let base = listen(&harness).await;
        let client = NotifyClient::new(base.clone());

        let mut one = SocketClient::connect(&base, "1").await.unwrap();
        let mut two = SocketClient::connect(&base, "2").await.unwrap();
        timeout(WAIT, async {
            while client.health().await.unwrap().connections != 2 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();

        one.send(&SocketInbound {
            target: Some("2".into()),
            payload: serde_json::json!("table ready"),
        })
        .await
        .unwrap();
        let text = timeout(WAIT, two.next_text()).await.unwrap().unwrap();
        assert_eq!(text.as_deref(), Some("table ready"));

        client
            .send_order("1", &serde_json::json!({"total": 3}))
            .await
            .unwrap();
        let text = timeout(WAIT, one.next_text()).await.unwrap().unwrap().unwrap();
        let notification: OrderNotification = serde_json::from_str(&text).unwrap();
        assert_eq!(notification.order_id, "1");

        one.send_text("everyone").await.unwrap();
        let text = timeout(WAIT, two.next_text()).await.unwrap().unwrap();
        assert_eq!(text.as_deref(), Some("everyone"));
        let text = timeout(WAIT, one.next_text()).await.unwrap().unwrap();
        assert_eq!(text.as_deref(), Some("everyone"));

        two.close().await.unwrap();
        timeout(WAIT, async {
            while client.health().await.unwrap().connections != 1 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();
    }
}
