//! Server-sent events API handlers.
//!
//! # Endpoints
//!
//! - `GET  /events/{id}`    – open a push stream for order `id` (`admin` for all)
//! - `POST /sendorder/{id}` – announce a newly sent order
//! - `POST /acceptorder`    – report an accepted, rejected or completed order

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use kanau::processor::Processor;
use ordercast_core::events::{OrderEvent, PublishError, TargetId};
use ordercast_core::processors::Subscription;
use ordercast_sdk::objects::{
    AcceptOrderRequest, OrderAction, OrderNotification, PublishResponse, StreamConnected,
};
use tokio_stream::Stream;
use tracing::{debug, info};

use crate::state::AppState;

/// Build the SSE API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/events/{id}", get(events))
        .route("/sendorder/{id}", post(send_order))
        .route("/acceptorder", post(accept_order))
}

// ---------------------------------------------------------------------------
// GET /events/{id}
// ---------------------------------------------------------------------------

/// Long-lived push stream.
///
/// The first frame is `event: connected` with the subscriber id. Every
/// published event matching `id` follows as a single `data:` frame. A
/// keep-alive comment is written whenever the stream has been idle for the
/// configured interval, which also surfaces dead connections.
async fn events(
    state: State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, SseApiError> {
    let target = TargetId::parse(&id);
    let subscription = state
        .broker
        .subscribe(target.clone())
        .map_err(SseApiError::Publish)?;

    let hello = StreamConnected {
        subscriber_id: subscription.id().as_uuid(),
        target: target.to_string(),
    };
    let hello = Event::default()
        .event("connected")
        .json_data(&hello)
        .map_err(|e| SseApiError::Encode(e.to_string()))?;

    info!(
        subscriber_id = %subscription.id(),
        target_id = %target,
        "Event stream opened"
    );

    let keep_alive = state.stream_config().await.keep_alive;
    let stream = OrderEventStream {
        hello: Some(hello),
        subscription,
    };
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(keep_alive).text("keep-alive")))
}

/// Response body of one event stream.
///
/// Owns the [`Subscription`]; when the connection goes away for any reason
/// the body is dropped and the subscriber is unregistered.
struct OrderEventStream {
    hello: Option<Event>,
    subscription: Subscription,
}

impl Stream for OrderEventStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(hello) = self.hello.take() {
            return Poll::Ready(Some(Ok(hello)));
        }
        Pin::new(&mut self.subscription)
            .poll_next(cx)
            .map(|event| event.map(|event| Ok(to_sse_event(&event))))
    }
}

impl Drop for OrderEventStream {
    fn drop(&mut self) {
        info!(
            subscriber_id = %self.subscription.id(),
            target_id = %self.subscription.target(),
            "Event stream closed"
        );
    }
}

/// One event, one `data:` frame. Carriage returns cannot be framed and are
/// stripped.
fn to_sse_event(event: &OrderEvent) -> Event {
    let payload = event.payload();
    if payload.contains('\r') {
        Event::default().data(payload.replace('\r', ""))
    } else {
        Event::default().data(payload)
    }
}

// ---------------------------------------------------------------------------
// POST /sendorder/{id}
// ---------------------------------------------------------------------------

/// Publish an `order sent` notification to the
/// subscribers of `id`. The request body is the order document.
async fn send_order(
    state: State<AppState>,
    Path(order_id): Path<String>,
    Json(order): Json<serde_json::Value>,
) -> Result<impl IntoResponse, SseApiError> {
    let order_id = order_id.trim().to_string();
    if order_id.is_empty() {
        return Err(SseApiError::MissingOrderId);
    }
    let notification = OrderNotification::new(order_id, OrderAction::Sent).with_order(order);
    publish(&state, notification).await
}

// ---------------------------------------------------------------------------
// POST /acceptorder
// ---------------------------------------------------------------------------

/// Publish the shop's decision on an order.
async fn accept_order(
    state: State<AppState>,
    Json(request): Json<AcceptOrderRequest>,
) -> Result<impl IntoResponse, SseApiError> {
    let order_id = request.order_id.trim().to_string();
    if order_id.is_empty() {
        return Err(SseApiError::MissingOrderId);
    }
    let notification =
        OrderNotification::new(order_id, request.status).with_message(request.message);
    publish(&state, notification).await
}

/// Serialize `notification` and hand it to the notifier, targeted at its order.
async fn publish(
    state: &AppState,
    notification: OrderNotification,
) -> Result<(StatusCode, Json<PublishResponse>), SseApiError> {
    let payload =
        serde_json::to_string(&notification).map_err(|e| SseApiError::Encode(e.to_string()))?;

    state
        .notifier
        .process(OrderEvent::targeted(&notification.order_id, payload))
        .await
        .map_err(SseApiError::Publish)?;

    debug!(
        order_id = %notification.order_id,
        action = %notification.action,
        "Order notification published"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(PublishResponse {
            order_id: notification.order_id,
            action: notification.action,
        }),
    ))
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

/// Errors that can occur in SSE API handlers.
#[derive(Debug)]
enum SseApiError {
    /// The broker refused the event or registration.
    Publish(PublishError),
    /// A payload could not be encoded.
    Encode(String),
    /// The request named no order.
    MissingOrderId,
}

impl IntoResponse for SseApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            SseApiError::Publish(PublishError::QueueFull) => {
                tracing::warn!("SSE API: event queue full, event dropped");
                (StatusCode::SERVICE_UNAVAILABLE, "event queue is full").into_response()
            }
            SseApiError::Publish(PublishError::Closed) => {
                tracing::error!("SSE API: event broker is not running");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            SseApiError::Encode(e) => {
                tracing::error!(error = %e, "SSE API: failed to encode payload");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            SseApiError::MissingOrderId => {
                (StatusCode::BAD_REQUEST, "order id is required").into_response()
            }
        }
    }
}
