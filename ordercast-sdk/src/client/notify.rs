//! HTTP client for the publish endpoints and the event stream.

use std::collections::VecDeque;

use reqwest::Client;
use url::Url;

use super::{ClientError, check_status};
use crate::objects::{AcceptOrderRequest, HealthResponse, PublishResponse};
use crate::sse::{SseDecoder, SseFrame};

/// Typed HTTP client for the Ordercast notification endpoints.
#[derive(Debug, Clone)]
pub struct NotifyClient {
    http: Client,
    base_url: Url,
}

impl NotifyClient {
    /// Create a new `NotifyClient` for the server at `base_url`.
    pub fn new(base_url: Url) -> Self {
        Self {
            http: Client::new(),
            base_url,
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `POST /sse/sendorder/{id}` – announce a new order to its subscribers.
    pub async fn send_order(
        &self,
        order_id: &str,
        order: &serde_json::Value,
    ) -> Result<PublishResponse, ClientError> {
        let url = self.base_url.join(&format!("/sse/sendorder/{order_id}"))?;
        let resp = self.http.post(url).json(order).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    /// `POST /sse/acceptorder` – report an accepted, rejected or completed
    /// order.
    pub async fn accept_order(
        &self,
        request: &AcceptOrderRequest,
    ) -> Result<PublishResponse, ClientError> {
        let url = self.base_url.join("/sse/acceptorder")?;
        let resp = self.http.post(url).json(request).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    /// `GET /health`
    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let url = self.base_url.join("/health")?;
        let resp = check_status(self.http.get(url).send().await?).await?;
        Ok(resp.json().await?)
    }

    /// `GET /sse/events/{id}` – open an event stream for `target`.
    ///
    /// Use `"admin"` to receive every event.
    pub async fn events(&self, target: &str) -> Result<EventStream, ClientError> {
        let url = self.base_url.join(&format!("/sse/events/{target}"))?;
        let resp = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = check_status(resp).await?;
        Ok(EventStream {
            response,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
        })
    }
}

/// An open `text/event-stream` response.
#[derive(Debug)]
pub struct EventStream {
    response: reqwest::Response,
    decoder: SseDecoder,
    pending: VecDeque<SseFrame>,
}

impl EventStream {
    /// Wait for the next frame. `Ok(None)` means the server ended the stream.
    pub async fn next_frame(&mut self) -> Result<Option<SseFrame>, ClientError> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }
            match self.response.chunk().await? {
                Some(chunk) => self.pending.extend(self.decoder.push(&chunk)),
                None => return Ok(None),
            }
        }
    }
}
