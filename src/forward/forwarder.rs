//! Outbound forwarder: serves HTTP requests by tunnelling them over a [`Channel`].

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use bytes::Bytes;
use tokio::sync::Mutex;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::Instrument;
use uuid::Uuid;

use super::transmit::{SharedSink, Transmit};
use crate::observability::metrics;
use crate::stream::{Channel, ClientStream, MessageSource, StreamError};
use crate::wire::{flatten_headers, format_version, is_expect_continue, merge_headers_replace, HttpRequest, HttpResponse};

/// Reference body chunk size.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Request handler that forwards every request over its own stream.
pub struct Forwarder<C> {
    channel: Arc<C>,
    chunk_size: usize,
}

impl<C> Clone for Forwarder<C> {
    fn clone(&self) -> Self {
        Self {
            channel: Arc::clone(&self.channel),
            chunk_size: self.chunk_size,
        }
    }
}

impl<C: Channel> Forwarder<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel: Arc::new(channel),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Maximum payload of one request body chunk message.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Axum router sending every path and method through the tunnel.
    pub fn router(self) -> Router {
        Router::new().fallback(forward_handler::<C>).with_state(self)
    }

    /// Forward one request and build the downstream response.
    ///
    /// The response body keeps relaying until the stream ends. Dropping the
    /// returned response (or this future) cancels the exchange.
    pub async fn forward(&self, req: Request<Body>) -> Response {
        let start = Instant::now();
        let span = tracing::info_span!(
            "forward",
            exchange_id = %Uuid::new_v4(),
            method = %req.method(),
            url = %req.uri(),
        );

        let response = self.exchange(req).instrument(span).await;
        metrics::record_forward(response.status().as_u16(), start);
        response
    }

    async fn exchange(&self, req: Request<Body>) -> Response {
        let lifetime = CancellationToken::new();
        let guard = lifetime.clone().drop_guard();

        let ClientStream { sink, mut source } = match self.channel.open().await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to open stream");
                return gateway_error();
            }
        };
        let sink: SharedSink = Arc::new(Mutex::new(sink));

        let remote_addr = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_default();
        let expect_continue = is_expect_continue(req.headers());
        let (parts, body) = req.into_parts();

        let metadata = HttpRequest {
            method: parts.method.to_string(),
            url: parts.uri.to_string(),
            proto: format_version(parts.version).to_owned(),
            remote_addr,
            headers: flatten_headers(&parts.headers),
            body_data: Bytes::new(),
        };
        if let Err(e) = sink.lock().await.send(metadata).await {
            tracing::warn!(error = %e, "Failed to send request metadata");
            return gateway_error();
        }

        let mut pending_body = Some(Transmit::new(body, sink, lifetime.clone(), self.chunk_size));
        if !expect_continue {
            if let Some(transmit) = pending_body.take() {
                transmit.spawn();
            }
        }

        let mut headers = HeaderMap::new();
        let status = loop {
            let next = tokio::select! {
                biased;
                _ = lifetime.cancelled() => Err(StreamError::Cancelled),
                r = source.recv() => r,
            };
            let msg = match next {
                Ok(Some(msg)) => msg,
                Ok(None) => {
                    tracing::warn!("Stream ended before response metadata");
                    metrics::record_stream_failure("forward");
                    return gateway_error();
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Stream failed before response metadata");
                    metrics::record_stream_failure("forward");
                    return gateway_error();
                }
            };

            if let Err(e) = merge_headers_replace(&mut headers, &msg.headers) {
                tracing::warn!(error = %e, "Invalid response metadata");
                return gateway_error();
            }
            if msg.is_continue() {
                if let Some(transmit) = pending_body.take() {
                    tracing::debug!("Continuation received, transmitting request body");
                    transmit.spawn();
                }
                continue;
            }
            match final_status(&msg) {
                Some(status) if status.is_informational() => continue,
                Some(status) => break status,
                None => {
                    tracing::warn!(status_code = msg.status_code, "Invalid response status");
                    return gateway_error();
                }
            }
        };
        // A body still waiting for its continuation is never sent.
        drop(pending_body);

        tracing::debug!(status = status.as_u16(), "Response metadata received");
        let mut response = Response::new(relay_body(source, lifetime, guard));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

async fn forward_handler<C: Channel>(State(forwarder): State<Forwarder<C>>, req: Request<Body>) -> Response {
    forwarder.forward(req).await
}

fn final_status(msg: &HttpResponse) -> Option<StatusCode> {
    u16::try_from(msg.status_code)
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
}

fn gateway_error() -> Response {
    StatusCode::BAD_GATEWAY.into_response()
}

struct Relay {
    source: Box<dyn MessageSource<HttpResponse>>,
    lifetime: CancellationToken,
    _guard: DropGuard,
}

/// Response body fed by the stream's body chunks.
///
/// Ends quietly on stream failure: the status is already committed downstream.
fn relay_body(source: Box<dyn MessageSource<HttpResponse>>, lifetime: CancellationToken, guard: DropGuard) -> Body {
    let relay = Relay {
        source,
        lifetime,
        _guard: guard,
    };
    let chunks = futures_util::stream::unfold(Some(relay), |state| async move {
        let mut relay = state?;
        loop {
            let next = tokio::select! {
                biased;
                _ = relay.lifetime.cancelled() => Err(StreamError::Cancelled),
                r = relay.source.recv() => r,
            };
            match next {
                Ok(Some(msg)) if msg.body_data.is_empty() => continue,
                Ok(Some(msg)) => return Some((Ok::<_, Infallible>(msg.body_data), Some(relay))),
                Ok(None) => return None,
                Err(e) => {
                    tracing::debug!(error = %e, "Stream failed while relaying body, response truncated");
                    metrics::record_stream_failure("forward");
                    return None;
                }
            }
        }
    });
    Body::from_stream(chunks)
}
