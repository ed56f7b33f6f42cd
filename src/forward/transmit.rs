//! Request body transmission task.

use std::sync::Arc;

use axum::body::Body;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::stream::{MessageSink, StreamError};
use crate::wire::HttpRequest;

/// Request-direction sink shared by the main task and the body task.
pub(crate) type SharedSink = Arc<Mutex<Box<dyn MessageSink<HttpRequest>>>>;

/// Pending transmission of one request body.
///
/// Its only signal back to the exchange is cancelling `lifetime` on failure.
pub(crate) struct Transmit {
    body: Body,
    sink: SharedSink,
    lifetime: CancellationToken,
    chunk_size: usize,
}

impl Transmit {
    pub(crate) fn new(body: Body, sink: SharedSink, lifetime: CancellationToken, chunk_size: usize) -> Self {
        Self {
            body,
            sink,
            lifetime,
            chunk_size: chunk_size.max(1),
        }
    }

    pub(crate) fn spawn(self) {
        tokio::spawn(self.run());
    }

    async fn run(self) {
        let Transmit {
            body,
            sink,
            lifetime,
            chunk_size,
        } = self;
        let mut frames = body.into_data_stream();

        loop {
            let next = tokio::select! {
                biased;
                _ = lifetime.cancelled() => return,
                next = frames.next() => next,
            };
            match next {
                Some(Ok(data)) => {
                    for chunk in split_chunks(data, chunk_size) {
                        match send(&sink, &lifetime, HttpRequest::body_chunk(chunk)).await {
                            Ok(()) => {}
                            // The peer answered without reading the whole body.
                            Err(StreamError::Closed) => {
                                tracing::debug!("Peer stopped accepting the request body");
                                return;
                            }
                            Err(e) => {
                                tracing::debug!(error = %e, "Request body send failed");
                                lifetime.cancel();
                                return;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "Request body read failed");
                    lifetime.cancel();
                    return;
                }
                None => {
                    if let Err(e) = sink.lock().await.close_send().await {
                        tracing::debug!(error = %e, "Closing request direction failed");
                        lifetime.cancel();
                    }
                    return;
                }
            }
        }
    }
}

async fn send(sink: &SharedSink, lifetime: &CancellationToken, msg: HttpRequest) -> Result<(), StreamError> {
    let mut sink = sink.lock().await;
    tokio::select! {
        biased;
        _ = lifetime.cancelled() => Err(StreamError::Cancelled),
        r = sink.send(msg) => r,
    }
}

/// Split a frame into chunks of at most `size` bytes without copying.
fn split_chunks(mut data: Bytes, size: usize) -> impl Iterator<Item = Bytes> {
    std::iter::from_fn(move || {
        if data.is_empty() {
            None
        } else {
            Some(data.split_to(size.min(data.len())))
        }
    })
}
