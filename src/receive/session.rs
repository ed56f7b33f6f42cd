//! Per-exchange send guard and the handler-facing response writer.
//!
//! The body reader and the response writer both send on the response direction:
//! the reader may emit the `100 Continue` signal while the handler writes the
//! response. Every send happens while holding `Session::send`, together with the
//! flags that decide whether a status message may still be sent.

use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::stream::{MessageSink, StreamError};
use crate::wire::{flatten_headers, HttpResponse};

struct SendState {
    sink: Box<dyn MessageSink<HttpResponse>>,
    /// Final (non-100) status has been sent.
    status_sent: bool,
    continue_sent: bool,
}

/// Shared state of one exchange on the receiving side.
pub(crate) struct Session {
    send: Mutex<SendState>,
    lifetime: CancellationToken,
}

impl Session {
    pub(crate) fn new(sink: Box<dyn MessageSink<HttpResponse>>, lifetime: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            send: Mutex::new(SendState {
                sink,
                status_sent: false,
                continue_sent: false,
            }),
            lifetime,
        })
    }

    /// Cancel the exchange. Blocked sends and receives return `Cancelled`.
    pub(crate) fn fail(&self) {
        self.lifetime.cancel();
    }

    pub(crate) fn lifetime(&self) -> &CancellationToken {
        &self.lifetime
    }

    async fn send_locked(&self, state: &mut SendState, msg: HttpResponse) -> Result<(), StreamError> {
        let result = tokio::select! {
            biased;
            _ = self.lifetime.cancelled() => Err(StreamError::Cancelled),
            r = state.sink.send(msg) => r,
        };
        if result.is_err() {
            self.fail();
        }
        result
    }

    /// Send the final status once. Returns `false` if it had already been sent.
    pub(crate) async fn send_status(&self, status: StatusCode, headers: &HeaderMap) -> Result<bool, StreamError> {
        let mut state = self.send.lock().await;
        if state.status_sent {
            return Ok(false);
        }
        state.status_sent = true;
        let msg = HttpResponse::metadata(i32::from(status.as_u16()), flatten_headers(headers));
        self.send_locked(&mut state, msg).await?;
        Ok(true)
    }

    /// Send `100 Continue` unless a continuation or the final status already went out.
    pub(crate) async fn send_continue(&self) -> Result<(), StreamError> {
        let mut state = self.send.lock().await;
        if state.status_sent || state.continue_sent {
            return Ok(());
        }
        state.continue_sent = true;
        self.send_locked(&mut state, HttpResponse::continue_()).await
    }

    /// Send a provisional 1xx status other than 100. Never commits the response.
    pub(crate) async fn send_informational(&self, status: StatusCode, headers: &HeaderMap) -> Result<bool, StreamError> {
        let mut state = self.send.lock().await;
        if state.status_sent {
            return Ok(false);
        }
        let msg = HttpResponse::metadata(i32::from(status.as_u16()), flatten_headers(headers));
        self.send_locked(&mut state, msg).await?;
        Ok(true)
    }

    pub(crate) async fn send_body(&self, data: Bytes) -> Result<(), StreamError> {
        let mut state = self.send.lock().await;
        self.send_locked(&mut state, HttpResponse::body_chunk(data)).await
    }

    pub(crate) async fn status_sent(&self) -> bool {
        self.send.lock().await.status_sent
    }
}

/// Response writer handed to a [`Handler`](super::Handler).
///
/// Headers are collected in memory and only travel with the status message.
/// The status is sent at most once; writing body bytes sends `200 OK` first if
/// no status went out yet. A failed send cancels the whole exchange.
pub struct ResponseWriter {
    headers: HeaderMap,
    session: Arc<Session>,
}

impl ResponseWriter {
    pub(crate) fn new(session: Arc<Session>) -> Self {
        Self {
            headers: HeaderMap::new(),
            session,
        }
    }

    /// Headers that will accompany the status.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Set a header, replacing any previous values. Has no effect once the status is sent.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Send the status with the collected headers.
    ///
    /// Only the first final status has any effect. Informational statuses are
    /// sent as provisional messages and do not commit the response; `100 Continue`
    /// goes out at most once.
    pub async fn write_status(&mut self, status: StatusCode) -> Result<(), StreamError> {
        if status == StatusCode::CONTINUE {
            return self.session.send_continue().await;
        }
        if status.is_informational() {
            if self.session.send_informational(status, &self.headers).await? {
                tracing::trace!(status = status.as_u16(), "Informational status sent");
            }
            return Ok(());
        }
        if self.session.send_status(status, &self.headers).await? {
            tracing::trace!(status = status.as_u16(), "Response status sent");
        }
        Ok(())
    }

    /// Write body bytes, returning how many were accepted.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize, StreamError> {
        self.write_bytes(Bytes::copy_from_slice(data)).await?;
        Ok(data.len())
    }

    /// Write one body chunk without copying.
    pub async fn write_bytes(&mut self, data: Bytes) -> Result<(), StreamError> {
        self.write_status(StatusCode::OK).await?;
        self.session.send_body(data).await
    }

    /// Whether the final status has been sent.
    pub async fn is_committed(&self) -> bool {
        self.session.status_sent().await
    }

    /// Abandon the exchange; the forwarding side sees the stream fail.
    pub fn abort(&self) {
        self.session.fail();
    }

    /// Lifetime of the exchange, cancelled on any stream failure.
    pub fn lifetime(&self) -> &CancellationToken {
        self.session.lifetime()
    }

    /// Default `200 OK` for handlers that never wrote a status.
    pub(crate) async fn finish(&mut self) -> Result<(), StreamError> {
        self.write_status(StatusCode::OK).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::memory::{pipe, MemorySource};
    use crate::stream::MessageSource;

    fn writer() -> (ResponseWriter, MemorySource<HttpResponse>, CancellationToken) {
        let (sink, source) = pipe(16);
        let lifetime = CancellationToken::new();
        let session = Session::new(Box::new(sink), lifetime.clone());
        (ResponseWriter::new(session), source, lifetime)
    }

    async fn drain(writer: ResponseWriter, mut source: MemorySource<HttpResponse>) -> Vec<HttpResponse> {
        drop(writer);
        let mut out = Vec::new();
        while let Some(msg) = source.recv().await.unwrap() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn write_status_is_idempotent() {
        let (mut w, source, _) = writer();
        w.set_header(HeaderName::from_static("x-first"), HeaderValue::from_static("1"));
        w.write_status(StatusCode::CREATED).await.unwrap();
        w.set_header(HeaderName::from_static("x-late"), HeaderValue::from_static("2"));
        w.write_status(StatusCode::INTERNAL_SERVER_ERROR).await.unwrap();
        w.write(b"body").await.unwrap();
        assert!(w.is_committed().await);

        let sent = drain(w, source).await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].status_code, 201);
        assert_eq!(sent[0].headers.len(), 1);
        assert_eq!(sent[0].headers[0].header, "x-first");
        assert_eq!(sent[1].body_data, Bytes::from_static(b"body"));
    }

    #[tokio::test]
    async fn body_write_implies_ok_status() {
        let (mut w, source, _) = writer();
        assert_eq!(w.write(b"abc").await.unwrap(), 3);
        w.finish().await.unwrap();

        let sent = drain(w, source).await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].status_code, 200);
        assert!(sent[0].body_data.is_empty());
        assert_eq!(sent[1].body_data, Bytes::from_static(b"abc"));
    }

    #[tokio::test]
    async fn continue_does_not_commit_the_response() {
        let (mut w, source, _) = writer();
        w.write_status(StatusCode::CONTINUE).await.unwrap();
        w.write_status(StatusCode::CONTINUE).await.unwrap();
        assert!(!w.is_committed().await);
        w.write_status(StatusCode::ACCEPTED).await.unwrap();

        let codes: Vec<_> = drain(w, source).await.iter().map(|m| m.status_code).collect();
        assert_eq!(codes, vec![100, 202]);
    }

    #[tokio::test]
    async fn informational_status_does_not_commit() {
        let (mut w, source, _) = writer();
        w.set_header(HeaderName::from_static("link"), HeaderValue::from_static("</app.css>; rel=preload"));
        w.write_status(StatusCode::from_u16(103).unwrap()).await.unwrap();
        assert!(!w.is_committed().await);
        w.write(b"ok").await.unwrap();
        w.write_status(StatusCode::from_u16(103).unwrap()).await.unwrap();

        let sent = drain(w, source).await;
        let codes: Vec<_> = sent.iter().map(|m| m.status_code).collect();
        assert_eq!(codes, vec![103, 200, 0]);
        assert_eq!(sent[0].headers[0].header, "link");
        assert_eq!(sent[2].body_data, Bytes::from_static(b"ok"));
    }

    #[tokio::test]
    async fn send_failure_cancels_the_exchange() {
        let (mut w, source, lifetime) = writer();
        drop(source);

        assert_eq!(w.write(b"lost").await, Err(StreamError::Closed));
        assert!(lifetime.is_cancelled());
        assert_eq!(w.write(b"again").await, Err(StreamError::Cancelled));
    }
}
