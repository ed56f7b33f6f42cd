//! Request body backed by the request direction of the stream.

use std::sync::Arc;

use axum::body::Body;
use bytes::Bytes;
use thiserror::Error;

use super::session::Session;
use crate::stream::{MessageSource, StreamError};
use crate::wire::HttpRequest;

/// Errors reading the tunnelled request body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BodyError {
    /// The body was closed by the handler.
    #[error("request body closed")]
    Closed,

    #[error(transparent)]
    Stream(#[from] StreamError),
}

#[derive(Debug, Clone)]
enum ReadState {
    Open,
    Eof,
    Failed(StreamError),
    Closed,
}

/// Pull-style reader over the request body chunks.
///
/// The unconsumed remainder of the last chunk is served before receiving again.
/// End of data, failure and close are terminal: later reads return the same outcome.
pub struct RequestBody {
    source: Box<dyn MessageSource<HttpRequest>>,
    session: Arc<Session>,
    expect_continue: bool,
    content_length: Option<u64>,
    buf: Bytes,
    state: ReadState,
}

impl RequestBody {
    pub(crate) fn new(
        source: Box<dyn MessageSource<HttpRequest>>,
        session: Arc<Session>,
        expect_continue: bool,
        content_length: Option<u64>,
    ) -> Self {
        Self {
            source,
            session,
            expect_continue,
            content_length,
            buf: Bytes::new(),
            state: ReadState::Open,
        }
    }

    /// Declared length, `None` when unknown.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Whether the sender is waiting for `100 Continue` before transmitting.
    pub fn expects_continue(&self) -> bool {
        self.expect_continue
    }

    /// Next chunk of body data, `None` at end of data.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, BodyError> {
        if !self.buf.is_empty() {
            return Ok(Some(std::mem::take(&mut self.buf)));
        }
        match &self.state {
            ReadState::Open => {}
            ReadState::Eof => return Ok(None),
            ReadState::Failed(e) => return Err(e.clone().into()),
            ReadState::Closed => return Err(BodyError::Closed),
        }

        if self.expect_continue {
            self.expect_continue = false;
            if let Err(e) = self.session.send_continue().await {
                self.state = ReadState::Failed(e.clone());
                return Err(e.into());
            }
        }

        loop {
            let next = tokio::select! {
                biased;
                _ = self.session.lifetime().cancelled() => Err(StreamError::Cancelled),
                r = self.source.recv() => r,
            };
            match next {
                Ok(Some(msg)) if msg.body_data.is_empty() => continue,
                Ok(Some(msg)) => return Ok(Some(msg.body_data)),
                Ok(None) => {
                    self.state = ReadState::Eof;
                    return Ok(None);
                }
                Err(e) => {
                    self.session.fail();
                    self.state = ReadState::Failed(e.clone());
                    return Err(e.into());
                }
            }
        }
    }

    /// Read up to `buf.len()` bytes. Returns 0 at end of data.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, BodyError> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.buf.is_empty() {
            match self.chunk().await? {
                Some(chunk) => self.buf = chunk,
                None => return Ok(0),
            }
        }
        let n = buf.len().min(self.buf.len());
        buf[..n].copy_from_slice(&self.buf.split_to(n));
        Ok(n)
    }

    /// Read the remaining body into memory.
    pub async fn read_to_end(&mut self) -> Result<Bytes, BodyError> {
        let mut out = Vec::new();
        while let Some(chunk) = self.chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out.into())
    }

    /// Mark the body closed. Buffered data is discarded.
    pub fn close(&mut self) {
        self.buf = Bytes::new();
        self.state = ReadState::Closed;
    }

    /// Adapt into a streaming axum body.
    pub fn into_body(self) -> Body {
        let frames = futures_util::stream::unfold(Some(self), |state| async move {
            let mut body = state?;
            match body.chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(body))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        });
        Body::from_stream(frames)
    }
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBody")
            .field("content_length", &self.content_length)
            .field("expect_continue", &self.expect_continue)
            .field("buffered", &self.buf.len())
            .field("state", &self.state)
            .finish()
    }
}
