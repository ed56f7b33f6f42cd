//! Bidirectional stream primitive consumed by the forwarder and the receiver.
//!
//! # Data Flow
//! ```text
//! Forwarder                                   Receiver
//!   Channel::open() → ClientStream              ServerStream (one per call)
//!     sink:   MessageSink<HttpRequest>   ───▶     source: MessageSource<HttpRequest>
//!     source: MessageSource<HttpResponse> ◀───    sink:   MessageSink<HttpResponse>
//! ```
//!
//! # Design Decisions
//! - A stream is split into its two directions so each half has a single owner
//! - End of stream is `Ok(None)` from `recv`, never an error
//! - Transports: in-memory (`memory`) and gRPC (`crate::grpc`)

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::wire::{HttpRequest, HttpResponse};

/// Failures of the underlying stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The peer went away or the direction was already closed.
    #[error("stream closed")]
    Closed,

    /// The exchange's lifetime was cancelled.
    #[error("stream cancelled")]
    Cancelled,

    /// Opaque transport failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<tonic::Status> for StreamError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::Cancelled => StreamError::Cancelled,
            _ => StreamError::Transport(format!("{}: {}", status.code(), status.message())),
        }
    }
}

/// Sending half of one stream direction.
#[async_trait]
pub trait MessageSink<M: Send + 'static>: Send {
    /// Send one message, preserving order within the direction.
    async fn send(&mut self, msg: M) -> Result<(), StreamError>;

    /// Close the direction cleanly. Later sends fail.
    async fn close_send(&mut self) -> Result<(), StreamError>;
}

/// Receiving half of one stream direction.
#[async_trait]
pub trait MessageSource<M: Send + 'static>: Send {
    /// Next message, or `None` once the peer closed its send side.
    async fn recv(&mut self) -> Result<Option<M>, StreamError>;
}

/// Forwarder's view of one exchange.
pub struct ClientStream {
    pub sink: Box<dyn MessageSink<HttpRequest>>,
    pub source: Box<dyn MessageSource<HttpResponse>>,
}

/// Receiver's view of one exchange.
pub struct ServerStream {
    pub sink: Box<dyn MessageSink<HttpResponse>>,
    pub source: Box<dyn MessageSource<HttpRequest>>,
}

/// Something that can open a new stream per request.
#[async_trait]
pub trait Channel: Send + Sync + 'static {
    async fn open(&self) -> Result<ClientStream, StreamError>;
}
