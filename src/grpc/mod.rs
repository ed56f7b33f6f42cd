//! gRPC transport for the tunnel, built on tonic.
//!
//! # Data Flow
//! ```text
//! forward side                                   receive side
//!   GrpcChannel::open()                            HttpTunnelServer (tonic service)
//!     mpsc → ReceiverStream<HttpRequest>  ──h2──▶    Streaming<HttpRequest> → Receiver
//!     Streaming<HttpResponse>            ◀──h2──    ReceiverStream<Result<HttpResponse, Status>>
//! ```
//!
//! # Design Decisions
//! - Messages are prost-derived; the service is written by hand, no build script
//! - Each call maps to exactly one `ClientStream`/`ServerStream`
//! - Receiver failures surface as the call's `tonic::Status`

pub mod client;
pub mod server;

use async_trait::async_trait;
use tonic::Streaming;

use crate::stream::{MessageSource, StreamError};

pub use client::GrpcChannel;
pub use server::{HttpTunnelServer, ReceiveServer};

/// Default queue depth between the stream halves and tonic.
pub const DEFAULT_BUFFER: usize = 16;

/// Receiving half over a tonic message stream.
pub(crate) struct GrpcSource<M> {
    inner: Streaming<M>,
}

impl<M> GrpcSource<M> {
    pub(crate) fn new(inner: Streaming<M>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<M: Send + 'static> MessageSource<M> for GrpcSource<M> {
    async fn recv(&mut self) -> Result<Option<M>, StreamError> {
        self.inner.message().await.map_err(StreamError::from)
    }
}
