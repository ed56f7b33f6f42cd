//! Forward-side gRPC channel.

use std::time::Duration;

use async_trait::async_trait;
use http::uri::PathAndQuery;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::transport::{Channel as TransportChannel, Endpoint};

use super::{GrpcSource, DEFAULT_BUFFER};
use crate::stream::{Channel, ClientStream, MessageSink, StreamError};
use crate::wire::{HttpRequest, HttpResponse, METHOD_PATH};

/// Opens one bidirectional tunnel call per request over a tonic channel.
#[derive(Clone)]
pub struct GrpcChannel {
    inner: Grpc<TransportChannel>,
    buffer: usize,
}

impl GrpcChannel {
    pub fn new(channel: TransportChannel) -> Self {
        Self {
            inner: Grpc::new(channel),
            buffer: DEFAULT_BUFFER,
        }
    }

    /// Lazily connected channel to `endpoint` (e.g. `http://10.0.0.2:50051`).
    ///
    /// Connection errors surface per request, as gateway errors.
    pub fn connect_lazy(endpoint: &str, connect_timeout: Duration) -> Result<Self, tonic::transport::Error> {
        let channel = Endpoint::from_shared(endpoint.to_owned())?
            .connect_timeout(connect_timeout)
            .connect_lazy();
        tracing::debug!(endpoint, "gRPC channel configured");
        Ok(Self::new(channel))
    }

    /// Queue depth of the request direction.
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }
}

#[async_trait]
impl Channel for GrpcChannel {
    async fn open(&self) -> Result<ClientStream, StreamError> {
        let mut grpc = self.inner.clone();
        grpc.ready()
            .await
            .map_err(|e| StreamError::Transport(format!("service was not ready: {e}")))?;

        let (tx, rx) = mpsc::channel(self.buffer);
        let codec = ProstCodec::<HttpRequest, HttpResponse>::default();
        let path = PathAndQuery::from_static(METHOD_PATH);
        let response = grpc
            .streaming(tonic::Request::new(ReceiverStream::new(rx)), path, codec)
            .await?;

        Ok(ClientStream {
            sink: Box::new(RequestSink { tx: Some(tx) }),
            source: Box::new(GrpcSource::new(response.into_inner())),
        })
    }
}

struct RequestSink {
    tx: Option<mpsc::Sender<HttpRequest>>,
}

#[async_trait]
impl MessageSink<HttpRequest> for RequestSink {
    async fn send(&mut self, msg: HttpRequest) -> Result<(), StreamError> {
        let tx = self.tx.as_ref().ok_or(StreamError::Closed)?;
        tx.send(msg).await.map_err(|_| StreamError::Closed)
    }

    async fn close_send(&mut self) -> Result<(), StreamError> {
        // Dropping the sender ends the request stream, which half-closes the call.
        self.tx.take().map(drop).ok_or(StreamError::Closed)
    }
}
