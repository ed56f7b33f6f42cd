//! Receive-side gRPC service and server.

use std::convert::Infallible;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http_body_util::{BodyExt, Empty};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tokio_util::sync::CancellationToken;
use tonic::body::BoxBody;
use tonic::codec::ProstCodec;
use tonic::codegen::{BoxFuture, Service, StdError};
use tonic::server::{Grpc, NamedService, StreamingService};
use tonic::transport::Server;
use tonic::{Status, Streaming};

use super::{GrpcSource, DEFAULT_BUFFER};
use crate::receive::{Handler, ReceiveError, Receiver};
use crate::stream::{MessageSink, ServerStream, StreamError};
use crate::wire::{HttpRequest, HttpResponse, METHOD_PATH, SERVICE_NAME};

/// tonic service exposing a [`Receiver`] as the tunnel's bidirectional method.
pub struct HttpTunnelServer<H> {
    receiver: Receiver<H>,
    buffer: usize,
}

impl<H> Clone for HttpTunnelServer<H> {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.clone(),
            buffer: self.buffer,
        }
    }
}

impl<H: Handler> HttpTunnelServer<H> {
    pub fn new(receiver: Receiver<H>) -> Self {
        Self {
            receiver,
            buffer: DEFAULT_BUFFER,
        }
    }

    /// Queue depth of the response direction.
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }
}

impl<H> NamedService for HttpTunnelServer<H> {
    const NAME: &'static str = SERVICE_NAME;
}

impl<H, B> Service<http::Request<B>> for HttpTunnelServer<H>
where
    H: Handler,
    B: http_body::Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        if req.uri().path() != METHOD_PATH {
            return Box::pin(async { Ok(unimplemented()) });
        }
        let call = TunnelCall {
            receiver: self.receiver.clone(),
            buffer: self.buffer,
        };
        Box::pin(async move {
            let mut grpc = Grpc::new(ProstCodec::<HttpResponse, HttpRequest>::default());
            Ok(grpc.streaming(call, req).await)
        })
    }
}

fn unimplemented() -> http::Response<BoxBody> {
    let body = Empty::<Bytes>::new().map_err(|never| -> Status { match never {} }).boxed_unsync();
    let mut response = http::Response::new(body);
    let headers = response.headers_mut();
    headers.insert("grpc-status", HeaderValue::from(tonic::Code::Unimplemented as i32));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/grpc"));
    response
}

struct TunnelCall<H> {
    receiver: Receiver<H>,
    buffer: usize,
}

impl<H: Handler> StreamingService<HttpRequest> for TunnelCall<H> {
    type Response = HttpResponse;
    type ResponseStream = ReceiverStream<Result<HttpResponse, Status>>;
    type Future = BoxFuture<tonic::Response<Self::ResponseStream>, Status>;

    fn call(&mut self, request: tonic::Request<Streaming<HttpRequest>>) -> Self::Future {
        let receiver = self.receiver.clone();
        let (tx, rx) = mpsc::channel(self.buffer);
        Box::pin(async move {
            spawn_exchange(receiver, request.into_inner(), tx);
            Ok(tonic::Response::new(ReceiverStream::new(rx)))
        })
    }
}

/// Serve one call in the background.
///
/// The exchange's lifetime is cancelled once tonic stops reading responses,
/// i.e. when the caller went away.
fn spawn_exchange<H: Handler>(
    receiver: Receiver<H>,
    inbound: Streaming<HttpRequest>,
    outbound: mpsc::Sender<Result<HttpResponse, Status>>,
) {
    tokio::spawn(async move {
        let lifetime = CancellationToken::new();
        let stream = ServerStream {
            sink: Box::new(ResponseSink {
                tx: Some(outbound.clone()),
            }),
            source: Box::new(GrpcSource::new(inbound)),
        };

        let serve = receiver.serve_with_lifetime(stream, lifetime.clone());
        tokio::pin!(serve);
        let result = tokio::select! {
            r = &mut serve => r,
            _ = outbound.closed() => {
                lifetime.cancel();
                serve.await
            }
        };

        if let Err(e) = result {
            tracing::warn!(error = %e, "Tunnelled exchange failed");
            let _ = outbound.send(Err(status_for(&e))).await;
        }
    });
}

fn status_for(err: &ReceiveError) -> Status {
    match err {
        ReceiveError::Stream(StreamError::Cancelled) => Status::cancelled(err.to_string()),
        ReceiveError::Stream(_) => Status::unavailable(err.to_string()),
        _ => Status::invalid_argument(err.to_string()),
    }
}

struct ResponseSink {
    tx: Option<mpsc::Sender<Result<HttpResponse, Status>>>,
}

#[async_trait]
impl MessageSink<HttpResponse> for ResponseSink {
    async fn send(&mut self, msg: HttpResponse) -> Result<(), StreamError> {
        let tx = self.tx.as_ref().ok_or(StreamError::Closed)?;
        tx.send(Ok(msg)).await.map_err(|_| StreamError::Closed)
    }

    async fn close_send(&mut self) -> Result<(), StreamError> {
        self.tx.take().map(drop).ok_or(StreamError::Closed)
    }
}

/// gRPC server hosting the tunnel service.
pub struct ReceiveServer<H> {
    service: HttpTunnelServer<H>,
}

impl<H: Handler> ReceiveServer<H> {
    pub fn new(receiver: Receiver<H>) -> Self {
        Self {
            service: HttpTunnelServer::new(receiver),
        }
    }

    /// Run the server on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), tonic::transport::Error> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "Receive server starting");
        }

        Server::builder()
            .add_service(self.service)
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("Receive server stopped");
        Ok(())
    }
}
