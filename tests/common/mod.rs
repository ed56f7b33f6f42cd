//! Shared utilities for tunnel integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use http::Request;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use http_tunnel::forward::Forwarder;
use http_tunnel::lifecycle::Shutdown;
use http_tunnel::receive::{Handler, ReceiveError, Receiver, RequestBody, ResponseWriter};
use http_tunnel::stream::memory::{channel, pipe, MemoryChannel, MemoryListener, MemorySink, MemorySource};
use http_tunnel::stream::{Channel, ClientStream, MessageSink, MessageSource, ServerStream, StreamError};
use http_tunnel::wire::{HttpHeader, HttpRequest, HttpResponse};
use http_tunnel::ForwardServer;

/// Writes the request body back as the response body.
pub struct Echo;

#[async_trait]
impl Handler for Echo {
    async fn handle(&self, mut req: Request<RequestBody>, w: &mut ResponseWriter) {
        let body = req.body_mut().read_to_end().await.unwrap();
        w.write_status(http::StatusCode::OK).await.unwrap();
        if !body.is_empty() {
            w.write_bytes(body).await.unwrap();
        }
    }
}

/// Serve every stream accepted on `listener`, reporting each exchange's outcome.
pub fn spawn_receiver<H: Handler>(
    receiver: Receiver<H>,
    mut listener: MemoryListener,
) -> mpsc::UnboundedReceiver<Result<(), ReceiveError>> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(stream) = listener.accept().await {
            let receiver = receiver.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let _ = tx.send(receiver.serve(stream).await);
            });
        }
    });
    rx
}

/// Forwarder connected to `handler` through an in-memory tunnel.
pub fn tunnel<H: Handler>(handler: H) -> Forwarder<MemoryChannel> {
    let (channel, listener) = channel(16);
    spawn_receiver(Receiver::new(handler), listener);
    Forwarder::new(channel)
}

/// Serve `forwarder` over HTTP on an ephemeral port.
///
/// The server runs until the returned [`Shutdown`] is triggered or dropped.
pub async fn serve_http<C: Channel>(forwarder: Forwarder<C>) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = ForwardServer::new(forwarder).run(listener, rx).await;
    });
    (addr, shutdown)
}

/// Client-side view of one exchange, driven by hand.
pub struct Client {
    pub requests: MemorySink<HttpRequest>,
    pub responses: MemorySource<HttpResponse>,
}

/// A connected server stream plus the handles that drive its client side.
pub fn server_stream() -> (ServerStream, Client) {
    let (req_sink, req_source) = pipe(64);
    let (resp_sink, resp_source) = pipe(64);
    (
        ServerStream {
            sink: Box::new(resp_sink),
            source: Box::new(req_source),
        },
        Client {
            requests: req_sink,
            responses: resp_source,
        },
    )
}

/// Collect every response message until the stream ends.
pub async fn collect(source: &mut MemorySource<HttpResponse>) -> Vec<HttpResponse> {
    let mut out = Vec::new();
    while let Ok(Some(msg)) = source.recv().await {
        out.push(msg);
    }
    out
}

pub fn header(name: &str, values: &[&str]) -> HttpHeader {
    HttpHeader {
        header: name.into(),
        values: values.iter().map(|v| v.to_string()).collect(),
    }
}

pub fn request_metadata(method: &str, url: &str, headers: Vec<HttpHeader>) -> HttpRequest {
    HttpRequest {
        method: method.into(),
        url: url.into(),
        proto: "HTTP/1.1".into(),
        remote_addr: "192.0.2.10:5000".into(),
        headers,
        ..Default::default()
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Response source replaying a fixed script, then ending the stream.
pub struct ScriptedSource {
    script: VecDeque<Result<HttpResponse, StreamError>>,
}

#[async_trait]
impl MessageSource<HttpResponse> for ScriptedSource {
    async fn recv(&mut self) -> Result<Option<HttpResponse>, StreamError> {
        match self.script.pop_front() {
            Some(Ok(msg)) => Ok(Some(msg)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

/// Request sink recording everything sent.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub sent: Arc<Mutex<Vec<HttpRequest>>>,
}

#[async_trait]
impl MessageSink<HttpRequest> for RecordingSink {
    async fn send(&mut self, msg: HttpRequest) -> Result<(), StreamError> {
        self.sent.lock().unwrap().push(msg);
        Ok(())
    }

    async fn close_send(&mut self) -> Result<(), StreamError> {
        Ok(())
    }
}

/// Channel whose single stream replays `script` as the response direction.
pub struct ScriptedChannel {
    script: Mutex<Option<Vec<Result<HttpResponse, StreamError>>>>,
    pub sink: RecordingSink,
}

impl ScriptedChannel {
    pub fn new(script: Vec<Result<HttpResponse, StreamError>>) -> Self {
        Self {
            script: Mutex::new(Some(script)),
            sink: RecordingSink::default(),
        }
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    async fn open(&self) -> Result<ClientStream, StreamError> {
        let script = self
            .script
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| StreamError::Transport("script already used".into()))?;
        Ok(ClientStream {
            sink: Box::new(self.sink.clone()),
            source: Box::new(ScriptedSource { script: script.into() }),
        })
    }
}

/// Request source replaying a fixed script on the receiving side.
pub struct ScriptedRequests {
    script: VecDeque<Result<HttpRequest, StreamError>>,
}

impl ScriptedRequests {
    pub fn new(script: Vec<Result<HttpRequest, StreamError>>) -> Self {
        Self { script: script.into() }
    }
}

#[async_trait]
impl MessageSource<HttpRequest> for ScriptedRequests {
    async fn recv(&mut self) -> Result<Option<HttpRequest>, StreamError> {
        match self.script.pop_front() {
            Some(Ok(msg)) => Ok(Some(msg)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}
