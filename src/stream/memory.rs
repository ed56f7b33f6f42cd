//! In-process transport built on tokio channels.
//!
//! Each opened stream is a pair of bounded mpsc queues. Dropping or closing a
//! sink ends its direction; the peer's `recv` then yields `None`.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Channel, ClientStream, MessageSink, MessageSource, ServerStream, StreamError};

/// Sending half backed by an mpsc queue.
pub struct MemorySink<M> {
    tx: Option<mpsc::Sender<M>>,
}

/// Receiving half backed by an mpsc queue.
pub struct MemorySource<M> {
    rx: mpsc::Receiver<M>,
}

/// Create one connected direction with the given queue capacity.
pub fn pipe<M: Send + 'static>(capacity: usize) -> (MemorySink<M>, MemorySource<M>) {
    let (tx, rx) = mpsc::channel(capacity);
    (MemorySink { tx: Some(tx) }, MemorySource { rx })
}

#[async_trait]
impl<M: Send + 'static> MessageSink<M> for MemorySink<M> {
    async fn send(&mut self, msg: M) -> Result<(), StreamError> {
        let tx = self.tx.as_ref().ok_or(StreamError::Closed)?;
        tx.send(msg).await.map_err(|_| StreamError::Closed)
    }

    async fn close_send(&mut self) -> Result<(), StreamError> {
        self.tx.take().map(drop).ok_or(StreamError::Closed)
    }
}

#[async_trait]
impl<M: Send + 'static> MessageSource<M> for MemorySource<M> {
    async fn recv(&mut self) -> Result<Option<M>, StreamError> {
        Ok(self.rx.recv().await)
    }
}

/// Client side of the in-memory transport.
#[derive(Clone)]
pub struct MemoryChannel {
    accept_tx: mpsc::Sender<ServerStream>,
    capacity: usize,
}

/// Server side of the in-memory transport; yields one stream per `open`.
pub struct MemoryListener {
    accept_rx: mpsc::Receiver<ServerStream>,
}

/// Create a connected channel/listener pair. `capacity` bounds each direction's queue.
pub fn channel(capacity: usize) -> (MemoryChannel, MemoryListener) {
    let (accept_tx, accept_rx) = mpsc::channel(16);
    (
        MemoryChannel {
            accept_tx,
            capacity: capacity.max(1),
        },
        MemoryListener { accept_rx },
    )
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn open(&self) -> Result<ClientStream, StreamError> {
        let (req_sink, req_source) = pipe(self.capacity);
        let (resp_sink, resp_source) = pipe(self.capacity);

        let server = ServerStream {
            sink: Box::new(resp_sink),
            source: Box::new(req_source),
        };
        self.accept_tx
            .send(server)
            .await
            .map_err(|_| StreamError::Transport("listener is gone".into()))?;

        Ok(ClientStream {
            sink: Box::new(req_sink),
            source: Box::new(resp_source),
        })
    }
}

impl MemoryListener {
    /// Wait for the next opened stream. `None` once every channel handle is dropped.
    pub async fn accept(&mut self) -> Option<ServerStream> {
        self.accept_rx.recv().await
    }
}
