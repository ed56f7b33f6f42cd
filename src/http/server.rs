//! HTTP server for the forwarding side.
//!
//! # Responsibilities
//! - Accept downstream HTTP/1.1 and HTTP/2 connections via Axum
//! - Record the peer address for request metadata
//! - Hand every request to the forwarder
//! - Stop accepting on shutdown and drain in-flight exchanges

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::forward::Forwarder;
use crate::stream::Channel;

/// HTTP listener in front of a [`Forwarder`].
pub struct ForwardServer {
    router: Router,
}

impl ForwardServer {
    pub fn new<C: Channel>(forwarder: Forwarder<C>) -> Self {
        Self {
            router: Self::build_router(forwarder),
        }
    }

    fn build_router<C: Channel>(forwarder: Forwarder<C>) -> Router {
        forwarder.router().layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "Forward server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("Forward server stopped");
        Ok(())
    }
}
