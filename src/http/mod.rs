//! HTTP edges of the tunnel.
//!
//! # Data Flow
//! ```text
//! Forward side:
//!     TCP connection → server.rs (axum, TraceLayer, ConnectInfo) → Forwarder
//!
//! Receive side:
//!     Receiver → upstream.rs (UpstreamHandler) → hyper client → backend
//! ```
//!
//! # Design Decisions
//! - Hop-by-hop headers are not relayed to or from the backend
//! - Backend unreachable → 502, like any reverse proxy

pub mod server;
pub mod upstream;

pub use server::ForwardServer;
pub use upstream::UpstreamHandler;
