//! HTTP-over-stream tunnel library.
//!
//! Carries HTTP exchanges over one bidirectional message stream per request:
//! the forwarding side turns an incoming HTTP request into stream messages,
//! the receiving side turns them back into a request for a local handler.

pub mod config;
pub mod forward;
pub mod grpc;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod receive;
pub mod stream;
pub mod wire;

pub use config::TunnelConfig;
pub use forward::Forwarder;
pub use grpc::{GrpcChannel, ReceiveServer};
pub use crate::http::{ForwardServer, UpstreamHandler};
pub use lifecycle::Shutdown;
pub use receive::{Handler, Receiver, ResponseWriter};
pub use stream::{Channel, ClientStream, ServerStream, StreamError};
