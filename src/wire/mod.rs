//! Wire contract shared by both ends of a tunnelled exchange.
//!
//! # Data Flow
//! ```text
//! Request direction (forwarder → receiver):
//!     HttpRequest { method, url, proto, remote_addr, headers }   exactly once, first
//!     HttpRequest { body_data }                                   zero or more
//!     (send side closed)
//!
//! Response direction (receiver → forwarder):
//!     HttpResponse { status_code: 100 }                           optional, continuation
//!     HttpResponse { status_code, headers }                       exactly once
//!     HttpResponse { body_data }                                  zero or more
//! ```
//!
//! # Design Decisions
//! - One message type per direction; metadata and body fields are never mixed in one message
//! - Header names travel as written and are canonicalized on decode
//! - Header values replace, never accumulate, per name

pub mod headers;
pub mod message;
pub mod version;

use thiserror::Error;

pub use headers::{flatten_headers, is_expect_continue, merge_headers_replace};
pub use message::{HttpHeader, HttpRequest, HttpResponse};
pub use version::{format_version, parse_version, to_http_version};

/// gRPC service name carrying the exchange.
pub const SERVICE_NAME: &str = "httpovergrpc.HTTPOverGRPCService";

/// Full gRPC method path of the bidirectional call.
pub const METHOD_PATH: &str = "/httpovergrpc.HTTPOverGRPCService/HTTP";

/// Status code of the provisional continuation message.
pub const STATUS_CONTINUE: i32 = 100;

/// Errors decoding header entries from a metadata message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Header name is not a valid HTTP token.
    #[error("invalid header name {0:?}")]
    InvalidHeaderName(String),

    /// Header value contains bytes not allowed in HTTP.
    #[error("invalid value for header {0:?}")]
    InvalidHeaderValue(String),
}
