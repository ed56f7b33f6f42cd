//! Outbound forwarder subsystem.
//!
//! # Data Flow
//! ```text
//! Downstream HTTP request
//!     → forwarder.rs (open stream, send metadata)
//!     → transmit.rs (body task: now, or after 100 Continue)
//!     ← forwarder.rs (response metadata → status + headers)
//!     ← relay body (body chunks → downstream response body)
//! ```
//!
//! # Design Decisions
//! - One stream per request, never shared
//! - Gateway error only while nothing has been committed downstream
//! - The body task reports back only by cancelling the exchange

pub mod forwarder;
mod transmit;

pub use forwarder::{Forwarder, DEFAULT_CHUNK_SIZE};
