//! Inbound receiver subsystem.
//!
//! # Data Flow
//! ```text
//! ServerStream
//!     → receiver.rs (first message → synthetic http::Request)
//!     → handler.rs (local Handler: tower service or upstream proxy)
//!     → session.rs (ResponseWriter: status/headers/body → response messages)
//!     ← body.rs (RequestBody: body chunks, 100-continue on first read)
//! ```
//!
//! # Design Decisions
//! - Writer and body reader share one send guard per exchange
//! - "Final status sent" and "continue sent" are tracked separately
//! - The default 200 is an idempotent finish step after every handler

pub mod body;
pub mod handler;
pub mod receiver;
pub mod session;

pub use body::{BodyError, RequestBody};
pub use handler::{relay_response, Handler, ServiceHandler};
pub use receiver::{Lifetime, Protocol, ReceiveError, Receiver, RemoteAddr};
pub use session::ResponseWriter;
