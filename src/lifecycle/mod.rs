//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → servers stop accepting → in-flight exchanges drain → exit
//!     drain deadline passed → remaining tasks are abandoned
//! ```
//!
//! # Design Decisions
//! - One broadcast channel fans the signal out to every server
//! - Draining is bounded so a stuck stream cannot block exit forever

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
