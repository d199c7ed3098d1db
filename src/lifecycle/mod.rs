//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → HTTP server drains, watchers release subscriptions,
//!                 pending confirmation waits return Cancelled
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger()
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
