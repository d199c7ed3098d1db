//! HTTP façade subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID)
//!     → handlers.rs (JSON ⇄ ValueInteractor)
//!     → Send to client
//! ```
//!
//! # Error Mapping
//! - Malformed body or value → 400
//! - Any interactor failure → 500 with the error message

pub mod handlers;
pub mod request;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
