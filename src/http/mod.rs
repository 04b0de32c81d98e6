//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request-id, trace, timeout)
//!     → request.rs (request ID, buffered body, InboundRequest)
//!     → pipeline (prepare → validate → forward)
//!     → response.rs (ResponseEnvelope → JSON response)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use response::ResponseEnvelope;
pub use server::HttpServer;
